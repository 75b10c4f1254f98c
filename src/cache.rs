// Disk-backed memoization of the fact table as a columnar parquet
// artifact, plus the in-memory keyed cache owned by the front-end.
//
// The artifact has no staleness check: if it exists it is returned
// verbatim, and freshness is obtained by deleting it or passing
// `use_cache_file = false`. Writers racing on the same artifact are not
// coordinated; the last writer wins.
use crate::error::PipelineError;
use crate::loader;
use crate::transform;
use crate::types::FactOrder;
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FACT_FILE: &str = "fact_orders.parquet";

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

fn fact_schema() -> Schema {
    Schema::new(vec![
        Field::new("order_id", DataType::Utf8, false),
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("order_status", DataType::Utf8, false),
        Field::new("order_purchase_timestamp", timestamp_type(), true),
        Field::new("order_estimated_delivery_date", timestamp_type(), true),
        Field::new("order_delivered_customer_date", timestamp_type(), true),
        Field::new("customer_zip_code_prefix", DataType::Utf8, true),
        Field::new("customer_city", DataType::Utf8, true),
        Field::new("customer_state", DataType::Utf8, true),
        Field::new("mean_lat", DataType::Float64, true),
        Field::new("mean_lng", DataType::Float64, true),
        Field::new("payment_type_mode", DataType::Utf8, true),
        Field::new("payment_value_sum", DataType::Float64, true),
        Field::new("freight_value_sum", DataType::Float64, true),
        Field::new("product_category_mode", DataType::Utf8, true),
        Field::new("delay_days", DataType::Int64, true),
        Field::new("on_time", DataType::Boolean, true),
    ])
}

fn ts_micros(t: Option<NaiveDateTime>) -> Option<i64> {
    t.map(|t| t.and_utc().timestamp_micros())
}

/// Persist the fact table to a single parquet file with the fixed schema.
pub fn write_fact_parquet(path: &Path, facts: &[FactOrder]) -> Result<(), PipelineError> {
    let schema = Arc::new(fact_schema());
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            facts.iter().map(|f| f.order_id.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            facts.iter().map(|f| f.customer_id.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            facts.iter().map(|f| f.order_status.as_str()),
        )),
        Arc::new(
            facts
                .iter()
                .map(|f| ts_micros(f.purchase_ts))
                .collect::<TimestampMicrosecondArray>(),
        ),
        Arc::new(
            facts
                .iter()
                .map(|f| ts_micros(f.estimated_delivery_ts))
                .collect::<TimestampMicrosecondArray>(),
        ),
        Arc::new(
            facts
                .iter()
                .map(|f| ts_micros(f.delivered_ts))
                .collect::<TimestampMicrosecondArray>(),
        ),
        Arc::new(
            facts
                .iter()
                .map(|f| f.zip_prefix.as_deref())
                .collect::<StringArray>(),
        ),
        Arc::new(facts.iter().map(|f| f.city.as_deref()).collect::<StringArray>()),
        Arc::new(facts.iter().map(|f| f.state.as_deref()).collect::<StringArray>()),
        Arc::new(facts.iter().map(|f| f.mean_lat).collect::<Float64Array>()),
        Arc::new(facts.iter().map(|f| f.mean_lng).collect::<Float64Array>()),
        Arc::new(
            facts
                .iter()
                .map(|f| f.payment_type_mode.as_deref())
                .collect::<StringArray>(),
        ),
        Arc::new(
            facts
                .iter()
                .map(|f| f.payment_value_sum)
                .collect::<Float64Array>(),
        ),
        Arc::new(
            facts
                .iter()
                .map(|f| f.freight_value_sum)
                .collect::<Float64Array>(),
        ),
        Arc::new(
            facts
                .iter()
                .map(|f| f.product_category_mode.as_deref())
                .collect::<StringArray>(),
        ),
        Arc::new(facts.iter().map(|f| f.delay_days).collect::<Int64Array>()),
        Arc::new(facts.iter().map(|f| f.on_time).collect::<BooleanArray>()),
    ];
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a T, PipelineError> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| PipelineError::Cache(format!("column `{}` missing from artifact", name)))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| PipelineError::Cache(format!("column `{}` has an unexpected type", name)))
}

fn opt_str(a: &StringArray, i: usize) -> Option<String> {
    (!a.is_null(i)).then(|| a.value(i).to_string())
}

fn opt_f64(a: &Float64Array, i: usize) -> Option<f64> {
    (!a.is_null(i)).then(|| a.value(i))
}

fn opt_i64(a: &Int64Array, i: usize) -> Option<i64> {
    (!a.is_null(i)).then(|| a.value(i))
}

fn opt_bool(a: &BooleanArray, i: usize) -> Option<bool> {
    (!a.is_null(i)).then(|| a.value(i))
}

fn opt_ts(a: &TimestampMicrosecondArray, i: usize) -> Option<NaiveDateTime> {
    if a.is_null(i) {
        None
    } else {
        DateTime::from_timestamp_micros(a.value(i)).map(|t| t.naive_utc())
    }
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<FactOrder>) -> Result<(), PipelineError> {
    let order_id = column::<StringArray>(batch, "order_id")?;
    let customer_id = column::<StringArray>(batch, "customer_id")?;
    let order_status = column::<StringArray>(batch, "order_status")?;
    let purchase = column::<TimestampMicrosecondArray>(batch, "order_purchase_timestamp")?;
    let estimated = column::<TimestampMicrosecondArray>(batch, "order_estimated_delivery_date")?;
    let delivered = column::<TimestampMicrosecondArray>(batch, "order_delivered_customer_date")?;
    let zip = column::<StringArray>(batch, "customer_zip_code_prefix")?;
    let city = column::<StringArray>(batch, "customer_city")?;
    let state = column::<StringArray>(batch, "customer_state")?;
    let lat = column::<Float64Array>(batch, "mean_lat")?;
    let lng = column::<Float64Array>(batch, "mean_lng")?;
    let payment_mode = column::<StringArray>(batch, "payment_type_mode")?;
    let payment_sum = column::<Float64Array>(batch, "payment_value_sum")?;
    let freight_sum = column::<Float64Array>(batch, "freight_value_sum")?;
    let category_mode = column::<StringArray>(batch, "product_category_mode")?;
    let delay = column::<Int64Array>(batch, "delay_days")?;
    let on_time = column::<BooleanArray>(batch, "on_time")?;

    for i in 0..batch.num_rows() {
        out.push(FactOrder {
            order_id: order_id.value(i).to_string(),
            customer_id: customer_id.value(i).to_string(),
            order_status: order_status.value(i).to_string(),
            purchase_ts: opt_ts(purchase, i),
            estimated_delivery_ts: opt_ts(estimated, i),
            delivered_ts: opt_ts(delivered, i),
            zip_prefix: opt_str(zip, i),
            city: opt_str(city, i),
            state: opt_str(state, i),
            mean_lat: opt_f64(lat, i),
            mean_lng: opt_f64(lng, i),
            payment_type_mode: opt_str(payment_mode, i),
            payment_value_sum: opt_f64(payment_sum, i),
            freight_value_sum: opt_f64(freight_sum, i),
            product_category_mode: opt_str(category_mode, i),
            delay_days: opt_i64(delay, i),
            on_time: opt_bool(on_time, i),
        });
    }
    Ok(())
}

/// Load the fact table back from a parquet artifact written by
/// [`write_fact_parquet`].
pub fn read_fact_parquet(path: &Path) -> Result<Vec<FactOrder>, PipelineError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut facts = Vec::new();
    for batch in reader {
        let batch = batch?;
        decode_batch(&batch, &mut facts)?;
    }
    Ok(facts)
}

/// Obtain the fact table, memoized to disk.
///
/// If `use_cache_file` is set and the artifact exists under
/// `processed_dir`, it is loaded and returned unchanged. Otherwise the full
/// pipeline runs from `raw_dir`, the result is persisted, and returned.
pub fn get_fact_orders(
    raw_dir: &Path,
    processed_dir: &Path,
    use_cache_file: bool,
) -> Result<Vec<FactOrder>, PipelineError> {
    let artifact = processed_dir.join(FACT_FILE);
    if use_cache_file && artifact.exists() {
        info!("loading cached fact table from {}", artifact.display());
        return read_fact_parquet(&artifact);
    }
    let (tables, report) = loader::load_required(raw_dir)?;
    info!(
        "loaded {} raw rows ({} skipped)",
        report.rows_loaded, report.rows_skipped
    );
    let facts = transform::build_fact_orders(&tables);
    fs::create_dir_all(processed_dir)?;
    write_fact_parquet(&artifact, &facts)?;
    info!(
        "persisted {} fact rows to {}",
        facts.len(),
        artifact.display()
    );
    Ok(facts)
}

/// In-memory memo of loaded fact tables, owned by the caller (not a
/// process-global). Keyed by the raw directory and the cache-file flag;
/// an entry lives until explicitly evicted.
#[derive(Default)]
pub struct FactCache {
    entries: HashMap<(PathBuf, bool), Arc<Vec<FactOrder>>>,
}

impl FactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(
        &mut self,
        raw_dir: &Path,
        processed_dir: &Path,
        use_cache_file: bool,
    ) -> Result<Arc<Vec<FactOrder>>, PipelineError> {
        let key = (raw_dir.to_path_buf(), use_cache_file);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(Arc::clone(hit));
        }
        let facts = Arc::new(get_fact_orders(raw_dir, processed_dir, use_cache_file)?);
        self.entries.insert(key, Arc::clone(&facts));
        Ok(facts)
    }

    pub fn evict(&mut self, raw_dir: &Path, use_cache_file: bool) {
        self.entries.remove(&(raw_dir.to_path_buf(), use_cache_file));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::parse_datetime_safe;

    fn full_fact() -> FactOrder {
        FactOrder {
            order_id: "o1".to_string(),
            customer_id: "c1".to_string(),
            order_status: "delivered".to_string(),
            purchase_ts: parse_datetime_safe(Some("2024-01-01 09:00:00")),
            estimated_delivery_ts: parse_datetime_safe(Some("2024-01-10 00:00:00")),
            delivered_ts: parse_datetime_safe(Some("2024-01-08 16:00:00")),
            zip_prefix: Some("01310".to_string()),
            city: Some("sao paulo".to_string()),
            state: Some("SP".to_string()),
            mean_lat: Some(-23.56),
            mean_lng: Some(-46.65),
            payment_type_mode: Some("credit_card".to_string()),
            payment_value_sum: Some(80.0),
            freight_value_sum: Some(12.5),
            product_category_mode: Some("health_beauty".to_string()),
            delay_days: Some(-2),
            on_time: Some(true),
        }
    }

    fn sparse_fact() -> FactOrder {
        FactOrder {
            order_id: "o2".to_string(),
            customer_id: "c2".to_string(),
            order_status: "shipped".to_string(),
            purchase_ts: None,
            estimated_delivery_ts: None,
            delivered_ts: None,
            zip_prefix: None,
            city: None,
            state: None,
            mean_lat: None,
            mean_lng: None,
            payment_type_mode: None,
            payment_value_sum: None,
            freight_value_sum: None,
            product_category_mode: None,
            delay_days: None,
            on_time: None,
        }
    }

    #[test]
    fn parquet_round_trip_preserves_values_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FACT_FILE);
        let facts = vec![full_fact(), sparse_fact()];
        write_fact_parquet(&path, &facts).unwrap();
        let loaded = read_fact_parquet(&path).unwrap();
        assert_eq!(loaded, facts);
    }

    #[test]
    fn parquet_round_trip_of_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FACT_FILE);
        write_fact_parquet(&path, &[]).unwrap();
        assert!(read_fact_parquet(&path).unwrap().is_empty());
    }

    #[test]
    fn existing_artifact_short_circuits_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("processed");
        fs::create_dir_all(&processed).unwrap();
        let facts = vec![full_fact()];
        write_fact_parquet(&processed.join(FACT_FILE), &facts).unwrap();

        // The raw directory does not exist; a rebuild would fail. The cache
        // hit must return the persisted table without touching it.
        let missing_raw = dir.path().join("no-such-raw");
        let loaded = get_fact_orders(&missing_raw, &processed, true).unwrap();
        assert_eq!(loaded, facts);
    }

    #[test]
    fn skipping_the_cache_forces_a_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("processed");
        fs::create_dir_all(&processed).unwrap();
        write_fact_parquet(&processed.join(FACT_FILE), &[full_fact()]).unwrap();

        let missing_raw = dir.path().join("no-such-raw");
        let err = get_fact_orders(&missing_raw, &processed, false).unwrap_err();
        assert!(matches!(err, PipelineError::MissingSource { .. }));
    }

    #[test]
    fn fact_cache_memoizes_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("processed");
        fs::create_dir_all(&processed).unwrap();
        let facts = vec![full_fact(), sparse_fact()];
        write_fact_parquet(&processed.join(FACT_FILE), &facts).unwrap();

        let raw = dir.path().join("raw");
        let mut cache = FactCache::new();
        let first = cache.fetch(&raw, &processed, true).unwrap();
        let second = cache.fetch(&raw, &processed, true).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, facts);

        cache.evict(&raw, true);
        let third = cache.fetch(&raw, &processed, true).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*third, facts);
    }
}
