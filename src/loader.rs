use crate::error::PipelineError;
use crate::types::{
    CategoryTranslation, Customer, GeoSample, Order, OrderItem, Payment, Product, RawCustomer,
    RawGeolocation, RawOrder, RawOrderItem, RawPayment, RawProduct, RawTables, RawTranslation,
};
use crate::util::{parse_datetime_safe, parse_f64_safe};
use csv::ReaderBuilder;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::path::Path;

pub const ORDERS_CSV: &str = "olist_orders_dataset.csv";
pub const CUSTOMERS_CSV: &str = "olist_customers_dataset.csv";
pub const ORDER_ITEMS_CSV: &str = "olist_order_items_dataset.csv";
pub const ORDER_PAYMENTS_CSV: &str = "olist_order_payments_dataset.csv";
pub const PRODUCTS_CSV: &str = "olist_products_dataset.csv";
pub const TRANSLATION_CSV: &str = "product_category_name_translation.csv";
pub const GEOLOCATION_CSV: &str = "olist_geolocation_dataset.csv";

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub rows_loaded: usize,
    pub rows_skipped: usize,
}

/// Read one CSV into raw rows. A missing file is the genuine fault path;
/// rows that fail structural deserialization are skipped and counted.
fn read_table<T: DeserializeOwned>(
    raw_dir: &Path,
    file: &str,
    table: &'static str,
    report: &mut LoadReport,
) -> Result<Vec<T>, PipelineError> {
    let path = raw_dir.join(file);
    if !path.exists() {
        return Err(PipelineError::MissingSource { table, path });
    }
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(&path)?;
    let mut rows = Vec::new();
    for result in rdr.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                report.rows_skipped += 1;
                warn!("skipping malformed {} row: {}", table, e);
            }
        }
    }
    report.rows_loaded += rows.len();
    debug!("{}: {} rows", table, rows.len());
    Ok(rows)
}

/// Load the seven required source tables and coerce them to typed records.
///
/// Rows missing their join key are dropped (and counted); every other
/// missing or unparseable value becomes `None` and flows through the
/// pipeline as a null.
pub fn load_required(raw_dir: &Path) -> Result<(RawTables, LoadReport), PipelineError> {
    let mut report = LoadReport::default();

    let raw_orders: Vec<RawOrder> = read_table(raw_dir, ORDERS_CSV, "orders", &mut report)?;
    let raw_customers: Vec<RawCustomer> =
        read_table(raw_dir, CUSTOMERS_CSV, "customers", &mut report)?;
    let raw_items: Vec<RawOrderItem> =
        read_table(raw_dir, ORDER_ITEMS_CSV, "order_items", &mut report)?;
    let raw_payments: Vec<RawPayment> =
        read_table(raw_dir, ORDER_PAYMENTS_CSV, "order_payments", &mut report)?;
    let raw_products: Vec<RawProduct> = read_table(raw_dir, PRODUCTS_CSV, "products", &mut report)?;
    let raw_translations: Vec<RawTranslation> = read_table(
        raw_dir,
        TRANSLATION_CSV,
        "product_category_translation",
        &mut report,
    )?;
    let raw_geo: Vec<RawGeolocation> =
        read_table(raw_dir, GEOLOCATION_CSV, "geolocation", &mut report)?;

    let skip = |report: &mut LoadReport| {
        report.rows_skipped += 1;
        report.rows_loaded -= 1;
    };

    let mut orders = Vec::with_capacity(raw_orders.len());
    for row in raw_orders {
        match (row.order_id, row.customer_id) {
            (Some(order_id), Some(customer_id)) => orders.push(Order {
                order_id,
                customer_id,
                order_status: row.order_status.unwrap_or_else(|| "unknown".to_string()),
                purchase_ts: parse_datetime_safe(row.order_purchase_timestamp.as_deref()),
                estimated_delivery_ts: parse_datetime_safe(
                    row.order_estimated_delivery_date.as_deref(),
                ),
                delivered_ts: parse_datetime_safe(row.order_delivered_customer_date.as_deref()),
            }),
            _ => skip(&mut report),
        }
    }

    let mut customers = Vec::with_capacity(raw_customers.len());
    for row in raw_customers {
        match row.customer_id {
            Some(customer_id) => customers.push(Customer {
                customer_id,
                zip_prefix: row.customer_zip_code_prefix,
                city: row.customer_city,
                state: row.customer_state,
            }),
            None => skip(&mut report),
        }
    }

    let mut order_items = Vec::with_capacity(raw_items.len());
    for row in raw_items {
        match row.order_id {
            Some(order_id) => order_items.push(OrderItem {
                order_id,
                product_id: row.product_id,
                freight_value: parse_f64_safe(row.freight_value.as_deref()),
            }),
            None => skip(&mut report),
        }
    }

    let mut payments = Vec::with_capacity(raw_payments.len());
    for row in raw_payments {
        match row.order_id {
            Some(order_id) => payments.push(Payment {
                order_id,
                payment_type: row.payment_type,
                payment_value: parse_f64_safe(row.payment_value.as_deref()),
            }),
            None => skip(&mut report),
        }
    }

    let mut products = Vec::with_capacity(raw_products.len());
    for row in raw_products {
        match row.product_id {
            Some(product_id) => products.push(Product {
                product_id,
                category: row.product_category_name,
            }),
            None => skip(&mut report),
        }
    }

    let mut translations = Vec::with_capacity(raw_translations.len());
    for row in raw_translations {
        match (row.product_category_name, row.product_category_name_english) {
            (Some(category), Some(category_english)) => translations.push(CategoryTranslation {
                category,
                category_english,
            }),
            _ => skip(&mut report),
        }
    }

    let mut geolocation = Vec::with_capacity(raw_geo.len());
    for row in raw_geo {
        match row.geolocation_zip_code_prefix {
            Some(zip_prefix) => geolocation.push(GeoSample {
                zip_prefix,
                lat: parse_f64_safe(row.geolocation_lat.as_deref()),
                lng: parse_f64_safe(row.geolocation_lng.as_deref()),
            }),
            None => skip(&mut report),
        }
    }

    let tables = RawTables {
        orders,
        customers,
        order_items,
        payments,
        products,
        translations,
        geolocation,
    };
    Ok((tables, report))
}
