// The consumption contract over the fact table: filtering, scalar KPIs,
// and the per-state geographic rollup.
use crate::types::{FactOrder, GeoStateRow, KpiSummary};
use crate::util::average;
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};

/// Filter dimensions for the fact table. The default value applies no
/// restriction at all; an empty set means that dimension is inactive.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
    pub states: Vec<String>,
    pub categories: Vec<String>,
    pub payment_types: Vec<String>,
    pub delivered_only: bool,
}

fn in_set(value: Option<&str>, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    // A null value never matches an active membership filter.
    match value {
        Some(v) => allowed.iter().any(|a| a == v),
        None => false,
    }
}

/// Return the rows satisfying every active constraint. Constraints AND
/// together; each membership set is an OR over its values. Date bounds are
/// inclusive on the purchase timestamp, and a row with a null purchase
/// timestamp fails any active date bound.
pub fn apply_filters(facts: &[FactOrder], filter: &OrderFilter) -> Vec<FactOrder> {
    facts
        .iter()
        .filter(|f| {
            if let Some(from) = filter.date_from {
                match f.purchase_ts {
                    Some(ts) if ts >= from => {}
                    _ => return false,
                }
            }
            if let Some(to) = filter.date_to {
                match f.purchase_ts {
                    Some(ts) if ts <= to => {}
                    _ => return false,
                }
            }
            if !in_set(f.state.as_deref(), &filter.states) {
                return false;
            }
            if !in_set(f.product_category_mode.as_deref(), &filter.categories) {
                return false;
            }
            if !in_set(f.payment_type_mode.as_deref(), &filter.payment_types) {
                return false;
            }
            if filter.delivered_only && f.order_status != "delivered" {
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

/// Scalar KPIs over a (filtered) fact slice. Rates and means default to 0.0
/// on empty or all-null input; a division by zero never reaches the caller.
///
/// The on-time rate is computed over delivered rows whose `on_time` is
/// known; rows where the delay could not be derived are excluded from both
/// the numerator and the denominator.
pub fn compute_kpis(facts: &[FactOrder]) -> KpiSummary {
    let total_orders = facts.len();
    let delivered: Vec<&FactOrder> = facts
        .iter()
        .filter(|f| f.order_status == "delivered")
        .collect();
    let delivered_orders = delivered.len();

    let on_time_known = delivered.iter().filter(|f| f.on_time.is_some()).count();
    let on_time_count = delivered
        .iter()
        .filter(|f| f.on_time == Some(true))
        .count();
    let on_time_rate = if on_time_known > 0 {
        on_time_count as f64 / on_time_known as f64
    } else {
        0.0
    };

    let delays: Vec<f64> = delivered
        .iter()
        .filter_map(|f| f.delay_days)
        .map(|d| d as f64)
        .collect();
    let avg_delay_days = average(&delays);

    let total_payment_value: f64 = facts.iter().filter_map(|f| f.payment_value_sum).sum();
    let total_freight_value: f64 = facts.iter().filter_map(|f| f.freight_value_sum).sum();

    KpiSummary {
        total_orders,
        delivered_orders,
        on_time_count,
        on_time_rate,
        avg_delay_days,
        total_payment_value,
        total_freight_value,
    }
}

/// Per-state rollup for the map view. Rows missing either coordinate are
/// dropped before grouping; empty input yields zero rows rather than an
/// error. Output is sorted by state code for stable display.
pub fn group_geo(facts: &[FactOrder]) -> Vec<GeoStateRow> {
    #[derive(Default)]
    struct Acc {
        lats: Vec<f64>,
        lngs: Vec<f64>,
        order_ids: HashSet<String>,
        delivered_ids: HashSet<String>,
        on_time_known: usize,
        on_time_count: usize,
        delays: Vec<f64>,
    }
    let mut map: HashMap<String, Acc> = HashMap::new();
    for f in facts {
        let (Some(lat), Some(lng)) = (f.mean_lat, f.mean_lng) else {
            continue;
        };
        let Some(state) = f.state.as_deref() else {
            continue;
        };
        let e = map.entry(state.to_string()).or_default();
        e.lats.push(lat);
        e.lngs.push(lng);
        e.order_ids.insert(f.order_id.clone());
        if f.order_status == "delivered" {
            e.delivered_ids.insert(f.order_id.clone());
            if let Some(on_time) = f.on_time {
                e.on_time_known += 1;
                if on_time {
                    e.on_time_count += 1;
                }
            }
            if let Some(delay) = f.delay_days {
                e.delays.push(delay as f64);
            }
        }
    }

    let mut rows: Vec<GeoStateRow> = map
        .into_iter()
        .map(|(state, acc)| {
            let on_time_rate = if acc.on_time_known > 0 {
                acc.on_time_count as f64 / acc.on_time_known as f64
            } else {
                0.0
            };
            GeoStateRow {
                state,
                mean_lat: average(&acc.lats),
                mean_lng: average(&acc.lngs),
                order_count: acc.order_ids.len(),
                delivered_count: acc.delivered_ids.len(),
                on_time_count: acc.on_time_count,
                on_time_rate,
                avg_delay_days: average(&acc.delays),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.state.cmp(&b.state));
    rows
}
