// The transform pipeline: geo lookup, per-order aggregation, and the
// left-join chain that assembles the fact table.
use crate::types::{
    CategoryTranslation, Customer, FactOrder, GeoSample, OrderItem, Payment, Product, RawTables,
};
use crate::util::{days_between, mode_first};
use log::info;
use std::collections::HashMap;

/// Centroid of all geolocation samples sharing a zip prefix. Latitude and
/// longitude are averaged independently so one malformed coordinate does
/// not discard the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCentroid {
    pub mean_lat: Option<f64>,
    pub mean_lng: Option<f64>,
}

/// Group geolocation samples by zip prefix and average the coordinates.
/// Prefixes absent from the input get no entry; nothing is synthesized.
pub fn build_geo_lookup(samples: &[GeoSample]) -> HashMap<String, GeoCentroid> {
    #[derive(Default)]
    struct Acc {
        lat_sum: f64,
        lat_n: usize,
        lng_sum: f64,
        lng_n: usize,
    }
    let mut map: HashMap<String, Acc> = HashMap::new();
    for s in samples {
        let e = map.entry(s.zip_prefix.clone()).or_default();
        if let Some(lat) = s.lat {
            e.lat_sum += lat;
            e.lat_n += 1;
        }
        if let Some(lng) = s.lng {
            e.lng_sum += lng;
            e.lng_n += 1;
        }
    }
    map.into_iter()
        .map(|(prefix, acc)| {
            let centroid = GeoCentroid {
                mean_lat: (acc.lat_n > 0).then(|| acc.lat_sum / acc.lat_n as f64),
                mean_lng: (acc.lng_n > 0).then(|| acc.lng_sum / acc.lng_n as f64),
            };
            (prefix, centroid)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentAgg {
    pub type_mode: Option<String>,
    pub value_sum: f64,
}

/// One aggregate per order that has at least one payment row: the mode of
/// the non-null payment types (first-encountered wins ties) and the sum of
/// payment values with nulls as zero.
pub fn aggregate_payments(payments: &[Payment]) -> HashMap<String, PaymentAgg> {
    #[derive(Default)]
    struct Acc {
        types: Vec<String>,
        value_sum: f64,
    }
    let mut map: HashMap<String, Acc> = HashMap::new();
    for p in payments {
        let e = map.entry(p.order_id.clone()).or_default();
        if let Some(t) = &p.payment_type {
            e.types.push(t.clone());
        }
        e.value_sum += p.payment_value.unwrap_or(0.0);
    }
    map.into_iter()
        .map(|(order_id, acc)| {
            let agg = PaymentAgg {
                type_mode: mode_first(&acc.types),
                value_sum: acc.value_sum,
            };
            (order_id, agg)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemAgg {
    pub freight_sum: f64,
    pub category_mode: Option<String>,
}

/// One aggregate per order that has at least one item row. Each item's
/// category is resolved before counting: the English translation when one
/// exists, the untranslated name otherwise. Items whose product or category
/// is unknown contribute freight but no category.
pub fn aggregate_items(
    items: &[OrderItem],
    products: &[Product],
    translations: &[CategoryTranslation],
) -> HashMap<String, ItemAgg> {
    let category_by_product: HashMap<&str, Option<&str>> = products
        .iter()
        .map(|p| (p.product_id.as_str(), p.category.as_deref()))
        .collect();
    let english_by_category: HashMap<&str, &str> = translations
        .iter()
        .map(|t| (t.category.as_str(), t.category_english.as_str()))
        .collect();

    #[derive(Default)]
    struct Acc {
        freight_sum: f64,
        categories: Vec<String>,
    }
    let mut map: HashMap<String, Acc> = HashMap::new();
    for item in items {
        let e = map.entry(item.order_id.clone()).or_default();
        e.freight_sum += item.freight_value.unwrap_or(0.0);
        let category = item
            .product_id
            .as_deref()
            .and_then(|pid| category_by_product.get(pid).copied())
            .flatten();
        if let Some(cat) = category {
            let resolved = english_by_category.get(cat).copied().unwrap_or(cat);
            e.categories.push(resolved.to_string());
        }
    }
    map.into_iter()
        .map(|(order_id, acc)| {
            let agg = ItemAgg {
                freight_sum: acc.freight_sum,
                category_mode: mode_first(&acc.categories),
            };
            (order_id, agg)
        })
        .collect()
}

/// Assemble the fact table: orders left-joined with customers, the geo
/// lookup, and the two per-order aggregates, preserving the orders table's
/// row order. `delay_days`/`on_time` are derived only for delivered orders;
/// a delivery date on any other status never produces a delay.
pub fn build_fact_orders(tables: &RawTables) -> Vec<FactOrder> {
    let customers_by_id: HashMap<&str, &Customer> = tables
        .customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c))
        .collect();
    let geo_lookup = build_geo_lookup(&tables.geolocation);
    let payment_aggs = aggregate_payments(&tables.payments);
    let item_aggs = aggregate_items(&tables.order_items, &tables.products, &tables.translations);

    let mut facts = Vec::with_capacity(tables.orders.len());
    for order in &tables.orders {
        let customer = customers_by_id.get(order.customer_id.as_str());
        let zip_prefix = customer.and_then(|c| c.zip_prefix.clone());
        let centroid = zip_prefix.as_deref().and_then(|z| geo_lookup.get(z));
        let payment = payment_aggs.get(order.order_id.as_str());
        let items = item_aggs.get(order.order_id.as_str());

        let (delay_days, on_time) = if order.order_status == "delivered" {
            match (order.delivered_ts, order.estimated_delivery_ts) {
                (Some(delivered), Some(estimated)) => {
                    let delay = days_between(estimated, delivered);
                    (Some(delay), Some(delay <= 0))
                }
                _ => (None, None),
            }
        } else {
            (None, None)
        };

        facts.push(FactOrder {
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            order_status: order.order_status.clone(),
            purchase_ts: order.purchase_ts,
            estimated_delivery_ts: order.estimated_delivery_ts,
            delivered_ts: order.delivered_ts,
            zip_prefix,
            city: customer.and_then(|c| c.city.clone()),
            state: customer.and_then(|c| c.state.clone()),
            mean_lat: centroid.and_then(|g| g.mean_lat),
            mean_lng: centroid.and_then(|g| g.mean_lng),
            payment_type_mode: payment.and_then(|p| p.type_mode.clone()),
            payment_value_sum: payment.map(|p| p.value_sum),
            freight_value_sum: items.map(|i| i.freight_sum),
            product_category_mode: items.and_then(|i| i.category_mode.clone()),
            delay_days,
            on_time,
        });
    }
    info!("assembled {} fact rows", facts.len());
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Order;
    use crate::util::parse_datetime_safe;

    fn order(id: &str, status: &str, purchase: &str, estimated: &str, delivered: &str) -> Order {
        Order {
            order_id: id.to_string(),
            customer_id: format!("c-{}", id),
            order_status: status.to_string(),
            purchase_ts: parse_datetime_safe(Some(purchase)),
            estimated_delivery_ts: parse_datetime_safe(Some(estimated)),
            delivered_ts: parse_datetime_safe(Some(delivered)),
        }
    }

    fn customer(id: &str, zip: &str, state: &str) -> Customer {
        Customer {
            customer_id: id.to_string(),
            zip_prefix: Some(zip.to_string()),
            city: None,
            state: Some(state.to_string()),
        }
    }

    fn geo(zip: &str, lat: Option<f64>, lng: Option<f64>) -> GeoSample {
        GeoSample {
            zip_prefix: zip.to_string(),
            lat,
            lng,
        }
    }

    fn empty_tables() -> RawTables {
        RawTables {
            orders: vec![],
            customers: vec![],
            order_items: vec![],
            payments: vec![],
            products: vec![],
            translations: vec![],
            geolocation: vec![],
        }
    }

    #[test]
    fn geo_lookup_averages_per_prefix_and_skips_bad_coords() {
        let samples = vec![
            geo("01310", Some(-23.0), Some(-46.0)),
            geo("01310", Some(-25.0), Some(-48.0)),
            geo("01310", None, Some(-50.0)),
            geo("99999", None, None),
        ];
        let lookup = build_geo_lookup(&samples);
        let c = lookup.get("01310").unwrap();
        assert_eq!(c.mean_lat, Some(-24.0));
        assert_eq!(c.mean_lng, Some(-48.0));
        // Prefix seen but with no usable coordinates: entry has null means.
        let empty = lookup.get("99999").unwrap();
        assert_eq!(empty.mean_lat, None);
        // Prefix never seen: no entry at all.
        assert!(lookup.get("00000").is_none());
    }

    #[test]
    fn payment_aggregate_mode_and_sum() {
        let payments = vec![
            Payment {
                order_id: "o2".to_string(),
                payment_type: Some("credit_card".to_string()),
                payment_value: Some(50.0),
            },
            Payment {
                order_id: "o2".to_string(),
                payment_type: Some("credit_card".to_string()),
                payment_value: Some(30.0),
            },
        ];
        let aggs = aggregate_payments(&payments);
        let agg = aggs.get("o2").unwrap();
        assert_eq!(agg.type_mode.as_deref(), Some("credit_card"));
        assert_eq!(agg.value_sum, 80.0);
    }

    #[test]
    fn payment_aggregate_with_all_null_types_still_sums() {
        let payments = vec![
            Payment {
                order_id: "o1".to_string(),
                payment_type: None,
                payment_value: Some(10.0),
            },
            Payment {
                order_id: "o1".to_string(),
                payment_type: None,
                payment_value: None,
            },
        ];
        let aggs = aggregate_payments(&payments);
        let agg = aggs.get("o1").unwrap();
        assert_eq!(agg.type_mode, None);
        assert_eq!(agg.value_sum, 10.0);
    }

    #[test]
    fn item_aggregate_translates_per_row_with_fallback() {
        let items = vec![
            OrderItem {
                order_id: "o1".to_string(),
                product_id: Some("p1".to_string()),
                freight_value: Some(5.0),
            },
            OrderItem {
                order_id: "o1".to_string(),
                product_id: Some("p2".to_string()),
                freight_value: None,
            },
            OrderItem {
                order_id: "o1".to_string(),
                product_id: Some("p2".to_string()),
                freight_value: Some(2.5),
            },
        ];
        let products = vec![
            Product {
                product_id: "p1".to_string(),
                category: Some("beleza_saude".to_string()),
            },
            Product {
                product_id: "p2".to_string(),
                category: Some("categoria_sem_traducao".to_string()),
            },
        ];
        let translations = vec![CategoryTranslation {
            category: "beleza_saude".to_string(),
            category_english: "health_beauty".to_string(),
        }];
        let aggs = aggregate_items(&items, &products, &translations);
        let agg = aggs.get("o1").unwrap();
        assert_eq!(agg.freight_sum, 7.5);
        // p2's untranslated name appears twice and wins the mode.
        assert_eq!(agg.category_mode.as_deref(), Some("categoria_sem_traducao"));
        // No rows for other orders: absent, not zero.
        assert!(aggs.get("o9").is_none());
    }

    #[test]
    fn delivered_order_gets_delay_and_on_time() {
        let mut tables = empty_tables();
        tables.orders.push(order(
            "o1",
            "delivered",
            "2024-01-01 10:00:00",
            "2024-01-10 00:00:00",
            "2024-01-08 16:00:00",
        ));
        let facts = build_fact_orders(&tables);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].delay_days, Some(-2));
        assert_eq!(facts[0].on_time, Some(true));
    }

    #[test]
    fn delay_is_status_gated_not_date_gated() {
        let mut tables = empty_tables();
        // A canceled order can still carry a delivery date; it must not
        // produce a delay.
        tables.orders.push(order(
            "o1",
            "canceled",
            "2024-01-01 10:00:00",
            "2024-01-10 00:00:00",
            "2024-01-08 16:00:00",
        ));
        tables
            .orders
            .push(order("o2", "delivered", "2024-01-01 10:00:00", "", ""));
        let facts = build_fact_orders(&tables);
        assert_eq!(facts[0].delay_days, None);
        assert_eq!(facts[0].on_time, None);
        // Delivered but with unparseable dates: nulls propagate, row kept.
        assert_eq!(facts[1].delay_days, None);
        assert_eq!(facts[1].on_time, None);
    }

    #[test]
    fn left_joins_keep_every_order_with_nulls() {
        let mut tables = empty_tables();
        tables.orders.push(order(
            "o3",
            "shipped",
            "2024-02-01 08:00:00",
            "2024-02-10 00:00:00",
            "",
        ));
        let facts = build_fact_orders(&tables);
        assert_eq!(facts.len(), 1);
        let f = &facts[0];
        assert_eq!(f.state, None);
        assert_eq!(f.mean_lat, None);
        assert_eq!(f.mean_lng, None);
        assert_eq!(f.payment_type_mode, None);
        assert_eq!(f.payment_value_sum, None);
        assert_eq!(f.freight_value_sum, None);
        assert_eq!(f.product_category_mode, None);
    }

    #[test]
    fn fact_rows_follow_source_order_and_are_unique_per_order() {
        let mut tables = empty_tables();
        for id in ["b", "a", "c"] {
            tables.orders.push(order(
                id,
                "shipped",
                "2024-03-01 00:00:00",
                "2024-03-10 00:00:00",
                "",
            ));
        }
        tables.customers.push(customer("c-a", "01310", "SP"));
        tables.geolocation.push(geo("01310", Some(-23.5), Some(-46.6)));

        let facts = build_fact_orders(&tables);
        let ids: Vec<&str> = facts.iter().map(|f| f.order_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        // Customer and geo joined only where the keys match.
        assert_eq!(facts[1].state.as_deref(), Some("SP"));
        assert_eq!(facts[1].mean_lat, Some(-23.5));
        assert_eq!(facts[0].state, None);
    }

    #[test]
    fn build_is_deterministic() {
        let mut tables = empty_tables();
        tables.orders.push(order(
            "o1",
            "delivered",
            "2024-01-01 10:00:00",
            "2024-01-10 00:00:00",
            "2024-01-12 09:00:00",
        ));
        tables.customers.push(customer("c-o1", "01310", "SP"));
        tables.geolocation.push(geo("01310", Some(-23.5), Some(-46.6)));
        tables.payments.push(Payment {
            order_id: "o1".to_string(),
            payment_type: Some("boleto".to_string()),
            payment_value: Some(99.9),
        });
        let first = build_fact_orders(&tables);
        let second = build_fact_orders(&tables);
        assert_eq!(first, second);
        assert_eq!(first[0].delay_days, Some(2));
        assert_eq!(first[0].on_time, Some(false));
    }
}
