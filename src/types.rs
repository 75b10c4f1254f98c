use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

// Raw CSV rows. Every field is optional so a dirty export never aborts the
// load; the loader coerces values and decides which rows are usable.

#[derive(Debug, Deserialize)]
pub struct RawOrder {
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub order_status: Option<String>,
    pub order_purchase_timestamp: Option<String>,
    pub order_delivered_customer_date: Option<String>,
    pub order_estimated_delivery_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawCustomer {
    pub customer_id: Option<String>,
    pub customer_zip_code_prefix: Option<String>,
    pub customer_city: Option<String>,
    pub customer_state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawOrderItem {
    pub order_id: Option<String>,
    pub product_id: Option<String>,
    pub freight_value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawPayment {
    pub order_id: Option<String>,
    pub payment_type: Option<String>,
    pub payment_value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawProduct {
    pub product_id: Option<String>,
    pub product_category_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawTranslation {
    pub product_category_name: Option<String>,
    pub product_category_name_english: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawGeolocation {
    pub geolocation_zip_code_prefix: Option<String>,
    pub geolocation_lat: Option<String>,
    pub geolocation_lng: Option<String>,
}

// Typed records produced by the loader.

#[derive(Debug, Clone)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub order_status: String,
    pub purchase_ts: Option<NaiveDateTime>,
    pub estimated_delivery_ts: Option<NaiveDateTime>,
    pub delivered_ts: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub customer_id: String,
    pub zip_prefix: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub order_id: String,
    pub product_id: Option<String>,
    pub freight_value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Payment {
    pub order_id: String,
    pub payment_type: Option<String>,
    pub payment_value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Product {
    pub product_id: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryTranslation {
    pub category: String,
    pub category_english: String,
}

#[derive(Debug, Clone)]
pub struct GeoSample {
    pub zip_prefix: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Everything the transform needs, loaded from the raw directory.
#[derive(Debug)]
pub struct RawTables {
    pub orders: Vec<Order>,
    pub customers: Vec<Customer>,
    pub order_items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
    pub products: Vec<Product>,
    pub translations: Vec<CategoryTranslation>,
    pub geolocation: Vec<GeoSample>,
}

/// One row per order: the denormalized delivery outcome for that order.
///
/// Left joins keep every order; any side without a match contributes `None`.
/// `delay_days`/`on_time` are populated only for delivered orders whose
/// delivery and estimate timestamps both parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct FactOrder {
    pub order_id: String,
    pub customer_id: String,
    pub order_status: String,
    pub purchase_ts: Option<NaiveDateTime>,
    pub estimated_delivery_ts: Option<NaiveDateTime>,
    pub delivered_ts: Option<NaiveDateTime>,
    pub zip_prefix: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub mean_lat: Option<f64>,
    pub mean_lng: Option<f64>,
    pub payment_type_mode: Option<String>,
    pub payment_value_sum: Option<f64>,
    pub freight_value_sum: Option<f64>,
    pub product_category_mode: Option<String>,
    pub delay_days: Option<i64>,
    pub on_time: Option<bool>,
}

/// Scalar summary of a (filtered) slice of the fact table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub total_orders: usize,
    pub delivered_orders: usize,
    pub on_time_count: usize,
    pub on_time_rate: f64,
    pub avg_delay_days: f64,
    pub total_payment_value: f64,
    pub total_freight_value: f64,
}

/// Per-state rollup for the geographic view. Rows without coordinates are
/// dropped before grouping, so `mean_lat`/`mean_lng` are always defined.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct GeoStateRow {
    #[serde(rename = "customer_state")]
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "MeanLat")]
    pub mean_lat: f64,
    #[tabled(rename = "MeanLng")]
    pub mean_lng: f64,
    #[tabled(rename = "Orders")]
    pub order_count: usize,
    #[tabled(rename = "Delivered")]
    pub delivered_count: usize,
    #[tabled(rename = "OnTime")]
    pub on_time_count: usize,
    #[tabled(rename = "OnTimeRate")]
    pub on_time_rate: f64,
    #[tabled(rename = "AvgDelay")]
    pub avg_delay_days: f64,
}
