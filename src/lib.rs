// Delivery performance fact pipeline.
//
// Builds one denormalized fact row per e-commerce order (delivery outcome,
// payment and freight aggregates, customer geography) from seven raw CSV
// tables, memoizes the result to a parquet artifact, and exposes the
// filter/KPI/geo operations consumers are allowed to call.
pub mod cache;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod output;
pub mod transform;
pub mod types;
pub mod util;
