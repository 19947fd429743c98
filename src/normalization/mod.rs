//! Ingestion-time normalization of upstream payloads and derived measurements.

pub mod dimensions;
pub mod record;

pub use dimensions::{estimate_weight, Measurable, WeightEstimate};
pub use record::{normalize_record, normalize_stone};
