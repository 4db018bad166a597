//! Time-bucketed metric storage: one bucket per period, rotating window of
//! N buckets (§4.9/§4.10).

pub mod bucket;
pub mod window;

pub use bucket::MetricBucket;
pub use window::{MetricsWindow, WindowConfig};
