//! Bounded-memory aggregation primitives shared by every metric bucket:
//! exact counters, HLL cardinality estimation, Space-Saving top-K, and a
//! quantile digest. See each submodule for the concrete sizing rationale.

pub mod counter;
pub mod digest;
pub mod hll;
pub mod topk;

pub use counter::ExactCounter;
pub use digest::QuantileDigest;
pub use hll::HyperLogLog;
pub use topk::SpaceSaving;
