//! Handlers turn subscribed input signals into rolling [`MetricsWindow`]
//! snapshots (§4.9). Each handler owns its window and connects its own
//! closures to an [`crate::input::InputSignals`]; `start`/`stop` are
//! idempotent, matching the `InputSource` lifecycle shape.

pub mod dns_handler;
pub mod net_handler;

pub use dns_handler::{DnsHandler, DnsHandlerConfig};
pub use net_handler::NetHandler;
