//! Unified packet/event intake (§4.4): offline capture file, live capture,
//! a mock generator, and the two dnstap variants. Every variant emits
//! through the same signal set so handlers don't care which one they're
//! attached to.

pub mod capture_file;
pub mod dnstap_file;
pub mod dnstap_socket;
pub mod live_interface;
pub mod mock_generator;
pub mod sflow;

use std::sync::{Arc, Mutex};

use dnstap_parser::DnstapEvent;

use crate::packet::{PacketEvent, Timestamp};
use crate::signals::Signal;

/// Every input variant emits through a shared signal set wrapped in a
/// mutex: `CaptureFile`/`DnstapFile` run synchronously on the caller's
/// thread, while `LiveInterface`/`MockGenerator`/`DnstapSocket` own a
/// background thread and need to reach the same signals from there.
pub type SharedSignals = Arc<Mutex<InputSignals>>;

pub use capture_file::CaptureFile;
pub use dnstap_file::DnstapFile;
pub use dnstap_socket::DnstapSocket;
pub use live_interface::LiveInterface;
pub use mock_generator::MockGenerator;

/// §3.1 — surfaced by sources whose capture handle can report native drop
/// counters; left at zero for sources that can't.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureStats {
    pub received: u64,
    pub dropped_if: u64,
    pub dropped_os: u64,
}

/// The full signal set an `InputSource` may emit. A given variant only
/// fires the signals relevant to what it decodes.
#[derive(Default)]
pub struct InputSignals {
    pub packet_signal: Signal<PacketEvent>,
    pub udp_signal: Signal<PacketEvent>,
    pub dnstap_signal: Signal<DnstapEvent>,
    pub start_ts_signal: Signal<Timestamp>,
    pub end_ts_signal: Signal<Timestamp>,
    pub pcap_stats_signal: Signal<CaptureStats>,
}

/// Common lifecycle every intake variant implements. `start`/`stop` are
/// idempotent (§4.4).
pub trait InputSource {
    fn start(&mut self, signals: SharedSignals) -> crate::error::Result<()>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}
