//! Live-interface intake (§4.4): opens a named device with libpcap and runs
//! capture on a dedicated background thread owned by this source, matching
//! the original pcap input's `_pcapDevice`/capture-callback split.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::error::{self, Result};
use crate::host_matcher::HostMatcher;
use crate::input::capture_file::emit_ethernet_frame;
use crate::input::{CaptureStats, InputSource, SharedSignals};
use crate::packet::Timestamp;

const DEFAULT_BUFFER_TIMEOUT_MS: i32 = 10;
const DEFAULT_SNAPLEN: i32 = 1000;

pub struct LiveInterfaceConfig {
    pub iface: String,
    pub bpf: Option<String>,
    pub host_matcher: HostMatcher,
    pub sflow_collector_port: Option<u16>,
    pub buffer_timeout_ms: i32,
    pub snaplen: i32,
}

impl LiveInterfaceConfig {
    pub fn new(iface: String, host_matcher: HostMatcher) -> Self {
        LiveInterfaceConfig {
            iface,
            bpf: None,
            host_matcher,
            sflow_collector_port: None,
            buffer_timeout_ms: DEFAULT_BUFFER_TIMEOUT_MS,
            snaplen: DEFAULT_SNAPLEN,
        }
    }
}

pub struct LiveInterface {
    config: LiveInterfaceConfig,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LiveInterface {
    pub fn new(config: LiveInterfaceConfig) -> Self {
        LiveInterface {
            config,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl InputSource for LiveInterface {
    fn start(&mut self, signals: SharedSignals) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut capture = pcap::Capture::from_device(self.config.iface.as_str())
            .map_err(|e| {
                error::CaptureOpenSnafu {
                    iface: self.config.iface.clone(),
                    message: e.to_string(),
                }
                .build()
            })?
            .promisc(true)
            .snaplen(self.config.snaplen)
            .timeout(self.config.buffer_timeout_ms)
            .open()
            .map_err(|e| {
                error::CaptureOpenSnafu {
                    iface: self.config.iface.clone(),
                    message: e.to_string(),
                }
                .build()
            })?;

        if let Some(bpf) = &self.config.bpf {
            capture.filter(bpf, true).map_err(|e| {
                error::CaptureOpenSnafu {
                    iface: self.config.iface.clone(),
                    message: format!("invalid BPF filter: {e}"),
                }
                .build()
            })?;
        }

        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let host_matcher = self.config.host_matcher.clone();
        let sflow_port = self.config.sflow_collector_port;
        let iface = self.config.iface.clone();

        self.worker = Some(std::thread::spawn(move || {
            let mut first_ts: Option<Timestamp> = None;
            while running.load(Ordering::SeqCst) {
                match capture.next_packet() {
                    Ok(packet) => {
                        let ts = Timestamp::from_secs_nanos(
                            packet.header.ts.tv_sec.max(0) as u64,
                            (packet.header.ts.tv_usec.max(0) as u32).saturating_mul(1000),
                        );
                        if first_ts.is_none() {
                            first_ts = Some(ts);
                            signals.lock().expect("signals mutex poisoned").start_ts_signal.emit(&ts);
                        }
                        emit_ethernet_frame(packet.data, ts, &host_matcher, sflow_port, &signals);
                    }
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(e) => {
                        warn!(iface = %iface, error = %e, "live capture read error");
                        break;
                    }
                }
            }

            if let Ok(stats) = capture.stats() {
                signals
                    .lock()
                    .expect("signals mutex poisoned")
                    .pcap_stats_signal
                    .emit(&CaptureStats {
                        received: stats.received as u64,
                        dropped_if: stats.dropped as u64,
                        dropped_os: stats.if_dropped as u64,
                    });
            }
            debug!(iface = %iface, "live capture thread exiting");
        }));

        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
