//! Offline pcap/pcapng file intake (§4.4). Synchronous: runs to completion
//! in the caller's thread, emitting `start_ts_signal` from the first packet
//! and `end_ts_signal` from the last.

use std::net::IpAddr;
use std::path::PathBuf;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use tracing::{debug, warn};

use crate::error::{self, NetvisorError, Result};
use crate::host_matcher::HostMatcher;
use crate::input::sflow;
use crate::input::{CaptureStats, InputSignals, InputSource, SharedSignals};
use crate::packet::{L3Protocol, L4Protocol, PacketEvent, Timestamp};

pub struct CaptureFileConfig {
    pub path: PathBuf,
    pub bpf: Option<String>,
    pub host_matcher: HostMatcher,
    /// UDP port sFlow collectors listen on; datagrams to this port are
    /// unwrapped per §4.4.1 instead of treated as ordinary UDP payloads.
    pub sflow_collector_port: Option<u16>,
}

pub struct CaptureFile {
    config: CaptureFileConfig,
    running: bool,
}

impl CaptureFile {
    pub fn new(config: CaptureFileConfig) -> Self {
        CaptureFile {
            config,
            running: false,
        }
    }
}

/// Decodes one raw Ethernet frame, classifies its direction against
/// `host_matcher`, and fires `packet_signal`/`udp_signal`. Shared by every
/// source that hands over already-captured raw frames (§4.4); sFlow-wrapped
/// UDP payloads are unwrapped into their sampled frames and fed back through
/// this same function.
pub(crate) fn emit_ethernet_frame(
    raw: &[u8],
    ts: Timestamp,
    host_matcher: &HostMatcher,
    sflow_collector_port: Option<u16>,
    signals: &SharedSignals,
) {
    let Ok(sliced) = SlicedPacket::from_ethernet(raw) else {
        return;
    };

    let (l3, src_ip, dst_ip): (L3Protocol, IpAddr, IpAddr) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => (
            L3Protocol::IPv4,
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        ),
        Some(NetSlice::Ipv6(ipv6)) => (
            L3Protocol::IPv6,
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        ),
        _ => return,
    };

    let (l4, src_port, dst_port, udp_payload): (L4Protocol, u16, u16, Option<&[u8]>) =
        match &sliced.transport {
            Some(TransportSlice::Udp(udp)) => (
                L4Protocol::Udp,
                udp.source_port(),
                udp.destination_port(),
                Some(udp.payload()),
            ),
            Some(TransportSlice::Tcp(tcp)) => {
                (L4Protocol::Tcp, tcp.source_port(), tcp.destination_port(), None)
            }
            _ => (L4Protocol::Other, 0, 0, None),
        };

    let direction = host_matcher.classify(src_ip, dst_ip);

    if let Some(payload) = udp_payload {
        if Some(dst_port) == sflow_collector_port {
            for frame in sflow::extract_sampled_frames(payload) {
                emit_ethernet_frame(&frame, ts, host_matcher, sflow_collector_port, signals);
            }
            return;
        }
    }

    let event = PacketEvent::new(
        raw.to_vec(),
        l3,
        l4,
        direction,
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        ts,
    );

    let mut signals = signals.lock().expect("signals mutex poisoned");
    signals.packet_signal.emit(&event);
    if l4 == L4Protocol::Udp {
        signals.udp_signal.emit(&event);
    }
}

impl InputSource for CaptureFile {
    fn start(&mut self, signals: SharedSignals) -> Result<()> {
        if self.running {
            return Ok(());
        }

        let mut capture = pcap::Capture::from_file(&self.config.path).map_err(|e| {
            error::CaptureOpenSnafu {
                iface: self.config.path.display().to_string(),
                message: e.to_string(),
            }
            .build()
        })?;

        if let Some(bpf) = &self.config.bpf {
            capture.filter(bpf, true).map_err(|e| {
                error::CaptureOpenSnafu {
                    iface: self.config.path.display().to_string(),
                    message: format!("invalid BPF filter: {e}"),
                }
                .build()
            })?;
        }

        self.running = true;

        let mut first_ts: Option<Timestamp> = None;
        let mut last_ts: Option<Timestamp> = None;
        let mut packets_read: u64 = 0;

        loop {
            if !self.running {
                break;
            }
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
                    last_ts = Some(ts);
                    packets_read += 1;
                    emit_ethernet_frame(
                        packet.data,
                        ts,
                        &self.config.host_matcher,
                        self.config.sflow_collector_port,
                        &signals,
                    );
                }
                Err(pcap::Error::NoMorePackets) => break,
                Err(e) => {
                    warn!(path = %self.config.path.display(), error = %e, "capture file read error");
                    break;
                }
            }
        }

        if let Some(ts) = last_ts {
            signals.lock().expect("signals mutex poisoned").end_ts_signal.emit(&ts);
        }
        signals
            .lock()
            .expect("signals mutex poisoned")
            .pcap_stats_signal
            .emit(&CaptureStats {
                received: packets_read,
                dropped_if: 0,
                dropped_os: 0,
            });

        debug!(path = %self.config.path.display(), packets_read, "capture file exhausted");
        self.running = false;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn not_running_before_start() {
        let source = CaptureFile::new(CaptureFileConfig {
            path: PathBuf::from("/nonexistent.pcap"),
            bpf: None,
            host_matcher: HostMatcher::new(Vec::new()),
            sflow_collector_port: None,
        });
        assert!(!source.is_running());
    }

    #[test]
    fn stop_before_start_is_a_harmless_no_op() {
        let mut source = CaptureFile::new(CaptureFileConfig {
            path: PathBuf::from("/nonexistent.pcap"),
            bpf: None,
            host_matcher: HostMatcher::new(Vec::new()),
            sflow_collector_port: None,
        });
        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn start_on_missing_file_returns_capture_open_error() {
        let mut source = CaptureFile::new(CaptureFileConfig {
            path: PathBuf::from("/definitely/does/not/exist.pcap"),
            bpf: None,
            host_matcher: HostMatcher::new(Vec::new()),
            sflow_collector_port: None,
        });
        let signals: SharedSignals = Arc::new(Mutex::new(InputSignals::default()));
        let result = source.start(signals);
        assert!(result.is_err());
        assert!(matches!(result, Err(NetvisorError::CaptureOpen { .. })));
    }
}
