//! The packet event data model (§3): immutable for the duration of handler
//! processing.

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::host_matcher::Direction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum L3Protocol {
    IPv4,
    IPv6,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum L4Protocol {
    Tcp,
    Udp,
    Other,
}

/// Wall-clock timestamp with nanosecond resolution, relative to the Unix
/// epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp {
            secs: dur.as_secs(),
            nanos: dur.subsec_nanos(),
        }
    }

    pub fn from_secs_nanos(secs: u64, nanos: u32) -> Self {
        Timestamp { secs, nanos }
    }

    /// Difference in milliseconds, saturating at zero if `self` precedes
    /// `earlier` (the matcher invariant `reply.ts >= query.ts` should
    /// already guarantee this never happens on the happy path).
    pub fn millis_since(&self, earlier: &Timestamp) -> f64 {
        let self_ms = self.secs as f64 * 1000.0 + self.nanos as f64 / 1_000_000.0;
        let earlier_ms = earlier.secs as f64 * 1000.0 + earlier.nanos as f64 / 1_000_000.0;
        (self_ms - earlier_ms).max(0.0)
    }
}

/// Hash over (src_ip, dst_ip, src_port, dst_port, l4_proto) identifying a
/// flow, independent of packet direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlowHash(pub u64);

impl FlowHash {
    pub fn compute(
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
        l4: L4Protocol,
    ) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        src_ip.hash(&mut hasher);
        dst_ip.hash(&mut hasher);
        src_port.hash(&mut hasher);
        dst_port.hash(&mut hasher);
        (l4 as u8).hash(&mut hasher);
        FlowHash(hasher.finish())
    }
}

#[derive(Clone, Debug)]
pub struct PacketEvent {
    pub raw: Vec<u8>,
    pub l3: L3Protocol,
    pub l4: L4Protocol,
    pub direction: Direction,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub flow_hash: FlowHash,
    pub timestamp: Timestamp,
}

impl PacketEvent {
    pub fn new(
        raw: Vec<u8>,
        l3: L3Protocol,
        l4: L4Protocol,
        direction: Direction,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
        timestamp: Timestamp,
    ) -> Self {
        let flow_hash = FlowHash::compute(src_ip, dst_ip, src_port, dst_port, l4);
        PacketEvent {
            raw,
            l3,
            l4,
            direction,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            flow_hash,
            timestamp,
        }
    }
}
