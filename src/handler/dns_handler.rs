//! DNS handler (§4.9): reassembles TCP-carried DNS, decodes UDP and dnstap
//! messages, matches query/reply transactions, and rolls the survivors
//! (after the filter chain) into a [`MetricsWindow`]. Packets that pass the
//! filter are re-emitted on a side-channel `forward` signal so a
//! [`super::NetHandler`] can be composed "behind" this handler instead of
//! subscribing to raw `packet_signal` directly (§4.9).

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};

use etherparse::{SlicedPacket, TransportSlice};
use serde_json::Value;
use tracing::debug;

use dnstap_parser::dnstap::{message, SocketFamily, SocketProtocol};
use dnstap_parser::DnstapEvent;

use crate::dns::matcher::TransactionKey;
use crate::dns::parser::{parse_tcp_segment, parse_udp};
use crate::dns::{DnsRecord, DnsTransactionMatcher, MatchEvent, MatcherConfig};
use crate::filter::{FilterChain, FilterConfig};
use crate::host_matcher::{Direction, HostMatcher};
use crate::input::SharedSignals;
use crate::metrics::{MetricsWindow, WindowConfig};
use crate::packet::{FlowHash, L3Protocol, L4Protocol, PacketEvent, Timestamp};
use crate::signals::Signal;
use crate::tcp_reassembler::{ReassemblerConfig, ReassemblyOutcome, TcpReassembler, TcpSegment};

pub struct DnsHandlerConfig {
    pub filter: FilterConfig,
    pub matcher: MatcherConfig,
    pub reassembler: ReassemblerConfig,
    /// Classifies direction for dnstap-sourced records, which carry no
    /// packet of their own to classify against a capture's host subnets.
    pub host_matcher: HostMatcher,
}

impl Default for DnsHandlerConfig {
    fn default() -> Self {
        DnsHandlerConfig {
            filter: FilterConfig::default(),
            matcher: MatcherConfig::default(),
            reassembler: ReassemblerConfig::default(),
            host_matcher: HostMatcher::default(),
        }
    }
}

pub struct DnsHandler {
    window: Arc<Mutex<MetricsWindow>>,
    filter: Arc<FilterChain>,
    matcher: Arc<Mutex<DnsTransactionMatcher>>,
    reassembler: Arc<Mutex<TcpReassembler>>,
    host_matcher: HostMatcher,
    seen_flows: Arc<Mutex<HashSet<FlowHash>>>,
    forward: Arc<Mutex<Signal<PacketEvent>>>,
    attached: bool,
}

impl DnsHandler {
    pub fn new(config: DnsHandlerConfig, window_config: WindowConfig, start_ts: Timestamp) -> Self {
        DnsHandler {
            window: Arc::new(Mutex::new(MetricsWindow::new(window_config, start_ts))),
            filter: Arc::new(FilterChain::new(config.filter)),
            matcher: Arc::new(Mutex::new(DnsTransactionMatcher::new(config.matcher))),
            reassembler: Arc::new(Mutex::new(TcpReassembler::new(config.reassembler))),
            host_matcher: config.host_matcher,
            seen_flows: Arc::new(Mutex::new(HashSet::new())),
            forward: Arc::new(Mutex::new(Signal::new())),
            attached: false,
        }
    }

    /// Registers a callback fired with every packet that survives the
    /// filter chain. Used by [`super::NetHandler::attach_behind_dns_filter`].
    pub fn connect_forward(&self, f: impl FnMut(&PacketEvent) + Send + 'static) {
        self.forward.lock().expect("forward signal mutex poisoned").connect(f);
    }

    pub fn current_snapshot(&self) -> Value {
        self.window
            .lock()
            .expect("metrics window mutex poisoned")
            .to_json(0)
            .unwrap_or(Value::Null)
    }

    pub fn snapshot_all(&self) -> Value {
        self.window.lock().expect("metrics window mutex poisoned").to_json_all()
    }

    /// Number of DNS-over-TCP flows this handler currently considers open
    /// (a SYN or first segment seen, no FIN/RST observed yet).
    pub fn active_tcp_flow_count(&self) -> usize {
        self.seen_flows.lock().expect("seen-flows mutex poisoned").len()
    }

    pub fn start(&mut self, signals: &SharedSignals) {
        if self.attached {
            return;
        }

        {
            let window = Arc::clone(&self.window);
            let filter = Arc::clone(&self.filter);
            let matcher = Arc::clone(&self.matcher);
            let forward = Arc::clone(&self.forward);
            signals
                .lock()
                .expect("signals mutex poisoned")
                .udp_signal
                .connect(move |event: &PacketEvent| {
                    if let Some(payload) = udp_payload_of(event) {
                        if let Some(record) = parse_udp(&payload, event.clone()) {
                            process_record(&window, &filter, &matcher, &forward, record);
                        }
                    }
                });
        }

        {
            let window = Arc::clone(&self.window);
            let filter = Arc::clone(&self.filter);
            let matcher = Arc::clone(&self.matcher);
            let reassembler = Arc::clone(&self.reassembler);
            let seen_flows = Arc::clone(&self.seen_flows);
            let forward = Arc::clone(&self.forward);
            signals
                .lock()
                .expect("signals mutex poisoned")
                .packet_signal
                .connect(move |event: &PacketEvent| {
                    if event.l4 != L4Protocol::Tcp {
                        return;
                    }
                    let Ok(sliced) = SlicedPacket::from_ethernet(&event.raw) else {
                        return;
                    };
                    let Some(TransportSlice::Tcp(tcp)) = sliced.transport else {
                        return;
                    };
                    let segment = TcpSegment {
                        payload: tcp.payload(),
                        seq: tcp.sequence_number(),
                        syn: tcp.syn(),
                        fin: tcp.fin(),
                        rst: tcp.rst(),
                    };

                    seen_flows.lock().expect("seen-flows mutex poisoned").insert(event.flow_hash);

                    let (outcome, assembled) =
                        reassembler.lock().expect("reassembler mutex poisoned").reassemble(
                            event.flow_hash,
                            event.direction,
                            &segment,
                        );

                    if matches!(outcome, ReassemblyOutcome::FinOrRstWithNoData) {
                        seen_flows.lock().expect("seen-flows mutex poisoned").remove(&event.flow_hash);
                    }

                    if let Some(bytes) = assembled {
                        if let Some(record) = parse_tcp_segment(&bytes, event.clone()) {
                            process_record(&window, &filter, &matcher, &forward, record);
                        }
                    }
                });
        }

        {
            let window = Arc::clone(&self.window);
            let filter = Arc::clone(&self.filter);
            let matcher = Arc::clone(&self.matcher);
            let forward = Arc::clone(&self.forward);
            let host_matcher = self.host_matcher.clone();
            signals
                .lock()
                .expect("signals mutex poisoned")
                .dnstap_signal
                .connect(move |event: &DnstapEvent| {
                    for record in records_from_dnstap(event, &host_matcher) {
                        process_record(&window, &filter, &matcher, &forward, record);
                    }
                });
        }

        self.attached = true;
    }

    pub fn stop(&mut self) {
        if !self.attached {
            return;
        }
        let flushed = self.reassembler.lock().expect("reassembler mutex poisoned").close_all();
        debug!(flows = flushed.len(), "dns handler flushed in-flight tcp flows on stop");
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

fn udp_payload_of(event: &PacketEvent) -> Option<Vec<u8>> {
    let sliced = SlicedPacket::from_ethernet(&event.raw).ok()?;
    match sliced.transport {
        Some(TransportSlice::Udp(udp)) => Some(udp.payload().to_vec()),
        _ => None,
    }
}

fn process_record(
    window: &Arc<Mutex<MetricsWindow>>,
    filter: &Arc<FilterChain>,
    matcher: &Arc<Mutex<DnsTransactionMatcher>>,
    forward: &Arc<Mutex<Signal<PacketEvent>>>,
    record: DnsRecord,
) {
    let ts = record.packet.timestamp;

    if !filter.accepts(&record) {
        let mut window = window.lock().expect("metrics window mutex poisoned");
        let bucket = window.current_bucket_for(ts);
        bucket.touch(ts);
        bucket.counters.filtered.incr();
        return;
    }

    forward.lock().expect("forward signal mutex poisoned").emit(&record.packet);

    {
        let mut window = window.lock().expect("metrics window mutex poisoned");
        let bucket = window.current_bucket_for(ts);
        bucket.touch(ts);

        match record.message_direction {
            crate::dns::MessageDirection::Query => bucket.counters.queries.incr(),
            crate::dns::MessageDirection::Response => {
                bucket.counters.replies.incr();
                match record.rcode {
                    0 => bucket.counters.noerror.incr(),
                    2 => bucket.counters.srvfail.incr(),
                    3 => bucket.counters.nx.incr(),
                    5 => bucket.counters.refused.incr(),
                    _ => {}
                }
            }
        }

        if let Some(qname) = &record.normalized_qname {
            bucket.cardinality.qname.add(qname.as_bytes());
        }
        if let Some(top2) = record.top_qname2() {
            bucket.topk.top_qname2.add(&top2);
        }
        if let Some(question) = &record.question {
            if let Some(qtype) = question.qtype.as_deref() {
                bucket.topk.top_qtype.add(qtype);
            }
        }
        if let Some(name) = record.rcode_name {
            bucket.topk.top_rcode.add(name);
        }

        match record.packet.l3 {
            L3Protocol::IPv4 => bucket.counters.ipv4.incr(),
            L3Protocol::IPv6 => bucket.counters.ipv6.incr(),
            L3Protocol::Unknown => {}
        }
        match record.packet.l4 {
            L4Protocol::Udp => {
                bucket.counters.udp.incr();
                bucket.topk.top_udp_ports.add(&record.packet.dst_port.to_string());
            }
            L4Protocol::Tcp => bucket.counters.tcp.incr(),
            L4Protocol::Other => bucket.counters.other_l4.incr(),
        }
        match record.packet.direction {
            Direction::ToHost => bucket.counters.total_in.incr(),
            Direction::FromHost => bucket.counters.total_out.incr(),
            Direction::Unknown => {}
        }
    }

    let key = TransactionKey {
        flow_hash: record.packet.flow_hash.0,
        transaction_id: record.transaction_id,
    };
    let events = matcher.lock().expect("matcher mutex poisoned").ingest(key, record);

    let mut window = window.lock().expect("metrics window mutex poisoned");
    let bucket = window.current_bucket_for(ts);
    for event in events {
        match event {
            MatchEvent::Completed(completed) => {
                bucket.counters.xacts_total.incr();
                bucket.xact_latency.digest.observe_millis(completed.latency_ms);
                match DnsTransactionMatcher::transaction_direction(&completed.query) {
                    Direction::ToHost => bucket.counters.xacts_in.incr(),
                    Direction::FromHost => bucket.counters.xacts_out.incr(),
                    Direction::Unknown => {}
                }
            }
            MatchEvent::TimedOut { .. } => bucket.counters.xacts_timed_out.incr(),
            MatchEvent::Orphan { .. } | MatchEvent::Duplicate { .. } => {}
        }
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => Some(IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))),
        16 => {
            let array: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(array)))
        }
        _ => None,
    }
}

fn timestamp_from(secs: Option<u64>, nsec: Option<u32>) -> Timestamp {
    match secs {
        Some(secs) => Timestamp::from_secs_nanos(secs, nsec.unwrap_or(0)),
        None => Timestamp::now(),
    }
}

fn l4_from_socket_protocol(protocol: Option<SocketProtocol>) -> L4Protocol {
    match protocol {
        Some(SocketProtocol::Udp) => L4Protocol::Udp,
        Some(SocketProtocol::Tcp) => L4Protocol::Tcp,
        _ => L4Protocol::Other,
    }
}

fn l3_from_socket_family(family: Option<SocketFamily>) -> L3Protocol {
    match family {
        Some(SocketFamily::Inet) => L3Protocol::IPv4,
        Some(SocketFamily::Inet6) => L3Protocol::IPv6,
        None => L3Protocol::Unknown,
    }
}

/// Builds zero, one, or two [`DnsRecord`]s out of one dnstap message event:
/// one for the query payload if present, one for the response payload if
/// present — each with its own synthesized [`PacketEvent`] since dnstap
/// carries endpoint metadata instead of a wire frame.
fn records_from_dnstap(event: &DnstapEvent, host_matcher: &HostMatcher) -> Vec<DnsRecord> {
    let l3 = l3_from_socket_family(event.socket_family);
    let l4 = l4_from_socket_protocol(event.socket_protocol);

    let is_query_message = matches!(
        event.message_type,
        message::Type::AuthQuery
            | message::Type::ClientQuery
            | message::Type::ResolverQuery
            | message::Type::ForwarderQuery
            | message::Type::StubQuery
            | message::Type::ToolQuery
            | message::Type::UpdateQuery
    );

    let query_ip = event.query_address.as_deref().and_then(ip_from_bytes);
    let response_ip = event.response_address.as_deref().and_then(ip_from_bytes);
    let fallback_ip: IpAddr = if l3 == L3Protocol::IPv6 {
        Ipv6Addr::UNSPECIFIED.into()
    } else {
        Ipv4Addr::UNSPECIFIED.into()
    };

    let mut records = Vec::with_capacity(2);

    if let Some(payload) = &event.query_message {
        let src_ip = query_ip.unwrap_or(fallback_ip);
        let dst_ip = response_ip.unwrap_or(fallback_ip);
        let direction = if is_query_message {
            host_matcher.classify(src_ip, dst_ip)
        } else {
            host_matcher.classify(dst_ip, src_ip)
        };
        let packet = PacketEvent::new(
            payload.clone(),
            l3,
            l4,
            direction,
            src_ip,
            dst_ip,
            event.query_port.unwrap_or(0) as u16,
            53,
            timestamp_from(event.query_time_sec, event.query_time_nsec),
        );
        if let Some(record) = parse_udp(payload, packet) {
            records.push(record);
        }
    }

    if let Some(payload) = &event.response_message {
        let src_ip = response_ip.unwrap_or(fallback_ip);
        let dst_ip = query_ip.unwrap_or(fallback_ip);
        let direction = host_matcher.classify(src_ip, dst_ip);
        let packet = PacketEvent::new(
            payload.clone(),
            l3,
            l4,
            direction,
            src_ip,
            dst_ip,
            53,
            event.query_port.unwrap_or(0) as u16,
            timestamp_from(event.response_time_sec, event.response_time_nsec),
        );
        if let Some(record) = parse_udp(payload, packet) {
            records.push(record);
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSignals;
    use hickory_proto::op::{Message, MessageType, Query};
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    fn build_query(name: &str) -> Vec<u8> {
        let mut msg = Message::new();
        msg.set_id(7).set_message_type(MessageType::Query);
        msg.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
        msg.to_vec().unwrap()
    }

    fn frame_with_udp_dns(payload: &[u8]) -> Vec<u8> {
        let builder = etherparse::PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([192, 168, 0, 5], [192, 168, 0, 1], 64)
            .udp(5353, 53);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    #[test]
    fn start_is_idempotent() {
        let signals: SharedSignals = Arc::new(Mutex::new(InputSignals::default()));
        let mut handler = DnsHandler::new(DnsHandlerConfig::default(), WindowConfig::default(), Timestamp::from_secs_nanos(0, 0));
        handler.start(&signals);
        handler.start(&signals);
        assert_eq!(signals.lock().unwrap().udp_signal.subscriber_count(), 1);
    }

    #[test]
    fn udp_query_updates_the_query_counter() {
        let signals: SharedSignals = Arc::new(Mutex::new(InputSignals::default()));
        let mut handler = DnsHandler::new(DnsHandlerConfig::default(), WindowConfig::default(), Timestamp::from_secs_nanos(0, 0));
        handler.start(&signals);

        let raw = frame_with_udp_dns(&build_query("example.com."));
        let event = PacketEvent::new(
            raw,
            L3Protocol::IPv4,
            L4Protocol::Udp,
            Direction::FromHost,
            "192.168.0.5".parse().unwrap(),
            "192.168.0.1".parse().unwrap(),
            5353,
            53,
            Timestamp::from_secs_nanos(0, 0),
        );
        signals.lock().unwrap().udp_signal.emit(&event);

        let snapshot = handler.current_snapshot();
        assert_eq!(snapshot["wire_packets"]["queries"], 1);
    }

    #[test]
    fn forward_signal_only_fires_for_filter_survivors() {
        let signals: SharedSignals = Arc::new(Mutex::new(InputSignals::default()));
        let config = DnsHandlerConfig {
            filter: FilterConfig {
                only_qtype: vec!["AAAA".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut handler = DnsHandler::new(config, WindowConfig::default(), Timestamp::from_secs_nanos(0, 0));

        let forwarded = Arc::new(Mutex::new(0u32));
        let forwarded_clone = Arc::clone(&forwarded);
        handler.connect_forward(move |_event| {
            *forwarded_clone.lock().unwrap() += 1;
        });
        handler.start(&signals);

        let raw = frame_with_udp_dns(&build_query("example.com."));
        let event = PacketEvent::new(
            raw,
            L3Protocol::IPv4,
            L4Protocol::Udp,
            Direction::FromHost,
            "192.168.0.5".parse().unwrap(),
            "192.168.0.1".parse().unwrap(),
            5353,
            53,
            Timestamp::from_secs_nanos(0, 0),
        );
        signals.lock().unwrap().udp_signal.emit(&event);

        assert_eq!(*forwarded.lock().unwrap(), 0, "an A query must not pass an AAAA-only filter");
        assert_eq!(handler.current_snapshot()["wire_packets"]["filtered"], 1);
    }

    #[test]
    fn dnstap_query_message_becomes_a_record() {
        let event = DnstapEvent {
            message_type: message::Type::ClientQuery,
            socket_family: Some(SocketFamily::Inet),
            socket_protocol: Some(SocketProtocol::Udp),
            query_address: Some(vec![127, 0, 0, 1]),
            response_address: None,
            query_port: Some(5353),
            response_port: None,
            query_time_sec: Some(1_700_000_000),
            query_time_nsec: Some(0),
            query_message: Some(build_query("example.org.")),
            response_time_sec: None,
            response_time_nsec: None,
            response_message: None,
        };
        let records = records_from_dnstap(&event, &HostMatcher::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].normalized_qname.as_deref(), Some("example.org."));
    }
}
