//! Net handler (§4.9): rolls every observed packet into a [`MetricsWindow`]
//! without decoding DNS at all. Can attach directly to `packet_signal`, or
//! behind a [`super::DnsHandler`]'s forward signal so it only ever sees
//! packets that survived that handler's filter chain — the "DNS handler as
//! filter surrogate" composition.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::host_matcher::Direction;
use crate::input::SharedSignals;
use crate::metrics::{MetricsWindow, WindowConfig};
use crate::packet::{L3Protocol, L4Protocol, PacketEvent, Timestamp};

use super::DnsHandler;

pub struct NetHandler {
    window: Arc<Mutex<MetricsWindow>>,
    attached: bool,
}

impl NetHandler {
    pub fn new(window_config: WindowConfig, start_ts: Timestamp) -> Self {
        NetHandler {
            window: Arc::new(Mutex::new(MetricsWindow::new(window_config, start_ts))),
            attached: false,
        }
    }

    /// Subscribes directly to every packet an input source raises.
    pub fn attach(&mut self, signals: &SharedSignals) {
        if self.attached {
            return;
        }
        let window = Arc::clone(&self.window);
        signals
            .lock()
            .expect("signals mutex poisoned")
            .packet_signal
            .connect(move |event: &PacketEvent| record_packet(&window, event));
        self.attached = true;
    }

    /// Subscribes to `dns_handler`'s forward signal instead, so only packets
    /// that survived that handler's filter chain reach this window.
    pub fn attach_behind_dns_filter(&mut self, dns_handler: &DnsHandler) {
        if self.attached {
            return;
        }
        let window = Arc::clone(&self.window);
        dns_handler.connect_forward(move |event: &PacketEvent| record_packet(&window, event));
        self.attached = true;
    }

    /// Net handlers hold no resources of their own to release; `stop` only
    /// marks the handler detachable again (subscriptions themselves outlive
    /// it for the signal's lifetime, matching `Signal`'s append-only design).
    pub fn stop(&mut self) {
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
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
}

fn record_packet(window: &Arc<Mutex<MetricsWindow>>, event: &PacketEvent) {
    let mut window = window.lock().expect("metrics window mutex poisoned");
    let bucket = window.current_bucket_for(event.timestamp);
    bucket.touch(event.timestamp);

    match event.l3 {
        L3Protocol::IPv4 => {
            bucket.counters.ipv4.incr();
            bucket.topk.top_ipv4.add(&event.src_ip.to_string());
        }
        L3Protocol::IPv6 => {
            bucket.counters.ipv6.incr();
            bucket.topk.top_ipv6.add(&event.src_ip.to_string());
        }
        L3Protocol::Unknown => {}
    }

    match event.l4 {
        L4Protocol::Udp => {
            bucket.counters.udp.incr();
            bucket.topk.top_udp_ports.add(&event.dst_port.to_string());
        }
        L4Protocol::Tcp => bucket.counters.tcp.incr(),
        L4Protocol::Other => bucket.counters.other_l4.incr(),
    }

    match event.direction {
        Direction::ToHost => {
            bucket.counters.total_in.incr();
            bucket.cardinality.src_ips_in.add(event.src_ip.to_string().as_bytes());
        }
        Direction::FromHost => {
            bucket.counters.total_out.incr();
            bucket.cardinality.dst_ips_out.add(event.dst_ip.to_string().as_bytes());
        }
        Direction::Unknown => {}
    }
}
