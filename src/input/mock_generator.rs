//! Synthetic traffic generator (§4.4): a background thread emitting one
//! DNS-over-UDP packet every 100ms, used for testing and demos without a
//! real capture device. Grounded on the original `_generate_mock_traffic`
//! (fixed host MAC/IP, randomized peer, randomized qname/qtype/rcode).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use etherparse::PacketBuilder;
use std::str::FromStr;

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use rand::Rng;

use crate::error::Result;
use crate::host_matcher::HostMatcher;
use crate::input::capture_file::emit_ethernet_frame;
use crate::input::{InputSource, SharedSignals};
use crate::packet::Timestamp;

const MOCK_INTERVAL: Duration = Duration::from_millis(100);
const HOST_MAC: [u8; 6] = [0x00, 0x50, 0x43, 0x11, 0x22, 0x33];
const HOST_IP: [u8; 4] = [192, 168, 0, 1];
const MOCK_QTYPES: [RecordType; 5] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::PTR,
    RecordType::MX,
    RecordType::TXT,
];
const MOCK_RCODES: [ResponseCode; 6] = [
    ResponseCode::NoError,
    ResponseCode::FormErr,
    ResponseCode::ServFail,
    ResponseCode::NXDomain,
    ResponseCode::NotImp,
    ResponseCode::Refused,
];

pub struct MockGeneratorConfig {
    pub host_matcher: HostMatcher,
}

pub struct MockGenerator {
    config: MockGeneratorConfig,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MockGenerator {
    pub fn new(config: MockGeneratorConfig) -> Self {
        MockGenerator {
            config,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

fn build_mock_frame() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let to_host = rng.gen_bool(0.5);

    let other_mac = [0xaa, 0xbb, 0xcc, 0xdd, rng.gen::<u8>(), rng.gen::<u8>()];
    let other_ip = [10, 0, 0, rng.gen::<u8>()];

    let (eth_src, eth_dst, ip_src, ip_dst, udp_src, udp_dst) = if to_host {
        (other_mac, HOST_MAC, other_ip, HOST_IP, rng.gen::<u16>(), 53)
    } else {
        (HOST_MAC, other_mac, HOST_IP, other_ip, 53, rng.gen::<u16>())
    };

    let mut msg = Message::new();
    msg.set_id(rng.gen::<u16>());
    let qtype = MOCK_QTYPES[rng.gen_range(0..MOCK_QTYPES.len())];
    let qname = format!("{}.netvisor-mock.dev.", rng.gen_range(0..20));
    msg.add_query(Query::query(Name::from_str(&qname).expect("valid mock qname"), qtype));
    if to_host {
        msg.set_message_type(MessageType::Query);
    } else {
        msg.set_message_type(MessageType::Response);
        msg.set_response_code(MOCK_RCODES[rng.gen_range(0..MOCK_RCODES.len())]);
    }
    let dns_payload = msg.to_vec().unwrap_or_default();

    let builder = PacketBuilder::ethernet2(eth_src, eth_dst)
        .ipv4(ip_src, ip_dst, 64)
        .udp(udp_src, udp_dst);
    let mut frame = Vec::with_capacity(builder.size(dns_payload.len()));
    let _ = builder.write(&mut frame, &dns_payload);
    frame
}

impl InputSource for MockGenerator {
    fn start(&mut self, signals: SharedSignals) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let host_matcher = self.config.host_matcher.clone();

        self.worker = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let frame = build_mock_frame();
                emit_ethernet_frame(&frame, Timestamp::now(), &host_matcher, None, &signals);
                std::thread::sleep(MOCK_INTERVAL);
            }
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
