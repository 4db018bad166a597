//! The DNS record data model (§3): a decoded message trimmed to what the
//! transaction matcher and metrics bucket need.

use crate::packet::PacketEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageDirection {
    Query,
    Response,
}

#[derive(Clone, Debug)]
pub struct Question {
    pub qname: String,
    pub qtype: Option<String>,
    pub qtype_id: u16,
    pub qclass: String,
}

#[derive(Clone, Debug)]
pub struct DnsRecord {
    pub message_direction: MessageDirection,
    pub rcode: u16,
    pub rcode_name: Option<&'static str>,
    pub opcode: u8,
    pub truncated: bool,
    pub transaction_id: u16,
    pub question: Option<Question>,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
    pub packet: PacketEvent,
    /// Lower-cased question name, trailing dot preserved (§4.6).
    pub normalized_qname: Option<String>,
}

impl DnsRecord {
    pub fn top_qname2(&self) -> Option<String> {
        let name = self.normalized_qname.as_ref()?;
        let trimmed = name.trim_end_matches('.');
        let labels: Vec<&str> = trimmed.rsplitn(3, '.').collect();
        match labels.len() {
            0 => None,
            1 => Some(format!(".{}", labels[0])),
            _ => Some(format!(".{}.{}", labels[1], labels[0])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_matcher::Direction;
    use crate::packet::{L3Protocol, L4Protocol, Timestamp};
    use std::net::IpAddr;

    fn dummy_packet() -> PacketEvent {
        PacketEvent::new(
            Vec::new(),
            L3Protocol::IPv4,
            L4Protocol::Udp,
            Direction::ToHost,
            "1.2.3.4".parse::<IpAddr>().unwrap(),
            "5.6.7.8".parse::<IpAddr>().unwrap(),
            5353,
            53,
            Timestamp::from_secs_nanos(0, 0),
        )
    }

    fn record_with_qname(qname: &str) -> DnsRecord {
        DnsRecord {
            message_direction: MessageDirection::Query,
            rcode: 0,
            rcode_name: Some("NoError"),
            opcode: 0,
            truncated: false,
            transaction_id: 1,
            question: None,
            answer_count: 0,
            authority_count: 0,
            additional_count: 0,
            packet: dummy_packet(),
            normalized_qname: Some(qname.to_string()),
        }
    }

    #[test]
    fn top_qname2_keeps_last_two_labels() {
        let record = record_with_qname("foo.bar.test.com.");
        assert_eq!(record.top_qname2().as_deref(), Some(".test.com"));
    }

    #[test]
    fn top_qname2_of_two_label_name_is_itself() {
        let record = record_with_qname("test.com.");
        assert_eq!(record.top_qname2().as_deref(), Some(".test.com"));
    }

    #[test]
    fn top_qname2_of_single_label_name() {
        let record = record_with_qname("localhost.");
        assert_eq!(record.top_qname2().as_deref(), Some(".localhost"));
    }
}
