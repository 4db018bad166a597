//! Wraps `dnsmsg-parser`'s wire decode, producing the record shape the rest
//! of this crate consumes. A malformed message is dropped (the caller
//! increments a parse-error counter and never sees a `DnsRecord`) — it
//! never propagates further (§4.6).

use dnsmsg_parser::dns_message_parser::DnsMessageParser;

use crate::packet::PacketEvent;

use super::record::{DnsRecord, MessageDirection, Question};

/// Decodes a UDP payload (the whole datagram) as a DNS message.
pub fn parse_udp(payload: &[u8], packet: PacketEvent) -> Option<DnsRecord> {
    parse_raw(payload, packet)
}

/// Decodes one reassembled TCP segment, stripping the preceding 16-bit
/// big-endian length prefix that TCP DNS framing requires.
pub fn parse_tcp_segment(segment: &[u8], packet: PacketEvent) -> Option<DnsRecord> {
    if segment.len() < 2 {
        return None;
    }
    let declared_len = u16::from_be_bytes([segment[0], segment[1]]) as usize;
    let body = segment.get(2..2 + declared_len)?;
    parse_raw(body, packet)
}

fn parse_raw(payload: &[u8], packet: PacketEvent) -> Option<DnsRecord> {
    let mut parser = DnsMessageParser::new(payload.to_vec());
    let message = parser.parse_as_query_message().ok()?;

    let message_direction = if message.header.qr == 0 {
        MessageDirection::Query
    } else {
        MessageDirection::Response
    };

    let question = message.question_section.first().map(|q| Question {
        qname: q.name.clone(),
        qtype: q.record_type.clone(),
        qtype_id: q.record_type_id,
        qclass: q.class.clone(),
    });

    let normalized_qname = question.as_ref().map(|q| q.qname.to_lowercase());

    Some(DnsRecord {
        message_direction,
        rcode: message.response_code,
        rcode_name: message.response,
        opcode: message.header.opcode,
        truncated: message.header.tc,
        transaction_id: message.header.id,
        question,
        answer_count: message.answer_count,
        authority_count: message.authority_count,
        additional_count: message.additional_count,
        packet,
        normalized_qname,
    })
}
