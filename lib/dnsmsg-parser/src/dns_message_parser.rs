use hickory_proto::{
    op::message::Message as TrustDnsMessage, rr::record_type::RecordType, ProtoError,
};
use snafu::{ResultExt, Snafu};

use super::dns_message::{DnsQueryMessage, QueryHeader, QueryQuestion};

/// Error type for DNS message parsing.
#[derive(Debug, Snafu)]
pub enum DnsMessageParserError {
    #[snafu(display("encountered error from hickory-proto: {source}"))]
    WireError { source: ProtoError },
}

pub type DnsParserResult<T> = Result<T, DnsMessageParserError>;

/// Decodes a raw DNS message (the full UDP payload, or a TCP segment with its
/// 2-byte length prefix already stripped) into a [`DnsQueryMessage`].
///
/// Only the header, question section, and per-section record counts are
/// decoded — answer/authority/additional rdata is never inspected. This
/// mirrors what a transaction-metrics pipeline actually consumes: rcode,
/// qtype, qname, and answer count.
#[derive(Debug)]
pub struct DnsMessageParser {
    raw_message: Vec<u8>,
}

impl DnsMessageParser {
    pub fn new(raw_message: Vec<u8>) -> Self {
        DnsMessageParser { raw_message }
    }

    pub fn raw_message(&self) -> &[u8] {
        &self.raw_message
    }

    pub fn parse_as_query_message(&mut self) -> DnsParserResult<DnsQueryMessage> {
        let msg =
            TrustDnsMessage::from_vec(&self.raw_message).context(WireSnafu)?;
        let header = parse_dns_query_message_header(&msg);
        let response_code = u16::from(header.rcode);

        Ok(DnsQueryMessage {
            response_code,
            response: parse_response_code(response_code),
            header,
            question_section: parse_dns_query_message_question_section(&msg),
            answer_count: msg.answer_count(),
            authority_count: msg.name_server_count(),
            additional_count: msg.additional_count(),
        })
    }
}

fn parse_dns_query_message_question_section(dns_message: &TrustDnsMessage) -> Vec<QueryQuestion> {
    dns_message
        .queries()
        .iter()
        .map(|query| QueryQuestion {
            name: query.name().to_string(),
            class: query.query_class().to_string(),
            record_type: format_record_type(query.query_type()),
            record_type_id: u16::from(query.query_type()),
        })
        .collect()
}

fn format_record_type(record_type: RecordType) -> Option<String> {
    match record_type {
        RecordType::Unknown(code) => parse_unknown_record_type(code),
        _ => Some(record_type.to_string()),
    }
}

fn parse_response_code(rcode: u16) -> Option<&'static str> {
    match rcode {
        0 => Some("NoError"),   // [RFC1035]
        1 => Some("FormErr"),   // [RFC1035]
        2 => Some("ServFail"),  // [RFC1035]
        3 => Some("NXDomain"),  // [RFC1035]
        4 => Some("NotImp"),    // [RFC1035]
        5 => Some("Refused"),   // [RFC1035]
        6 => Some("YXDomain"),  // [RFC2136][RFC6672]
        7 => Some("YXRRSet"),   // [RFC2136]
        8 => Some("NXRRSet"),   // [RFC2136]
        9 => Some("NotAuth"),   // [RFC2136]
        10 => Some("NotZone"),  // [RFC2136]
        16 => Some("BADSIG"),   // [RFC2845]
        17 => Some("BADKEY"),   // [RFC2845]
        18 => Some("BADTIME"),  // [RFC2845]
        19 => Some("BADMODE"),  // [RFC2930]
        20 => Some("BADNAME"),  // [RFC2930]
        21 => Some("BADALG"),   // [RFC2930]
        22 => Some("BADTRUNC"), // [RFC4635]
        23 => Some("BADCOOKIE"),
        _ => None,
    }
}

fn parse_dns_query_message_header(dns_message: &TrustDnsMessage) -> QueryHeader {
    QueryHeader {
        id: dns_message.header().id(),
        opcode: dns_message.header().op_code().into(),
        rcode: dns_message.header().response_code(),
        qr: dns_message.header().message_type() as u8,
        aa: dns_message.header().authoritative(),
        tc: dns_message.header().truncated(),
        rd: dns_message.header().recursion_desired(),
        ra: dns_message.header().recursion_available(),
        question_count: dns_message.header().query_count(),
        answer_count: dns_message.header().answer_count(),
        authority_count: dns_message.header().name_server_count(),
        additional_count: dns_message.header().additional_count(),
    }
}

fn parse_unknown_record_type(rtype: u16) -> Option<String> {
    match rtype {
        1 => Some(String::from("A")),
        2 => Some(String::from("NS")),
        5 => Some(String::from("CNAME")),
        6 => Some(String::from("SOA")),
        12 => Some(String::from("PTR")),
        15 => Some(String::from("MX")),
        16 => Some(String::from("TXT")),
        28 => Some(String::from("AAAA")),
        33 => Some(String::from("SRV")),
        35 => Some(String::from("NAPTR")),
        41 => Some(String::from("OPT")),
        43 => Some(String::from("DS")),
        46 => Some(String::from("RRSIG")),
        47 => Some(String::from("NSEC")),
        48 => Some(String::from("DNSKEY")),
        50 => Some(String::from("NSEC3")),
        51 => Some(String::from("NSEC3PARAM")),
        52 => Some(String::from("TLSA")),
        255 => Some(String::from("ANY")),
        257 => Some(String::from("CAA")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::{
        op::{Message, MessageType, Query},
        rr::{Name, RecordType},
    };
    use std::str::FromStr;

    fn build_query(name: &str, id: u16) -> Vec<u8> {
        let mut msg = Message::new();
        msg.set_id(id).set_message_type(MessageType::Query);
        msg.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
        msg.to_vec().unwrap()
    }

    #[test]
    fn parses_query_header_and_question() {
        let raw = build_query("www.example.com.", 42);
        let mut parser = DnsMessageParser::new(raw);
        let parsed = parser.parse_as_query_message().expect("should parse");

        assert_eq!(parsed.header.id, 42);
        assert_eq!(parsed.header.qr, 0);
        assert_eq!(parsed.question_section.len(), 1);
        assert_eq!(parsed.question_section[0].name, "www.example.com.");
        assert_eq!(parsed.question_section[0].record_type_id, 1);
        assert_eq!(parsed.response_code, 0);
        assert_eq!(parsed.response, Some("NoError"));
    }

    #[test]
    fn rejects_truncated_garbage() {
        let mut parser = DnsMessageParser::new(vec![0u8; 3]);
        assert!(parser.parse_as_query_message().is_err());
    }

    #[test]
    fn response_code_table_covers_common_codes() {
        assert_eq!(parse_response_code(0), Some("NoError"));
        assert_eq!(parse_response_code(2), Some("ServFail"));
        assert_eq!(parse_response_code(3), Some("NXDomain"));
        assert_eq!(parse_response_code(5), Some("Refused"));
        assert_eq!(parse_response_code(9999), None);
    }
}
