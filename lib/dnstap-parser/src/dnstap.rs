//! Decodes the dnstap protobuf payload carried inside each frame-streams
//! data frame, extracting `Message`-typed events. `Dnstap` frames of any
//! other type are reported but dropped — nothing downstream parses them.

use prost::Message as _;
use snafu::{ResultExt, Snafu};

include!(concat!(env!("OUT_DIR"), "/dnstap.rs"));

#[derive(Debug, Snafu)]
pub enum DnstapDecodeError {
    #[snafu(display("failed to decode dnstap protobuf frame: {source}"))]
    Protobuf { source: prost::DecodeError },
    #[snafu(display("dnstap frame has no message payload"))]
    MissingMessage,
    #[snafu(display("dnstap frame type is not MESSAGE"))]
    NotAMessage,
}

/// The subset of `dnstap::Message` a transaction pipeline needs: which way
/// the message went, the socket it traveled over, and the raw DNS payloads.
#[derive(Debug, Clone)]
pub struct DnstapEvent {
    pub message_type: message::Type,
    pub socket_family: Option<SocketFamily>,
    pub socket_protocol: Option<SocketProtocol>,
    pub query_address: Option<Vec<u8>>,
    pub response_address: Option<Vec<u8>>,
    pub query_port: Option<u32>,
    pub response_port: Option<u32>,
    pub query_time_sec: Option<u64>,
    pub query_time_nsec: Option<u32>,
    pub query_message: Option<Vec<u8>>,
    pub response_time_sec: Option<u64>,
    pub response_time_nsec: Option<u32>,
    pub response_message: Option<Vec<u8>>,
}

/// Decodes one frame-streams data frame payload as a dnstap `Message` event.
pub fn decode_message_frame(frame: &[u8]) -> Result<DnstapEvent, DnstapDecodeError> {
    let envelope = Dnstap::decode(frame).context(ProtobufSnafu)?;

    if envelope.r#type() != dnstap::Type::Message {
        return Err(DnstapDecodeError::NotAMessage);
    }
    let message = envelope.message.ok_or(DnstapDecodeError::MissingMessage)?;

    Ok(DnstapEvent {
        message_type: message.r#type(),
        socket_family: message
            .socket_family
            .and_then(|v| SocketFamily::try_from(v).ok()),
        socket_protocol: message
            .socket_protocol
            .and_then(|v| SocketProtocol::try_from(v).ok()),
        query_address: message.query_address,
        response_address: message.response_address,
        query_port: message.query_port,
        response_port: message.response_port,
        query_time_sec: message.query_time_sec,
        query_time_nsec: message.query_time_nsec,
        query_message: message.query_message,
        response_time_sec: message.response_time_sec,
        response_time_nsec: message.response_time_nsec,
        response_message: message.response_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;

    #[test]
    fn decodes_a_client_response_message() {
        let msg = Message {
            r#type: message::Type::ClientResponse as i32,
            socket_family: Some(SocketFamily::Inet as i32),
            socket_protocol: Some(SocketProtocol::Udp as i32),
            query_address: Some(vec![127, 0, 0, 1]),
            response_address: Some(vec![127, 0, 0, 1]),
            query_port: Some(5353),
            response_port: Some(53),
            query_time_sec: Some(1_700_000_000),
            query_time_nsec: Some(0),
            query_message: None,
            query_zone: None,
            response_time_sec: Some(1_700_000_000),
            response_time_nsec: Some(1_000_000),
            response_message: Some(vec![1, 2, 3]),
        };
        let envelope = Dnstap {
            r#type: dnstap::Type::Message as i32,
            identity: None,
            version: None,
            extra: None,
            message: Some(msg),
        };
        let bytes = envelope.encode_to_vec();

        let decoded = decode_message_frame(&bytes).unwrap();
        assert_eq!(decoded.message_type, message::Type::ClientResponse);
        assert_eq!(decoded.response_message, Some(vec![1, 2, 3]));
        assert_eq!(decoded.response_port, Some(53));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(decode_message_frame(&[0xff, 0x00, 0xff]).is_err());
    }
}
