#![deny(warnings)]

mod internal_events;
pub mod dnstap;
pub mod framestream;

use internal_events::DnstapParseWarning;

pub use dnstap::{decode_message_frame, DnstapDecodeError, DnstapEvent};
pub use framestream::{FrameStreamCodec, FrameStreamError, FrameStreamEvent};

/// Result of decoding one chunk of frame-stream bytes: dnstap messages ready
/// to forward, plus any control-protocol events a caller must act on (e.g.
/// writing back an ACCEPT frame on a bidirectional session's READY).
#[derive(Debug, Default)]
pub struct DecodedChunk {
    pub messages: Vec<DnstapEvent>,
    pub control: Vec<FrameStreamEvent>,
}

/// Feeds bytes through a [`FrameStreamCodec`] and decodes every resulting
/// data frame as a dnstap `Message`. A frame that fails protobuf decode is
/// logged and skipped rather than aborting the whole session, matching the
/// "skip malformed frame, keep going" behavior of a long-lived dnstap feed.
/// Non-data events (READY, FINISH) are returned alongside the messages
/// rather than discarded, since a bidirectional session's transport layer
/// needs to react to them (e.g. reply to READY with ACCEPT).
pub fn decode_chunk(codec: &mut FrameStreamCodec, data: &[u8]) -> Result<DecodedChunk, FrameStreamError> {
    let events = codec.feed(data)?;
    let mut chunk = DecodedChunk::default();
    for event in events {
        match event {
            FrameStreamEvent::Data(frame) => match decode_message_frame(&frame) {
                Ok(msg) => chunk.messages.push(msg),
                Err(error) => DnstapParseWarning { error }.emit(),
            },
            other => chunk.control.push(other),
        }
    }
    Ok(chunk)
}
