//! Frame Streams decoder: the length-prefixed framing protocol dnstap is
//! carried over, independent of the dnstap payload itself.
//!
//! Wire shape per frame:
//!   [u32 be length][length bytes of payload]
//! A length of zero marks a control frame, itself length-prefixed:
//!   [0u32][u32 be control length][control length bytes]
//! A control frame payload is `[u32 be control type]` followed by zero or
//! more `[u32 be field type][u32 be field length][field bytes]` fields (only
//! CONTENT_TYPE, field type 1, is defined today).

use bytes::{Buf, BytesMut};
use snafu::Snafu;

/// Matches libfstrm's `FSTRM_READER_MAX_FRAME_SIZE_DEFAULT`.
pub const MAX_FRAME_SIZE: u32 = 1 << 20;

const CONTENT_TYPE_FIELD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ControlType {
    Accept = 1,
    Start = 2,
    Stop = 3,
    Ready = 4,
    Finish = 5,
}

impl ControlType {
    fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(ControlType::Accept),
            2 => Some(ControlType::Start),
            3 => Some(ControlType::Stop),
            4 => Some(ControlType::Ready),
            5 => Some(ControlType::Finish),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    New,
    Ready,
    Running,
    Stopped,
}

#[derive(Debug, Snafu)]
pub enum FrameStreamError {
    #[snafu(display("invalid data: header length"))]
    HeaderTooShort,
    #[snafu(display("invalid data: control frame length"))]
    ControlLengthTooShort,
    #[snafu(display("data frame too large: {len} bytes"))]
    FrameTooLarge { len: u32 },
    #[snafu(display("received data frame before a START control frame"))]
    DataBeforeStart,
    #[snafu(display("received unknown control frame type {raw}"))]
    UnknownControlType { raw: u32 },
    #[snafu(display("control frame truncated"))]
    ControlFrameTruncated,
    #[snafu(display("received {kind} control frame but session already started"))]
    AlreadyStarted { kind: &'static str },
    #[snafu(display("received STOP/FINISH control frame before READY/START"))]
    UnexpectedTermination,
}

/// An event surfaced by [`FrameStreamCodec::feed`] as the byte stream is
/// decoded: either a decoded data frame payload, or a control-protocol
/// transition a caller may want to react to (e.g. send its own READY/ACCEPT
/// reply on a bidirectional session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStreamEvent {
    Data(Vec<u8>),
    ControlReady { content_types: Vec<Vec<u8>> },
    ControlFinish,
}

/// Incremental decoder for one frame-streams session. Feed it arbitrary
/// chunks of socket or file bytes; it buffers partial frames across calls.
#[derive(Debug)]
pub struct FrameStreamCodec {
    buffer: BytesMut,
    state: SessionState,
    is_bidir: bool,
}

impl Default for FrameStreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStreamCodec {
    pub fn new() -> Self {
        FrameStreamCodec {
            buffer: BytesMut::new(),
            state: SessionState::New,
            is_bidir: false,
        }
    }

    pub fn is_bidirectional(&self) -> bool {
        self.is_bidir
    }

    /// Append newly-received bytes and decode as many complete frames as are
    /// now available. May decode zero, one, or several frames per call.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<FrameStreamEvent>, FrameStreamError> {
        self.buffer.extend_from_slice(data);
        let mut events = Vec::new();

        loop {
            if self.buffer.len() < 4 {
                if !self.buffer.is_empty() {
                    // not an error yet: just need more bytes.
                }
                break;
            }

            let frame_len = u32::from_be_bytes(self.buffer[..4].try_into().unwrap());

            if frame_len != 0 {
                if self.state != SessionState::Running {
                    return Err(FrameStreamError::DataBeforeStart);
                }
                if frame_len > MAX_FRAME_SIZE {
                    return Err(FrameStreamError::FrameTooLarge { len: frame_len });
                }
                let total = 4 + frame_len as usize;
                if self.buffer.len() < total {
                    break;
                }
                self.buffer.advance(4);
                let payload = self.buffer.split_to(frame_len as usize).to_vec();
                events.push(FrameStreamEvent::Data(payload));
            } else {
                if self.buffer.len() < 8 {
                    break;
                }
                let ctrl_len = u32::from_be_bytes(self.buffer[4..8].try_into().unwrap());
                let total = 8 + ctrl_len as usize;
                if self.buffer.len() < total {
                    break;
                }
                self.buffer.advance(8);
                let control = self.buffer.split_to(ctrl_len as usize);
                events.extend(self.decode_control_frame(&control)?);
            }
        }

        Ok(events)
    }

    /// Encodes the ACCEPT control frame a bidirectional session's server
    /// side writes back in response to a client's READY, echoing the
    /// content types the client offered.
    pub fn encode_accept_frame(content_types: &[Vec<u8>]) -> Vec<u8> {
        let mut body = (ControlType::Accept as u32).to_be_bytes().to_vec();
        for content_type in content_types {
            body.extend(CONTENT_TYPE_FIELD.to_be_bytes());
            body.extend((content_type.len() as u32).to_be_bytes());
            body.extend_from_slice(content_type);
        }
        let mut out = 0u32.to_be_bytes().to_vec();
        out.extend((body.len() as u32).to_be_bytes());
        out.extend(body);
        out
    }

    fn decode_control_frame(
        &mut self,
        frame: &[u8],
    ) -> Result<Vec<FrameStreamEvent>, FrameStreamError> {
        if frame.len() < 4 {
            return Err(FrameStreamError::ControlFrameTruncated);
        }
        let raw_type = u32::from_be_bytes(frame[..4].try_into().unwrap());
        let control_type =
            ControlType::from_u32(raw_type).ok_or(FrameStreamError::UnknownControlType { raw: raw_type })?;

        let mut content_types = Vec::new();
        let mut rest = &frame[4..];
        while !rest.is_empty() {
            if rest.len() < 8 {
                return Err(FrameStreamError::ControlFrameTruncated);
            }
            let field_type = u32::from_be_bytes(rest[..4].try_into().unwrap());
            let field_len = u32::from_be_bytes(rest[4..8].try_into().unwrap()) as usize;
            rest = &rest[8..];
            if rest.len() < field_len {
                return Err(FrameStreamError::ControlFrameTruncated);
            }
            if field_type == CONTENT_TYPE_FIELD {
                content_types.push(rest[..field_len].to_vec());
            }
            rest = &rest[field_len..];
        }

        match control_type {
            ControlType::Start => {
                if self.state != SessionState::New {
                    return Err(FrameStreamError::AlreadyStarted { kind: "START" });
                }
                self.state = SessionState::Running;
                Ok(Vec::new())
            }
            ControlType::Ready => {
                if self.state != SessionState::New {
                    return Err(FrameStreamError::AlreadyStarted { kind: "READY" });
                }
                self.state = SessionState::Ready;
                self.is_bidir = true;
                Ok(vec![FrameStreamEvent::ControlReady { content_types }])
            }
            ControlType::Accept => {
                self.state = SessionState::Running;
                Ok(Vec::new())
            }
            ControlType::Stop => {
                if self.state == SessionState::New {
                    return Err(FrameStreamError::UnexpectedTermination);
                }
                self.state = SessionState::Stopped;
                Ok(Vec::new())
            }
            ControlType::Finish => {
                if self.state == SessionState::New {
                    return Err(FrameStreamError::UnexpectedTermination);
                }
                self.state = SessionState::Stopped;
                Ok(vec![FrameStreamEvent::ControlFinish])
            }
        }
    }
}
