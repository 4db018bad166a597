//! Dnstap frame-stream file intake (§4.4): reads a `.fs`/`.dnstap` file in
//! one pass and emits `dnstap_signal` for each decoded MESSAGE-typed frame.
//! The file already carries its own leading START control frame per the
//! frame-streams file format, so no bidirectional handshake is needed —
//! unlike [`super::dnstap_socket::DnstapSocket`], which negotiates READY.

use std::fs;
use std::path::PathBuf;

use dnstap_parser::{decode_chunk, FrameStreamCodec};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::error::{self, Result};
use crate::input::{InputSource, SharedSignals};

const READ_CHUNK: usize = 64 * 1024;

pub struct DnstapFileConfig {
    pub path: PathBuf,
}

pub struct DnstapFile {
    config: DnstapFileConfig,
    running: bool,
}

impl DnstapFile {
    pub fn new(config: DnstapFileConfig) -> Self {
        DnstapFile {
            config,
            running: false,
        }
    }
}

impl InputSource for DnstapFile {
    fn start(&mut self, signals: SharedSignals) -> Result<()> {
        if self.running {
            return Ok(());
        }

        let bytes = fs::read(&self.config.path).context(error::IoSnafu {
            context: self.config.path.display().to_string(),
        })?;

        self.running = true;
        let mut codec = FrameStreamCodec::new();
        let mut events_emitted = 0u64;

        for chunk in bytes.chunks(READ_CHUNK) {
            if !self.running {
                break;
            }
            match decode_chunk(&mut codec, chunk) {
                Ok(messages) => {
                    let mut signals = signals.lock().expect("signals mutex poisoned");
                    for message in messages {
                        signals.dnstap_signal.emit(&message);
                        events_emitted += 1;
                    }
                }
                Err(e) => {
                    warn!(path = %self.config.path.display(), error = %e, "dnstap file frame-stream error");
                    break;
                }
            }
        }

        debug!(path = %self.config.path.display(), events_emitted, "dnstap file exhausted");
        self.running = false;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use dnstap_parser::dnstap;
    use prost::Message as _;

    fn control_frame(control_type: u32) -> Vec<u8> {
        let body = control_type.to_be_bytes().to_vec();
        let mut out = 0u32.to_be_bytes().to_vec();
        out.extend((body.len() as u32).to_be_bytes());
        out.extend(body);
        out
    }

    fn message_frame() -> Vec<u8> {
        let envelope = dnstap::Dnstap {
            r#type: dnstap::dnstap::Type::Message as i32,
            identity: None,
            version: None,
            extra: None,
            message: Some(dnstap::Message {
                r#type: dnstap::message::Type::ClientQuery as i32,
                socket_family: None,
                socket_protocol: None,
                query_address: None,
                response_address: None,
                query_port: None,
                response_port: None,
                query_time_sec: None,
                query_time_nsec: None,
                query_message: Some(vec![1, 2, 3]),
                query_zone: None,
                response_time_sec: None,
                response_time_nsec: None,
                response_message: None,
            }),
        };
        let body = envelope.encode_to_vec();
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend(body);
        out
    }

    #[test]
    fn not_running_before_start() {
        let source = DnstapFile::new(DnstapFileConfig {
            path: PathBuf::from("/nonexistent.dnstap"),
        });
        assert!(!source.is_running());
    }

    #[test]
    fn start_on_missing_file_returns_io_error() {
        let mut source = DnstapFile::new(DnstapFileConfig {
            path: PathBuf::from("/definitely/does/not/exist.dnstap"),
        });
        let signals: SharedSignals = Arc::new(Mutex::new(crate::input::InputSignals::default()));
        assert!(source.start(signals).is_err());
    }

    #[test]
    fn reads_a_frame_stream_file_and_emits_dnstap_events() {
        let mut bytes = control_frame(2 /* START */);
        bytes.extend(message_frame());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.dnstap");
        fs::write(&path, &bytes).unwrap();

        let mut source = DnstapFile::new(DnstapFileConfig { path });
        let signals: SharedSignals = Arc::new(Mutex::new(crate::input::InputSignals::default()));
        let received = Arc::new(Mutex::new(0u32));
        let received_clone = Arc::clone(&received);
        signals.lock().unwrap().dnstap_signal.connect(move |_event| {
            *received_clone.lock().unwrap() += 1;
        });

        source.start(signals).expect("should read the file");
        assert_eq!(*received.lock().unwrap(), 1);
    }
}
