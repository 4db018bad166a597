//! Crate-local error type, following the teacher's `dnsmsg-parser`/
//! `dnstap-parser` pattern of a `#[derive(Snafu)]` enum with a `Result<T, E>`
//! alias, rather than one opaque `anyhow::Error` — callers match on kind per
//! the error-handling policy table.

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, NetvisorError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NetvisorError {
    #[snafu(display("configuration error: {message}"))]
    Config { message: String },

    #[snafu(display("failed to open capture on {iface}: {message}"))]
    CaptureOpen { iface: String, message: String },

    #[snafu(display("frame-stream protocol error: {source}"))]
    Protocol { source: dnstap_parser::FrameStreamError },

    #[snafu(display("failed to decode dnstap frame: {source}"))]
    DnstapParse { source: dnstap_parser::DnstapDecodeError },

    #[snafu(display("failed to decode DNS message: {source}"))]
    DnsParse { source: dnsmsg_parser::dns_message_parser::DnsMessageParserError },

    #[snafu(display("I/O error on {context}: {source}"))]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl NetvisorError {
    /// True for errors that should abort the owning input source's
    /// `start()` call (§7's ConfigError/CaptureOpenError); false for errors
    /// that are counted and otherwise swallowed.
    pub fn is_fatal_for_source(&self) -> bool {
        matches!(
            self,
            NetvisorError::Config { .. } | NetvisorError::CaptureOpen { .. }
        )
    }
}
