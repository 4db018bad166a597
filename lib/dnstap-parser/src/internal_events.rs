use tracing::warn;

/// Emitted whenever a single frame fails to decode — the session itself
/// keeps running, since one malformed frame shouldn't take down a live
/// dnstap socket feed.
#[derive(Debug)]
pub(crate) struct DnstapParseWarning<E> {
    pub error: E,
}

impl<E: std::fmt::Display> DnstapParseWarning<E> {
    pub(crate) fn emit(self) {
        warn!(
            message = "recoverable error while parsing dnstap data, skipping frame",
            error = %self.error,
        );
    }
}
