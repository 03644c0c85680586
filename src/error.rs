use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong between a request being submitted and its
/// decoded (or raw) response being handed back to a caller.
///
/// All variants are recovered at the session/multiplexer boundary and turned
/// into return values; none of them takes down unrelated client sessions.
#[derive(Debug, Error)]
pub enum BmsError {
    /// The BLE collaborator failed to connect or dropped the connection.
    #[error("BLE connection error: {0}")]
    Connection(String),

    /// The request bytes could not be delivered to the write characteristic.
    /// Not retried automatically.
    #[error("request write failed: {0}")]
    WriteFailed(String),

    /// No complete response frame arrived within the wait window.
    #[error("no complete response within {0:?}")]
    Timeout(Duration),

    /// The in-progress response buffer grew past the allowed maximum without
    /// ever hitting the terminator byte.
    #[error("response frame exceeded {limit} bytes without terminating")]
    FrameOverflow { limit: usize },

    /// A response frame ended before the bytes a decode path indexes.
    /// Surfaced as-is, never papered over with default values.
    #[error("response too short: needed {expected} bytes, got {actual}")]
    TruncatedResponse { expected: usize, actual: usize },

    /// The device link is gone; no further requests can be serviced.
    #[error("device link closed")]
    LinkClosed,
}
