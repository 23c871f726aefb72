//! Protocol-level error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Message body ended before a field could be read.
    #[error("incomplete message: expected {expected} bytes, got {actual}")]
    IncompleteMessage {
        /// Bytes needed.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Length word smaller than the length word itself.
    #[error("invalid message length: {0}")]
    InvalidLength(i32),

    /// Length word above the accepted ceiling.
    #[error("message too large: {length} bytes (max {max})")]
    MessageTooLarge {
        /// Declared length.
        length: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// A C string was not NUL-terminated within the message.
    #[error("unterminated string in {0} message")]
    UnterminatedString(&'static str),

    /// String payload was not valid UTF-8.
    #[error("invalid UTF-8 in {0} message")]
    InvalidUtf8(&'static str),

    /// Startup packet announced a protocol version this side does not speak.
    #[error("unsupported protocol version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version.
        major: u16,
        /// Minor version.
        minor: u16,
    },

    /// Frontend frame with a tag this crate does not model.
    #[error("unexpected frontend message tag: 0x{0:02x}")]
    UnexpectedTag(u8),
}
