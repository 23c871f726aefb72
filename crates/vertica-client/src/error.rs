//! Client error types.

use std::fmt;

use thiserror::Error;

use crate::connection::Connection;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Establishment or reset failed.
    ///
    /// For a failed establishment the error owns the failed handle, which can
    /// still be inspected with [`Connection::status`] and
    /// [`Connection::error_message`].
    #[error(transparent)]
    Connection(Box<ConnectionError>),

    /// The handle has no bound connection (never established, or finished).
    #[error("not connected")]
    NotConnected,

    /// Wrong call shape, e.g. an unsupported argument count.
    #[error("{0}")]
    Misuse(String),

    /// A login field had the wrong type.
    #[error("wrong argument type for {field}: expected {expected}, got {found}")]
    InvalidArgument {
        /// Field name.
        field: &'static str,
        /// Accepted types.
        expected: &'static str,
        /// Type that was supplied.
        found: &'static str,
    },

    /// `establish` was called on a handle that already holds a connection.
    #[error("connection handle is already bound")]
    AlreadyConnected,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this is a connection failure (as opposed to misuse).
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this error reports a missing connection.
    #[must_use]
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// Check if this error reports a caller mistake.
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::Misuse(_) | Self::InvalidArgument { .. } | Self::AlreadyConnected
        )
    }

    /// Borrow the connection failure, if this is one.
    #[must_use]
    pub fn as_connection_error(&self) -> Option<&ConnectionError> {
        match self {
            Self::Connection(err) => Some(err),
            _ => None,
        }
    }

    /// Take the connection failure, if this is one.
    #[must_use]
    pub fn into_connection_error(self) -> Option<ConnectionError> {
        match self {
            Self::Connection(err) => Some(*err),
            _ => None,
        }
    }

    pub(crate) fn connection(message: impl Into<String>, connection: Option<Connection>) -> Self {
        Self::Connection(Box::new(ConnectionError {
            message: message.into(),
            connection,
        }))
    }
}

/// Failed authentication or negotiation.
pub struct ConnectionError {
    message: String,
    connection: Option<Connection>,
}

impl ConnectionError {
    /// Message reported by the engine.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The handle that failed, when the error owns it.
    ///
    /// `None` for a failed reset, where the caller still holds the handle.
    #[must_use]
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Take ownership of the failed handle.
    #[must_use]
    pub fn into_connection(self) -> Option<Connection> {
        self.connection
    }
}

impl fmt::Debug for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionError")
            .field("message", &self.message)
            .field("has_connection", &self.connection.is_some())
            .finish()
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConnectionError {}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(Error::NotConnected.is_not_connected());
        assert!(Error::Misuse("x".into()).is_misuse());
        assert!(Error::AlreadyConnected.is_misuse());
        assert!(!Error::NotConnected.is_connection_error());

        let err = Error::connection("FATAL:  no such user", None);
        assert!(err.is_connection_error());
        assert!(!err.is_misuse());
        assert_eq!(err.to_string(), "FATAL:  no such user");
        assert!(err.as_connection_error().and_then(ConnectionError::connection).is_none());
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::InvalidArgument {
            field: "host",
            expected: "string or nil",
            found: "integer",
        };
        assert_eq!(
            err.to_string(),
            "wrong argument type for host: expected string or nil, got integer"
        );
    }
}
