//! Connection, polling and transaction states.
//!
//! ## Handle phases
//!
//! ```text
//! Unbound -> Connecting(mode) -> Bound | Failed
//! Bound | Failed -> Resetting(mode) -> Bound | Failed
//! Bound | Failed -> Terminated (via finish())
//! ```
//!
//! The numeric codes of [`ConnectionStatus`], [`PollingStatus`] and
//! [`TransactionStatus`] follow the numbering of the C client library so
//! they can be exchanged with code written against it.

use std::fmt;

/// How negotiation is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// The call returns once negotiation has finished.
    #[default]
    Blocking,
    /// The call returns immediately; the caller drives negotiation with
    /// repeated polls.
    NonBlocking,
}

impl Mode {
    /// `NonBlocking` for `true`, `Blocking` otherwise.
    #[must_use]
    pub fn from_async(flag: bool) -> Self {
        if flag { Self::NonBlocking } else { Self::Blocking }
    }

    /// Whether this is the poll-driven mode.
    #[must_use]
    pub fn is_non_blocking(self) -> bool {
        matches!(self, Self::NonBlocking)
    }
}

/// Life-cycle phase of a [`Connection`](crate::Connection) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlePhase {
    /// Allocated, nothing bound.
    Unbound,
    /// Establishment in progress.
    Connecting(Mode),
    /// Bound to a ready session.
    Bound,
    /// Bound to a connection whose negotiation failed.
    Failed,
    /// Reset in progress.
    Resetting(Mode),
    /// Finished; absorbing.
    Terminated,
}

impl HandlePhase {
    /// Whether a negotiation (connect or reset) is in progress.
    #[must_use]
    pub fn is_negotiating(self) -> bool {
        matches!(self, Self::Connecting(_) | Self::Resetting(_))
    }
}

/// Engine-reported connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Session ready.
    Ok,
    /// Negotiation failed or the connection broke.
    Bad,
    /// Waiting for the TCP connection to be made.
    Started,
    /// TCP connection made; waiting to send.
    Made,
    /// Waiting for a response from the server.
    AwaitingResponse,
    /// Authenticated; waiting for backend start-up to finish.
    AuthOk,
    /// Negotiating environment settings.
    Setenv,
    /// Negotiating TLS.
    SslStartup,
    /// Internal state: connect() needed.
    Needed,
    /// A code this crate does not know.
    Unknown,
}

impl ConnectionStatus {
    /// Numeric code.
    ///
    /// `Unknown` has no code of its own and reports `-1`.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Bad => 1,
            Self::Started => 2,
            Self::Made => 3,
            Self::AwaitingResponse => 4,
            Self::AuthOk => 5,
            Self::Setenv => 6,
            Self::SslStartup => 7,
            Self::Needed => 8,
            Self::Unknown => -1,
        }
    }

    /// Map a numeric code; unknown codes give [`ConnectionStatus::Unknown`].
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Bad,
            2 => Self::Started,
            3 => Self::Made,
            4 => Self::AwaitingResponse,
            5 => Self::AuthOk,
            6 => Self::Setenv,
            7 => Self::SslStartup,
            8 => Self::Needed,
            _ => Self::Unknown,
        }
    }

    /// Lower-case name (`ok`, `bad`, `awaiting_response`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Bad => "bad",
            Self::Started => "started",
            Self::Made => "made",
            Self::AwaitingResponse => "awaiting_response",
            Self::AuthOk => "auth_ok",
            Self::Setenv => "setenv",
            Self::SslStartup => "ssl_startup",
            Self::Needed => "needed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one non-blocking negotiation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollingStatus {
    /// Negotiation failed; stop polling.
    Failed,
    /// Wait until the socket is readable, then poll again.
    Reading,
    /// Wait until the socket is writable, then poll again.
    Writing,
    /// Negotiation finished; stop polling.
    Ok,
    /// Poll again right away.
    Active,
}

impl PollingStatus {
    /// Numeric code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Failed => 0,
            Self::Reading => 1,
            Self::Writing => 2,
            Self::Ok => 3,
            Self::Active => 4,
        }
    }

    /// Map a numeric code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Failed),
            1 => Some(Self::Reading),
            2 => Some(Self::Writing),
            3 => Some(Self::Ok),
            4 => Some(Self::Active),
            _ => None,
        }
    }

    /// Whether polling should stop.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ok | Self::Failed)
    }

    /// Lower-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Reading => "reading",
            Self::Writing => "writing",
            Self::Ok => "ok",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for PollingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-reported transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Idle, outside a transaction block.
    Idle,
    /// A command is in progress.
    Active,
    /// Idle inside a transaction block.
    InTransaction,
    /// Idle inside a failed transaction block.
    InError,
    /// Connection is bad or the state is not known.
    Unknown,
}

impl TransactionStatus {
    /// Numeric code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Idle => 0,
            Self::Active => 1,
            Self::InTransaction => 2,
            Self::InError => 3,
            Self::Unknown => 4,
        }
    }

    /// Map a numeric code; unknown codes give [`TransactionStatus::Unknown`].
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Idle,
            1 => Self::Active,
            2 => Self::InTransaction,
            3 => Self::InError,
            _ => Self::Unknown,
        }
    }

    /// Map the `ReadyForQuery` indicator byte.
    #[must_use]
    pub fn from_indicator(indicator: u8) -> Self {
        match indicator {
            vertica_protocol::TRANSACTION_IDLE => Self::Idle,
            vertica_protocol::TRANSACTION_IN_BLOCK => Self::InTransaction,
            vertica_protocol::TRANSACTION_FAILED => Self::InError,
            _ => Self::Unknown,
        }
    }

    /// Lower-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::InTransaction => "in_transaction",
            Self::InError => "in_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status_codes() {
        for code in 0..=8 {
            assert_eq!(ConnectionStatus::from_code(code).code(), code);
        }
        assert_eq!(ConnectionStatus::from_code(42), ConnectionStatus::Unknown);
        assert_eq!(ConnectionStatus::AwaitingResponse.to_string(), "awaiting_response");
    }

    #[test]
    fn test_handle_phase_negotiating() {
        assert!(HandlePhase::Connecting(Mode::NonBlocking).is_negotiating());
        assert!(HandlePhase::Resetting(Mode::Blocking).is_negotiating());
        for phase in [
            HandlePhase::Unbound,
            HandlePhase::Bound,
            HandlePhase::Failed,
            HandlePhase::Terminated,
        ] {
            assert!(!phase.is_negotiating(), "{phase:?}");
        }
    }

    #[test]
    fn test_polling_status_codes() {
        for code in 0..=4 {
            assert_eq!(PollingStatus::from_code(code).map(PollingStatus::code), Some(code));
        }
        assert_eq!(PollingStatus::from_code(5), None);
        assert!(PollingStatus::Ok.is_terminal());
        assert!(!PollingStatus::Active.is_terminal());
    }

    #[test]
    fn test_transaction_status_indicator() {
        assert_eq!(TransactionStatus::from_indicator(b'I'), TransactionStatus::Idle);
        assert_eq!(TransactionStatus::from_indicator(b'T'), TransactionStatus::InTransaction);
        assert_eq!(TransactionStatus::from_indicator(b'E'), TransactionStatus::InError);
        assert_eq!(TransactionStatus::from_indicator(b'?'), TransactionStatus::Unknown);
        assert_eq!(TransactionStatus::from_code(99), TransactionStatus::Unknown);
    }

    #[test]
    fn test_mode_from_async() {
        assert_eq!(Mode::from_async(true), Mode::NonBlocking);
        assert_eq!(Mode::from_async(false), Mode::Blocking);
    }
}
