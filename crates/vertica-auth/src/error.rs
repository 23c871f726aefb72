//! Authentication error types.

use thiserror::Error;

/// Errors that can occur while answering an authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The server asked for a method this client does not implement.
    #[error("authentication method \"{0}\" is not supported")]
    Unsupported(&'static str),

    /// The server asked for a password but none was supplied.
    #[error("fe_sendauth: no password supplied")]
    PasswordRequired,
}
