//! TLS-related error types.

use thiserror::Error;

/// Errors that can occur during TLS setup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TlsError {
    /// Invalid certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// The host name cannot be used for SNI or verification.
    #[error("invalid server name for TLS: \"{0}\"")]
    InvalidServerName(String),

    /// TLS configuration error.
    #[error("TLS configuration error: {0}")]
    Configuration(String),

    /// Rustls error.
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
}
