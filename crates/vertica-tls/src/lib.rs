//! # vertica-tls
//!
//! TLS session setup for Vertica connections.
//!
//! Vertica negotiates encryption in-band: the client sends an `SslRequest`,
//! the server answers with a single byte, and on `S` the TLS handshake runs
//! over the same socket before the startup packet is sent.
//!
//! ```text
//! TCP Connect → SslRequest → 'S' → TLS Handshake → Startup (encrypted)
//! ```
//!
//! This crate does no I/O. [`TlsConnector::session`] hands back a
//! [`rustls::ClientConnection`] that the caller feeds from its own socket,
//! so the handshake can be driven by the same poll loop as the rest of the
//! negotiation.
//!
//! ## Security
//!
//! `sslmode=prefer` and `sslmode=require` encrypt without verifying the
//! server certificate and log a warning. `verify-ca` checks the chain
//! against the webpki roots (or custom roots) and `verify-full` also checks
//! the host name.
//!
//! ```rust
//! use vertica_tls::{SslMode, TlsConnector};
//!
//! let connector = TlsConnector::new(SslMode::VerifyFull.tls_config()).unwrap();
//! let session = connector.session("db.example.com").unwrap();
//! assert!(session.is_handshaking());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;

pub use config::{SslMode, TlsConfig, TlsVersion};
pub use connector::TlsConnector;
pub use error::TlsError;

pub use rustls::ClientConnection;
pub use rustls::pki_types::CertificateDer;
