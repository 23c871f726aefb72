//! # vertica-protocol
//!
//! Message types for the startup half of the Vertica frontend/backend
//! protocol (version 3.0).
//!
//! This crate covers what a client needs to bring a session to
//! `ReadyForQuery`: the startup packet, the TLS request, authentication
//! exchanges, parameter and key reports, error and notice responses, and
//! orderly termination. It also decodes the client side of those exchanges
//! so a test server can be built on the same types.
//!
//! ## Design Philosophy
//!
//! This crate is IO-agnostic. Decoders take a [`bytes::BytesMut`] holding
//! whatever has been read so far and return `Ok(None)` until a whole message
//! is available, so the same code serves blocking sockets, non-blocking
//! sockets driven by a poll loop, and async servers.
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use vertica_protocol::{BackendMessage, FrontendMessage, Startup};
//!
//! let startup = Startup::new()
//!     .param("user", Some("dbadmin"))
//!     .param("database", Some("vmart"));
//! let bytes = FrontendMessage::Startup(startup).to_bytes();
//! assert_eq!(&bytes[4..8], &(3_i32 << 16).to_be_bytes());
//!
//! let mut inbound = BytesMut::from(&b"Z\x00\x00\x00\x05I"[..]);
//! assert_eq!(
//!     BackendMessage::decode(&mut inbound).unwrap(),
//!     Some(BackendMessage::ReadyForQuery(b'I'))
//! );
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod authentication;
pub mod backend;
pub mod codec;
pub mod error;
pub mod fields;
pub mod frontend;
pub mod version;

pub use authentication::AuthenticationRequest;
pub use backend::{BackendMessage, SslResponse};
pub use error::ProtocolError;
pub use fields::ServerFields;
pub use frontend::{FrontendMessage, Startup, CANCEL_REQUEST_CODE, SSL_REQUEST_CODE};
pub use version::{ProtocolVersion, ServerVersion};

/// Default Vertica server port.
pub const DEFAULT_PORT: u16 = 5433;

/// Transaction indicator: idle, not in a transaction block.
pub const TRANSACTION_IDLE: u8 = b'I';

/// Transaction indicator: inside a transaction block.
pub const TRANSACTION_IN_BLOCK: u8 = b'T';

/// Transaction indicator: inside a failed transaction block.
pub const TRANSACTION_FAILED: u8 = b'E';
