//! # vertica-client
//!
//! Connection handle for Vertica with blocking and poll-driven negotiation.
//!
//! A [`Connection`] wraps one server session. It can be established in
//! three shapes (see [`LoginParams`]):
//!
//! - a connection-info string, blocking;
//! - a connection-info string plus an async flag;
//! - six discrete fields (host, port, options, database, user, password).
//!
//! ## Negotiation
//!
//! Blocking establishment returns once the session is ready or has failed.
//! Non-blocking establishment returns at once; the caller then polls until
//! a terminal status, waiting on the socket in between:
//!
//! ```text
//! connect_start -> poll() -> Reading | Writing | Active -> ... -> Ok | Failed
//! ```
//!
//! [`PollingStatus::Reading`] and [`PollingStatus::Writing`] name the
//! readiness to wait for on [`Connection::socket`]. The crate never waits
//! itself, so it fits any reactor. Reset follows the same two-mode pattern.
//!
//! ## Handle life cycle
//!
//! ```text
//! Unbound -> Connecting(mode) -> Bound | Failed
//! Bound | Failed -> Resetting(mode) -> Bound | Failed
//! Bound | Failed -> Terminated
//! ```
//!
//! A failed establishment still binds the failed resource; the returned
//! [`ConnectionError`] owns the handle so its status and error message can
//! be inspected. Every accessor on an unbound or finished handle returns
//! [`Error::NotConnected`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use vertica_client::{Connection, ConnectionStatus};
//!
//! # fn main() -> Result<(), vertica_client::Error> {
//! let mut conn = Connection::new("host=127.0.0.1 port=5433 user=dbadmin dbname=vmart")?;
//! assert_eq!(conn.status()?, ConnectionStatus::Ok);
//! println!("server {}", conn.server_version()?);
//!
//! conn.reset()?;
//! conn.finish();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cancel;
pub mod config;
pub mod connection;
pub(crate) mod engine;
pub mod error;
pub mod params;
pub mod state;

pub use cancel::CancelToken;
pub use config::{ConnInfoError, Config};
pub use connection::Connection;
pub use error::{ConnectionError, Error, Result};
pub use params::{LoginFields, LoginParams, Value};
pub use state::{ConnectionStatus, HandlePhase, Mode, PollingStatus, TransactionStatus};
pub use vertica_auth::Credentials;
pub use vertica_protocol::ServerFields;
pub use vertica_tls::{CertificateDer, SslMode, TlsConfig, TlsVersion};

/// Socket descriptor type of the platform.
#[cfg(unix)]
pub type RawSocket = std::os::fd::RawFd;

/// Socket descriptor type of the platform.
#[cfg(windows)]
pub type RawSocket = std::os::windows::io::RawSocket;
