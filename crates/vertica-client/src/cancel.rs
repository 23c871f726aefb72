//! Request cancellation support.
//!
//! A [`CancelToken`] carries the backend's process id and secret key and
//! the address the session was made to. Cancelling opens a fresh TCP
//! connection, sends a single `CancelRequest` packet and closes it again;
//! the session's own socket is never touched, so the token can be used from
//! any thread while the session is busy.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vertica_client::Connection;
//!
//! # fn main() -> Result<(), vertica_client::Error> {
//! let conn = Connection::new("host=127.0.0.1 user=dbadmin")?;
//! let token = conn.cancel_token()?;
//!
//! std::thread::spawn(move || {
//!     if let Err(e) = token.cancel() {
//!         eprintln!("Failed to cancel: {e}");
//!     }
//! });
//! # Ok(())
//! # }
//! ```
//!
//! ## Important Notes
//!
//! - The token is `Clone + Send` and outlives the handle it came from
//! - The server gives no answer; success only means the request was sent

use std::io::Write;
use std::net::{SocketAddr, TcpStream};

use vertica_protocol::FrontendMessage;

use crate::error::Result;

/// Credentials for cancelling whatever the session is currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelToken {
    addr: SocketAddr,
    pid: i32,
    key: i32,
}

impl CancelToken {
    pub(crate) fn new(addr: SocketAddr, pid: i32, key: i32) -> Self {
        Self { addr, pid, key }
    }

    /// Server address the request goes to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Backend process id.
    #[must_use]
    pub fn backend_pid(&self) -> i32 {
        self.pid
    }

    /// Send the cancellation request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the server cannot be
    /// reached or the packet cannot be written.
    pub fn cancel(&self) -> Result<()> {
        tracing::debug!(addr = %self.addr, pid = self.pid, "sending cancel request");

        let mut stream = TcpStream::connect(self.addr)?;
        let packet = FrontendMessage::CancelRequest {
            pid: self.pid,
            key: self.key,
        }
        .to_bytes();
        stream.write_all(&packet)?;
        stream.flush()?;
        Ok(())
    }
}
