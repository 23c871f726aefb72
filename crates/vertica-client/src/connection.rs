//! The connection handle.
//!
//! A [`Connection`] owns at most one engine resource. It is allocated empty,
//! bound by a successful establishment, optionally reset in place any number
//! of times, and finished exactly once; dropping a bound handle finishes it.
//!
//! ```rust,no_run
//! use vertica_client::{Connection, LoginParams, Mode, PollingStatus};
//!
//! # fn main() -> Result<(), vertica_client::Error> {
//! // Blocking.
//! let conn = Connection::new("host=127.0.0.1 user=dbadmin password=secret")?;
//! println!("backend pid {}", conn.backend_pid()?);
//!
//! // Poll-driven.
//! let params = LoginParams::from_conninfo_with_mode("host=127.0.0.1", Mode::NonBlocking);
//! let mut conn = Connection::open(params)?;
//! loop {
//!     match conn.poll()? {
//!         PollingStatus::Ok | PollingStatus::Failed => break,
//!         // Wait on conn.socket() for readiness in a real event loop.
//!         _ => std::thread::yield_now(),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;

use vertica_protocol::ServerFields;

use crate::RawSocket;
use crate::cancel::CancelToken;
use crate::engine::RawConnection;
use crate::error::{Error, Result};
use crate::params::{LoginParams, Value};
use crate::state::{ConnectionStatus, HandlePhase, Mode, PollingStatus, TransactionStatus};

/// A handle to a single server session.
pub struct Connection {
    raw: Option<RawConnection>,
    phase: HandlePhase,
}

impl Connection {
    /// An empty handle with nothing bound.
    #[must_use]
    pub fn alloc() -> Self {
        Self {
            raw: None,
            phase: HandlePhase::Unbound,
        }
    }

    /// Bind this handle to a new connection.
    ///
    /// In blocking mode negotiation has finished when this returns. In
    /// non-blocking mode it has only started; drive it with [`Self::poll`].
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyConnected`] if the handle is not empty.
    /// * [`Error::Connection`] if negotiation failed (or, in non-blocking
    ///   mode, could not even start). The error owns this handle, still
    ///   bound to the failed resource, for inspection.
    pub fn establish(mut self, params: LoginParams) -> Result<Self> {
        match self.phase {
            HandlePhase::Unbound => {}
            HandlePhase::Terminated => {
                return Err(Error::Misuse("connection handle has been finished".into()));
            }
            _ => return Err(Error::AlreadyConnected),
        }

        let mode = params.mode();
        let config = params.to_config();
        self.phase = HandlePhase::Connecting(mode);
        let raw = match mode {
            Mode::Blocking => RawConnection::connect(config),
            Mode::NonBlocking => RawConnection::connect_start(config),
        };

        let failed = raw.status() == ConnectionStatus::Bad;
        let message = raw.error_message().to_owned();
        self.raw = Some(raw);

        if failed {
            self.phase = HandlePhase::Failed;
            return Err(Error::connection(message, Some(self)));
        }
        if mode == Mode::Blocking {
            self.phase = HandlePhase::Bound;
        }
        Ok(self)
    }

    /// Allocate and establish in one step.
    pub fn open(params: LoginParams) -> Result<Self> {
        Self::alloc().establish(params)
    }

    /// Blocking connect with a connection-info string.
    pub fn new(conninfo: &str) -> Result<Self> {
        Self::open(LoginParams::from_conninfo(conninfo))
    }

    /// Establish from a dynamically shaped argument list; see
    /// [`LoginParams::resolve`].
    pub fn from_args(args: &[Value]) -> Result<Self> {
        Self::open(LoginParams::resolve(args)?)
    }

    /// Life-cycle phase.
    #[must_use]
    pub fn phase(&self) -> HandlePhase {
        self.phase
    }

    fn raw(&self) -> Result<&RawConnection> {
        self.raw.as_ref().ok_or(Error::NotConnected)
    }

    fn raw_mut(&mut self) -> Result<&mut RawConnection> {
        self.raw.as_mut().ok_or(Error::NotConnected)
    }

    // =========================================================================
    // Negotiation
    // =========================================================================

    /// Advance a non-blocking connect by one step.
    ///
    /// `Failed` is returned, not raised; inspect [`Self::error_message`].
    /// Outside a negotiation this reports the current outcome again.
    pub fn poll(&mut self) -> Result<PollingStatus> {
        let status = self.raw_mut()?.poll();
        if self.phase.is_negotiating() {
            self.settle(status);
        }
        Ok(status)
    }

    /// Advance a non-blocking reset by one step.
    pub fn reset_poll(&mut self) -> Result<PollingStatus> {
        self.poll()
    }

    fn settle(&mut self, status: PollingStatus) {
        match status {
            PollingStatus::Ok => self.phase = HandlePhase::Bound,
            PollingStatus::Failed => self.phase = HandlePhase::Failed,
            _ => {}
        }
    }

    /// Re-establish the session in place, blocking until done.
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] if renegotiation failed; the handle stays bound
    /// in `Failed` and can be reset again.
    pub fn reset(&mut self) -> Result<()> {
        self.reset_in(Mode::Blocking)
    }

    /// Start a non-blocking reset; drive it with [`Self::reset_poll`].
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] if the reset could not even start.
    pub fn reset_start(&mut self) -> Result<()> {
        self.reset_in(Mode::NonBlocking)
    }

    /// Reset with a dynamic async flag. Only an exact `true` selects
    /// non-blocking mode.
    pub fn reset_with(&mut self, async_flag: &Value) -> Result<()> {
        self.reset_in(Mode::from_async(async_flag.is_true()))
    }

    /// Reset in the given mode.
    pub fn reset_in(&mut self, mode: Mode) -> Result<()> {
        let raw = self.raw.as_mut().ok_or(Error::NotConnected)?;
        self.phase = HandlePhase::Resetting(mode);

        let ok = match mode {
            Mode::Blocking => raw.reset(),
            Mode::NonBlocking => raw.reset_start(mode),
        };
        if !ok {
            let message = raw.error_message().to_owned();
            self.phase = HandlePhase::Failed;
            return Err(Error::connection(message, None));
        }

        if mode == Mode::Blocking {
            tracing::info!(host = raw.config().effective_host(), "connection reset");
            self.phase = HandlePhase::Bound;
        } else {
            tracing::debug!(host = raw.config().effective_host(), "connection reset started");
        }
        Ok(())
    }

    /// Release the connection. Calling it again is a no-op.
    pub fn finish(&mut self) {
        if let Some(mut raw) = self.raw.take() {
            raw.finish();
        }
        self.phase = HandlePhase::Terminated;
    }

    /// Alias for [`Self::finish`].
    pub fn close(&mut self) {
        self.finish();
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Database name.
    pub fn db(&self) -> Result<&str> {
        Ok(self.raw()?.config().effective_dbname())
    }

    /// User name.
    pub fn user(&self) -> Result<&str> {
        Ok(self.raw()?.config().effective_user())
    }

    /// Password.
    pub fn password(&self) -> Result<&str> {
        Ok(self.raw()?.config().effective_password())
    }

    /// Host name as given (or the default).
    pub fn host(&self) -> Result<&str> {
        Ok(self.raw()?.config().effective_host())
    }

    /// Port, in string form.
    pub fn port(&self) -> Result<String> {
        Ok(self.raw()?.config().effective_port())
    }

    /// Session options string.
    pub fn options(&self) -> Result<&str> {
        Ok(self.raw()?.config().effective_options())
    }

    /// Connection status as the engine reports it now.
    pub fn status(&self) -> Result<ConnectionStatus> {
        Ok(self.raw()?.status())
    }

    /// Server transaction status.
    pub fn transaction_status(&self) -> Result<TransactionStatus> {
        Ok(self.raw()?.transaction_status())
    }

    /// A run-time parameter reported by the server; `None` if never
    /// reported.
    pub fn parameter_status(&self, name: &str) -> Result<Option<&str>> {
        Ok(self.raw()?.parameter_status(name))
    }

    /// All run-time parameters reported by the server.
    pub fn parameters(&self) -> Result<&HashMap<String, String>> {
        Ok(self.raw()?.parameters())
    }

    /// Frontend/backend protocol major version; `0` when the connection is
    /// bad.
    pub fn protocol_version(&self) -> Result<i32> {
        Ok(self.raw()?.protocol_version())
    }

    /// Server version in integer form (`80000` for 8.0); `0` if unknown.
    pub fn server_version(&self) -> Result<u32> {
        Ok(self.raw()?.server_version())
    }

    /// Last error message; empty if there is none.
    pub fn error_message(&self) -> Result<&str> {
        Ok(self.raw()?.error_message())
    }

    /// Socket descriptor, for readiness polling; `None` when no socket is
    /// open.
    pub fn socket(&self) -> Result<Option<RawSocket>> {
        Ok(self.raw()?.socket())
    }

    /// Backend process id; `0` if unknown.
    pub fn backend_pid(&self) -> Result<i32> {
        Ok(self.raw()?.backend_pid())
    }

    /// Whether the session is TLS-encrypted.
    pub fn uses_encryption(&self) -> Result<bool> {
        Ok(self.raw()?.uses_encryption())
    }

    /// Notices the server sent during negotiation.
    pub fn notices(&self) -> Result<&[ServerFields]> {
        Ok(self.raw()?.notices())
    }

    /// Token for cancelling the session's current request.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] unless negotiation completed and the server
    /// sent its key.
    pub fn cancel_token(&self) -> Result<CancelToken> {
        let raw = self.raw()?;
        match (raw.status(), raw.peer_addr(), raw.backend_key()) {
            (ConnectionStatus::Ok, Some(addr), Some((pid, key))) => {
                Ok(CancelToken::new(addr, pid, key))
            }
            _ => Err(Error::NotConnected),
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::alloc()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Connection");
        s.field("phase", &self.phase);
        if let Some(raw) = &self.raw {
            s.field("host", &raw.config().effective_host())
                .field("port", &raw.config().effective_port())
                .field("status", &raw.status());
        }
        s.finish()
    }
}
