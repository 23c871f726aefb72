//! Connection negotiation engine.
//!
//! [`RawConnection`] owns the socket and all session state. Negotiation is
//! a sequence of phases, each advanced by [`RawConnection::poll`]:
//!
//! ```text
//! Connecting -> Made -> [SslRequested -> TlsHandshake] -> AwaitingResponse
//!            -> AuthOk -> Ready
//! ```
//!
//! Any phase may end in `Bad`. Blocking and non-blocking negotiation share
//! the same phases; in blocking mode the socket blocks (bounded by
//! `connect_timeout`) and the driver keeps polling until a terminal status.

mod transport;

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Instant;

use bytes::BytesMut;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use vertica_auth::Credentials;
use vertica_protocol::{
    AuthenticationRequest, BackendMessage, FrontendMessage, ProtocolVersion, ServerFields,
    ServerVersion, SslResponse, Startup,
};
use vertica_tls::TlsConnector;

use crate::RawSocket;
use crate::config::{ConnInfoError, Config};
use crate::state::{ConnectionStatus, Mode, PollingStatus, TransactionStatus};
use transport::{Handshake, Transport};

const SERVER_CLOSED: &str = "server closed the connection unexpectedly\n\
    \tThis probably means the server terminated abnormally\n\
    \tbefore or while processing the request.";

const TIMEOUT_EXPIRED: &str = "timeout expired";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Needed,
    Connecting,
    Made,
    SslRequested,
    TlsHandshake,
    AwaitingResponse,
    AuthOk,
    Ready,
    Bad,
}

/// What a negotiation step needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Read,
    Write,
    Ready,
}

/// State of an in-flight non-blocking TCP connect.
enum Probe {
    Connected,
    Pending,
    Failed(io::Error),
}

/// The engine-side connection resource.
pub(crate) struct RawConnection {
    config: Config,
    mode: Mode,
    phase: Phase,
    addrs: Vec<SocketAddr>,
    next_addr: usize,
    current_addr: Option<SocketAddr>,
    connect_errors: Vec<String>,
    deadline: Option<Instant>,
    transport: Option<Transport>,
    rbuf: BytesMut,
    wbuf: BytesMut,
    parameters: HashMap<String, String>,
    backend_key: Option<(i32, i32)>,
    transaction_indicator: Option<u8>,
    error_message: String,
    notices: Vec<ServerFields>,
}

impl RawConnection {
    /// Negotiate to completion before returning.
    ///
    /// A failure still yields a resource, in status `Bad`, carrying the
    /// error message.
    pub(crate) fn connect(config: Result<Config, ConnInfoError>) -> Self {
        let mut raw = Self::start(config, Mode::Blocking);
        raw.complete();
        raw
    }

    /// Begin negotiation and return at once; drive it with [`Self::poll`].
    pub(crate) fn connect_start(config: Result<Config, ConnInfoError>) -> Self {
        Self::start(config, Mode::NonBlocking)
    }

    fn start(config: Result<Config, ConnInfoError>, mode: Mode) -> Self {
        match config {
            Ok(config) => {
                let mut raw = Self::new(config, mode);
                raw.begin();
                raw
            }
            Err(err) => {
                let mut raw = Self::new(Config::default(), mode);
                raw.fail(err.to_string());
                raw
            }
        }
    }

    fn new(config: Config, mode: Mode) -> Self {
        Self {
            config,
            mode,
            phase: Phase::Needed,
            addrs: Vec::new(),
            next_addr: 0,
            current_addr: None,
            connect_errors: Vec::new(),
            deadline: None,
            transport: None,
            rbuf: BytesMut::with_capacity(1024),
            wbuf: BytesMut::with_capacity(256),
            parameters: HashMap::new(),
            backend_key: None,
            transaction_indicator: None,
            error_message: String::new(),
            notices: Vec::new(),
        }
    }

    /// Resolve addresses and enter `Connecting`. In non-blocking mode the
    /// first TCP connect is initiated here so the caller has a socket to
    /// wait on.
    fn begin(&mut self) {
        self.deadline = match (self.mode, self.config.connect_timeout) {
            (Mode::Blocking, Some(timeout)) => Some(Instant::now() + timeout),
            _ => None,
        };

        match resolve_addrs(&self.config) {
            Ok(addrs) => self.addrs = addrs,
            Err(message) => return self.fail(message),
        }

        self.set_phase(Phase::Connecting);
        if self.mode.is_non_blocking() {
            if let Err(message) = self.open_next() {
                self.fail(message);
            }
        }
    }

    /// Advance negotiation by one step.
    pub(crate) fn poll(&mut self) -> PollingStatus {
        match self.phase {
            Phase::Ready => return PollingStatus::Ok,
            Phase::Bad | Phase::Needed => return PollingStatus::Failed,
            _ => {}
        }

        match self.step() {
            Ok(Step::Continue) => PollingStatus::Active,
            Ok(Step::Read) => PollingStatus::Reading,
            Ok(Step::Write) => PollingStatus::Writing,
            Ok(Step::Ready) => PollingStatus::Ok,
            Err(message) => {
                self.fail(message);
                PollingStatus::Failed
            }
        }
    }

    /// Drive negotiation until it succeeds or fails.
    fn complete(&mut self) {
        while !self.poll().is_terminal() {}
    }

    /// Tear down the session and renegotiate with the same settings.
    ///
    /// Returns `false` if the reset failed before any I/O could start.
    pub(crate) fn reset_start(&mut self, mode: Mode) -> bool {
        self.close();
        self.parameters.clear();
        self.backend_key = None;
        self.transaction_indicator = None;
        self.error_message.clear();
        self.notices.clear();
        self.addrs.clear();
        self.next_addr = 0;
        self.current_addr = None;
        self.connect_errors.clear();
        self.rbuf.clear();
        self.wbuf.clear();

        self.mode = mode;
        self.phase = Phase::Needed;
        self.begin();
        self.phase != Phase::Bad
    }

    /// Blocking reset.
    pub(crate) fn reset(&mut self) -> bool {
        self.reset_start(Mode::Blocking);
        self.complete();
        self.phase == Phase::Ready
    }

    /// Release the socket. Safe to call more than once.
    pub(crate) fn finish(&mut self) {
        if self.transport.is_some() {
            tracing::debug!(host = self.config.effective_host(), "closing connection");
        }
        self.close();
        self.phase = Phase::Bad;
    }

    fn close(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        if self.phase == Phase::Ready {
            let farewell = FrontendMessage::Terminate.to_bytes();
            transport.close(Some(&farewell[..]));
        } else {
            transport.close(None);
        }
    }

    fn fail(&mut self, message: String) {
        tracing::debug!(error = %message, "connection failed");
        if let Some(transport) = self.transport.take() {
            transport.close(None);
        }
        self.error_message = message;
        self.phase = Phase::Bad;
    }

    fn set_phase(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "negotiation phase");
        self.phase = phase;
    }

    // =========================================================================
    // Negotiation steps
    // =========================================================================

    fn step(&mut self) -> Result<Step, String> {
        if let Some(deadline) = self.deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TIMEOUT_EXPIRED.to_owned());
            }
            if let Some(transport) = &self.transport {
                let sock = transport.socket();
                let _ = sock.set_read_timeout(Some(remaining));
                let _ = sock.set_write_timeout(Some(remaining));
            }
        }

        if let Some(step) = self.flush()? {
            return Ok(step);
        }

        match self.phase {
            Phase::Connecting => self.step_connecting(),
            Phase::Made => self.step_made(),
            Phase::SslRequested => self.step_ssl_response(),
            Phase::TlsHandshake => self.step_handshake(),
            Phase::AwaitingResponse | Phase::AuthOk => self.step_messages(),
            Phase::Ready => Ok(Step::Ready),
            Phase::Needed | Phase::Bad => Err("connection not open".to_owned()),
        }
    }

    fn step_connecting(&mut self) -> Result<Step, String> {
        let probe = self.transport.as_ref().map(|t| probe_connect(t.socket()));
        match probe {
            Some(Probe::Connected) => {
                self.connected();
                Ok(Step::Continue)
            }
            Some(Probe::Pending) => Ok(Step::Write),
            Some(Probe::Failed(err)) => {
                self.connect_failed(&err);
                self.open_next()
            }
            None => self.open_next(),
        }
    }

    /// Try the remaining addresses in order until one connects (blocking) or
    /// starts connecting (non-blocking).
    fn open_next(&mut self) -> Result<Step, String> {
        self.transport = None;

        while let Some(&addr) = self.addrs.get(self.next_addr) {
            self.next_addr += 1;
            self.current_addr = Some(addr);
            tracing::debug!(%addr, mode = ?self.mode, "connecting");

            let attempt = match self.mode {
                Mode::Blocking => self.connect_blocking(addr).map(|s| (s, true)),
                Mode::NonBlocking => connect_non_blocking(addr),
            };

            match attempt {
                Ok((stream, done)) => {
                    self.transport = Some(Transport::Plain(stream));
                    if done {
                        self.connected();
                        return Ok(Step::Continue);
                    }
                    return Ok(Step::Write);
                }
                Err(err) => self.connect_failed(&err),
            }
        }

        Err(self.connect_errors.join("\n"))
    }

    fn connect_blocking(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(io::ErrorKind::TimedOut.into());
                }
                TcpStream::connect_timeout(&addr, remaining)
            }
            None => TcpStream::connect(addr),
        }
    }

    fn connected(&mut self) {
        if let Some(transport) = &self.transport {
            let _ = transport.socket().set_nodelay(true);
        }
        self.set_phase(Phase::Made);
    }

    fn connect_failed(&mut self, err: &io::Error) {
        let host = self.config.effective_host();
        let message = match self.current_addr {
            Some(addr) => format!(
                "could not connect to server: {err}\n\
                 \tIs the server running on host \"{host}\" ({ip}) and accepting\n\
                 \tTCP/IP connections on port {port}?",
                ip = addr.ip(),
                port = addr.port(),
            ),
            None => format!("could not connect to server: {err}"),
        };
        tracing::debug!(error = %err, addr = ?self.current_addr, "connect attempt failed");
        self.connect_errors.push(message);
    }

    fn step_made(&mut self) -> Result<Step, String> {
        if self.config.sslmode.requests_tls() {
            FrontendMessage::SslRequest.encode(&mut self.wbuf);
            self.set_phase(Phase::SslRequested);
        } else {
            self.queue_startup();
            self.set_phase(Phase::AwaitingResponse);
        }
        Ok(self.flush()?.unwrap_or(Step::Read))
    }

    fn step_ssl_response(&mut self) -> Result<Step, String> {
        let transport = self.transport.as_mut().ok_or(SERVER_CLOSED)?;
        let byte = match transport.read_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => return Err(SERVER_CLOSED.to_owned()),
            Err(err) if is_interrupted(&err) => return Ok(Step::Continue),
            Err(err) if is_blocked(&err) => return self.blocked(Step::Read),
            Err(err) => return Err(format!("could not receive data from server: {err}")),
        };

        match SslResponse::from_byte(byte) {
            Some(SslResponse::Accepted) => {
                self.start_tls()?;
                Ok(Step::Continue)
            }
            Some(SslResponse::Refused) => {
                if self.config.sslmode.requires_tls() {
                    return Err("server does not support SSL, but SSL was required".to_owned());
                }
                tracing::debug!("server refused TLS, continuing unencrypted");
                self.queue_startup();
                self.set_phase(Phase::AwaitingResponse);
                Ok(self.flush()?.unwrap_or(Step::Read))
            }
            // An error frame in place of the answer; decode it normally.
            None if byte == b'E' => {
                self.rbuf.extend_from_slice(&[byte]);
                self.set_phase(Phase::AwaitingResponse);
                Ok(Step::Continue)
            }
            None => Err(format!(
                "received invalid response to SSL negotiation: {}",
                char::from(byte)
            )),
        }
    }

    fn start_tls(&mut self) -> Result<(), String> {
        let connector = TlsConnector::new(self.config.tls_config())
            .map_err(|e| format!("could not create SSL context: {e}"))?;
        let session = connector
            .session(self.config.effective_host())
            .map_err(|e| format!("could not establish SSL connection: {e}"))?;

        let transport = self.transport.take().ok_or(SERVER_CLOSED)?;
        self.transport = Some(transport.into_tls(session));
        self.set_phase(Phase::TlsHandshake);
        Ok(())
    }

    fn step_handshake(&mut self) -> Result<Step, String> {
        let transport = self.transport.as_mut().ok_or(SERVER_CLOSED)?;
        match transport.handshake() {
            Ok(Handshake::Done) => {
                tracing::debug!("TLS handshake complete");
                self.queue_startup();
                self.set_phase(Phase::AwaitingResponse);
                Ok(self.flush()?.unwrap_or(Step::Read))
            }
            Ok(Handshake::WantRead) => self.blocked(Step::Read),
            Ok(Handshake::WantWrite) => self.blocked(Step::Write),
            Err(err) if is_interrupted(&err) => Ok(Step::Continue),
            Err(err) if is_blocked(&err) => self.blocked(Step::Read),
            Err(err) => Err(format!("SSL error: {err}")),
        }
    }

    fn queue_startup(&mut self) {
        let non_empty = |s: &str| (!s.is_empty()).then_some(s.to_owned());
        let user = non_empty(self.config.effective_user());
        let database = non_empty(self.config.effective_dbname());
        let options = non_empty(self.config.effective_options());

        let startup = Startup::new()
            .param("user", user.as_deref())
            .param("database", database.as_deref())
            .param("options", options.as_deref())
            .param("client_label", self.config.application_name.as_deref());
        FrontendMessage::Startup(startup).encode(&mut self.wbuf);
    }

    fn step_messages(&mut self) -> Result<Step, String> {
        loop {
            let message = match BackendMessage::decode(&mut self.rbuf) {
                Ok(Some(message)) => message,
                Ok(None) => match self.fill()? {
                    Some(step) => return Ok(step),
                    None => continue,
                },
                Err(err) => return Err(format!("invalid message from server: {err}")),
            };

            if let Some(step) = self.handle(message)? {
                return Ok(step);
            }
        }
    }

    /// Read more bytes. `Some(step)` when the socket has nothing for us.
    fn fill(&mut self) -> Result<Option<Step>, String> {
        let transport = self.transport.as_mut().ok_or(SERVER_CLOSED)?;
        match transport.read_into(&mut self.rbuf) {
            Ok(0) => Err(SERVER_CLOSED.to_owned()),
            Ok(_) => Ok(None),
            Err(err) if is_interrupted(&err) => Ok(None),
            Err(err) if is_blocked(&err) => self.blocked(Step::Read).map(Some),

            Err(err) => Err(format!("could not receive data from server: {err}")),
        }
    }

    /// Send queued bytes. `Some(step)` when the socket cannot take them yet.
    fn flush(&mut self) -> Result<Option<Step>, String> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(None);
        };
        if self.wbuf.is_empty() && !transport.wants_write() {
            return Ok(None);
        }
        match transport.write_from(&mut self.wbuf) {
            Ok(()) => Ok(None),
            Err(err) if is_interrupted(&err) => Ok(Some(Step::Continue)),
            Err(err) if is_blocked(&err) => self.blocked(Step::Write).map(Some),
            Err(err) => Err(format!("could not send data to server: {err}")),
        }
    }

    /// A would-block condition: a wait in non-blocking mode, a timeout in
    /// blocking mode.
    fn blocked(&self, step: Step) -> Result<Step, String> {
        if self.mode.is_non_blocking() {
            Ok(step)
        } else {
            Err(TIMEOUT_EXPIRED.to_owned())
        }
    }

    fn handle(&mut self, message: BackendMessage) -> Result<Option<Step>, String> {
        match message {
            BackendMessage::ErrorResponse(fields) => Err(fields.to_string()),
            BackendMessage::NoticeResponse(fields) => {
                tracing::warn!(notice = %fields, "server notice during negotiation");
                self.notices.push(fields);
                Ok(None)
            }
            BackendMessage::Authentication(request) if self.phase == Phase::AwaitingResponse => {
                self.authenticate(request)
            }
            other if self.phase == Phase::AwaitingResponse => Err(format!(
                "expected authentication request from server, but received {}",
                other.name()
            )),
            BackendMessage::Authentication(request) => Err(format!(
                "unexpected authentication request ({}) after authentication completed",
                request.method_name()
            )),
            BackendMessage::ParameterStatus { name, value } => {
                tracing::trace!(%name, %value, "parameter status");
                self.parameters.insert(name, value);
                Ok(None)
            }
            BackendMessage::BackendKeyData { pid, key } => {
                self.backend_key = Some((pid, key));
                Ok(None)
            }
            BackendMessage::ReadyForQuery(indicator) => {
                self.transaction_indicator = Some(indicator);
                self.set_phase(Phase::Ready);
                tracing::info!(
                    host = self.config.effective_host(),
                    port = %self.config.effective_port(),
                    backend_pid = self.backend_pid(),
                    encrypted = self.uses_encryption(),
                    "connection ready"
                );
                Ok(Some(Step::Ready))
            }
            other => {
                tracing::debug!(message = other.name(), "ignoring message during startup");
                Ok(None)
            }
        }
    }

    fn authenticate(&mut self, request: AuthenticationRequest) -> Result<Option<Step>, String> {
        if request == AuthenticationRequest::Ok {
            tracing::debug!("authentication accepted");
            self.set_phase(Phase::AuthOk);
            return Ok(None);
        }

        let mut credentials = Credentials::new(self.config.effective_user());
        if let Some(password) = &self.config.password {
            credentials = credentials.with_password(password.clone());
        }

        match vertica_auth::respond(&request, &credentials) {
            Ok(Some(response)) => {
                FrontendMessage::Password(response).encode(&mut self.wbuf);
                self.flush()
            }
            Ok(None) => Ok(None),
            Err(err) => Err(err.to_string()),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        match self.phase {
            Phase::Needed => ConnectionStatus::Needed,
            Phase::Connecting => ConnectionStatus::Started,
            Phase::Made => ConnectionStatus::Made,
            Phase::SslRequested | Phase::TlsHandshake => ConnectionStatus::SslStartup,
            Phase::AwaitingResponse => ConnectionStatus::AwaitingResponse,
            Phase::AuthOk => ConnectionStatus::AuthOk,
            Phase::Ready => ConnectionStatus::Ok,
            Phase::Bad => ConnectionStatus::Bad,
        }
    }

    pub(crate) fn transaction_status(&self) -> TransactionStatus {
        match (self.phase, self.transaction_indicator) {
            (Phase::Ready, Some(indicator)) => TransactionStatus::from_indicator(indicator),
            _ => TransactionStatus::Unknown,
        }
    }

    pub(crate) fn parameter_status(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub(crate) fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub(crate) fn protocol_version(&self) -> i32 {
        if self.phase == Phase::Bad {
            0
        } else {
            i32::from(ProtocolVersion::V3_0.major())
        }
    }

    pub(crate) fn server_version(&self) -> u32 {
        if self.phase == Phase::Bad {
            return 0;
        }
        self.parameter_status("server_version")
            .and_then(ServerVersion::parse)
            .map_or(0, ServerVersion::as_number)
    }

    pub(crate) fn error_message(&self) -> &str {
        &self.error_message
    }

    pub(crate) fn socket(&self) -> Option<RawSocket> {
        self.transport.as_ref().map(|t| raw_socket(t.socket()))
    }

    pub(crate) fn backend_pid(&self) -> i32 {
        self.backend_key.map_or(0, |(pid, _)| pid)
    }

    pub(crate) fn backend_key(&self) -> Option<(i32, i32)> {
        self.backend_key
    }

    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.current_addr
    }

    pub(crate) fn uses_encryption(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_encrypted)
    }

    pub(crate) fn notices(&self) -> &[ServerFields] {
        &self.notices
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        self.finish();
    }
}

fn resolve_addrs(config: &Config) -> Result<Vec<SocketAddr>, String> {
    let port = config.port_number()?;

    if let Some(hostaddr) = config.hostaddr.as_deref().filter(|h| !h.is_empty()) {
        let ip: IpAddr = hostaddr
            .parse()
            .map_err(|_| format!("could not parse network address \"{hostaddr}\""))?;
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let host = config.effective_host();
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("could not translate host name \"{host}\" to address: {e}"))?
        .collect();

    if addrs.is_empty() {
        return Err(format!(
            "could not translate host name \"{host}\" to address: no addresses found"
        ));
    }
    tracing::debug!(host, count = addrs.len(), "resolved host");
    Ok(addrs)
}

fn connect_non_blocking(addr: SocketAddr) -> io::Result<(TcpStream, bool)> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    let done = match socket.connect(&SockAddr::from(addr)) {
        Ok(()) => true,
        Err(err) if connect_in_progress(&err) => false,
        Err(err) => return Err(err),
    };
    Ok((socket.into(), done))
}

fn connect_in_progress(err: &io::Error) -> bool {
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    err.kind() == io::ErrorKind::WouldBlock
}

fn probe_connect(sock: &TcpStream) -> Probe {
    match sock.take_error() {
        Ok(Some(err)) | Err(err) => return Probe::Failed(err),
        Ok(None) => {}
    }
    match sock.peer_addr() {
        Ok(_) => Probe::Connected,
        Err(err) if err.kind() == io::ErrorKind::NotConnected => Probe::Pending,
        Err(err) => Probe::Failed(err),
    }
}

/// The socket has nothing to offer yet, or its timeout fired.
fn is_blocked(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// A signal cut the call short; retry it.
fn is_interrupted(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted
}

#[cfg(unix)]
fn raw_socket(sock: &TcpStream) -> RawSocket {
    use std::os::fd::AsRawFd;
    sock.as_raw_fd()
}

#[cfg(windows)]
fn raw_socket(sock: &TcpStream) -> RawSocket {
    use std::os::windows::io::AsRawSocket;
    sock.as_raw_socket()
}
