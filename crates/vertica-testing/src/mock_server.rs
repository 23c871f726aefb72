//! Mock Vertica server for unit and integration tests.
//!
//! The server speaks the startup half of the frontend/backend protocol:
//!
//! - answers `SslRequest` with `S` (and a TLS handshake using a freshly
//!   generated self-signed certificate) or `N`
//! - authenticates with trust, cleartext or MD5 passwords
//! - reports run-time parameters, backend key data and ready-for-query
//! - records startup packets, cancel requests and terminations
//!
//! Each accepted connection gets its own backend pid (`base_pid + n`), so a
//! client that resets can observe the new session.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vertica_testing::mock_server::{MockAuth, MockVerticaServer};
//!
//! #[tokio::test]
//! async fn test_cleartext() {
//!     let server = MockVerticaServer::builder()
//!         .with_user("dbadmin", "secret")
//!         .with_auth(MockAuth::Cleartext)
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let addr = server.addr();
//!     // Connect your client to addr...
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio_rustls::TlsAcceptor;
use vertica_protocol::{
    AuthenticationRequest, BackendMessage, FrontendMessage, ProtocolError, ServerFields,
    SslResponse, Startup, TRANSACTION_IDLE,
};

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent something undecodable.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Certificate generation or TLS configuration failed.
    #[error("TLS setup error: {0}")]
    Tls(String),

    /// The client sent a message the server did not expect at this point.
    #[error("Unexpected message: {0}")]
    Unexpected(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// How the server authenticates clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MockAuth {
    /// Accept without a challenge.
    #[default]
    Trust,
    /// Ask for the password in clear.
    Cleartext,
    /// Ask for the MD5-hashed password, using the configured salt.
    Md5,
    /// Send this request verbatim and wait; for methods a client cannot
    /// satisfy.
    Request(AuthenticationRequest),
}

/// Mock server configuration.
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// User that may log in; empty accepts any user.
    pub user: String,
    /// Password expected by cleartext and MD5 authentication.
    pub password: String,
    /// Authentication method.
    pub auth: MockAuth,
    /// Salt used for MD5 challenges.
    pub salt: [u8; 4],
    /// Parameters reported after authentication, in order.
    pub parameters: Vec<(String, String)>,
    /// Backend pid of the first connection; later connections count up.
    pub base_pid: i32,
    /// Secret key sent in backend key data.
    pub secret_key: i32,
    /// Transaction indicator sent with ready-for-query.
    pub transaction_indicator: u8,
    /// Whether `SslRequest` is accepted.
    pub tls: bool,
    /// Error sent instead of the answer to `SslRequest`.
    pub ssl_error: Option<ServerFields>,
    /// Error sent instead of an authentication request.
    pub startup_error: Option<ServerFields>,
    /// Notices sent after authentication succeeds.
    pub notices: Vec<ServerFields>,
    /// Number of initial connections closed without a reply.
    pub dropped_connections: usize,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            auth: MockAuth::Trust,
            salt: [1, 2, 3, 4],
            parameters: vec![
                ("server_version".into(), "12.0.4".into()),
                ("client_encoding".into(), "UTF8".into()),
                ("standard_conforming_strings".into(), "on".into()),
            ],
            base_pid: 4242,
            secret_key: 0x5EC2_E7,
            transaction_indicator: TRANSACTION_IDLE,
            tls: false,
            ssl_error: None,
            startup_error: None,
            notices: Vec::new(),
            dropped_connections: 0,
        }
    }
}

/// Builder for creating a mock server.
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only this user may log in, with this password.
    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user = user.into();
        self.config.password = password.into();
        self
    }

    /// Set the authentication method.
    pub fn with_auth(mut self, auth: MockAuth) -> Self {
        self.config.auth = auth;
        self
    }

    /// Set the MD5 salt.
    pub fn with_salt(mut self, salt: [u8; 4]) -> Self {
        self.config.salt = salt;
        self
    }

    /// Report an extra (or replacement) run-time parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.config.parameters.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => self.config.parameters.push((name, value)),
        }
        self
    }

    /// Set the backend pid of the first connection.
    pub fn with_backend_pid(mut self, pid: i32) -> Self {
        self.config.base_pid = pid;
        self
    }

    /// Set the transaction indicator sent with ready-for-query.
    pub fn with_transaction_indicator(mut self, indicator: u8) -> Self {
        self.config.transaction_indicator = indicator;
        self
    }

    /// Accept TLS with a self-signed certificate for `localhost`.
    pub fn with_tls(mut self) -> Self {
        self.config.tls = true;
        self
    }

    /// Answer `SslRequest` with this error.
    pub fn with_ssl_error(mut self, fields: ServerFields) -> Self {
        self.config.ssl_error = Some(fields);
        self
    }

    /// Reject every startup packet with this error.
    pub fn with_startup_error(mut self, fields: ServerFields) -> Self {
        self.config.startup_error = Some(fields);
        self
    }

    /// Send a notice after authentication.
    pub fn with_notice(mut self, fields: ServerFields) -> Self {
        self.config.notices.push(fields);
        self
    }

    /// Close the first `count` connections as soon as they are accepted.
    pub fn with_dropped_connections(mut self, count: usize) -> Self {
        self.config.dropped_connections = count;
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockVerticaServer> {
        MockVerticaServer::start(self.config).await
    }
}

/// What the server has observed so far.
#[derive(Debug, Default)]
struct Observed {
    active: usize,
    accepted: usize,
    startups: Vec<Startup>,
    cancel_requests: Vec<(i32, i32)>,
    terminations: usize,
}

struct Shared {
    config: MockServerConfig,
    acceptor: Option<TlsAcceptor>,
    observed: Mutex<Observed>,
}

/// Mock Vertica server.
pub struct MockVerticaServer {
    /// Server address.
    addr: SocketAddr,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
    /// Server certificate, when TLS is enabled.
    certificate: Option<CertificateDer<'static>>,
    shared: Arc<Shared>,
}

impl MockVerticaServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let (acceptor, certificate) = if config.tls {
            let (acceptor, cert) = tls_acceptor()?;
            (Some(acceptor), Some(cert))
        } else {
            (None, None)
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            config,
            acceptor,
            observed: Mutex::new(Observed::default()),
        });

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            certificate,
            shared: shared.clone(),
        };

        // Spawn the accept loop
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                let shared = shared.clone();
                                tokio::spawn(async move {
                                    let serial = {
                                        let mut observed = shared.observed.lock().await;
                                        observed.active += 1;
                                        observed.accepted += 1;
                                        observed.accepted - 1
                                    };
                                    tracing::debug!(%peer, serial, "mock connection accepted");
                                    if let Err(e) = handle_connection(stream, &shared, serial).await {
                                        tracing::debug!("Connection error: {}", e);
                                    }
                                    let mut observed = shared.observed.lock().await;
                                    observed.active = observed.active.saturating_sub(1);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connection-info string pointing at this server.
    pub fn conninfo(&self) -> String {
        format!("host={} port={}", self.host(), self.port())
    }

    /// Self-signed server certificate, when TLS is enabled.
    pub fn certificate(&self) -> Option<&CertificateDer<'static>> {
        self.certificate.as_ref()
    }

    /// Backend pid the `n`th accepted connection receives.
    pub fn backend_pid_of(&self, n: usize) -> i32 {
        pid_for(&self.shared.config, n)
    }

    /// Number of connections currently open.
    pub async fn connection_count(&self) -> usize {
        self.shared.observed.lock().await.active
    }

    /// Number of connections accepted since start.
    pub async fn accepted_count(&self) -> usize {
        self.shared.observed.lock().await.accepted
    }

    /// Startup packets received, in order.
    pub async fn startups(&self) -> Vec<Startup> {
        self.shared.observed.lock().await.startups.clone()
    }

    /// Cancel requests received, as `(pid, key)`.
    pub async fn cancel_requests(&self) -> Vec<(i32, i32)> {
        self.shared.observed.lock().await.cancel_requests.clone()
    }

    /// Number of `Terminate` messages received.
    pub async fn terminations(&self) -> usize {
        self.shared.observed.lock().await.terminations
    }

    /// Stop the server.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockVerticaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pid_for(config: &MockServerConfig, n: usize) -> i32 {
    config
        .base_pid
        .wrapping_add(i32::try_from(n).unwrap_or(i32::MAX))
}

fn tls_acceptor() -> Result<(TlsAcceptor, CertificateDer<'static>)> {
    let tls_err = |e: &dyn std::fmt::Display| MockServerError::Tls(e.to_string());

    let key_pair = rcgen::KeyPair::generate().map_err(|e| tls_err(&e))?;
    let params = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .map_err(|e| tls_err(&e))?;
    let cert = params.self_signed(&key_pair).map_err(|e| tls_err(&e))?;
    let cert_der = cert.der().clone();
    let key_der = PrivateKeyDer::try_from(key_pair.serialize_der()).map_err(|e| tls_err(&e))?;

    let config =
        rustls::ServerConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()
            .map_err(|e| tls_err(&e))?
            .with_no_client_auth()
            .with_single_cert(vec![cert_der.clone()], key_der)
            .map_err(|e| tls_err(&e))?;

    Ok((TlsAcceptor::from(Arc::new(config)), cert_der))
}

/// Handle a single client connection.
async fn handle_connection(mut stream: TcpStream, shared: &Shared, serial: usize) -> Result<()> {
    let config = &shared.config;
    if serial < config.dropped_connections {
        tracing::debug!(serial, "mock dropping connection");
        return Ok(());
    }
    let mut buf = BytesMut::with_capacity(1024);

    let Some(first) = read_frame(&mut stream, &mut buf, FrontendMessage::decode_initial).await?
    else {
        return Ok(());
    };

    match first {
        FrontendMessage::SslRequest => {
            if let Some(fields) = &config.ssl_error {
                return send(&mut stream, &[BackendMessage::ErrorResponse(fields.clone())]).await;
            }
            match &shared.acceptor {
                Some(acceptor) => {
                    stream.write_all(&[SslResponse::Accepted.as_byte()]).await?;
                    let mut tls = acceptor.accept(stream).await?;
                    tracing::debug!("mock TLS handshake complete");
                    let startup = expect_startup(&mut tls, &mut buf).await?;
                    serve_session(&mut tls, &mut buf, startup, shared, serial).await
                }
                None => {
                    stream.write_all(&[SslResponse::Refused.as_byte()]).await?;
                    let startup = expect_startup(&mut stream, &mut buf).await?;
                    serve_session(&mut stream, &mut buf, startup, shared, serial).await
                }
            }
        }
        FrontendMessage::CancelRequest { pid, key } => {
            tracing::debug!(pid, "mock cancel request");
            shared.observed.lock().await.cancel_requests.push((pid, key));
            Ok(())
        }
        FrontendMessage::Startup(startup) => {
            serve_session(&mut stream, &mut buf, startup, shared, serial).await
        }
        other => Err(MockServerError::Unexpected(format!("{other:?}"))),
    }
}

async fn expect_startup<S>(stream: &mut S, buf: &mut BytesMut) -> Result<Startup>
where
    S: AsyncRead + Unpin,
{
    match read_frame(stream, buf, FrontendMessage::decode_initial).await? {
        Some(FrontendMessage::Startup(startup)) => Ok(startup),
        Some(other) => Err(MockServerError::Unexpected(format!("{other:?}"))),
        None => Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()),
    }
}

/// Authenticate, report the session and then wait for `Terminate`.
async fn serve_session<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    startup: Startup,
    shared: &Shared,
    serial: usize,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = &shared.config;
    let user = startup.get("user").unwrap_or_default().to_owned();
    shared.observed.lock().await.startups.push(startup);

    if let Some(fields) = &config.startup_error {
        return send(stream, &[BackendMessage::ErrorResponse(fields.clone())]).await;
    }

    let accepted = match &config.auth {
        MockAuth::Trust => true,
        MockAuth::Cleartext => {
            let request = AuthenticationRequest::CleartextPassword;
            send(stream, &[BackendMessage::Authentication(request)]).await?;
            read_password(stream, buf).await? == config.password
        }
        MockAuth::Md5 => {
            let request = AuthenticationRequest::Md5Password { salt: config.salt };
            send(stream, &[BackendMessage::Authentication(request)]).await?;
            let expected = vertica_auth::md5_response(&user, &config.password, &config.salt);
            read_password(stream, buf).await? == expected
        }
        MockAuth::Request(request) => {
            send(stream, &[BackendMessage::Authentication(request.clone())]).await?;
            // Nothing the client can answer; wait for it to hang up.
            let mut sink = [0u8; 64];
            while stream.read(&mut sink).await? > 0 {}
            return Ok(());
        }
    };

    if !accepted || (!config.user.is_empty() && user != config.user) {
        let fields = ServerFields::new(
            "FATAL",
            "28000",
            &format!("Invalid username or password for user \"{user}\""),
        );
        return send(stream, &[BackendMessage::ErrorResponse(fields)]).await;
    }

    let mut messages = vec![BackendMessage::Authentication(AuthenticationRequest::Ok)];
    messages.extend(config.notices.iter().cloned().map(BackendMessage::NoticeResponse));
    messages.extend(config.parameters.iter().map(|(name, value)| {
        BackendMessage::ParameterStatus {
            name: name.clone(),
            value: value.clone(),
        }
    }));
    messages.push(BackendMessage::BackendKeyData {
        pid: pid_for(config, serial),
        key: config.secret_key,
    });
    messages.push(BackendMessage::ReadyForQuery(config.transaction_indicator));
    send(stream, &messages).await?;

    loop {
        match read_frame(stream, buf, FrontendMessage::decode_tagged).await? {
            Some(FrontendMessage::Terminate) => {
                shared.observed.lock().await.terminations += 1;
                return Ok(());
            }
            Some(other) => tracing::debug!(?other, "mock ignoring message"),
            None => return Ok(()),
        }
    }
}

async fn read_password<S>(stream: &mut S, buf: &mut BytesMut) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    match read_frame(stream, buf, FrontendMessage::decode_tagged).await? {
        Some(FrontendMessage::Password(password)) => Ok(password),
        Some(other) => Err(MockServerError::Unexpected(format!("{other:?}"))),
        None => Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()),
    }
}

/// Read until `decode` yields a message. `None` on a clean end of stream.
async fn read_frame<S, T>(
    stream: &mut S,
    buf: &mut BytesMut,
    decode: fn(&mut BytesMut) -> std::result::Result<Option<T>, ProtocolError>,
) -> Result<Option<T>>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(message) = decode(buf)? {
            return Ok(Some(message));
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(None);
        }
    }
}

async fn send<S>(stream: &mut S, messages: &[BackendMessage]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut out = BytesMut::new();
    for message in messages {
        message.encode(&mut out);
    }
    stream.write_all(&out).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockVerticaServer::builder().build().await.unwrap();
        assert!(server.port() > 0);
        assert_eq!(server.host(), "127.0.0.1");
        assert_eq!(server.connection_count().await, 0);
        assert!(server.certificate().is_none());
    }

    #[tokio::test]
    async fn test_mock_server_tls_certificate() {
        let server = MockVerticaServer::builder().with_tls().build().await.unwrap();
        assert!(server.certificate().is_some());
    }

    #[test]
    fn test_with_parameter_replaces() {
        let builder = MockServerBuilder::new()
            .with_parameter("server_version", "8.0")
            .with_parameter("extra", "1");
        let params = &builder.config.parameters;
        assert_eq!(
            params.iter().filter(|(n, _)| n == "server_version").count(),
            1
        );
        assert!(params.contains(&("server_version".into(), "8.0".into())));
        assert!(params.contains(&("extra".into(), "1".into())));
    }

    #[tokio::test]
    async fn test_dropped_connections_close_without_reply() {
        let server = MockVerticaServer::builder()
            .with_dropped_connections(1)
            .build()
            .await
            .unwrap();

        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        let mut byte = [0u8; 1];
        let n = stream.read(&mut byte).await.unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(server.accepted_count().await, 1);
    }

    #[test]
    fn test_pid_per_connection() {
        let config = MockServerConfig::default();
        assert_eq!(pid_for(&config, 0), 4242);
        assert_eq!(pid_for(&config, 3), 4245);
    }
}
