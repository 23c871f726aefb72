//! Connection settings and the connection-info string parser.
//!
//! The connection-info string uses the familiar keyword/value syntax:
//!
//! ```text
//! host=db1.example.com port=5433 dbname=vmart user=dbadmin password='s3cr3t pw'
//! ```
//!
//! Values may be single-quoted; inside a value a backslash escapes the next
//! character. Unknown keywords are ignored.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use vertica_protocol::DEFAULT_PORT;
use vertica_tls::{SslMode, TlsConfig};

/// Default host when none is given.
pub const DEFAULT_HOST: &str = "localhost";

/// Errors in a connection-info string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConnInfoError {
    /// A keyword was not followed by `=`.
    #[error("missing \"=\" after \"{0}\" in connection info string")]
    MissingEquals(String),

    /// A single-quoted value never closed.
    #[error("unterminated quoted string in connection info string")]
    UnterminatedQuote,

    /// `sslmode` had an unrecognised value.
    #[error("invalid sslmode value: \"{0}\"")]
    InvalidSslMode(String),

    /// A numeric option could not be parsed.
    #[error("invalid integer value \"{value}\" for connection option \"{key}\"")]
    InvalidInteger {
        /// Keyword.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Settings used to establish a connection.
///
/// Every field is optional; `None` means "not given" and the `effective_*`
/// accessors apply the defaults. An empty host, port or database name is
/// treated as not given (the database then falls back to the user name).
/// Other empty strings are kept as given.
#[derive(Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    /// Host name to connect to (and to verify for TLS).
    pub host: Option<String>,
    /// Numeric address to dial instead of resolving `host`.
    pub hostaddr: Option<String>,
    /// Port, as written by the caller.
    pub port: Option<String>,
    /// Database name.
    pub dbname: Option<String>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Session options string.
    pub options: Option<String>,
    /// TLS policy.
    pub sslmode: SslMode,
    /// Trusted roots, server name and protocol versions for TLS; `sslmode`
    /// still decides what is verified.
    pub tls: Option<TlsConfig>,
    /// Limit on the whole blocking negotiation.
    pub connect_timeout: Option<Duration>,
    /// Label reported to the server as `client_label`.
    pub application_name: Option<String>,
}

impl Config {
    /// Create an empty configuration (all defaults).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection-info string.
    pub fn from_conninfo(conninfo: &str) -> Result<Self, ConnInfoError> {
        let mut config = Self::default();

        for (key, value) in parse_pairs(conninfo)? {
            match key.as_str() {
                "host" => config.host = Some(value),
                "hostaddr" => config.hostaddr = Some(value),
                "port" => config.port = Some(value),
                "dbname" => config.dbname = Some(value),
                "user" => config.user = Some(value),
                "password" => config.password = Some(value),
                "options" => config.options = Some(value),
                "sslmode" => {
                    config.sslmode = value
                        .parse()
                        .map_err(|_| ConnInfoError::InvalidSslMode(value.clone()))?;
                }
                "connect_timeout" => {
                    let secs: i64 = value.trim().parse().map_err(|_| {
                        ConnInfoError::InvalidInteger {
                            key: "connect_timeout",
                            value: value.clone(),
                        }
                    })?;
                    config.connect_timeout =
                        u64::try_from(secs).ok().filter(|s| *s > 0).map(Duration::from_secs);
                }
                "client_label" | "application_name" => config.application_name = Some(value),
                _ => {
                    tracing::debug!(key = %key, "ignoring unknown connection option");
                }
            }
        }

        Ok(config)
    }

    /// Set the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the numeric address to dial.
    #[must_use]
    pub fn hostaddr(mut self, addr: impl Into<String>) -> Self {
        self.hostaddr = Some(addr.into());
        self
    }

    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: impl ToString) -> Self {
        self.port = Some(port.to_string());
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    /// Set the user name.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the options string.
    #[must_use]
    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Set the TLS policy.
    #[must_use]
    pub fn sslmode(mut self, mode: SslMode) -> Self {
        self.sslmode = mode;
        self
    }

    /// Set TLS roots, server name and protocol versions.
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// TLS settings for the session: the `tls` settings (or defaults) under
    /// the `sslmode` verification policy.
    #[must_use]
    pub fn tls_config(&self) -> TlsConfig {
        self.sslmode.apply(self.tls.clone().unwrap_or_default())
    }

    /// Set the blocking negotiation time limit.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Effective host name.
    #[must_use]
    pub fn effective_host(&self) -> &str {
        match self.host.as_deref() {
            Some(host) if !host.is_empty() => host,
            _ => DEFAULT_HOST,
        }
    }

    /// Effective port, in string form.
    #[must_use]
    pub fn effective_port(&self) -> String {
        match self.port.as_deref() {
            Some(port) if !port.trim().is_empty() => port.to_owned(),
            _ => DEFAULT_PORT.to_string(),
        }
    }

    /// Port as a number; the message matches what the engine reports.
    pub fn port_number(&self) -> Result<u16, String> {
        let port = self.effective_port();
        port.trim()
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| format!("invalid port number: \"{port}\""))
    }

    /// Effective user name (empty when none was given).
    #[must_use]
    pub fn effective_user(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }

    /// Effective database name; defaults to the user name.
    #[must_use]
    pub fn effective_dbname(&self) -> &str {
        match self.dbname.as_deref() {
            Some(db) if !db.is_empty() => db,
            _ => self.effective_user(),
        }
    }

    /// Effective password (empty when none was given).
    #[must_use]
    pub fn effective_password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    /// Effective options string.
    #[must_use]
    pub fn effective_options(&self) -> &str {
        self.options.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("hostaddr", &self.hostaddr)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("options", &self.options)
            .field("sslmode", &self.sslmode)
            .field("tls", &self.tls)
            .field("connect_timeout", &self.connect_timeout)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Split a connection-info string into keyword/value pairs.
fn parse_pairs(input: &str) -> Result<Vec<(String, String)>, ConnInfoError> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next_if_eq(&'=').is_none() {
            return Err(ConnInfoError::MissingEquals(key));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    None => return Err(ConnInfoError::UnterminatedQuote),
                    Some('\'') => break,
                    Some('\\') => match chars.next() {
                        Some(c) => value.push(c),
                        None => return Err(ConnInfoError::UnterminatedQuote),
                    },
                    Some(c) => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                } else {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}
