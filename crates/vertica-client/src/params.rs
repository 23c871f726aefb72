//! Login parameter resolution.
//!
//! A connection can be requested in three shapes:
//!
//! 1. a connection-info string (blocking);
//! 2. a connection-info string and an async flag;
//! 3. six discrete fields: host, port, options, database, user, password
//!    (blocking).
//!
//! Typed callers use [`LoginParams::from_conninfo`],
//! [`LoginParams::from_conninfo_with_mode`] and [`LoginParams::from_fields`].
//! Dynamic callers (bindings, scripting layers) pass a slice of [`Value`]s
//! to [`LoginParams::resolve`], which dispatches on the argument count.

use crate::config::{ConnInfoError, Config};
use crate::error::{Error, Result};
use crate::state::Mode;

/// Dynamically typed argument.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// Absent.
    #[default]
    Nil,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// String.
    Str(String),
}

impl Value {
    /// Type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Str(_) => "string",
        }
    }

    /// Whether this is exactly `true`.
    ///
    /// Truthy values such as `1` or `"true"` do not count.
    #[must_use]
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Self::Int(i64::from(n))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Nil, Into::into)
    }
}

/// The six discrete login fields. `None` means "not given".
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LoginFields {
    /// Host name.
    pub host: Option<String>,
    /// Port, in string form.
    pub port: Option<String>,
    /// Session options.
    pub options: Option<String>,
    /// Database name.
    pub dbname: Option<String>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
}

impl std::fmt::Debug for LoginFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginFields")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("options", &self.options)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Normalised login parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginParams {
    /// Connection-info string.
    ConnInfo {
        /// The string; `None` selects every default.
        conninfo: Option<String>,
        /// Blocking or poll-driven establishment.
        mode: Mode,
    },
    /// Discrete fields (always blocking).
    Fields(LoginFields),
    /// Settings built in code, e.g. to trust a private certificate
    /// authority.
    Config {
        /// The settings.
        config: Box<Config>,
        /// Blocking or poll-driven establishment.
        mode: Mode,
    },
}

impl LoginParams {
    /// Connection-info string, blocking.
    pub fn from_conninfo(conninfo: impl Into<String>) -> Self {
        Self::ConnInfo {
            conninfo: Some(conninfo.into()),
            mode: Mode::Blocking,
        }
    }

    /// Connection-info string with an explicit mode.
    pub fn from_conninfo_with_mode(conninfo: impl Into<String>, mode: Mode) -> Self {
        Self::ConnInfo {
            conninfo: Some(conninfo.into()),
            mode,
        }
    }

    /// Discrete fields, blocking.
    #[must_use]
    pub fn from_fields(fields: LoginFields) -> Self {
        Self::Fields(fields)
    }

    /// Prepared settings with an explicit mode.
    #[must_use]
    pub fn from_config(config: Config, mode: Mode) -> Self {
        Self::Config {
            config: Box::new(config),
            mode,
        }
    }

    /// Resolve a dynamically shaped argument list.
    ///
    /// * 1 argument: connection-info string (or nil).
    /// * 2 arguments: connection-info string and async flag; only an exact
    ///   `true` selects non-blocking mode.
    /// * 6 arguments: host, port, options, database, user, password. The
    ///   port may be an integer or boolean and is converted to a string.
    ///
    /// Any other count is [`Error::Misuse`]; a field of the wrong type is
    /// [`Error::InvalidArgument`].
    pub fn resolve(args: &[Value]) -> Result<Self> {
        match args {
            [conninfo] => Ok(Self::ConnInfo {
                conninfo: optional_string("conninfo", conninfo)?,
                mode: Mode::Blocking,
            }),
            [conninfo, flag] => Ok(Self::ConnInfo {
                conninfo: optional_string("conninfo", conninfo)?,
                mode: Mode::from_async(flag.is_true()),
            }),
            [host, port, options, dbname, user, password] => Ok(Self::Fields(LoginFields {
                host: optional_string("host", host)?,
                port: port_string(port),
                options: optional_string("options", options)?,
                dbname: optional_string("dbname", dbname)?,
                user: optional_string("user", user)?,
                password: optional_string("password", password)?,
            })),
            _ => Err(Error::Misuse(format!(
                "wrong number of arguments ({} for 1, 2 or 6)",
                args.len()
            ))),
        }
    }

    /// Requested establishment mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::ConnInfo { mode, .. } | Self::Config { mode, .. } => *mode,
            Self::Fields(_) => Mode::Blocking,
        }
    }

    /// Turn the parameters into connection settings.
    pub fn to_config(&self) -> std::result::Result<Config, ConnInfoError> {
        match self {
            Self::ConnInfo { conninfo, .. } => {
                Config::from_conninfo(conninfo.as_deref().unwrap_or_default())
            }
            Self::Fields(fields) => {
                let mut config = Config::new();
                config.host = fields.host.clone();
                config.port = fields.port.clone();
                config.options = fields.options.clone();
                config.dbname = fields.dbname.clone();
                config.user = fields.user.clone();
                config.password = fields.password.clone();
                Ok(config)
            }
            Self::Config { config, .. } => Ok((**config).clone()),
        }
    }
}

fn optional_string(field: &'static str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Nil => Ok(None),
        Value::Str(s) => Ok(Some(s.clone())),
        other => Err(Error::InvalidArgument {
            field,
            expected: "string or nil",
            found: other.type_name(),
        }),
    }
}

fn port_string(value: &Value) -> Option<String> {
    match value {
        Value::Nil => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Int(n) => Some(n.to_string()),
        Value::Str(s) => Some(s.clone()),
    }
}
