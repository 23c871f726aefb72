//! Client-to-server messages used during connection negotiation.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{self, read_cstring, read_i32, write_cstring, write_tagged, write_untagged};
use crate::error::ProtocolError;
use crate::version::ProtocolVersion;

/// Request code sent in place of a protocol version to ask for TLS.
pub const SSL_REQUEST_CODE: i32 = 80_877_103;

/// Request code sent in place of a protocol version to cancel a query.
pub const CANCEL_REQUEST_CODE: i32 = 80_877_102;

/// Tag of the password message.
pub const PASSWORD_TAG: u8 = b'p';

/// Tag of the terminate message.
pub const TERMINATE_TAG: u8 = b'X';

/// Startup packet: protocol version plus session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Startup {
    /// Protocol version requested by the client.
    pub version: ProtocolVersion,
    /// Ordered key/value parameters (`user`, `database`, `options`, ...).
    pub params: Vec<(String, String)>,
}

impl Startup {
    /// Build a startup packet for protocol 3.0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: ProtocolVersion::V3_0,
            params: Vec::new(),
        }
    }

    /// Append a parameter; `None` values are skipped.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.params.push((key.into(), value.to_string()));
        }
        self
    }

    /// Look up a parameter by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn decode_params(version: ProtocolVersion, mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut params = Vec::new();
        loop {
            codec::ensure_remaining(&body, 1)?;
            if body[0] == 0 {
                break;
            }
            let key = read_cstring(&mut body, "Startup")?;
            let value = read_cstring(&mut body, "Startup")?;
            params.push((key, value));
        }
        Ok(Self { version, params })
    }
}

impl Default for Startup {
    fn default() -> Self {
        Self::new()
    }
}

/// A frontend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// Session startup.
    Startup(Startup),
    /// Ask the server to switch to TLS before startup.
    SslRequest,
    /// Cancel the query running on another session.
    CancelRequest {
        /// Backend process id of the target session.
        pid: i32,
        /// Secret key of the target session.
        key: i32,
    },
    /// Response to a password challenge (cleartext or hashed).
    Password(String),
    /// Orderly session close.
    Terminate,
}

impl FrontendMessage {
    /// Encode into `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Self::Startup(startup) => write_untagged(dst, |b| {
                b.put_i32(startup.version.raw());
                for (key, value) in &startup.params {
                    write_cstring(b, key);
                    write_cstring(b, value);
                }
                b.put_u8(0);
            }),
            Self::SslRequest => write_untagged(dst, |b| b.put_i32(SSL_REQUEST_CODE)),
            Self::CancelRequest { pid, key } => write_untagged(dst, |b| {
                b.put_i32(CANCEL_REQUEST_CODE);
                b.put_i32(*pid);
                b.put_i32(*key);
            }),
            Self::Password(password) => {
                write_tagged(dst, PASSWORD_TAG, |b| write_cstring(b, password));
            }
            Self::Terminate => write_tagged(dst, TERMINATE_TAG, |_| {}),
        }
    }

    /// Encode into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode an untagged startup-phase packet (server side).
    ///
    /// Returns `Ok(None)` while the packet is incomplete.
    pub fn decode_initial(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        let Some(mut body) = codec::split_untagged(src)? else {
            return Ok(None);
        };

        let code = read_i32(&mut body)?;
        let message = match code {
            SSL_REQUEST_CODE => Self::SslRequest,
            CANCEL_REQUEST_CODE => {
                let pid = read_i32(&mut body)?;
                let key = read_i32(&mut body)?;
                Self::CancelRequest { pid, key }
            }
            raw => {
                let version = ProtocolVersion::new(raw);
                if version.major() != ProtocolVersion::V3_0.major() {
                    return Err(ProtocolError::UnsupportedVersion {
                        major: version.major(),
                        minor: version.minor(),
                    });
                }
                Self::Startup(Startup::decode_params(version, body)?)
            }
        };
        Ok(Some(message))
    }

    /// Decode a tagged frontend frame (server side).
    ///
    /// Returns `Ok(None)` while the frame is incomplete.
    pub fn decode_tagged(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        let Some((tag, mut body)) = codec::split_tagged(src)? else {
            return Ok(None);
        };

        match tag {
            PASSWORD_TAG => Ok(Some(Self::Password(read_cstring(&mut body, "Password")?))),
            TERMINATE_TAG => Ok(Some(Self::Terminate)),
            other => Err(ProtocolError::UnexpectedTag(other)),
        }
    }
}
