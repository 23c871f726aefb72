//! Server-to-client messages seen during connection negotiation.

use bytes::{BufMut, Bytes, BytesMut};

use crate::authentication::AuthenticationRequest;
use crate::codec::{self, ensure_remaining, read_cstring, read_i32, write_cstring, write_tagged};
use crate::error::ProtocolError;
use crate::fields::ServerFields;

/// Backend message tags.
pub mod tag {
    /// Authentication request.
    pub const AUTHENTICATION: u8 = b'R';
    /// Run-time parameter report.
    pub const PARAMETER_STATUS: u8 = b'S';
    /// Cancellation key data.
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// Ready for query.
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// Error response.
    pub const ERROR_RESPONSE: u8 = b'E';
    /// Notice response.
    pub const NOTICE_RESPONSE: u8 = b'N';
}

/// Single-byte answer to an `SslRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslResponse {
    /// `S`: the server will start a TLS handshake.
    Accepted,
    /// `N`: the server does not do TLS; continue in clear.
    Refused,
}

impl SslResponse {
    /// Interpret the response byte. `None` for anything else, which usually
    /// means the server sent an `ErrorResponse` frame instead.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'S' => Some(Self::Accepted),
            b'N' => Some(Self::Refused),
            _ => None,
        }
    }

    /// Wire byte.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Accepted => b'S',
            Self::Refused => b'N',
        }
    }
}

/// A backend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// Authentication request or completion.
    Authentication(AuthenticationRequest),
    /// A run-time parameter reported by the server.
    ParameterStatus {
        /// Parameter name.
        name: String,
        /// Current value.
        value: String,
    },
    /// Process id and secret key for cancellation.
    BackendKeyData {
        /// Backend process id.
        pid: i32,
        /// Secret key.
        key: i32,
    },
    /// The server is idle; carries the transaction indicator byte.
    ReadyForQuery(u8),
    /// Fatal or non-fatal error.
    ErrorResponse(ServerFields),
    /// Informational notice.
    NoticeResponse(ServerFields),
    /// Any tag not modelled here.
    Unknown {
        /// Message tag.
        tag: u8,
        /// Raw body.
        body: Bytes,
    },
}

impl BackendMessage {
    /// Decode one message from the front of `src`.
    ///
    /// Returns `Ok(None)` until a whole frame is buffered.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        let Some((tag, body)) = codec::split_tagged(src)? else {
            return Ok(None);
        };
        Self::decode_body(tag, body).map(Some)
    }

    /// Decode a message body given its tag.
    pub fn decode_body(tag: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        Ok(match tag {
            tag::AUTHENTICATION => Self::Authentication(AuthenticationRequest::decode(body)?),
            tag::PARAMETER_STATUS => {
                let name = read_cstring(&mut body, "ParameterStatus")?;
                let value = read_cstring(&mut body, "ParameterStatus")?;
                Self::ParameterStatus { name, value }
            }
            tag::BACKEND_KEY_DATA => {
                let pid = read_i32(&mut body)?;
                let key = read_i32(&mut body)?;
                Self::BackendKeyData { pid, key }
            }
            tag::READY_FOR_QUERY => {
                ensure_remaining(&body, 1)?;
                Self::ReadyForQuery(body[0])
            }
            tag::ERROR_RESPONSE => {
                Self::ErrorResponse(ServerFields::decode(body, "ErrorResponse")?)
            }
            tag::NOTICE_RESPONSE => {
                Self::NoticeResponse(ServerFields::decode(body, "NoticeResponse")?)
            }
            other => Self::Unknown { tag: other, body },
        })
    }

    /// Encode into `dst` (server side).
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Self::Authentication(request) => {
                write_tagged(dst, tag::AUTHENTICATION, |b| request.encode_body(b));
            }
            Self::ParameterStatus { name, value } => {
                write_tagged(dst, tag::PARAMETER_STATUS, |b| {
                    write_cstring(b, name);
                    write_cstring(b, value);
                });
            }
            Self::BackendKeyData { pid, key } => {
                write_tagged(dst, tag::BACKEND_KEY_DATA, |b| {
                    b.put_i32(*pid);
                    b.put_i32(*key);
                });
            }
            Self::ReadyForQuery(indicator) => {
                write_tagged(dst, tag::READY_FOR_QUERY, |b| b.put_u8(*indicator));
            }
            Self::ErrorResponse(fields) => {
                write_tagged(dst, tag::ERROR_RESPONSE, |b| fields.encode_body(b));
            }
            Self::NoticeResponse(fields) => {
                write_tagged(dst, tag::NOTICE_RESPONSE, |b| fields.encode_body(b));
            }
            Self::Unknown { tag, body } => write_tagged(dst, *tag, |b| b.put_slice(body)),
        }
    }

    /// Short message name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "Authentication",
            Self::ParameterStatus { .. } => "ParameterStatus",
            Self::BackendKeyData { .. } => "BackendKeyData",
            Self::ReadyForQuery(_) => "ReadyForQuery",
            Self::ErrorResponse(_) => "ErrorResponse",
            Self::NoticeResponse(_) => "NoticeResponse",
            Self::Unknown { .. } => "Unknown",
        }
    }
}
