//! Authentication request (`R`) message.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{ensure_remaining, read_i32};
use crate::error::ProtocolError;

/// Authentication method codes carried in the `R` message.
pub mod code {
    /// Authentication succeeded.
    pub const OK: i32 = 0;
    /// Kerberos V5.
    pub const KERBEROS_V5: i32 = 2;
    /// Cleartext password.
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    /// `crypt(3)` password with a 2-byte salt.
    pub const CRYPT_PASSWORD: i32 = 4;
    /// MD5 password with a 4-byte salt.
    pub const MD5_PASSWORD: i32 = 5;
    /// SCM credential passing.
    pub const SCM_CREDENTIAL: i32 = 6;
    /// GSSAPI.
    pub const GSS: i32 = 7;
    /// GSSAPI continuation.
    pub const GSS_CONTINUE: i32 = 8;
    /// SSPI.
    pub const SSPI: i32 = 9;
}

/// What the server asks of the client during authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationRequest {
    /// Authentication is complete.
    Ok,
    /// Kerberos V5 is required.
    KerberosV5,
    /// Send the password in clear.
    CleartextPassword,
    /// Send the `crypt(3)`-hashed password.
    CryptPassword {
        /// Two-byte salt.
        salt: [u8; 2],
    },
    /// Send the MD5-hashed password.
    Md5Password {
        /// Four-byte salt.
        salt: [u8; 4],
    },
    /// SCM credential message required.
    ScmCredential,
    /// GSSAPI negotiation start.
    Gss,
    /// GSSAPI continuation data.
    GssContinue(Bytes),
    /// SSPI negotiation start.
    Sspi,
    /// A method code this client does not know.
    Unknown(i32),
}

impl AuthenticationRequest {
    /// Decode the body of an `R` message.
    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let method = read_i32(&mut body)?;
        Ok(match method {
            code::OK => Self::Ok,
            code::KERBEROS_V5 => Self::KerberosV5,
            code::CLEARTEXT_PASSWORD => Self::CleartextPassword,
            code::CRYPT_PASSWORD => {
                ensure_remaining(&body, 2)?;
                Self::CryptPassword {
                    salt: [body[0], body[1]],
                }
            }
            code::MD5_PASSWORD => {
                ensure_remaining(&body, 4)?;
                Self::Md5Password {
                    salt: [body[0], body[1], body[2], body[3]],
                }
            }
            code::SCM_CREDENTIAL => Self::ScmCredential,
            code::GSS => Self::Gss,
            code::GSS_CONTINUE => Self::GssContinue(body),
            code::SSPI => Self::Sspi,
            other => Self::Unknown(other),
        })
    }

    /// Method code of this request.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Ok => code::OK,
            Self::KerberosV5 => code::KERBEROS_V5,
            Self::CleartextPassword => code::CLEARTEXT_PASSWORD,
            Self::CryptPassword { .. } => code::CRYPT_PASSWORD,
            Self::Md5Password { .. } => code::MD5_PASSWORD,
            Self::ScmCredential => code::SCM_CREDENTIAL,
            Self::Gss => code::GSS,
            Self::GssContinue(_) => code::GSS_CONTINUE,
            Self::Sspi => code::SSPI,
            Self::Unknown(other) => *other,
        }
    }

    /// Human-readable method name for diagnostics.
    #[must_use]
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::KerberosV5 => "kerberos v5",
            Self::CleartextPassword => "cleartext password",
            Self::CryptPassword { .. } => "crypt password",
            Self::Md5Password { .. } => "md5 password",
            Self::ScmCredential => "scm credential",
            Self::Gss => "gss",
            Self::GssContinue(_) => "gss continue",
            Self::Sspi => "sspi",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Encode the body (server side).
    pub(crate) fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_i32(self.code());
        match self {
            Self::CryptPassword { salt } => dst.put_slice(salt),
            Self::Md5Password { salt } => dst.put_slice(salt),
            Self::GssContinue(data) => dst.put_slice(data),
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_md5_salt() {
        let body = Bytes::from_static(&[0, 0, 0, 5, 1, 2, 3, 4]);
        assert_eq!(
            AuthenticationRequest::decode(body).unwrap(),
            AuthenticationRequest::Md5Password { salt: [1, 2, 3, 4] }
        );
    }

    #[test]
    fn test_decode_md5_missing_salt() {
        let body = Bytes::from_static(&[0, 0, 0, 5, 1, 2]);
        assert!(matches!(
            AuthenticationRequest::decode(body),
            Err(ProtocolError::IncompleteMessage { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_decode_unknown_method_is_preserved() {
        let body = Bytes::from_static(&[0, 0, 0, 10]);
        let request = AuthenticationRequest::decode(body).unwrap();
        assert_eq!(request, AuthenticationRequest::Unknown(10));
        assert_eq!(request.code(), 10);
    }
}
