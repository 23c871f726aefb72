//! Password challenge responses.

use vertica_protocol::AuthenticationRequest;

use crate::credentials::Credentials;
use crate::error::AuthError;

/// Compute the answer to an authentication request.
///
/// Returns `Ok(None)` when the request needs no reply (authentication is
/// already complete), or the string to send in a password message.
pub fn respond(
    request: &AuthenticationRequest,
    credentials: &Credentials,
) -> Result<Option<String>, AuthError> {
    match request {
        AuthenticationRequest::Ok => Ok(None),
        AuthenticationRequest::CleartextPassword => {
            tracing::debug!(user = credentials.user(), "answering cleartext password request");
            required_password(credentials).map(|p| Some(p.to_owned()))
        }
        AuthenticationRequest::Md5Password { salt } => {
            tracing::debug!(user = credentials.user(), "answering md5 password request");
            let password = required_password(credentials)?;
            Ok(Some(md5_response(credentials.user(), password, salt)))
        }
        other => Err(AuthError::Unsupported(other.method_name())),
    }
}

/// MD5 challenge response: `"md5" + hex(md5(hex(md5(password + user)) + salt))`.
#[must_use]
pub fn md5_response(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = format!("{password}{user}");
    let inner_hash = format!("{:x}", md5::compute(inner.as_bytes()));

    let mut outer_input = inner_hash.into_bytes();
    outer_input.extend_from_slice(salt);
    let outer_hash = md5::compute(&outer_input);

    format!("md5{outer_hash:x}")
}

fn required_password(credentials: &Credentials) -> Result<&str, AuthError> {
    match credentials.password() {
        Some(password) if !password.is_empty() => Ok(password),
        _ => Err(AuthError::PasswordRequired),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_answer() {
        assert_eq!(
            md5_response("dbadmin", "secret", &[1, 2, 3, 4]),
            "md5eb4ab686c356bb27c27fd00833d5a193"
        );
    }

    #[test]
    fn test_md5_request() {
        let creds = Credentials::new("dbadmin").with_password("secret");
        let request = AuthenticationRequest::Md5Password { salt: [1, 2, 3, 4] };
        assert_eq!(
            respond(&request, &creds).unwrap().as_deref(),
            Some("md5eb4ab686c356bb27c27fd00833d5a193")
        );
    }

    #[test]
    fn test_cleartext_request() {
        let creds = Credentials::new("u").with_password("pw");
        assert_eq!(
            respond(&AuthenticationRequest::CleartextPassword, &creds)
                .unwrap()
                .as_deref(),
            Some("pw")
        );
    }

    #[test]
    fn test_ok_needs_no_reply() {
        assert_eq!(
            respond(&AuthenticationRequest::Ok, &Credentials::new("u")).unwrap(),
            None
        );
    }

    #[test]
    fn test_missing_password() {
        let request = AuthenticationRequest::Md5Password { salt: [0; 4] };
        assert_eq!(
            respond(&request, &Credentials::new("u")),
            Err(AuthError::PasswordRequired)
        );
        assert_eq!(
            respond(&request, &Credentials::new("u").with_password("")),
            Err(AuthError::PasswordRequired)
        );
    }

    #[test]
    fn test_unsupported_method() {
        let creds = Credentials::new("u").with_password("pw");
        assert_eq!(
            respond(&AuthenticationRequest::KerberosV5, &creds),
            Err(AuthError::Unsupported("kerberos v5"))
        );
        assert_eq!(
            respond(&AuthenticationRequest::CryptPassword { salt: [1, 2] }, &creds),
            Err(AuthError::Unsupported("crypt password"))
        );
    }
}
