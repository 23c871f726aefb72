//! # vertica-auth
//!
//! Credentials and authentication challenge handling for Vertica
//! connections, isolated from connection logic so the hashing rules can be
//! tested on their own.
//!
//! ## Supported Authentication Methods
//!
//! | Method | Server code | Response |
//! |--------|-------------|----------|
//! | Trust | 0 | none |
//! | Cleartext password | 3 | the password |
//! | MD5 password | 5 | `md5` + hex(md5(hex(md5(password + user)) + salt)) |
//!
//! Kerberos, GSS, SSPI, SCM and crypt challenges are reported as
//! [`AuthError::Unsupported`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod credentials;
pub mod error;
pub mod password;

pub use credentials::Credentials;
pub use error::AuthError;
pub use password::{md5_response, respond};

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
