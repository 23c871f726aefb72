//! # vertica-testing
//!
//! Test infrastructure for the Vertica connection handle.
//!
//! The centrepiece is [`MockVerticaServer`], an in-process server speaking
//! the startup half of the frontend/backend protocol: TLS negotiation,
//! authentication, parameter reports, backend key data and the final
//! ready-for-query. It is enough to drive a client through every
//! negotiation phase without a real database.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vertica_testing::{MockAuth, MockVerticaServer};
//!
//! #[tokio::test]
//! async fn test_connect() {
//!     let server = MockVerticaServer::builder()
//!         .with_user("dbadmin", "secret")
//!         .with_auth(MockAuth::Md5)
//!         .with_parameter("server_version", "12.0.4")
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let conninfo = server.conninfo();
//!     // Connect your client with conninfo...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;

pub use mock_server::{
    MockAuth, MockServerBuilder, MockServerConfig, MockServerError, MockVerticaServer,
};
