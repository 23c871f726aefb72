//! TLS connector producing client sessions.

use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore,
    SignatureScheme,
};

use crate::config::{TlsConfig, TlsVersion};
use crate::error::TlsError;

// =============================================================================
// Certificate verifiers
// =============================================================================

/// A certificate verifier that accepts any server certificate.
///
/// **WARNING:** Using this verifier exposes the connection to
/// man-in-the-middle attacks.
#[derive(Debug)]
struct DangerousServerCertVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for DangerousServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Verifies the chain with webpki but accepts a certificate issued for
/// another host name (`sslmode=verify-ca`).
#[derive(Debug)]
struct ChainOnlyVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

// =============================================================================
// TLS Connector
// =============================================================================

/// Builds rustls client sessions for Vertica connections.
///
/// The connector is cheap to clone; the rustls configuration is shared.
#[derive(Clone)]
pub struct TlsConnector {
    config: TlsConfig,
    client_config: Arc<ClientConfig>,
}

impl TlsConnector {
    /// Create a new TLS connector with the given configuration.
    pub fn new(config: TlsConfig) -> Result<Self, TlsError> {
        let client_config = Arc::new(Self::build_client_config(&config)?);
        Ok(Self {
            config,
            client_config,
        })
    }

    fn build_client_config(config: &TlsConfig) -> Result<ClientConfig, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let versions = Self::select_versions(config);
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&versions)?;

        if config.trust_server_certificate {
            tracing::warn!(
                "server certificate verification is disabled; \
                 the connection is encrypted but not authenticated"
            );
            return Ok(builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(DangerousServerCertVerifier {
                    provider,
                }))
                .with_no_client_auth());
        }

        let root_store = Self::build_root_store(config)?;
        if config.verify_hostname {
            return Ok(builder
                .with_root_certificates(root_store)
                .with_no_client_auth());
        }

        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(root_store), provider)
            .build()
            .map_err(|e| TlsError::Configuration(e.to_string()))?;
        Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(ChainOnlyVerifier { inner }))
            .with_no_client_auth())
    }

    fn build_root_store(config: &TlsConfig) -> Result<RootCertStore, TlsError> {
        let mut root_store = RootCertStore::empty();

        if config.root_certificates.is_empty() {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        } else {
            for cert in &config.root_certificates {
                root_store
                    .add(cert.clone())
                    .map_err(|e| TlsError::InvalidCertificate(e.to_string()))?;
            }
        }

        Ok(root_store)
    }

    fn select_versions(config: &TlsConfig) -> Vec<&'static rustls::SupportedProtocolVersion> {
        let mut versions: Vec<_> = [TlsVersion::Tls12, TlsVersion::Tls13]
            .into_iter()
            .filter(|v| config.min_protocol_version <= *v && *v <= config.max_protocol_version)
            .map(|v| v.to_rustls())
            .collect();

        if versions.is_empty() {
            versions.push(&rustls::version::TLS12);
        }

        versions
    }

    /// Start a client session for `host`.
    ///
    /// The returned connection has queued its `ClientHello`; the caller moves
    /// bytes between it and the socket until `is_handshaking()` is false.
    pub fn session(&self, host: &str) -> Result<ClientConnection, TlsError> {
        let name = self.config.server_name.as_deref().unwrap_or(host);
        let server_name = ServerName::try_from(name.to_owned())
            .map_err(|_| TlsError::InvalidServerName(name.to_owned()))?;

        tracing::debug!(server_name = %name, "starting TLS session");
        Ok(ClientConnection::new(
            Arc::clone(&self.client_config),
            server_name,
        )?)
    }

    /// Get the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &TlsConfig {
        &self.config
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SslMode;

    fn self_signed() -> CertificateDer<'static> {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.self_signed(&key_pair).unwrap().der().clone()
    }

    #[test]
    fn test_every_sslmode_builds() {
        for mode in [
            SslMode::Disable,
            SslMode::Prefer,
            SslMode::Require,
            SslMode::VerifyCa,
            SslMode::VerifyFull,
        ] {
            assert!(TlsConnector::new(mode.tls_config()).is_ok(), "{mode}");
        }
    }

    #[test]
    fn test_session_starts_handshake() {
        let connector = TlsConnector::new(SslMode::Require.tls_config()).unwrap();
        let session = connector.session("127.0.0.1").unwrap();
        assert!(session.is_handshaking());
        assert!(session.wants_write());
    }

    #[test]
    fn test_server_name_override() {
        let config = TlsConfig::new()
            .add_root_certificate(self_signed())
            .with_server_name("localhost");
        let connector = TlsConnector::new(config).unwrap();
        assert!(connector.session("not a host name").is_ok());
    }

    #[test]
    fn test_invalid_server_name() {
        let connector = TlsConnector::new(TlsConfig::new()).unwrap();
        assert!(matches!(
            connector.session("not a host name"),
            Err(TlsError::InvalidServerName(_))
        ));
    }

    #[test]
    fn test_invalid_root_certificate() {
        let config = TlsConfig::new().add_root_certificate(CertificateDer::from(vec![1, 2, 3]));
        assert!(matches!(
            TlsConnector::new(config),
            Err(TlsError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn test_tls13_only() {
        let config = TlsConfig::new().min_protocol_version(TlsVersion::Tls13);
        assert_eq!(TlsConnector::select_versions(&config).len(), 1);
        assert!(TlsConnector::new(config).is_ok());
    }
}
