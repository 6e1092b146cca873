//! TLS Connector Modes
//!
//! The control channel supports three verification modes: strict
//! (webpki roots), custom CA bundle (for services fronted by an internal
//! CA), and verification disabled for development against self-signed
//! endpoints. All modes run on the rustls ring provider.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_tungstenite::Connector;

/// TLS verification mode for the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify against the bundled webpki roots.
    Strict,
    /// Verify against a PEM CA bundle at the given path.
    CustomCa(PathBuf),
    /// Accept any certificate. Development only.
    Insecure,
}

/// TLS configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// CA bundle could not be read.
    #[error("failed to read CA bundle: {0}")]
    Io(#[from] std::io::Error),

    /// CA bundle contained no usable certificates.
    #[error("CA bundle {0} contains no certificates")]
    EmptyCaBundle(String),

    /// rustls rejected the configuration.
    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Build the `tokio-tungstenite` connector for a TLS mode.
///
/// `Strict` returns `None`, deferring to the library's built-in
/// webpki-roots connector (also the right answer for plain `ws://`
/// URLs in tests).
///
/// # Errors
///
/// Returns `TlsError` if the CA bundle cannot be read or the rustls
/// config cannot be built.
pub fn build_connector(mode: &TlsMode) -> Result<Option<Connector>, TlsError> {
    match mode {
        TlsMode::Strict => Ok(None),
        TlsMode::CustomCa(path) => {
            let file = File::open(path)?;
            let mut reader = BufReader::new(file);
            let certs: Vec<CertificateDer<'static>> =
                rustls_pemfile::certs(&mut reader).collect::<Result<_, _>>()?;
            if certs.is_empty() {
                return Err(TlsError::EmptyCaBundle(path.display().to_string()));
            }

            let mut roots = RootCertStore::empty();
            for cert in certs {
                let _ = roots.add(cert);
            }

            let config =
                rustls::ClientConfig::builder_with_provider(Arc::new(ring_provider()))
                    .with_safe_default_protocol_versions()?
                    .with_root_certificates(roots)
                    .with_no_client_auth();
            Ok(Some(Connector::Rustls(Arc::new(config))))
        }
        TlsMode::Insecure => {
            tracing::warn!("TLS certificate verification is DISABLED");
            let provider = ring_provider();
            let verifier = Arc::new(AcceptAnyCert(provider.clone()));
            let config = rustls::ClientConfig::builder_with_provider(Arc::new(provider))
                .with_safe_default_protocol_versions()?
                .dangerous()
                .with_custom_certificate_verifier(verifier)
                .with_no_client_auth();
            Ok(Some(Connector::Rustls(Arc::new(config))))
        }
    }
}

fn ring_provider() -> CryptoProvider {
    rustls::crypto::ring::default_provider()
}

/// Verifier that accepts any server certificate but still checks
/// handshake signatures with the provider's algorithms.
#[derive(Debug)]
struct AcceptAnyCert(CryptoProvider);

impl ServerCertVerifier for AcceptAnyCert {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_uses_default_connector() {
        assert!(build_connector(&TlsMode::Strict).unwrap().is_none());
    }

    #[test]
    fn insecure_mode_builds_connector() {
        let connector = build_connector(&TlsMode::Insecure).unwrap();
        assert!(matches!(connector, Some(Connector::Rustls(_))));
    }

    #[test]
    fn missing_ca_bundle_is_an_error() {
        let mode = TlsMode::CustomCa(PathBuf::from("/nonexistent/ca.pem"));
        assert!(matches!(build_connector(&mode), Err(TlsError::Io(_))));
    }

    #[test]
    fn empty_ca_bundle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();

        let mode = TlsMode::CustomCa(path);
        assert!(matches!(
            build_connector(&mode),
            Err(TlsError::EmptyCaBundle(_))
        ));
    }
}
