//! Chain-of-trust validation against a fixed set of trust anchors.

use std::sync::Arc;

use rustls::client::{verify_server_cert_signed_by_trust_anchor, verify_server_name};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::{ParsedCertificate, WebPkiClientVerifier};
use rustls::RootCertStore;
use tracing::{debug, trace};

use super::{CertificateError, HandshakeContext, SslParameters, TrustManager};
use crate::config::ConfigError;

/// Trust manager backed by webpki path validation.
///
/// Server checks honor the handshake's endpoint identification: when it is
/// still enabled and a server name is known, the leaf must be valid for
/// that name.
#[derive(Debug)]
pub struct WebPkiTrustManager {
    roots: Arc<RootCertStore>,
    anchors: Vec<CertificateDer<'static>>,
    client_verifier: Arc<dyn ClientCertVerifier>,
    provider: Arc<CryptoProvider>,
}

impl WebPkiTrustManager {
    /// Create a trust manager from DER-encoded CA certificates.
    pub fn new(anchors: Vec<CertificateDer<'static>>) -> Result<Self, ConfigError> {
        if anchors.is_empty() {
            return Err(ConfigError::NoTrustAnchors);
        }

        let mut roots = RootCertStore::empty();
        for anchor in &anchors {
            roots
                .add(anchor.clone())
                .map_err(|e| ConfigError::InvalidTrustAnchor(e.to_string()))?;
        }
        let roots = Arc::new(roots);

        let provider = Arc::new(ring::default_provider());
        let client_verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::clone(&roots), Arc::clone(&provider))
                .build()
                .map_err(|e| ConfigError::VerifierBuild(e.to_string()))?;

        debug!(anchor_count = anchors.len(), "Created webpki trust manager");

        Ok(Self {
            roots,
            anchors,
            client_verifier,
            provider,
        })
    }

    /// Create a trust manager from a PEM bundle of CA certificates.
    pub fn from_pem(pem: &[u8]) -> Result<Self, ConfigError> {
        let mut reader = std::io::Cursor::new(pem);
        let anchors = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::InvalidTrustAnchor(format!("PEM parse failed: {}", e)))?;

        Self::new(anchors)
    }
}

fn split_chain<'c, 'a>(
    chain: &'c [CertificateDer<'a>],
) -> Result<(&'c CertificateDer<'a>, &'c [CertificateDer<'a>]), CertificateError> {
    chain
        .split_first()
        .ok_or(CertificateError::MissingPeerCertificates)
}

fn verification_time(params: Option<&SslParameters>) -> UnixTime {
    params.map_or_else(UnixTime::now, SslParameters::verification_time)
}

fn untrusted(e: rustls::Error) -> CertificateError {
    CertificateError::Untrusted(e.to_string())
}

impl TrustManager for WebPkiTrustManager {
    fn check_client_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError> {
        let (leaf, intermediates) = split_chain(chain)?;

        self.client_verifier
            .verify_client_cert(
                leaf,
                intermediates,
                verification_time(handshake.ssl_parameters().as_ref()),
            )
            .map_err(untrusted)?;

        trace!(auth_type = %auth_type, "Client chain verified by webpki");
        Ok(())
    }

    fn check_server_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError> {
        let (leaf, intermediates) = split_chain(chain)?;
        let params = handshake.ssl_parameters();

        let parsed = ParsedCertificate::try_from(leaf)
            .map_err(|e| CertificateError::ParseFailed(e.to_string()))?;

        verify_server_cert_signed_by_trust_anchor(
            &parsed,
            &self.roots,
            intermediates,
            verification_time(params.as_ref()),
            self.provider.signature_verification_algorithms.all,
        )
        .map_err(untrusted)?;

        if let Some(params) = params {
            if let (true, Some(name)) = (
                params.endpoint_identification_enabled(),
                params.server_name.as_deref(),
            ) {
                let server_name = ServerName::try_from(name).map_err(|e| {
                    CertificateError::Untrusted(format!("invalid server name '{}': {}", name, e))
                })?;
                verify_server_name(&parsed, &server_name).map_err(untrusted)?;
                trace!(server_name = %name, "Server name verified by webpki");
            }
        }

        trace!(auth_type = %auth_type, "Server chain verified by webpki");
        Ok(())
    }

    fn accepted_issuers(&self) -> Vec<CertificateDer<'static>> {
        self.anchors.clone()
    }
}
