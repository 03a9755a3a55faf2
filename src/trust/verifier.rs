//! rustls verifiers driven by a [`TrustManager`].
//!
//! Every rejection is reported to rustls as the same
//! `ApplicationVerificationFailure`; the specific reason stays in local logs.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, RootCertStore, SignatureScheme};
use tracing::debug;

use super::{CertificateError, PeerRole, SslParameters, TrustManager};

/// Auth type reported to trust managers; rustls does not expose the key
/// exchange to certificate verifiers.
const AUTH_TYPE_UNKNOWN: &str = "UNKNOWN";

const ENDPOINT_IDENTIFICATION_HTTPS: &str = "HTTPS";

fn peer_chain<'a>(
    end_entity: &CertificateDer<'a>,
    intermediates: &[CertificateDer<'a>],
) -> Vec<CertificateDer<'a>> {
    std::iter::once(end_entity.clone())
        .chain(intermediates.iter().cloned())
        .collect()
}

fn reject(role: PeerRole, e: CertificateError) -> rustls::Error {
    debug!(role = %role, error = %e, "Rejecting peer certificate");
    rustls::Error::InvalidCertificate(rustls::CertificateError::ApplicationVerificationFailure)
}

/// Server certificate verifier for outbound connections.
#[derive(Debug)]
pub struct SanServerVerifier {
    trust: Arc<dyn TrustManager>,
    provider: Arc<CryptoProvider>,
}

impl SanServerVerifier {
    pub fn new(trust: Arc<dyn TrustManager>) -> Self {
        Self::with_provider(trust, Arc::new(ring::default_provider()))
    }

    pub fn with_provider(trust: Arc<dyn TrustManager>, provider: Arc<CryptoProvider>) -> Self {
        Self { trust, provider }
    }
}

impl ServerCertVerifier for SanServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let chain = peer_chain(end_entity, intermediates);
        let mut params = SslParameters {
            endpoint_identification_algorithm: Some(ENDPOINT_IDENTIFICATION_HTTPS.to_string()),
            server_name: Some(server_name.to_str().into_owned()),
            verification_time: Some(now),
        };

        self.trust
            .check_server_trusted(&chain, AUTH_TYPE_UNKNOWN, &mut params)
            .map_err(|e| reject(PeerRole::Server, e))?;

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client certificate verifier for inbound connections.
///
/// Client authentication is mandatory. The certificate request carries the
/// subjects of the trust manager's accepted issuers as hints.
#[derive(Debug)]
pub struct SanClientVerifier {
    trust: Arc<dyn TrustManager>,
    provider: Arc<CryptoProvider>,
    root_hints: Vec<DistinguishedName>,
}

impl SanClientVerifier {
    pub fn new(trust: Arc<dyn TrustManager>) -> Self {
        Self::with_provider(trust, Arc::new(ring::default_provider()))
    }

    pub fn with_provider(trust: Arc<dyn TrustManager>, provider: Arc<CryptoProvider>) -> Self {
        let mut issuers = RootCertStore::empty();
        let (added, ignored) = issuers.add_parsable_certificates(trust.accepted_issuers());
        debug!(
            added = added,
            ignored = ignored,
            "Collected client certificate request hints"
        );

        Self {
            trust,
            provider,
            root_hints: issuers.subjects(),
        }
    }
}

impl ClientCertVerifier for SanClientVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &self.root_hints
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let chain = peer_chain(end_entity, intermediates);
        let mut params = SslParameters {
            verification_time: Some(now),
            ..Default::default()
        };

        self.trust
            .check_client_trusted(&chain, AUTH_TYPE_UNKNOWN, &mut params)
            .map_err(|e| reject(PeerRole::Client, e))?;

        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{CertificateValidationContext, StringMatcherConfig};
    use crate::test_support::{LeafSpec, TestCa};
    use crate::trust::{TrustEvaluator, WebPkiTrustManager};

    fn evaluator(ca: &TestCa, allowed_san: &str) -> Arc<dyn TrustManager> {
        let delegate = Arc::new(WebPkiTrustManager::new(vec![ca.der()]).unwrap());
        let context =
            CertificateValidationContext::new([StringMatcherConfig::exact(allowed_san)]);
        Arc::new(TrustEvaluator::new(Some(&context), delegate).unwrap())
    }

    fn invalid_certificate() -> rustls::Error {
        rustls::Error::InvalidCertificate(rustls::CertificateError::ApplicationVerificationFailure)
    }

    #[test]
    fn test_server_verifier_applies_san_policy() {
        let ca = TestCa::new("Test CA");
        let leaf = ca.issue(&LeafSpec::new().dns("svc.example.com"));
        let verifier = SanServerVerifier::new(evaluator(&ca, "svc.example.com"));

        // Name mismatch is tolerated: the SAN policy owns identity.
        let dialed = ServerName::try_from("10.1.2.3").unwrap();
        assert!(verifier
            .verify_server_cert(&leaf, &[], &dialed, &[], UnixTime::now())
            .is_ok());

        let other = ca.issue(&LeafSpec::new().dns("db.example.com"));
        let dialed = ServerName::try_from("db.example.com").unwrap();
        assert_eq!(
            verifier
                .verify_server_cert(&other, &[], &dialed, &[], UnixTime::now())
                .unwrap_err(),
            invalid_certificate()
        );
    }

    #[test]
    fn test_server_verifier_rejects_untrusted_issuer() {
        let ca = TestCa::new("Test CA");
        let rogue = TestCa::new("Rogue CA");
        let leaf = rogue.issue(&LeafSpec::new().dns("svc.example.com"));
        let verifier = SanServerVerifier::new(evaluator(&ca, "svc.example.com"));

        let dialed = ServerName::try_from("svc.example.com").unwrap();
        assert_eq!(
            verifier
                .verify_server_cert(&leaf, &[], &dialed, &[], UnixTime::now())
                .unwrap_err(),
            invalid_certificate()
        );
        assert!(!verifier.supported_verify_schemes().is_empty());
    }

    #[test]
    fn test_verifiers_use_handshake_time() {
        let ca = TestCa::new("Test CA");
        let before_issue = UnixTime::since_unix_epoch(Duration::ZERO);

        let server = SanServerVerifier::new(evaluator(&ca, "svc.example.com"));
        let leaf = ca.issue(&LeafSpec::new().dns("svc.example.com"));
        let dialed = ServerName::try_from("svc.example.com").unwrap();
        assert_eq!(
            server
                .verify_server_cert(&leaf, &[], &dialed, &[], before_issue)
                .unwrap_err(),
            invalid_certificate()
        );

        let client = SanClientVerifier::new(evaluator(&ca, "spiffe://example.org/web"));
        let web = ca.issue(&LeafSpec::new().uri("spiffe://example.org/web"));
        assert_eq!(
            client
                .verify_client_cert(&web, &[], before_issue)
                .unwrap_err(),
            invalid_certificate()
        );
    }

    #[test]
    fn test_client_verifier() {
        let ca = TestCa::new("Test CA");
        let verifier = SanClientVerifier::new(evaluator(&ca, "spiffe://example.org/web"));

        assert_eq!(verifier.root_hint_subjects().len(), 1);
        assert!(verifier.offer_client_auth());
        assert!(verifier.client_auth_mandatory());

        let web = ca.issue(&LeafSpec::new().uri("spiffe://example.org/web"));
        assert!(verifier
            .verify_client_cert(&web, &[], UnixTime::now())
            .is_ok());

        let batch = ca.issue(&LeafSpec::new().uri("spiffe://example.org/batch"));
        assert_eq!(
            verifier
                .verify_client_cert(&batch, &[], UnixTime::now())
                .unwrap_err(),
            invalid_certificate()
        );
    }
}
