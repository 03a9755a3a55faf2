//! SAN-aware trust evaluation over a delegate trust manager.
//!
//! The evaluator runs in one of two modes:
//! - Fixed: every chain is validated by one delegate
//! - Federated: the delegate is selected by the trust domain of the peer's
//!   SPIFFE ID
//!
//! In both modes delegate validation runs first, then the SAN policy of the
//! validation context, so an untrusted chain never reaches SAN matching.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use tracing::{debug, warn};

use super::{CertificateError, HandshakeContext, PeerRole, TrustManager};
use crate::config::{CertificateValidationContext, ConfigError};
use crate::san::SanVerifier;
use crate::spiffe::{SpiffeIdExtractor, X509SpiffeIdExtractor};

#[derive(Debug)]
enum DelegateMode {
    Fixed(Arc<dyn TrustManager>),
    Federated(BTreeMap<String, Arc<dyn TrustManager>>),
}

/// Trust manager that adds SAN verification and SPIFFE federation.
///
/// Immutable after construction and safe to share across handshakes.
#[derive(Debug)]
pub struct TrustEvaluator {
    mode: DelegateMode,
    san_verifier: Option<SanVerifier>,
    spiffe_extractor: Arc<dyn SpiffeIdExtractor>,
}

impl TrustEvaluator {
    /// Create an evaluator that validates every chain with `delegate`.
    pub fn new(
        cert_context: Option<&CertificateValidationContext>,
        delegate: Arc<dyn TrustManager>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Some(context) = cert_context {
            builder = builder.validation_context(context.clone());
        }
        builder.build_fixed(delegate)
    }

    /// Create an evaluator that selects a delegate by SPIFFE trust domain.
    pub fn federated(
        cert_context: Option<&CertificateValidationContext>,
        trust_map: impl IntoIterator<Item = (String, Arc<dyn TrustManager>)>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Some(context) = cert_context {
            builder = builder.validation_context(context.clone());
        }
        builder.build_federated(trust_map)
    }

    pub fn builder() -> TrustEvaluatorBuilder {
        TrustEvaluatorBuilder::new()
    }

    /// Returns true if delegates are selected by SPIFFE trust domain.
    pub fn is_federated(&self) -> bool {
        matches!(self.mode, DelegateMode::Federated(_))
    }

    /// Trust domains of the federated trust map, in lexical order.
    pub fn trust_domains(&self) -> Vec<&str> {
        match &self.mode {
            DelegateMode::Fixed(_) => Vec::new(),
            DelegateMode::Federated(map) => map.keys().map(String::as_str).collect(),
        }
    }

    /// Validate a client chain: delegate validation, then SAN policy.
    pub fn check_client_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError> {
        self.check_trusted(PeerRole::Client, chain, auth_type, handshake)
    }

    /// Validate a server chain: delegate validation, then SAN policy.
    ///
    /// The handshake's built-in endpoint identification is switched off
    /// first; identity is enforced by the SAN policy instead.
    pub fn check_server_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError> {
        self.check_trusted(PeerRole::Server, chain, auth_type, handshake)
    }

    /// Accepted issuers of the delegate, or the de-duplicated union of all
    /// federated delegates' issuers.
    pub fn accepted_issuers(&self) -> Vec<CertificateDer<'static>> {
        match &self.mode {
            DelegateMode::Fixed(delegate) => delegate.accepted_issuers(),
            DelegateMode::Federated(map) => {
                let mut seen = HashSet::new();
                map.values()
                    .flat_map(|delegate| delegate.accepted_issuers())
                    .filter(|issuer| seen.insert(issuer.as_ref().to_vec()))
                    .collect()
            }
        }
    }

    /// Check only the SAN policy of the leaf certificate.
    pub fn verify_subject_alt_names(
        &self,
        chain: &[CertificateDer<'_>],
    ) -> Result<(), CertificateError> {
        match &self.san_verifier {
            Some(verifier) => verifier.verify_chain(chain),
            None => Ok(()),
        }
    }

    fn check_trusted(
        &self,
        role: PeerRole,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError> {
        if role == PeerRole::Server {
            disable_endpoint_identification(handshake);
        }

        let delegate = self.choose_delegate(chain).map_err(|e| {
            warn!(role = %role, error = %e, "No trust manager for peer certificate");
            e
        })?;

        let validated = match role {
            PeerRole::Client => delegate.check_client_trusted(chain, auth_type, handshake),
            PeerRole::Server => delegate.check_server_trusted(chain, auth_type, handshake),
        };
        validated.map_err(|e| {
            warn!(role = %role, auth_type = %auth_type, error = %e, "Peer certificate chain rejected");
            e
        })?;

        self.verify_subject_alt_names(chain).map_err(|e| {
            warn!(role = %role, error = %e, "Peer certificate failed SAN policy");
            e
        })?;

        debug!(
            role = %role,
            auth_type = %auth_type,
            chain_len = chain.len(),
            "Peer certificate trusted"
        );
        Ok(())
    }

    fn choose_delegate(
        &self,
        chain: &[CertificateDer<'_>],
    ) -> Result<&Arc<dyn TrustManager>, CertificateError> {
        match &self.mode {
            DelegateMode::Fixed(delegate) => Ok(delegate),
            DelegateMode::Federated(map) => {
                let spiffe_id = self
                    .spiffe_extractor
                    .extract(chain)?
                    .ok_or(CertificateError::NoSpiffeId)?;

                let trust_domain = spiffe_id.trust_domain();
                match map.get(trust_domain) {
                    Some(delegate) => {
                        debug!(
                            spiffe_id = %spiffe_id,
                            trust_domain = %trust_domain,
                            "Selected trust manager by SPIFFE trust domain"
                        );
                        Ok(delegate)
                    }
                    None => Err(CertificateError::UnknownTrustDomain(
                        trust_domain.to_string(),
                    )),
                }
            }
        }
    }
}

impl TrustManager for TrustEvaluator {
    fn check_client_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError> {
        TrustEvaluator::check_client_trusted(self, chain, auth_type, handshake)
    }

    fn check_server_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError> {
        TrustEvaluator::check_server_trusted(self, chain, auth_type, handshake)
    }

    fn accepted_issuers(&self) -> Vec<CertificateDer<'static>> {
        TrustEvaluator::accepted_issuers(self)
    }
}

fn disable_endpoint_identification(handshake: &mut dyn HandshakeContext) {
    if let Some(mut params) = handshake.ssl_parameters() {
        if params.endpoint_identification_enabled() {
            debug!(
                algorithm = ?params.endpoint_identification_algorithm,
                "Disabling built-in endpoint identification"
            );
        }
        params.endpoint_identification_algorithm = Some(String::new());
        handshake.set_ssl_parameters(params);
    }
}

/// Builder for [`TrustEvaluator`].
#[derive(Debug, Default)]
pub struct TrustEvaluatorBuilder {
    validation_context: Option<CertificateValidationContext>,
    spiffe_extractor: Option<Arc<dyn SpiffeIdExtractor>>,
}

impl TrustEvaluatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SAN policy.
    pub fn validation_context(mut self, context: CertificateValidationContext) -> Self {
        self.validation_context = Some(context);
        self
    }

    /// Replace the SPIFFE ID extractor used in federated mode.
    pub fn spiffe_extractor(mut self, extractor: Arc<dyn SpiffeIdExtractor>) -> Self {
        self.spiffe_extractor = Some(extractor);
        self
    }

    /// Build a fixed-delegate evaluator.
    pub fn build_fixed(self, delegate: Arc<dyn TrustManager>) -> Result<TrustEvaluator, ConfigError> {
        self.build(DelegateMode::Fixed(delegate))
    }

    /// Build a federated evaluator. Trust domains must be unique.
    pub fn build_federated(
        self,
        trust_map: impl IntoIterator<Item = (String, Arc<dyn TrustManager>)>,
    ) -> Result<TrustEvaluator, ConfigError> {
        let mut map = BTreeMap::new();
        for (trust_domain, delegate) in trust_map {
            if map.contains_key(&trust_domain) {
                return Err(ConfigError::DuplicateTrustDomain(trust_domain));
            }
            map.insert(trust_domain, delegate);
        }
        self.build(DelegateMode::Federated(map))
    }

    fn build(self, mode: DelegateMode) -> Result<TrustEvaluator, ConfigError> {
        let san_verifier = self
            .validation_context
            .as_ref()
            .map(SanVerifier::new)
            .transpose()?;

        debug!(
            federated = matches!(mode, DelegateMode::Federated(_)),
            san_matchers = san_verifier.as_ref().map_or(0, |v| v.matchers().len()),
            "Created trust evaluator"
        );

        Ok(TrustEvaluator {
            mode,
            san_verifier,
            spiffe_extractor: self
                .spiffe_extractor
                .unwrap_or_else(|| Arc::new(X509SpiffeIdExtractor)),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::config::StringMatcherConfig;
    use crate::spiffe::SpiffeId;
    use crate::test_support::{init_tracing, self_signed, LeafSpec};
    use crate::trust::{Detached, SslParameters};

    #[derive(Debug, Default)]
    struct StaticTrustManager {
        issuers: Vec<CertificateDer<'static>>,
        reject: Option<String>,
        calls: AtomicUsize,
        seen_params: Mutex<Vec<Option<SslParameters>>>,
    }

    impl StaticTrustManager {
        fn accepting(issuers: &[&[u8]]) -> Arc<Self> {
            Arc::new(Self {
                issuers: issuers
                    .iter()
                    .map(|der| CertificateDer::from(der.to_vec()))
                    .collect(),
                ..Default::default()
            })
        }

        fn rejecting(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                reject: Some(reason.to_string()),
                ..Default::default()
            })
        }

        fn check(&self, handshake: &mut dyn HandshakeContext) -> Result<(), CertificateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_params
                .lock()
                .unwrap()
                .push(handshake.ssl_parameters());
            match &self.reject {
                Some(reason) => Err(CertificateError::Untrusted(reason.clone())),
                None => Ok(()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TrustManager for StaticTrustManager {
        fn check_client_trusted(
            &self,
            _chain: &[CertificateDer<'_>],
            _auth_type: &str,
            handshake: &mut dyn HandshakeContext,
        ) -> Result<(), CertificateError> {
            self.check(handshake)
        }

        fn check_server_trusted(
            &self,
            _chain: &[CertificateDer<'_>],
            _auth_type: &str,
            handshake: &mut dyn HandshakeContext,
        ) -> Result<(), CertificateError> {
            self.check(handshake)
        }

        fn accepted_issuers(&self) -> Vec<CertificateDer<'static>> {
            self.issuers.clone()
        }
    }

    fn exact_context(pattern: &str) -> CertificateValidationContext {
        CertificateValidationContext::new([StringMatcherConfig::exact(pattern)])
    }

    fn federated_map(
        entries: &[(&str, &Arc<StaticTrustManager>)],
    ) -> Vec<(String, Arc<dyn TrustManager>)> {
        entries
            .iter()
            .map(|(td, tm)| (td.to_string(), Arc::clone(*tm) as Arc<dyn TrustManager>))
            .collect()
    }

    #[test]
    fn test_fixed_delegate_with_san_policy() {
        init_tracing();
        let delegate = StaticTrustManager::accepting(&[]);
        let cert = self_signed(&LeafSpec::new().dns("svc.example.com"));

        let evaluator =
            TrustEvaluator::new(Some(&exact_context("svc.example.com")), delegate.clone()).unwrap();
        assert!(!evaluator.is_federated());
        assert!(evaluator
            .check_client_trusted(&[cert.clone()], "RSA", &mut Detached)
            .is_ok());
        assert!(evaluator
            .check_server_trusted(&[cert.clone()], "RSA", &mut Detached)
            .is_ok());
        assert_eq!(delegate.calls(), 2);

        let evaluator =
            TrustEvaluator::new(Some(&exact_context("SVC.example.com")), delegate).unwrap();
        assert_eq!(
            evaluator.check_client_trusted(&[cert], "RSA", &mut Detached),
            Err(CertificateError::SanCheckFailed)
        );
    }

    #[test]
    fn test_no_context_or_empty_context_skips_san_check() {
        let delegate = StaticTrustManager::accepting(&[]);
        let no_san = self_signed(&LeafSpec::new());

        let without = TrustEvaluator::new(None, delegate.clone()).unwrap();
        assert!(without
            .check_client_trusted(&[no_san.clone()], "RSA", &mut Detached)
            .is_ok());

        let empty =
            TrustEvaluator::new(Some(&CertificateValidationContext::default()), delegate).unwrap();
        assert!(empty
            .check_server_trusted(&[no_san], "RSA", &mut Detached)
            .is_ok());
    }

    #[test]
    fn test_delegate_failure_precedes_san_check() {
        let delegate = StaticTrustManager::rejecting("expired");
        let cert = self_signed(&LeafSpec::new().dns("other.example.com"));

        let evaluator =
            TrustEvaluator::new(Some(&exact_context("svc.example.com")), delegate.clone()).unwrap();
        assert_eq!(
            evaluator.check_client_trusted(&[cert], "RSA", &mut Detached),
            Err(CertificateError::Untrusted("expired".to_string()))
        );
        assert_eq!(delegate.calls(), 1);
    }

    #[test]
    fn test_server_check_disables_endpoint_identification() {
        let delegate = StaticTrustManager::accepting(&[]);
        let evaluator = TrustEvaluator::new(None, delegate.clone()).unwrap();
        let cert = self_signed(&LeafSpec::new().dns("svc.example.com"));

        let mut params = SslParameters {
            endpoint_identification_algorithm: Some("HTTPS".to_string()),
            server_name: Some("svc.example.com".to_string()),
            ..Default::default()
        };
        evaluator
            .check_server_trusted(&[cert.clone()], "ECDHE_ECDSA", &mut params)
            .unwrap();
        assert!(!params.endpoint_identification_enabled());
        assert_eq!(params.server_name.as_deref(), Some("svc.example.com"));

        // The delegate already saw the disabled algorithm.
        let seen = delegate.seen_params.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].as_ref().unwrap().endpoint_identification_enabled());

        let mut params = SslParameters {
            endpoint_identification_algorithm: Some("HTTPS".to_string()),
            server_name: None,
            ..Default::default()
        };
        evaluator
            .check_client_trusted(&[cert], "ECDHE_ECDSA", &mut params)
            .unwrap();
        assert!(params.endpoint_identification_enabled());
    }

    #[test]
    fn test_federated_selects_delegate_by_trust_domain() {
        let example = StaticTrustManager::accepting(&[]);
        let partner = StaticTrustManager::accepting(&[]);
        let evaluator = TrustEvaluator::federated(
            None,
            federated_map(&[("example.org", &example), ("partner.net", &partner)]),
        )
        .unwrap();
        assert!(evaluator.is_federated());
        assert_eq!(evaluator.trust_domains(), vec!["example.org", "partner.net"]);

        let cert = self_signed(&LeafSpec::new().uri("spiffe://partner.net/billing"));
        evaluator
            .check_client_trusted(&[cert], "RSA", &mut Detached)
            .unwrap();
        assert_eq!(partner.calls(), 1);
        assert_eq!(example.calls(), 0);
    }

    #[test]
    fn test_federated_unknown_trust_domain() {
        let example = StaticTrustManager::accepting(&[]);
        let evaluator =
            TrustEvaluator::federated(None, federated_map(&[("example.org", &example)])).unwrap();

        let cert = self_signed(&LeafSpec::new().uri("spiffe://foreign.io/api"));
        assert_eq!(
            evaluator.check_server_trusted(&[cert], "RSA", &mut Detached),
            Err(CertificateError::UnknownTrustDomain("foreign.io".to_string()))
        );
        assert_eq!(example.calls(), 0);
    }

    #[test]
    fn test_federated_no_spiffe_id() {
        let example = StaticTrustManager::accepting(&[]);
        let evaluator =
            TrustEvaluator::federated(None, federated_map(&[("example.org", &example)])).unwrap();

        let cert = self_signed(&LeafSpec::new().dns("api.example.org"));
        assert_eq!(
            evaluator.check_client_trusted(&[cert], "RSA", &mut Detached),
            Err(CertificateError::NoSpiffeId)
        );
        assert_eq!(
            evaluator.check_client_trusted(&[], "RSA", &mut Detached),
            Err(CertificateError::NoSpiffeId)
        );
    }

    #[test]
    fn test_federated_with_san_policy() {
        let example = StaticTrustManager::accepting(&[]);
        let context = CertificateValidationContext::new([StringMatcherConfig::prefix(
            "spiffe://example.org/ns/prod/",
        )]);
        let evaluator =
            TrustEvaluator::federated(Some(&context), federated_map(&[("example.org", &example)]))
                .unwrap();

        let prod = self_signed(&LeafSpec::new().uri("spiffe://example.org/ns/prod/api"));
        let dev = self_signed(&LeafSpec::new().uri("spiffe://example.org/ns/dev/api"));
        assert!(evaluator
            .check_client_trusted(&[prod], "RSA", &mut Detached)
            .is_ok());
        assert_eq!(
            evaluator.check_client_trusted(&[dev], "RSA", &mut Detached),
            Err(CertificateError::SanCheckFailed)
        );
    }

    #[test]
    fn test_custom_spiffe_extractor() {
        #[derive(Debug)]
        struct FixedId;

        impl SpiffeIdExtractor for FixedId {
            fn extract(
                &self,
                _chain: &[CertificateDer<'_>],
            ) -> Result<Option<SpiffeId>, CertificateError> {
                SpiffeId::parse("spiffe://example.org/pinned").map(Some)
            }
        }

        let example = StaticTrustManager::accepting(&[]);
        let evaluator = TrustEvaluator::builder()
            .spiffe_extractor(Arc::new(FixedId))
            .build_federated(federated_map(&[("example.org", &example)]))
            .unwrap();

        let cert = self_signed(&LeafSpec::new());
        assert!(evaluator
            .check_client_trusted(&[cert], "RSA", &mut Detached)
            .is_ok());
        assert_eq!(example.calls(), 1);
    }

    #[test]
    fn test_accepted_issuers() {
        let fixed = StaticTrustManager::accepting(&[b"ca-1", b"ca-2"]);
        let evaluator = TrustEvaluator::new(None, fixed).unwrap();
        assert_eq!(evaluator.accepted_issuers().len(), 2);

        let a = StaticTrustManager::accepting(&[b"ca-1", b"ca-2"]);
        let b = StaticTrustManager::accepting(&[b"ca-2", b"ca-3", b"ca-1"]);
        let evaluator =
            TrustEvaluator::federated(None, federated_map(&[("a.org", &a), ("b.org", &b)]))
                .unwrap();

        let issuers: Vec<Vec<u8>> = evaluator
            .accepted_issuers()
            .iter()
            .map(|c| c.as_ref().to_vec())
            .collect();
        assert_eq!(
            issuers,
            vec![b"ca-1".to_vec(), b"ca-2".to_vec(), b"ca-3".to_vec()]
        );
    }

    #[test]
    fn test_duplicate_trust_domain_rejected() {
        let a = StaticTrustManager::accepting(&[]);
        let result = TrustEvaluator::federated(
            None,
            federated_map(&[("example.org", &a), ("example.org", &a)]),
        );
        assert!(matches!(result, Err(ConfigError::DuplicateTrustDomain(td)) if td == "example.org"));
    }

    #[test]
    fn test_invalid_context_fails_at_construction() {
        let context = CertificateValidationContext::new([StringMatcherConfig::default()]);
        let result = TrustEvaluator::new(Some(&context), StaticTrustManager::accepting(&[]));
        assert!(matches!(result, Err(ConfigError::NoMatchPattern)));
    }

    #[test]
    fn test_evaluator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TrustEvaluator>();

        let evaluator: Arc<dyn TrustManager> =
            Arc::new(TrustEvaluator::new(None, StaticTrustManager::accepting(&[b"ca"])).unwrap());
        assert_eq!(evaluator.accepted_issuers().len(), 1);
    }
}
