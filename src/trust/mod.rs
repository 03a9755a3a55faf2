//! Peer certificate trust evaluation.
//!
//! This module provides:
//! - The [`TrustManager`] seam for standard chain-of-trust validation
//! - [`TrustEvaluator`], which adds SAN policy and SPIFFE federation on top
//!   of a delegate trust manager
//! - A webpki-backed delegate and rustls verifier adapters

mod evaluator;
mod verifier;
mod webpki;

use std::fmt::Debug;

use rustls::pki_types::{CertificateDer, UnixTime};
use thiserror::Error;

pub use evaluator::{TrustEvaluator, TrustEvaluatorBuilder};
pub use verifier::{SanClientVerifier, SanServerVerifier};
pub use webpki::WebPkiTrustManager;

/// Errors that reject a peer certificate chain.
///
/// The handshake layer treats every variant as an untrusted peer; the detail
/// is for local logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("peer certificate(s) missing")]
    MissingPeerCertificates,

    #[error("failed to parse peer certificate: {0}")]
    ParseFailed(String),

    #[error("peer certificate has no subject alternative names (missing SAN)")]
    MissingSan,

    #[error("peer certificate SAN check failed")]
    SanCheckFailed,

    #[error("failed to extract SPIFFE ID from peer leaf certificate (no SPIFFE id)")]
    NoSpiffeId,

    #[error("multiple URI SAN values found in the peer leaf certificate")]
    MultipleUriSans,

    #[error("invalid SPIFFE ID '{id}': {reason}")]
    InvalidSpiffeId { id: String, reason: String },

    #[error("SPIFFE trust map doesn't contain trust domain '{0}' from peer leaf certificate (unknown trust domain)")]
    UnknownTrustDomain(String),

    #[error("peer certificate chain rejected: {0}")]
    Untrusted(String),
}

/// Which side of the handshake is being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// We are a server verifying a client certificate.
    Client,
    /// We are a client verifying a server certificate.
    Server,
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Client => write!(f, "client"),
            PeerRole::Server => write!(f, "server"),
        }
    }
}

/// TLS parameters of an in-progress handshake that the trust layer may read
/// or adjust.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslParameters {
    /// Built-in endpoint identification (e.g. `HTTPS`). `None` or empty
    /// disables the transport's own hostname check.
    pub endpoint_identification_algorithm: Option<String>,
    /// Name the client expects the server to present.
    pub server_name: Option<String>,
    /// Time at which certificate validity is judged. `None` means the
    /// current system time.
    pub verification_time: Option<UnixTime>,
}

impl SslParameters {
    /// Returns true if the transport would run its own hostname check.
    pub fn endpoint_identification_enabled(&self) -> bool {
        self.endpoint_identification_algorithm
            .as_deref()
            .is_some_and(|alg| !alg.is_empty())
    }

    /// The time to validate certificates at.
    pub fn verification_time(&self) -> UnixTime {
        self.verification_time.unwrap_or_else(UnixTime::now)
    }
}

/// The transport's handshake state, as seen by trust managers.
///
/// A context that returns `None` from [`ssl_parameters`] is not a TLS
/// handshake (e.g. a plain socket) and is left untouched.
///
/// [`ssl_parameters`]: HandshakeContext::ssl_parameters
pub trait HandshakeContext {
    fn ssl_parameters(&self) -> Option<SslParameters>;

    fn set_ssl_parameters(&mut self, params: SslParameters);
}

/// Handshake context for checks made outside any socket or engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl HandshakeContext for Detached {
    fn ssl_parameters(&self) -> Option<SslParameters> {
        None
    }

    fn set_ssl_parameters(&mut self, _params: SslParameters) {}
}

impl HandshakeContext for SslParameters {
    fn ssl_parameters(&self) -> Option<SslParameters> {
        Some(self.clone())
    }

    fn set_ssl_parameters(&mut self, params: SslParameters) {
        *self = params;
    }
}

/// Standard chain-of-trust validation (expiry, signature, path).
///
/// Implementations must be safe to share across concurrent handshakes.
pub trait TrustManager: Debug + Send + Sync {
    /// Validate a client certificate chain (we are the server).
    fn check_client_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError>;

    /// Validate a server certificate chain (we are the client).
    fn check_server_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        auth_type: &str,
        handshake: &mut dyn HandshakeContext,
    ) -> Result<(), CertificateError>;

    /// Certificate authorities accepted for peer authentication.
    fn accepted_issuers(&self) -> Vec<CertificateDer<'static>>;
}
