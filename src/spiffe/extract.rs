//! SPIFFE ID extraction from a peer certificate chain.

use std::fmt::Debug;

use rustls::pki_types::CertificateDer;
use tracing::trace;

use super::SpiffeId;
use crate::san::{subject_alt_names, SubjectAltName};
use crate::trust::CertificateError;

/// Source of the SPIFFE identity of a peer.
///
/// The trust evaluator uses this to pick a trust domain in federated mode.
pub trait SpiffeIdExtractor: Debug + Send + Sync {
    /// Extract the SPIFFE ID of the chain's leaf, if it carries one.
    fn extract(&self, chain: &[CertificateDer<'_>]) -> Result<Option<SpiffeId>, CertificateError>;
}

/// Extracts the SPIFFE ID from the leaf certificate's URI SAN.
#[derive(Debug, Default, Clone, Copy)]
pub struct X509SpiffeIdExtractor;

impl SpiffeIdExtractor for X509SpiffeIdExtractor {
    fn extract(&self, chain: &[CertificateDer<'_>]) -> Result<Option<SpiffeId>, CertificateError> {
        extract_spiffe_id(chain)
    }
}

/// Extract the SPIFFE ID of a certificate chain.
///
/// The leaf must carry exactly one URI SAN and it must use the `spiffe`
/// scheme. Several URI SANs make the identity ambiguous and are rejected.
pub fn extract_spiffe_id(
    chain: &[CertificateDer<'_>],
) -> Result<Option<SpiffeId>, CertificateError> {
    let Some(leaf) = chain.first() else {
        return Ok(None);
    };

    let uris: Vec<String> = subject_alt_names(leaf.as_ref())?
        .into_iter()
        .filter_map(|name| match name {
            SubjectAltName::Uri(uri) => Some(uri),
            _ => None,
        })
        .collect();

    match uris.as_slice() {
        [] => Ok(None),
        [uri] if has_spiffe_scheme(uri) => {
            let id = SpiffeId::parse(uri)?;
            trace!(spiffe_id = %id, "Found SPIFFE ID in certificate SAN");
            Ok(Some(id))
        }
        [_] => Ok(None),
        _ => Err(CertificateError::MultipleUriSans),
    }
}

fn has_spiffe_scheme(uri: &str) -> bool {
    uri.get(..9)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("spiffe://"))
}
