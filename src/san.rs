//! Subject alternative name verification of the peer leaf certificate.
//!
//! Only DNS, URI and IP address entries take part in matching. Other SAN
//! kinds are ignored.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rustls::pki_types::CertificateDer;
use tracing::{debug, trace};
use x509_parser::prelude::*;

use crate::config::{CertificateValidationContext, ConfigError};
use crate::matcher::StringMatcher;
use crate::trust::CertificateError;

/// One subject alternative name entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltName {
    Dns(String),
    Uri(String),
    IpAddress(IpAddr),
    /// Any kind that takes no part in matching, named for logging.
    Other(&'static str),
}

impl SubjectAltName {
    /// The value used for pattern matching, if this kind is eligible.
    pub fn match_value(&self) -> Option<String> {
        match self {
            SubjectAltName::Dns(name) | SubjectAltName::Uri(name) => Some(name.clone()),
            SubjectAltName::IpAddress(ip) => Some(ip.to_string()),
            SubjectAltName::Other(_) => None,
        }
    }
}

impl fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectAltName::Dns(name) => write!(f, "DNS:{}", name),
            SubjectAltName::Uri(uri) => write!(f, "URI:{}", uri),
            SubjectAltName::IpAddress(ip) => write!(f, "IP:{}", ip),
            SubjectAltName::Other(kind) => write!(f, "{}:<unsupported>", kind),
        }
    }
}

/// Extract the subject alternative names of a DER certificate.
///
/// Returns an empty list when the certificate has no SAN extension.
pub fn subject_alt_names(cert_der: &[u8]) -> Result<Vec<SubjectAltName>, CertificateError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| CertificateError::ParseFailed(format!("DER parse failed: {}", e)))?;

    let san = cert
        .subject_alternative_name()
        .map_err(|e| CertificateError::ParseFailed(format!("invalid SAN extension: {}", e)))?;

    let Some(san) = san else {
        return Ok(Vec::new());
    };

    Ok(san
        .value
        .general_names
        .iter()
        .map(|name| match name {
            GeneralName::DNSName(dns) => SubjectAltName::Dns(dns.to_string()),
            GeneralName::URI(uri) => SubjectAltName::Uri(uri.to_string()),
            GeneralName::IPAddress(bytes) => ip_from_bytes(bytes)
                .map(SubjectAltName::IpAddress)
                .unwrap_or(SubjectAltName::Other("IP")),
            GeneralName::RFC822Name(_) => SubjectAltName::Other("email"),
            GeneralName::DirectoryName(_) => SubjectAltName::Other("DirName"),
            GeneralName::RegisteredID(_) => SubjectAltName::Other("RID"),
            GeneralName::OtherName(..) => SubjectAltName::Other("othername"),
            _ => SubjectAltName::Other("unknown"),
        })
        .collect())
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Verifies the peer leaf certificate's SANs against an ordered matcher list.
#[derive(Debug, Clone, Default)]
pub struct SanVerifier {
    matchers: Vec<StringMatcher>,
}

impl SanVerifier {
    /// Compile the SAN matchers of a validation context.
    pub fn new(context: &CertificateValidationContext) -> Result<Self, ConfigError> {
        let matchers = StringMatcher::compile_all(&context.match_subject_alt_names)?;

        debug!(matcher_count = matchers.len(), "Created SAN verifier");

        Ok(Self { matchers })
    }

    /// Build a verifier from already compiled matchers.
    pub fn from_matchers(matchers: Vec<StringMatcher>) -> Self {
        Self { matchers }
    }

    /// Returns true if no SAN policy is configured.
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matchers(&self) -> &[StringMatcher] {
        &self.matchers
    }

    /// Verify the leaf (index 0) of a peer certificate chain.
    ///
    /// Intermediate and root certificates are never inspected.
    pub fn verify_chain(&self, chain: &[CertificateDer<'_>]) -> Result<(), CertificateError> {
        if self.matchers.is_empty() {
            return Ok(());
        }

        let leaf = chain
            .first()
            .ok_or(CertificateError::MissingPeerCertificates)?;

        self.verify_leaf(leaf.as_ref())
    }

    /// Verify one DER certificate.
    pub fn verify_leaf(&self, cert_der: &[u8]) -> Result<(), CertificateError> {
        if self.matchers.is_empty() {
            return Ok(());
        }

        let names = subject_alt_names(cert_der)?;
        if names.is_empty() {
            debug!("Peer certificate carries no SAN entries");
            return Err(CertificateError::MissingSan);
        }

        for name in &names {
            let Some(value) = name.match_value() else {
                trace!(san = %name, "Ignoring ineligible SAN entry");
                continue;
            };

            if let Some(matcher) = self.matchers.iter().find(|m| m.matches(&value)) {
                debug!(san = %name, matcher = %matcher, "SAN match found");
                return Ok(());
            }
        }

        debug!(san_count = names.len(), "No SAN entry matched");
        Err(CertificateError::SanCheckFailed)
    }
}
