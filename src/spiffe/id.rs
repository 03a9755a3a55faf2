//! SPIFFE ID parsing.
//!
//! SPIFFE ID format: `spiffe://trust-domain/workload-path`

use std::fmt;
use std::str::FromStr;

use crate::trust::CertificateError;

const SPIFFE_SCHEME: &str = "spiffe";
const MAX_SPIFFE_ID_LEN: usize = 2048;
const MAX_TRUST_DOMAIN_LEN: usize = 255;

/// A parsed SPIFFE ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpiffeId {
    trust_domain: String,
    path: String,
}

impl SpiffeId {
    /// Parse and validate a SPIFFE ID URI.
    pub fn parse(uri: &str) -> Result<Self, CertificateError> {
        let invalid = |reason: &str| CertificateError::InvalidSpiffeId {
            id: uri.to_string(),
            reason: reason.to_string(),
        };

        if uri.len() > MAX_SPIFFE_ID_LEN {
            return Err(invalid("SPIFFE ID exceeds maximum length"));
        }

        let (scheme, remainder) = uri
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        if !scheme.eq_ignore_ascii_case(SPIFFE_SCHEME) {
            return Err(invalid("scheme must be 'spiffe'"));
        }

        if remainder.contains(['?', '#']) {
            return Err(invalid("query and fragment are not allowed"));
        }

        // Trust domain is everything before the first /
        let (trust_domain, path) = match remainder.find('/') {
            Some(pos) => (&remainder[..pos], &remainder[pos..]),
            None => (remainder, ""),
        };

        validate_trust_domain(trust_domain).map_err(invalid)?;
        validate_path(path).map_err(invalid)?;

        Ok(Self {
            trust_domain: trust_domain.to_string(),
            path: path.to_string(),
        })
    }

    /// The trust domain, e.g. `example.org`.
    pub fn trust_domain(&self) -> &str {
        &self.trust_domain
    }

    /// The workload path including its leading `/`, or empty.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FromStr for SpiffeId {
    type Err = CertificateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spiffe://{}{}", self.trust_domain, self.path)
    }
}

fn validate_trust_domain(trust_domain: &str) -> Result<(), &'static str> {
    if trust_domain.is_empty() {
        return Err("trust domain is empty");
    }
    if trust_domain.contains('@') {
        return Err("user info is not allowed");
    }
    if trust_domain.contains(':') {
        return Err("port is not allowed");
    }
    if trust_domain.len() > MAX_TRUST_DOMAIN_LEN {
        return Err("trust domain exceeds maximum length");
    }
    if !trust_domain
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'_'))
    {
        return Err("trust domain contains invalid characters");
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err("path must not end with '/'");
    }

    // Leading '/' is guaranteed by the split in `parse`.
    for segment in path[1..].split('/') {
        if segment.is_empty() {
            return Err("path contains an empty segment");
        }
        if segment == "." || segment == ".." {
            return Err("path contains a dot segment");
        }
        if !segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
        {
            return Err("path contains invalid characters");
        }
    }
    Ok(())
}
