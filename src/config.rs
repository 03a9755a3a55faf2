//! Configuration types for peer trust evaluation and header decoding.
//!
//! These are the externally loaded inputs: the SAN match list of the
//! certificate validation context and the limits used by the header block
//! decoders. They are compiled into runtime types ([`StringMatcher`],
//! [`SanVerifier`]) once, when an evaluator or decoder is built.
//!
//! [`StringMatcher`]: crate::matcher::StringMatcher
//! [`SanVerifier`]: crate::san::SanVerifier

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while turning configuration into runtime types.
///
/// These are configuration defects, never per-request conditions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("string matcher has no match pattern")]
    NoMatchPattern,

    #[error("string matcher sets more than one match pattern: {0}")]
    MultipleMatchPatterns(String),

    #[error("invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("trust domain '{0}' is configured more than once")]
    DuplicateTrustDomain(String),

    #[error("no trust anchors configured")]
    NoTrustAnchors,

    #[error("invalid trust anchor: {0}")]
    InvalidTrustAnchor(String),

    #[error("failed to build verifier: {0}")]
    VerifierBuild(String),
}

/// Top-level configuration of the transport security core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct TransportSecurityConfig {
    /// Peer certificate validation context.
    #[serde(default)]
    pub validation_context: CertificateValidationContext,

    /// Inbound header decoding limits.
    #[serde(default)]
    pub headers: HeaderDecoderConfig,
}

/// Certificate validation context.
///
/// An empty match list means no SAN check is performed.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct CertificateValidationContext {
    /// SAN matchers, evaluated in order; the first match wins.
    #[serde(default)]
    pub match_subject_alt_names: Vec<StringMatcherConfig>,
}

impl CertificateValidationContext {
    /// Build a context from a list of matcher specifications.
    pub fn new(matchers: impl IntoIterator<Item = StringMatcherConfig>) -> Self {
        Self {
            match_subject_alt_names: matchers.into_iter().collect(),
        }
    }

    /// Returns true if no SAN policy is configured.
    pub fn is_empty(&self) -> bool {
        self.match_subject_alt_names.is_empty()
    }
}

/// One SAN match specification.
///
/// Exactly one of the pattern fields must be set. Leaving all of them unset,
/// or setting several, is rejected when the matcher is compiled.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct StringMatcherConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,

    /// Regular expression, matched against the whole candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_regex: Option<String>,

    /// Compare using ASCII case folding.
    #[serde(default)]
    pub ignore_case: bool,
}

impl StringMatcherConfig {
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            exact: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn prefix(pattern: impl Into<String>) -> Self {
        Self {
            prefix: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn suffix(pattern: impl Into<String>) -> Self {
        Self {
            suffix: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            contains: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn safe_regex(pattern: impl Into<String>) -> Self {
        Self {
            safe_regex: Some(pattern.into()),
            ..Default::default()
        }
    }

    /// Set case-insensitive matching.
    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// Names of the pattern fields that are set, in declaration order.
    pub(crate) fn set_patterns(&self) -> Vec<&'static str> {
        [
            ("exact", self.exact.is_some()),
            ("prefix", self.prefix.is_some()),
            ("suffix", self.suffix.is_some()),
            ("contains", self.contains.is_some()),
            ("safe-regex", self.safe_regex.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

/// Header block decoding limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct HeaderDecoderConfig {
    /// Maximum header list size in bytes, counted as in RFC 7540 §6.5.2.
    #[serde(default = "default_max_header_list_size")]
    pub max_header_list_size: u64,

    /// Initial guess of the number of headers per block. Capped at the
    /// number of entries the list size limit admits.
    #[serde(default = "default_initial_headers_guess")]
    pub initial_headers_guess: usize,
}

impl Default for HeaderDecoderConfig {
    fn default() -> Self {
        Self {
            max_header_list_size: default_max_header_list_size(),
            initial_headers_guess: default_initial_headers_guess(),
        }
    }
}

fn default_max_header_list_size() -> u64 {
    8192 // 8 KiB
}

fn default_initial_headers_guess() -> usize {
    8
}
