//! String matching for subject alternative names.
//!
//! Provides the five matching strategies of a validation context:
//! - Exact match
//! - Prefix match
//! - Suffix match
//! - Substring match
//! - Anchored regex match
//!
//! Case folding is ASCII only and locale independent.

use regex::{Regex, RegexBuilder};
use tracing::trace;

use crate::config::{ConfigError, StringMatcherConfig};

/// A compiled string matcher.
#[derive(Debug, Clone)]
pub struct StringMatcher {
    pattern: MatchPattern,
    ignore_case: bool,
}

#[derive(Debug, Clone)]
enum MatchPattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    SafeRegex(CompiledPattern),
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    regex: Regex,
    original: String,
}

impl StringMatcher {
    /// Compile a matcher from its configuration.
    ///
    /// Fails if the configuration does not name exactly one pattern, or if
    /// the regex does not compile.
    pub fn new(config: &StringMatcherConfig) -> Result<Self, ConfigError> {
        let set = config.set_patterns();
        if set.len() > 1 {
            return Err(ConfigError::MultipleMatchPatterns(set.join(", ")));
        }

        let pattern = if let Some(exact) = &config.exact {
            MatchPattern::Exact(exact.clone())
        } else if let Some(prefix) = &config.prefix {
            MatchPattern::Prefix(prefix.clone())
        } else if let Some(suffix) = &config.suffix {
            MatchPattern::Suffix(suffix.clone())
        } else if let Some(contains) = &config.contains {
            MatchPattern::Contains(contains.clone())
        } else if let Some(regex) = &config.safe_regex {
            MatchPattern::SafeRegex(compile_anchored(regex, config.ignore_case)?)
        } else {
            return Err(ConfigError::NoMatchPattern);
        };

        Ok(Self {
            pattern,
            ignore_case: config.ignore_case,
        })
    }

    /// Compile a list of matchers, preserving order.
    pub fn compile_all<'a>(
        configs: impl IntoIterator<Item = &'a StringMatcherConfig>,
    ) -> Result<Vec<Self>, ConfigError> {
        configs.into_iter().map(Self::new).collect()
    }

    /// Check a candidate against this matcher.
    ///
    /// An empty candidate never matches, and neither does an empty pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }

        let matched = match &self.pattern {
            MatchPattern::Exact(exact) => {
                !exact.is_empty()
                    && if self.ignore_case {
                        exact.eq_ignore_ascii_case(candidate)
                    } else {
                        exact == candidate
                    }
            }
            MatchPattern::Prefix(prefix) => {
                !prefix.is_empty()
                    && if self.ignore_case {
                        candidate.len() >= prefix.len()
                            && candidate.as_bytes()[..prefix.len()]
                                .eq_ignore_ascii_case(prefix.as_bytes())
                    } else {
                        candidate.starts_with(prefix.as_str())
                    }
            }
            MatchPattern::Suffix(suffix) => {
                !suffix.is_empty()
                    && if self.ignore_case {
                        candidate.len() >= suffix.len()
                            && candidate.as_bytes()[candidate.len() - suffix.len()..]
                                .eq_ignore_ascii_case(suffix.as_bytes())
                    } else {
                        candidate.ends_with(suffix.as_str())
                    }
            }
            MatchPattern::Contains(needle) => {
                !needle.is_empty()
                    && if self.ignore_case {
                        candidate
                            .to_ascii_lowercase()
                            .contains(&needle.to_ascii_lowercase())
                    } else {
                        candidate.contains(needle.as_str())
                    }
            }
            MatchPattern::SafeRegex(compiled) => compiled.regex.is_match(candidate),
        };

        trace!(
            candidate = %candidate,
            pattern = %self,
            matched = matched,
            "Evaluated string matcher"
        );
        matched
    }

    /// Returns true if any matcher in `matchers` accepts `candidate`.
    pub fn any_matches(matchers: &[Self], candidate: &str) -> bool {
        matchers.iter().any(|m| m.matches(candidate))
    }

    /// The kind of pattern this matcher applies.
    pub fn kind(&self) -> MatchKind {
        match self.pattern {
            MatchPattern::Exact(_) => MatchKind::Exact,
            MatchPattern::Prefix(_) => MatchKind::Prefix,
            MatchPattern::Suffix(_) => MatchKind::Suffix,
            MatchPattern::Contains(_) => MatchKind::Contains,
            MatchPattern::SafeRegex(_) => MatchKind::SafeRegex,
        }
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }
}

/// Compile a regex that must match the whole candidate.
fn compile_anchored(pattern: &str, ignore_case: bool) -> Result<CompiledPattern, ConfigError> {
    let regex = RegexBuilder::new(&format!(r"\A(?:{})\z", pattern))
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;

    Ok(CompiledPattern {
        regex,
        original: pattern.to_string(),
    })
}

/// Kind of string match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
    Suffix,
    Contains,
    SafeRegex,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::Exact => write!(f, "exact"),
            MatchKind::Prefix => write!(f, "prefix"),
            MatchKind::Suffix => write!(f, "suffix"),
            MatchKind::Contains => write!(f, "contains"),
            MatchKind::SafeRegex => write!(f, "safe_regex"),
        }
    }
}

impl std::fmt::Display for StringMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pattern = match &self.pattern {
            MatchPattern::Exact(p)
            | MatchPattern::Prefix(p)
            | MatchPattern::Suffix(p)
            | MatchPattern::Contains(p) => p.as_str(),
            MatchPattern::SafeRegex(compiled) => compiled.original.as_str(),
        };
        write!(f, "{}:{}", self.kind(), pattern)?;
        if self.ignore_case {
            write!(f, " (ignore case)")?;
        }
        Ok(())
    }
}
