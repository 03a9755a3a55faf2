//! Sentinel secure HTTP/2 transport core
//!
//! Peer identity checks and inbound header handling for an RPC channel
//! running over TLS and HTTP/2.
//!
//! # Features
//!
//! - Subject-alternative-name policy (exact, prefix, suffix, contains, regex)
//!   evaluated against the peer's leaf certificate
//! - SPIFFE federation: pick the chain validator by the peer's trust domain
//! - webpki chain validation and rustls verifier adapters
//! - Header views that hoist request pseudo-headers out of the generic table
//!   and expand `-bin` headers
//!
//! # Usage
//!
//! ```
//! use sentinel_h2_transport::headers::ServerHeadersDecoder;
//!
//! let mut decoder = ServerHeadersDecoder::default();
//! let headers = decoder.decode([
//!     (":method", "POST"),
//!     (":path", "/svc/Method"),
//!     ("content-type", "application/grpc"),
//! ])?;
//!
//! assert_eq!(headers.method().map(|m| &m[..]), Some(&b"POST"[..]));
//! assert_eq!(headers.size(), 3);
//! # Ok::<(), sentinel_h2_transport::headers::HeaderError>(())
//! ```

pub mod config;
pub mod headers;
pub mod matcher;
pub mod san;
pub mod spiffe;
pub mod trust;

#[cfg(test)]
mod test_support;

pub use config::{
    CertificateValidationContext, ConfigError, HeaderDecoderConfig, StringMatcherConfig,
    TransportSecurityConfig,
};
pub use headers::{
    ClientHeadersDecoder, HeaderError, Http2Headers, RequestHeaders, ResponseHeaders,
    ServerHeadersDecoder,
};
pub use matcher::StringMatcher;
pub use san::SanVerifier;
pub use spiffe::SpiffeId;
pub use trust::{
    CertificateError, SanClientVerifier, SanServerVerifier, TrustEvaluator, TrustManager,
    WebPkiTrustManager,
};
