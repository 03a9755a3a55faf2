//! SPIFFE identity support.
//!
//! This module provides:
//! - SPIFFE ID parsing and validation
//! - SPIFFE ID extraction from the peer leaf certificate

mod extract;
mod id;

pub use extract::{extract_spiffe_id, SpiffeIdExtractor, X509SpiffeIdExtractor};
pub use id::SpiffeId;
