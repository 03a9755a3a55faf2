//! Inbound HTTP/2 header blocks.
//!
//! Headers arrive from the HPACK layer one field at a time and are stored in
//! a flat slot table tuned for the handful of headers an RPC carries. Request
//! views hoist the pseudo-headers dispatch needs into dedicated slots;
//! response views keep everything in the table.

mod decoder;
mod table;
mod view;

use thiserror::Error;

pub use decoder::{ClientHeadersDecoder, HeadersDecoder, ServerHeadersDecoder};
pub use table::HeaderTable;
pub use view::{
    HeaderSlots, HeaderView, Http2Headers, NoSlots, RequestHeaders, RequestSlots, ResponseHeaders,
};

/// Names ending with this suffix carry base64-encoded binary values.
pub const BINARY_HEADER_SUFFIX: &[u8] = b"-bin";

/// Protocol violations found while building a header view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("duplicate {0} header")]
    DuplicatePseudoHeader(String),

    #[error("illegal pseudo-header '{0}' in request")]
    IllegalPseudoHeader(String),

    #[error("invalid binary value for header '{name}': {reason}")]
    InvalidBinaryValue { name: String, reason: String },

    #[error("header list size {size} exceeds limit of {limit} bytes")]
    HeaderListTooLarge { size: u64, limit: u64 },
}

impl HeaderError {
    /// Returns true if the violation must tear down the whole connection
    /// rather than the stream it arrived on.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, HeaderError::HeaderListTooLarge { .. })
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// HTTP/2 field names must be lower case.
pub(crate) fn validate_name(name: &[u8]) -> Result<(), HeaderError> {
    if name.iter().any(u8::is_ascii_uppercase) {
        return Err(HeaderError::InvalidHeaderName(lossy(name)));
    }
    Ok(())
}

pub(crate) fn is_pseudo_header(name: &[u8]) -> bool {
    name.first() == Some(&b':')
}

pub(crate) fn is_binary_header(name: &[u8]) -> bool {
    name.ends_with(BINARY_HEADER_SUFFIX)
}
