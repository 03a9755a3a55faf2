//! Builds header views from decoded HPACK field lists.

use std::marker::PhantomData;

use bytes::Bytes;
use tracing::{debug, trace};

use super::view::{HeaderSlots, HeaderView, Http2Headers, NoSlots, RequestSlots};
use super::HeaderError;
use crate::config::HeaderDecoderConfig;

/// Per-field overhead counted toward the header list size (RFC 7540 §6.5.2).
const HEADER_ENTRY_OVERHEAD: u64 = 32;

const GUESS_WEIGHT_NEW: f32 = 0.2;
const GUESS_WEIGHT_HISTORICAL: f32 = 0.8;

/// Header block decoder producing views with slot layout `S`.
///
/// One decoder serves one connection. It remembers roughly how many headers
/// recent blocks carried so new views rarely need to grow.
#[derive(Debug, Clone)]
pub struct HeadersDecoder<S> {
    max_header_list_size: u64,
    headers_guess: f32,
    _slots: PhantomData<fn() -> S>,
}

/// Decodes request header blocks on the server side.
pub type ServerHeadersDecoder = HeadersDecoder<RequestSlots>;

/// Decodes response header blocks on the client side.
pub type ClientHeadersDecoder = HeadersDecoder<NoSlots>;

impl<S: HeaderSlots> Default for HeadersDecoder<S> {
    fn default() -> Self {
        Self::new(&HeaderDecoderConfig::default())
    }
}

impl<S: HeaderSlots> HeadersDecoder<S> {
    pub fn new(config: &HeaderDecoderConfig) -> Self {
        let max_entries = max_entries(config.max_header_list_size);
        Self {
            max_header_list_size: config.max_header_list_size,
            headers_guess: config.initial_headers_guess.clamp(1, max_entries) as f32,
            _slots: PhantomData,
        }
    }

    pub fn max_header_list_size(&self) -> u64 {
        self.max_header_list_size
    }

    /// Apply a new limit, e.g. after the local SETTINGS change.
    pub fn set_max_header_list_size(&mut self, max: u64) {
        self.max_header_list_size = max;
    }

    /// Initial table capacity given to the next view.
    pub fn headers_guess(&self) -> usize {
        (self.headers_guess as usize).clamp(1, max_entries(self.max_header_list_size))
    }

    /// Build a view from one header block's fields.
    ///
    /// Fails on the first protocol violation or as soon as the running
    /// header list size exceeds the limit.
    pub fn decode<I, N, V>(&mut self, fields: I) -> Result<HeaderView<S>, HeaderError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<Bytes>,
        V: Into<Bytes>,
    {
        let mut headers = HeaderView::<S>::with_capacity(self.headers_guess());
        let count = fill(&mut headers, fields, self.max_header_list_size)?;

        // Track stored entries: a `-bin` field expands to one per segment.
        let entries = headers.size();
        self.headers_guess =
            GUESS_WEIGHT_NEW * entries as f32 + GUESS_WEIGHT_HISTORICAL * self.headers_guess;
        trace!(
            fields = count,
            entries = entries,
            headers_guess = self.headers_guess(),
            "Decoded header block"
        );

        Ok(headers)
    }
}

/// Most entries a block within `limit` can carry.
fn max_entries(limit: u64) -> usize {
    usize::try_from(limit / HEADER_ENTRY_OVERHEAD)
        .unwrap_or(usize::MAX)
        .max(1)
}

/// Add every field to `headers`, enforcing `limit`. Returns the field count.
fn fill<H, I, N, V>(headers: &mut H, fields: I, limit: u64) -> Result<usize, HeaderError>
where
    H: Http2Headers,
    I: IntoIterator<Item = (N, V)>,
    N: Into<Bytes>,
    V: Into<Bytes>,
{
    let mut size: u64 = 0;
    let mut count = 0;

    for (name, value) in fields {
        let name = name.into();
        let value = value.into();

        size = size
            .saturating_add(name.len() as u64)
            .saturating_add(value.len() as u64)
            .saturating_add(HEADER_ENTRY_OVERHEAD);
        if size > limit {
            debug!(size = size, limit = limit, "Header list size exceeded");
            return Err(HeaderError::HeaderListTooLarge { size, limit });
        }

        headers.add(name, value)?;
        count += 1;
    }

    Ok(count)
}
