//! Request and response header views.
//!
//! Both views are a [`HeaderTable`] composed with a set of dedicated slots.
//! Requests hoist `:path`, `:authority`, `:method`, `:scheme` and `te` out of
//! the table; responses keep every header, `:status` included, in the table.

use std::fmt;

use bytes::Bytes;

use super::table::HeaderTable;
use super::{is_pseudo_header, lossy, validate_name, HeaderError};

/// Uniform access to a header block, whatever its storage layout.
pub trait Http2Headers {
    fn add(&mut self, name: Bytes, value: Bytes) -> Result<(), HeaderError>;

    fn get(&self, name: &[u8]) -> Option<&Bytes>;

    fn get_all(&self, name: &[u8]) -> Vec<&Bytes>;

    fn remove(&mut self, name: &[u8]) -> bool;

    fn size(&self) -> usize;
}

/// Dedicated header slots kept outside the table.
pub trait HeaderSlots: Default + Clone + fmt::Debug {
    /// Name used when rendering the view.
    const VIEW_NAME: &'static str;

    /// Whether pseudo-headers must land in a slot. When true, a pseudo-header
    /// with no slot is rejected.
    const HOISTS_PSEUDO_HEADERS: bool;

    /// The slot for `name`, if it is hoisted.
    fn slot(&self, name: &[u8]) -> Option<&Option<Bytes>>;

    fn slot_mut(&mut self, name: &[u8]) -> Option<&mut Option<Bytes>>;

    /// Filled slots as `(name, value)`, in rendering order.
    fn filled(&self) -> Vec<(&'static str, &Bytes)>;

    fn filled_count(&self) -> usize;
}

const PATH: usize = 0;
const AUTHORITY: usize = 1;
const METHOD: usize = 2;
const SCHEME: usize = 3;
const TE: usize = 4;

const REQUEST_SLOT_NAMES: [&str; 5] = [":path", ":authority", ":method", ":scheme", "te"];

/// Slots for the request pseudo-headers and `te`.
#[derive(Debug, Clone, Default)]
pub struct RequestSlots {
    values: [Option<Bytes>; 5],
}

impl RequestSlots {
    fn index(name: &[u8]) -> Option<usize> {
        REQUEST_SLOT_NAMES
            .iter()
            .position(|slot| slot.as_bytes() == name)
    }
}

impl HeaderSlots for RequestSlots {
    const VIEW_NAME: &'static str = "RequestHeaders";
    const HOISTS_PSEUDO_HEADERS: bool = true;

    fn slot(&self, name: &[u8]) -> Option<&Option<Bytes>> {
        Self::index(name).map(|i| &self.values[i])
    }

    fn slot_mut(&mut self, name: &[u8]) -> Option<&mut Option<Bytes>> {
        Self::index(name).map(|i| &mut self.values[i])
    }

    fn filled(&self) -> Vec<(&'static str, &Bytes)> {
        REQUEST_SLOT_NAMES
            .iter()
            .zip(self.values.iter())
            .filter_map(|(name, value)| value.as_ref().map(|v| (*name, v)))
            .collect()
    }

    fn filled_count(&self) -> usize {
        self.values.iter().flatten().count()
    }
}

/// No dedicated slots; every header goes to the table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSlots;

impl HeaderSlots for NoSlots {
    const VIEW_NAME: &'static str = "ResponseHeaders";
    const HOISTS_PSEUDO_HEADERS: bool = false;

    fn slot(&self, _name: &[u8]) -> Option<&Option<Bytes>> {
        None
    }

    fn slot_mut(&mut self, _name: &[u8]) -> Option<&mut Option<Bytes>> {
        None
    }

    fn filled(&self) -> Vec<(&'static str, &Bytes)> {
        Vec::new()
    }

    fn filled_count(&self) -> usize {
        0
    }
}

/// A decoded header block: dedicated slots plus the generic table.
#[derive(Debug, Clone)]
pub struct HeaderView<S> {
    slots: S,
    table: HeaderTable,
}

/// Headers of an inbound request, as seen by a server.
pub type RequestHeaders = HeaderView<RequestSlots>;

/// Headers of an inbound response, as seen by a client.
pub type ResponseHeaders = HeaderView<NoSlots>;

impl<S: HeaderSlots> Default for HeaderView<S> {
    fn default() -> Self {
        Self::with_capacity(1)
    }
}

impl<S: HeaderSlots> HeaderView<S> {
    /// Create an empty view whose table is sized for `guess` entries.
    pub fn with_capacity(guess: usize) -> Self {
        Self {
            slots: S::default(),
            table: HeaderTable::with_capacity(guess),
        }
    }

    /// Add a header, routing hoisted names to their slot.
    pub fn add(
        &mut self,
        name: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<&mut Self, HeaderError> {
        let name = name.into();
        let value = value.into();
        validate_name(&name)?;

        if S::HOISTS_PSEUDO_HEADERS && is_pseudo_header(&name) {
            let slot = self
                .slots
                .slot_mut(&name)
                .ok_or_else(|| HeaderError::IllegalPseudoHeader(lossy(&name)))?;
            if slot.is_some() {
                return Err(HeaderError::DuplicatePseudoHeader(lossy(&name)));
            }
            *slot = Some(value);
            return Ok(self);
        }

        // `te` is not a pseudo-header; a later value replaces an earlier one.
        if let Some(slot) = self.slots.slot_mut(&name) {
            *slot = Some(value);
            return Ok(self);
        }

        self.table.add(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &[u8]) -> Option<&Bytes> {
        match self.slots.slot(name) {
            Some(slot) => slot.as_ref(),
            None => self.table.get(name),
        }
    }

    /// All values of `name`. A hoisted name has at most one.
    pub fn get_all(&self, name: &[u8]) -> Vec<&Bytes> {
        match self.slots.slot(name) {
            Some(slot) => slot.iter().collect(),
            None => self.table.get_all(name),
        }
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &[u8]) -> bool {
        match self.slots.slot_mut(name) {
            Some(slot) => slot.take().is_some(),
            None => self.table.remove(name),
        }
    }

    /// Replace every value of `name` with `value`.
    pub fn set(
        &mut self,
        name: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<&mut Self, HeaderError> {
        let name = name.into();
        validate_name(&name)?;
        self.remove(&name);
        self.add(name, value)
    }

    /// Filled slots plus table entries.
    pub fn size(&self) -> usize {
        self.slots.filled_count() + self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The generic table. Hoisted headers never appear here.
    pub fn table(&self) -> &HeaderTable {
        &self.table
    }

    /// See [`HeaderTable::names_and_values`].
    pub fn names_and_values(&self) -> &[Option<Bytes>] {
        self.table.names_and_values()
    }
}

impl RequestHeaders {
    pub fn path(&self) -> Option<&Bytes> {
        self.slots.values[PATH].as_ref()
    }

    pub fn authority(&self) -> Option<&Bytes> {
        self.slots.values[AUTHORITY].as_ref()
    }

    pub fn method(&self) -> Option<&Bytes> {
        self.slots.values[METHOD].as_ref()
    }

    pub fn scheme(&self) -> Option<&Bytes> {
        self.slots.values[SCHEME].as_ref()
    }

    pub fn te(&self) -> Option<&Bytes> {
        self.slots.values[TE].as_ref()
    }
}

impl ResponseHeaders {
    pub fn status(&self) -> Option<&Bytes> {
        self.table.get(b":status")
    }
}

impl<S: HeaderSlots> Http2Headers for HeaderView<S> {
    fn add(&mut self, name: Bytes, value: Bytes) -> Result<(), HeaderError> {
        HeaderView::add(self, name, value).map(|_| ())
    }

    fn get(&self, name: &[u8]) -> Option<&Bytes> {
        HeaderView::get(self, name)
    }

    fn get_all(&self, name: &[u8]) -> Vec<&Bytes> {
        HeaderView::get_all(self, name)
    }

    fn remove(&mut self, name: &[u8]) -> bool {
        HeaderView::remove(self, name)
    }

    fn size(&self) -> usize {
        HeaderView::size(self)
    }
}

impl<S: HeaderSlots> fmt::Display for HeaderView<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", S::VIEW_NAME)?;

        let slots = self
            .slots
            .filled()
            .into_iter()
            .map(|(name, value)| (name.as_bytes(), &value[..]));
        for (i, (name, value)) in slots.chain(self.table.iter()).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                "{}: {}",
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(value)
            )?;
        }

        f.write_str("]")
    }
}
