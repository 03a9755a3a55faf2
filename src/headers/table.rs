//! Flat slot table backing every header view.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;

use super::{is_binary_header, lossy, validate_name, HeaderError};

/// Standard alphabet; senders may or may not pad.
const BINARY_VALUE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Ordered multimap of raw header names to values.
///
/// Slot `2i` of [`names_and_values`] holds the name of entry `i` and slot
/// `2i + 1` its value, base64-decoded for binary headers. A parallel slot per
/// entry keeps the value as it appeared on the wire. Insertion is amortized
/// O(1); lookups scan linearly and compare names byte for byte.
///
/// [`names_and_values`]: HeaderTable::names_and_values
#[derive(Debug, Clone)]
pub struct HeaderTable {
    names_and_values: Vec<Option<Bytes>>,
    wire_values: Vec<Option<Bytes>>,
    len: usize,
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::with_capacity(1)
    }
}

impl HeaderTable {
    /// Create a table sized for `guess` entries (at least one).
    pub fn with_capacity(guess: usize) -> Self {
        let capacity = guess.max(1);
        Self {
            names_and_values: vec![None; capacity * 2],
            wire_values: vec![None; capacity],
            len: 0,
        }
    }

    /// Append a header.
    ///
    /// A binary header value is split on commas and every segment is stored
    /// as its own entry. All segments are decoded before any is stored, so a
    /// malformed value leaves the table unchanged.
    pub fn add(
        &mut self,
        name: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<&mut Self, HeaderError> {
        let name = name.into();
        let value = value.into();
        validate_name(&name)?;

        if !is_binary_header(&name) {
            self.push(name, value.clone(), value);
            return Ok(self);
        }

        let mut decoded = Vec::new();
        for segment in value.split(|b| *b == b',') {
            let bytes = BINARY_VALUE
                .decode(segment)
                .map_err(|e| HeaderError::InvalidBinaryValue {
                    name: lossy(&name),
                    reason: e.to_string(),
                })?;
            decoded.push((value.slice_ref(segment), Bytes::from(bytes)));
        }
        for (wire, bytes) in decoded {
            self.push(name.clone(), bytes, wire);
        }
        Ok(self)
    }

    fn push(&mut self, name: Bytes, value: Bytes, wire: Bytes) {
        if self.len == self.capacity() {
            self.grow();
        }
        self.names_and_values[self.len * 2] = Some(name);
        self.names_and_values[self.len * 2 + 1] = Some(value);
        self.wire_values[self.len] = Some(wire);
        self.len += 1;
    }

    fn grow(&mut self) {
        let capacity = self.capacity();
        let new_capacity = (capacity + capacity / 2).max(2);
        self.names_and_values.resize(new_capacity * 2, None);
        self.wire_values.resize(new_capacity, None);
    }

    fn name_at(&self, index: usize) -> &[u8] {
        self.names_and_values[index * 2].as_deref().unwrap_or_default()
    }

    fn positions<'a>(&'a self, name: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        (0..self.len).filter(move |&i| self.name_at(i) == name)
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &[u8]) -> Option<&Bytes> {
        self.positions(name)
            .next()
            .and_then(|i| self.names_and_values[i * 2 + 1].as_ref())
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all(&self, name: &[u8]) -> Vec<&Bytes> {
        self.positions(name)
            .filter_map(|i| self.names_and_values[i * 2 + 1].as_ref())
            .collect()
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.positions(name).next().is_some()
    }

    /// Remove every entry named `name`, shifting survivors down in order.
    ///
    /// Returns true if anything was removed. Capacity is kept.
    pub fn remove(&mut self, name: &[u8]) -> bool {
        let Some(first) = self.positions(name).next() else {
            return false;
        };

        let mut dest = first;
        for i in first..self.len {
            if self.name_at(i) == name {
                continue;
            }
            self.names_and_values.swap(dest * 2, i * 2);
            self.names_and_values.swap(dest * 2 + 1, i * 2 + 1);
            self.wire_values.swap(dest, i);
            dest += 1;
        }
        for i in dest..self.len {
            self.names_and_values[i * 2] = None;
            self.names_and_values[i * 2 + 1] = None;
            self.wire_values[i] = None;
        }
        self.len = dest;
        true
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

    /// Entries as `(name, wire value)`, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        (0..self.len).map(move |i| {
            (
                self.name_at(i),
                self.wire_values[i].as_deref().unwrap_or_default(),
            )
        })
    }

    /// The raw slot array. Binary values are already decoded.
    ///
    /// Trailing slots past [`len`](Self::len) entries are `None`.
    pub fn names_and_values(&self) -> &[Option<Bytes>] {
        &self.names_and_values
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of entries the table holds before growing.
    pub fn capacity(&self) -> usize {
        self.wire_values.len()
    }
}
