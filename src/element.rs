//! Container elements ("files") and their header blocks.
//!
//! An element header block is a 20-byte record followed by the element name:
//!
//! | Offset | Size | Field                          |
//! |--------|------|--------------------------------|
//! | 0      | 8    | creation time (LE ticks)       |
//! | 8      | 8    | modification time (LE ticks)   |
//! | 16     | 4    | format version (LE)            |
//! | 20     | ..   | name, UTF-16LE, NUL padded     |
//!
//! Ticks are units of 100 µs since 0001-01-01 00:00:00.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek};

use crate::container::{Container, ElementStream};
use crate::error::Result;
use crate::format::{ElementAddress, FormatError};

pub const ELEMENT_HEADER_LEN: usize = 20;

/// Microseconds per stored tick (×1000 to 100 ns ticks).
const MICROS_PER_TICK: i64 = 100;

/// One named entry of a container.
///
/// Equality and hashing use the name only, case-insensitively.  Comparing
/// elements taken from two different containers is meaningless.
#[derive(Debug, Clone, Serialize)]
pub struct Element {
    name:           String,
    created:        NaiveDateTime,
    modified:       NaiveDateTime,
    version:        u32,
    header_address: u64,
    data_address:   u64,
}

impl Element {
    /// Decode a fully materialised header block.
    pub fn decode(block: &[u8], address: &ElementAddress) -> std::result::Result<Self, FormatError> {
        if block.len() < ELEMENT_HEADER_LEN {
            return Err(FormatError::Truncated {
                what:     "element header",
                expected: ELEMENT_HEADER_LEN,
                got:      block.len(),
            });
        }
        let created  = ticks_to_datetime(LittleEndian::read_u64(&block[0..8]))?;
        let modified = ticks_to_datetime(LittleEndian::read_u64(&block[8..16]))?;
        let version  = LittleEndian::read_u32(&block[16..20]);

        Ok(Self {
            name: decode_name(&block[ELEMENT_HEADER_LEN..]),
            created,
            modified,
            version,
            header_address: address.header_address,
            data_address:   address.data_address,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created(&self) -> NaiveDateTime {
        self.created
    }

    pub fn modified(&self) -> NaiveDateTime {
        self.modified
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn header_address(&self) -> u64 {
        self.header_address
    }

    /// Logical address of the data chain; 0 or the sentinel when empty.
    pub fn data_address(&self) -> u64 {
        self.data_address
    }

    /// Shorthand for [`Container::open_stream`].
    pub fn open<'c, S: Read + Seek>(
        &self,
        container: &'c Container<S>,
        force_decompression: bool,
    ) -> Result<ElementStream<'c, S>> {
        container.open_stream(self, force_decompression)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.name.to_lowercase() == other.name.to_lowercase()
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_lowercase().hash(state);
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// UTF-16LE code units, trailing NULs trimmed.  An odd trailing byte is
/// ignored and unpaired surrogates become U+FFFD.
fn decode_name(bytes: &[u8]) -> String {
    let units = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]));
    let name: String = char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    name.trim_end_matches('\0').to_owned()
}

// ── Timestamps ───────────────────────────────────────────────────────────────

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

pub fn ticks_to_datetime(ticks: u64) -> std::result::Result<NaiveDateTime, FormatError> {
    i64::try_from(ticks)
        .ok()
        .and_then(|t| t.checked_mul(MICROS_PER_TICK))
        .and_then(|us| epoch().checked_add_signed(Duration::microseconds(us)))
        .ok_or(FormatError::TimestampOutOfRange(ticks))
}

/// Inverse of [`ticks_to_datetime`], truncating below one tick.
pub fn datetime_to_ticks(at: NaiveDateTime) -> Option<u64> {
    let micros = at.signed_duration_since(epoch()).num_microseconds()?;
    u64::try_from(micros / MICROS_PER_TICK).ok()
}
