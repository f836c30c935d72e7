//! Address-width variants of the V8 container layout.
//!
//! Two revisions of the format exist and nothing in the file says which one
//! it is:
//!
//! | Variant  | Field width | Sentinel                | Seek correction |
//! |----------|-------------|-------------------------|-----------------|
//! | `Narrow` | 4 bytes     | `0x7FFF_FFFF`           | none            |
//! | `Wide`   | 8 bytes     | `0xFFFF_FFFF_FFFF_FFFF` | `+0x1359`       |
//!
//! Every logical address stored in a Wide container is shifted by
//! [`WIDE_SEEK_OFFSET`] before it becomes a file position.  The constant is
//! opaque; it is simply what that revision of the platform writes.
//!
//! # Endianness
//! All binary fields are little-endian.  Block headers are ASCII hex and are
//! handled in [`crate::block`].

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;

use crate::block::BlockHeader;
use crate::error::Result;

pub const NARROW_SENTINEL: u64 = 0x7FFF_FFFF;
pub const WIDE_SENTINEL: u64 = u64::MAX;
pub const WIDE_SEEK_OFFSET: u64 = 0x1359;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Truncated {what}: expected {expected} bytes, got {got}")]
    Truncated { what: &'static str, expected: usize, got: usize },
    #[error("Unexpected byte 0x{found:02x} at block header offset {offset} (expected 0x{expected:02x})")]
    UnexpectedByte { offset: usize, expected: u8, found: u8 },
    #[error("Invalid hex field in block header: {0:?}")]
    InvalidHex(String),
    #[error("Page of {0} bytes exceeds the in-memory page limit")]
    PageTooLarge(u64),
    #[error("Address 0x{0:x} overflows after seek correction")]
    AddressOverflow(u64),
    #[error("Container header declares a zero page size")]
    ZeroPageSize,
    #[error("Timestamp {0} is outside the representable range")]
    TimestampOutOfRange(u64),
}

// ── Root structures ──────────────────────────────────────────────────────────

/// Fixed header at logical offset 0.
///
/// The free-page address is the only field that widens in the 64-bit
/// layout; the remaining three stay 32-bit in both variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerHeader {
    pub free_page_address: u64,
    pub page_size:         u32,
    pub storage_version:   u32,
    pub reserved:          u32,
}

/// One record of the element address table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementAddress {
    pub header_address: u64,
    pub data_address:   u64,
    /// Format-internal marker, carried through uninterpreted.
    pub signature:      u64,
}

// ── AddressFormat ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    /// 32-bit addresses.
    Narrow,
    /// 64-bit addresses with seek correction.
    Wide,
}

impl AddressFormat {
    /// Order in which [`crate::directory::ContainerDirectory::resolve`] tries
    /// the variants.
    pub const TRIAL_ORDER: [AddressFormat; 2] = [AddressFormat::Wide, AddressFormat::Narrow];

    #[inline]
    pub const fn field_width(self) -> usize {
        match self {
            AddressFormat::Narrow => 4,
            AddressFormat::Wide   => 8,
        }
    }

    /// "No further block" / "no data" marker.
    #[inline]
    pub const fn sentinel(self) -> u64 {
        match self {
            AddressFormat::Narrow => NARROW_SENTINEL,
            AddressFormat::Wide   => WIDE_SENTINEL,
        }
    }

    #[inline]
    pub const fn seek_offset(self) -> u64 {
        match self {
            AddressFormat::Narrow => 0,
            AddressFormat::Wide   => WIDE_SEEK_OFFSET,
        }
    }

    pub const fn container_header_len(self) -> usize {
        match self {
            AddressFormat::Narrow => 16,
            AddressFormat::Wide   => 20,
        }
    }

    pub const fn element_address_len(self) -> usize {
        3 * self.field_width()
    }

    /// `\r\n` + three space-terminated hex fields + `\r\n`.
    pub const fn block_header_len(self) -> usize {
        2 + 3 * (2 * self.field_width() + 1) + 2
    }

    /// True for the two values that mean "nothing here": 0 and the sentinel.
    #[inline]
    pub fn is_null_address(self, address: u64) -> bool {
        address == 0 || address == self.sentinel()
    }

    pub fn name(self) -> &'static str {
        match self {
            AddressFormat::Narrow => "32-bit",
            AddressFormat::Wide   => "64-bit",
        }
    }

    /// Physical file position of a logical address.
    pub fn physical_offset(self, address: u64) -> std::result::Result<u64, FormatError> {
        address
            .checked_add(self.seek_offset())
            .ok_or(FormatError::AddressOverflow(address))
    }

    pub fn seek<S: Seek + ?Sized>(self, source: &mut S, address: u64) -> Result<u64> {
        let target = self.physical_offset(address)?;
        Ok(source.seek(SeekFrom::Start(target))?)
    }

    // ── Decoders ────────────────────────────────────────────────────────────

    pub fn read_container_header<R: Read + ?Sized>(self, source: &mut R) -> Result<ContainerHeader> {
        let mut buf = [0u8; 20];
        let buf = &mut buf[..self.container_header_len()];
        read_fixed(source, buf, "container header")?;

        let mut rdr = &buf[..];
        let free_page_address = self.read_field(&mut rdr)?;
        Ok(ContainerHeader {
            free_page_address,
            page_size:       rdr.read_u32::<LittleEndian>()?,
            storage_version: rdr.read_u32::<LittleEndian>()?,
            reserved:        rdr.read_u32::<LittleEndian>()?,
        })
    }

    pub fn read_element_address<R: Read + ?Sized>(self, source: &mut R) -> Result<ElementAddress> {
        let mut buf = [0u8; 24];
        let buf = &mut buf[..self.element_address_len()];
        read_fixed(source, buf, "element address")?;

        let mut rdr = &buf[..];
        Ok(ElementAddress {
            header_address: self.read_field(&mut rdr)?,
            data_address:   self.read_field(&mut rdr)?,
            signature:      self.read_field(&mut rdr)?,
        })
    }

    pub fn read_block_header<R: Read + ?Sized>(self, source: &mut R) -> Result<BlockHeader> {
        let mut buf = [0u8; 55];
        let buf = &mut buf[..self.block_header_len()];
        read_fixed(source, buf, "block header")?;
        Ok(BlockHeader::parse(self, buf)?)
    }

    fn read_field(self, rdr: &mut &[u8]) -> io::Result<u64> {
        match self {
            AddressFormat::Narrow => rdr.read_u32::<LittleEndian>().map(u64::from),
            AddressFormat::Wide   => rdr.read_u64::<LittleEndian>(),
        }
    }
}

impl fmt::Display for AddressFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fill `buf` completely or fail with [`FormatError::Truncated`].
/// Real I/O errors pass through untouched.
pub(crate) fn read_fixed<R: Read + ?Sized>(source: &mut R, buf: &mut [u8], what: &'static str) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(FormatError::Truncated { what, expected: buf.len(), got: filled }.into());
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
