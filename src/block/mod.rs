//! Page-chained blocks.
//!
//! Every logical byte stream in a container (the element address table,
//! each element header, each element body) is stored as a chain of blocks.
//! A block is an ASCII header followed by one page of payload:
//!
//! ```text
//! 0D 0A <data size> 20 <page size> 20 <next page> 20 0D 0A <page bytes...>
//! ```
//!
//! Each field is `2 × field_width` hex digits (8 for Narrow, 16 for Wide).
//! The data size of the *first* header is the length of the whole stream;
//! `next page` is a logical address or the variant's sentinel.

pub mod probe;
pub mod reader;

pub use probe::Classification;
pub use reader::{read_data_block, BlockChainReader, MAX_PAGE_LEN};

use crate::format::{AddressFormat, FormatError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub data_size: u64,
    pub page_size: u64,
    pub next_page: u64,
}

impl BlockHeader {
    /// Decode a header from exactly `format.block_header_len()` bytes.
    pub fn parse(format: AddressFormat, raw: &[u8]) -> Result<Self, FormatError> {
        if raw.len() < format.block_header_len() {
            return Err(FormatError::Truncated {
                what:     "block header",
                expected: format.block_header_len(),
                got:      raw.len(),
            });
        }
        let digits = 2 * format.field_width();

        expect_byte(raw, 0, b'\r')?;
        expect_byte(raw, 1, b'\n')?;
        let mut pos = 2;
        let mut fields = [0u64; 3];
        for field in fields.iter_mut() {
            *field = parse_hex(&raw[pos..pos + digits])?;
            pos += digits;
            expect_byte(raw, pos, b' ')?;
            pos += 1;
        }
        expect_byte(raw, pos, b'\r')?;
        expect_byte(raw, pos + 1, b'\n')?;

        let [data_size, page_size, next_page] = fields;
        Ok(Self { data_size, page_size, next_page })
    }

    pub fn is_last(&self, format: AddressFormat) -> bool {
        self.next_page == format.sentinel()
    }
}

fn expect_byte(raw: &[u8], offset: usize, expected: u8) -> Result<(), FormatError> {
    match raw[offset] {
        b if b == expected => Ok(()),
        found => Err(FormatError::UnexpectedByte { offset, expected, found }),
    }
}

/// Big-endian hex digits, either case, at most 16 of them.
fn parse_hex(digits: &[u8]) -> Result<u64, FormatError> {
    let mut be = [0u8; 8];
    let start = be.len() - digits.len() / 2;
    hex::decode_to_slice(digits, &mut be[start..])
        .map_err(|_| FormatError::InvalidHex(String::from_utf8_lossy(digits).into_owned()))?;
    Ok(u64::from_be_bytes(be))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_narrow_header() {
        let raw = b"\r\n0000000a 00000200 7fffffff \r\n";
        let h = BlockHeader::parse(AddressFormat::Narrow, raw).unwrap();
        assert_eq!(h, BlockHeader { data_size: 10, page_size: 512, next_page: 0x7FFF_FFFF });
        assert!(h.is_last(AddressFormat::Narrow));
    }

    #[test]
    fn parses_wide_header_in_upper_case() {
        let raw = b"\r\n00000000000001A0 0000000000000200 FFFFFFFFFFFFFFFF \r\n";
        let h = BlockHeader::parse(AddressFormat::Wide, raw).unwrap();
        assert_eq!(h.data_size, 0x1A0);
        assert_eq!(h.page_size, 0x200);
        assert!(h.is_last(AddressFormat::Wide));
    }

    #[test]
    fn narrow_sentinel_is_not_wide_sentinel() {
        let raw = b"\r\n0000000000000010 0000000000000010 000000007fffffff \r\n";
        let h = BlockHeader::parse(AddressFormat::Wide, raw).unwrap();
        assert!(!h.is_last(AddressFormat::Wide));
    }

    #[test]
    fn rejects_missing_separator() {
        let raw = b"\r\n0000000a_00000200 7fffffff \r\n";
        assert_eq!(
            BlockHeader::parse(AddressFormat::Narrow, raw),
            Err(FormatError::UnexpectedByte { offset: 10, expected: b' ', found: b'_' })
        );
    }

    #[test]
    fn rejects_bad_line_start() {
        let raw = b"\n\r0000000a 00000200 7fffffff \r\n";
        assert!(matches!(
            BlockHeader::parse(AddressFormat::Narrow, raw),
            Err(FormatError::UnexpectedByte { offset: 0, .. })
        ));
    }

    #[test]
    fn rejects_non_hex_digits() {
        let raw = b"\r\n0000000g 00000200 7fffffff \r\n";
        assert!(matches!(
            BlockHeader::parse(AddressFormat::Narrow, raw),
            Err(FormatError::InvalidHex(_))
        ));
    }

    #[test]
    fn narrow_text_does_not_parse_as_wide() {
        let raw = b"\r\n0000000a 00000200 7fffffff \r\n";
        assert!(BlockHeader::parse(AddressFormat::Wide, raw).is_err());
    }
}
