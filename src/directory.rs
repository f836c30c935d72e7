//! Root structure of a container: header plus element address table.
//!
//! Nothing in the file identifies its address width, so resolution is a
//! trial: parse as [`AddressFormat::Wide`], and if any structural check
//! fails, start over as [`AddressFormat::Narrow`].  A failed attempt leaves
//! no state behind; only the source cursor moves.

use std::io::{Read, Seek};
use tracing::{debug, trace};

use crate::block::read_data_block;
use crate::error::{Error, Result};
use crate::format::{AddressFormat, ContainerHeader, ElementAddress, FormatError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDirectory {
    format:   AddressFormat,
    header:   ContainerHeader,
    elements: Vec<ElementAddress>,
}

impl ContainerDirectory {
    /// Try every variant in [`AddressFormat::TRIAL_ORDER`].
    ///
    /// `Ok(None)` means "not a container".  Format errors are part of the
    /// trial and never escape; I/O errors do.
    pub fn resolve<S: Read + Seek + ?Sized>(source: &mut S) -> Result<Option<Self>> {
        for format in AddressFormat::TRIAL_ORDER {
            match Self::parse(source, format) {
                Ok(directory) => {
                    debug!(%format, elements = directory.elements.len(), "container directory resolved");
                    return Ok(Some(directory));
                }
                Err(Error::Format(err)) => {
                    trace!(%format, %err, "container directory does not match");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Parse the directory assuming a known variant.
    pub fn parse<S: Read + Seek + ?Sized>(source: &mut S, format: AddressFormat) -> Result<Self> {
        format.seek(source, 0)?;
        let header = format.read_container_header(source)?;
        if header.page_size == 0 {
            return Err(FormatError::ZeroPageSize.into());
        }

        // The address table is the block chain right after the header.
        let table = read_data_block(&mut *source, format)?;
        let elements = decode_address_table(&table, format);

        Ok(Self { format, header, elements })
    }

    pub fn format(&self) -> AddressFormat {
        self.format
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn elements(&self) -> &[ElementAddress] {
        &self.elements
    }
}

/// Back-to-back records until one fails to decode or names no header.
fn decode_address_table(table: &[u8], format: AddressFormat) -> Vec<ElementAddress> {
    let mut rdr = table;
    let mut elements = Vec::with_capacity(table.len() / format.element_address_len());
    while let Ok(address) = format.read_element_address(&mut rdr) {
        if format.is_null_address(address.header_address) {
            break;
        }
        elements.push(address);
    }
    elements
}
