//! Sequential reader over a block chain.
//!
//! [`BlockChainReader`] starts at a block header and presents the payload
//! of every page in the chain as one forward-only byte stream.  Pages are
//! loaded one at a time; following `next page` seeks the shared source, so
//! nothing else may move the source cursor while a reader is alive.
//!
//! # Page length
//! Every page contributes `min(first header's data size, this header's page
//! size)` bytes.  The data size of later headers is ignored.  This is what
//! the platform's own reader does, including for chains whose last page is
//! not full.
//!
//! # Short reads
//! A chain that ends (sentinel) before the declared size is reached simply
//! stops producing bytes.  Bytes a page declares but the source cannot
//! supply are delivered as zeros.  Neither case is an error.

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{debug, trace, warn};

use super::probe::{self, Classification};
use super::BlockHeader;
use crate::error::Result;
use crate::format::{AddressFormat, FormatError};

/// Largest page (and largest whole block) held in memory: 2 GiB - 1.
pub const MAX_PAGE_LEN: u64 = i32::MAX as u64;

// ── Page ─────────────────────────────────────────────────────────────────────

/// One page worth of payload.  `data` may be shorter than `len` when the
/// source ran out; the gap reads as zeros.
#[derive(Debug, Default)]
struct Page {
    data:   Vec<u8>,
    len:    usize,
    offset: usize,
}

impl Page {
    fn load<R: Read>(source: &mut R, len: usize) -> io::Result<Self> {
        let mut data = Vec::new();
        source.by_ref().take(len as u64).read_to_end(&mut data)?;
        if data.len() < len {
            debug!(declared = len, available = data.len(), "page truncated by end of source");
        }
        Ok(Self { data, len, offset: 0 })
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.len - self.offset
    }

    fn copy_to(&mut self, out: &mut [u8]) -> usize {
        let n   = out.len().min(self.remaining());
        let end = self.offset + n;

        let present_end = end.min(self.data.len());
        let present = present_end.saturating_sub(self.offset);
        if present > 0 {
            out[..present].copy_from_slice(&self.data[self.offset..present_end]);
        }
        out[present..n].fill(0);

        self.offset = end;
        n
    }
}

fn page_len(declared: u64, page_size: u64) -> std::result::Result<usize, FormatError> {
    let len = declared.min(page_size);
    if len > MAX_PAGE_LEN {
        return Err(FormatError::PageTooLarge(len));
    }
    Ok(len as usize)
}

// ── BlockChainReader ─────────────────────────────────────────────────────────

pub struct BlockChainReader<R> {
    source:         R,
    format:         AddressFormat,
    first:          BlockHeader,
    current:        BlockHeader,
    /// Physical position of the first header, and of its payload.
    origin:         u64,
    start:          u64,
    page:           Page,
    position:       u64,
    exhausted:      bool,
    visited:        HashSet<u64>,
    classification: Classification,
}

impl<R: Read + Seek> BlockChainReader<R> {
    /// Open the chain whose header is at the source's current position and
    /// classify its first page (see [`probe::classify`]).
    pub fn new(source: R, format: AddressFormat) -> Result<Self> {
        let mut reader = Self::without_probe(source, format)?;
        let complete = reader.first.is_last(format) || reader.page.len as u64 >= reader.first.data_size;
        reader.classification = probe::classify(&reader.page.data, complete);
        trace!(classification = ?reader.classification, len = reader.len(), "block chain opened");
        Ok(reader)
    }

    /// Open the chain without classifying it.  Used for structural blocks
    /// (address tables, element headers) whose contents are never nested
    /// containers.
    pub fn without_probe(mut source: R, format: AddressFormat) -> Result<Self> {
        let origin = source.stream_position()?;
        let first  = format.read_block_header(&mut source)?;
        let start  = source.stream_position()?;
        let page   = Page::load(&mut source, page_len(first.data_size, first.page_size)?)?;

        Ok(Self {
            source,
            format,
            first,
            current: first,
            origin,
            start,
            page,
            position: 0,
            exhausted: false,
            visited: HashSet::from([origin]),
            classification: Classification::default(),
        })
    }

    /// Declared size of the whole chain, taken from the first header.
    #[inline]
    pub fn len(&self) -> u64 {
        self.first.data_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes delivered so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn format(&self) -> AddressFormat {
        self.format
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// First page inflates as raw deflate.
    pub fn is_packed(&self) -> bool {
        self.classification.is_packed
    }

    /// First page (inflated if packed) parses as a container.
    pub fn is_container(&self) -> bool {
        self.classification.is_container
    }

    /// Rewind to the first page without re-reading the first header.
    pub fn reset(&mut self) -> Result<()> {
        self.source.seek(SeekFrom::Start(self.start))?;
        self.current   = self.first;
        self.page      = Page::load(&mut self.source, page_len(self.first.data_size, self.first.page_size)?)?;
        self.position  = 0;
        self.exhausted = false;
        self.visited.clear();
        self.visited.insert(self.origin);
        Ok(())
    }

    /// Drain the chain into a buffer of exactly the declared size.
    /// A chain that ends early leaves the tail zeroed.
    pub fn read_block(mut self) -> Result<Vec<u8>> {
        let declared = self.len();
        if declared > MAX_PAGE_LEN {
            return Err(FormatError::PageTooLarge(declared).into());
        }
        let mut buf = vec![0u8; declared as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match self.fill(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled < buf.len() {
            debug!(declared, delivered = filled, "block chain ended before its declared size");
        }
        Ok(buf)
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn fill(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut read = 0;
        while read < out.len() && !self.exhausted {
            if self.page.remaining() == 0 {
                // Hand back what was already copied; the error repeats on the next call.
                match self.advance() {
                    Ok(()) => continue,
                    Err(e) if read == 0 => return Err(e),
                    Err(_) => break,
                }
            }
            read += self.page.copy_to(&mut out[read..]);
        }
        self.position += read as u64;
        Ok(read)
    }

    /// Load the next page, or mark the stream exhausted at the end of the
    /// chain.  A page address seen before in this chain also ends it.
    fn advance(&mut self) -> Result<()> {
        let next = self.current.next_page;
        if self.current.is_last(self.format) {
            self.exhausted = true;
            return Ok(());
        }

        let physical = self.format.physical_offset(next)?;
        if self.visited.contains(&physical) {
            warn!(address = next, "block chain loops back on itself; treating as end of chain");
            self.exhausted = true;
            return Ok(());
        }

        trace!(address = next, "following block chain");
        self.format.seek(&mut self.source, next)?;
        let header = self.format.read_block_header(&mut self.source)?;
        self.page    = Page::load(&mut self.source, page_len(self.first.data_size, header.page_size)?)?;
        self.current = header;
        self.visited.insert(physical);
        Ok(())
    }
}

impl<R: Read + Seek> Read for BlockChainReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf).map_err(io::Error::from)
    }
}

/// Read the whole block chain at the source's current position.
pub fn read_data_block<R: Read + Seek>(source: R, format: AddressFormat) -> Result<Vec<u8>> {
    BlockChainReader::without_probe(source, format)?.read_block()
}
