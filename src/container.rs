//! High-level [`Container`] API.
//!
//! ```no_run
//! use std::io::Read;
//! use v8unpack::Container;
//!
//! let cf = Container::open("1Cv8.cf")?;
//! for element in cf.files() {
//!     let element = element?;
//!     let mut body = Vec::new();
//!     cf.open_stream(&element, true)?.read_to_end(&mut body)?;
//!     println!("{}: {} bytes", element.name(), body.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Shared cursor
//! A container, its element iterator and every stream it hands out all
//! seek the same source.  The source is lent to one user at a time: while an
//! [`ElementStream`] is alive, advancing [`Files`] or opening another stream
//! fails with [`Error::SourceBusy`] instead of silently moving the cursor
//! under the first stream.

use flate2::read::DeflateDecoder;
use std::cell::{RefCell, RefMut};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

use crate::block::{read_data_block, BlockChainReader, Classification};
use crate::directory::ContainerDirectory;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::format::{AddressFormat, ContainerHeader, ElementAddress};

// ── Container ────────────────────────────────────────────────────────────────

/// A resolved container over a seekable source.
///
/// Pass the source by value to hand it over (it is closed when the
/// container is dropped), or pass `&mut source` to lend it.
pub struct Container<S> {
    source:    RefCell<S>,
    directory: ContainerDirectory,
}

impl Container<File> {
    /// Open a container file.  The file handle is owned by the container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening container");
        Self::from_reader(File::open(path)?)
    }
}

impl<S: Read + Seek> Container<S> {
    /// Resolve the directory of an already open source.
    ///
    /// Fails with [`Error::UnseekableSource`] if the source cannot report
    /// its position, and with [`Error::NotAContainer`] if neither address
    /// width fits.
    pub fn from_reader(mut source: S) -> Result<Self> {
        source.stream_position().map_err(Error::UnseekableSource)?;
        let directory = ContainerDirectory::resolve(&mut source)?.ok_or(Error::NotAContainer)?;
        Ok(Self { source: RefCell::new(source), directory })
    }

    pub fn address_format(&self) -> AddressFormat {
        self.directory.format()
    }

    pub fn header(&self) -> &ContainerHeader {
        self.directory.header()
    }

    pub fn addresses(&self) -> &[ElementAddress] {
        self.directory.elements()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.directory.elements().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements in directory order, decoded lazily.  Call again to restart.
    pub fn files(&self) -> Files<'_, S> {
        Files { container: self, next: 0 }
    }

    /// First element whose name matches case-insensitively.
    pub fn find(&self, name: &str) -> Result<Option<Element>> {
        let wanted = name.to_lowercase();
        for element in self.files() {
            let element = element?;
            if element.name().to_lowercase() == wanted {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    /// Stream an element's data.
    ///
    /// Elements without data yield an empty stream.  With
    /// `force_decompression`, a chain whose first page inflates is wrapped
    /// in a raw-deflate decoder; otherwise the stored bytes come back as is.
    pub fn open_stream(&self, element: &Element, force_decompression: bool) -> Result<ElementStream<'_, S>> {
        let format = self.address_format();
        if format.is_null_address(element.data_address()) {
            return Ok(ElementStream::Empty);
        }

        let mut lease = self.lease()?;
        format.seek(&mut lease, element.data_address())?;
        let reader = BlockChainReader::new(lease, format)?;

        if reader.is_packed() && force_decompression {
            Ok(ElementStream::Inflated(DeflateDecoder::new(reader)))
        } else {
            Ok(ElementStream::Raw(reader))
        }
    }

    /// Read an element's data to the end.
    pub fn read(&self, element: &Element, force_decompression: bool) -> Result<Vec<u8>> {
        let mut stream = self.open_stream(element, force_decompression)?;
        let mut out = Vec::new();
        stream.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Give the source back.
    pub fn into_inner(self) -> S {
        self.source.into_inner()
    }

    fn read_element(&self, address: &ElementAddress) -> Result<Element> {
        let format = self.address_format();
        let mut lease = self.lease()?;
        format.seek(&mut lease, address.header_address)?;
        let block = read_data_block(&mut lease, format)?;
        Ok(Element::decode(&block, address)?)
    }

    fn lease(&self) -> Result<SourceLease<'_, S>> {
        self.source
            .try_borrow_mut()
            .map(SourceLease)
            .map_err(|_| Error::SourceBusy)
    }
}

/// True if a container directory can be resolved from `source`.
///
/// The source position is left wherever the trial ended.
pub fn is_container<S: Read + Seek + ?Sized>(source: &mut S) -> Result<bool> {
    Ok(ContainerDirectory::resolve(source)?.is_some())
}

// ── Files ────────────────────────────────────────────────────────────────────

/// Iterator returned by [`Container::files`].
pub struct Files<'a, S> {
    container: &'a Container<S>,
    next:      usize,
}

impl<'a, S: Read + Seek> Iterator for Files<'a, S> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.container.addresses().get(self.next)?;
        self.next += 1;
        Some(self.container.read_element(address))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.container.len() - self.next;
        (left, Some(left))
    }
}

impl<'a, S: Read + Seek> ExactSizeIterator for Files<'a, S> {}

// ── Streams ──────────────────────────────────────────────────────────────────

/// Exclusive loan of a container's source.
pub struct SourceLease<'a, S>(RefMut<'a, S>);

impl<'a, S: Read> Read for SourceLease<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<'a, S: Seek> Seek for SourceLease<'a, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

/// Element data as returned by [`Container::open_stream`].
pub enum ElementStream<'a, S> {
    /// The element has no data chain.
    Empty,
    /// Stored bytes, exactly as chained in the container.
    Raw(BlockChainReader<SourceLease<'a, S>>),
    /// Stored bytes passed through a raw-deflate decoder.
    Inflated(DeflateDecoder<BlockChainReader<SourceLease<'a, S>>>),
}

impl<'a, S: Read + Seek> ElementStream<'a, S> {
    fn chain(&self) -> Option<&BlockChainReader<SourceLease<'a, S>>> {
        match self {
            ElementStream::Empty       => None,
            ElementStream::Raw(r)      => Some(r),
            ElementStream::Inflated(d) => Some(d.get_ref()),
        }
    }

    /// Declared size of the stored chain (before inflation); 0 when empty.
    pub fn stored_len(&self) -> u64 {
        self.chain().map_or(0, |r| r.len())
    }

    pub fn classification(&self) -> Classification {
        self.chain().map(|r| r.classification()).unwrap_or_default()
    }

    pub fn is_packed(&self) -> bool {
        self.classification().is_packed
    }

    pub fn is_container(&self) -> bool {
        self.classification().is_container
    }

    pub fn is_inflating(&self) -> bool {
        matches!(self, ElementStream::Inflated(_))
    }
}

impl<'a, S: Read + Seek> Read for ElementStream<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ElementStream::Empty       => Ok(0),
            ElementStream::Raw(r)      => r.read(buf),
            ElementStream::Inflated(d) => d.read(buf),
        }
    }
}
