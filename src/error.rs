use std::io;
use thiserror::Error;

use crate::format::FormatError;

#[derive(Error, Debug)]
pub enum Error {
    /// Structural decode failure. The directory trial and the stream probe
    /// treat this as "try the next candidate"; everywhere else it is fatal.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    #[error("Not a V8 container (neither 64-bit nor 32-bit layout matches)")]
    NotAContainer,
    #[error("Source does not support random access: {0}")]
    UnseekableSource(io::Error),
    /// Another element stream still holds the container's source.
    #[error("Container source is in use by an open element stream")]
    SourceBusy,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
