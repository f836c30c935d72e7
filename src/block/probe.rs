//! Heuristic classification of a block chain's first page.
//!
//! The container format has no flag saying whether an element is
//! compressed or is itself a container.  The platform's own tooling decides
//! by trial, and so do we:
//!
//! 1. Inflate the page as raw deflate.  No decoder error ⇒ packed, and the
//!    inflated bytes are what gets inspected next.  When the page is the
//!    whole chain the deflate stream must also reach its end; a page cut
//!    short by the next one only has to decode cleanly as far as it goes.
//! 2. Run the directory trial over those bytes held in memory.
//!
//! Only the first page is looked at, never the rest of the chain.  The
//! result is advisory and never changes what a reader returns.

use flate2::{Decompress, FlushDecompress, Status};
use serde::Serialize;
use std::io::Cursor;

use crate::directory::ContainerDirectory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_packed:    bool,
    pub is_container: bool,
}

pub fn classify(page: &[u8], complete: bool) -> Classification {
    match inflate(page, complete) {
        Some(inflated) => Classification {
            is_packed:    true,
            is_container: looks_like_container(&inflated),
        },
        None => Classification {
            is_packed:    false,
            is_container: looks_like_container(page),
        },
    }
}

/// Raw-deflate decode into a growing buffer.  `None` on any decoder error,
/// and, when `complete` is set, if the input ends before the stream does.
pub fn inflate(bytes: &[u8], complete: bool) -> Option<Vec<u8>> {
    let mut dec = Decompress::new(false);
    let mut out = Vec::with_capacity(bytes.len().saturating_mul(2).max(64));
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let before = (dec.total_in(), dec.total_out());
        let input  = &bytes[dec.total_in() as usize..];
        let status = dec.decompress_vec(input, &mut out, FlushDecompress::None).ok()?;
        if status == Status::StreamEnd {
            return Some(out);
        }
        if (dec.total_in(), dec.total_out()) == before {
            // Out of input short of the end of the stream.
            return (!complete).then_some(out);
        }
    }
}

pub fn looks_like_container(bytes: &[u8]) -> bool {
    matches!(ContainerDirectory::resolve(&mut Cursor::new(bytes)), Ok(Some(_)))
}
