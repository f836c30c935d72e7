//! In-memory container images for tests.
//!
//! The crate is read-only, so fixtures are assembled here by hand.  All
//! addresses handed out are logical; [`Image::into_bytes`] prepends the
//! Wide seek correction when needed.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;
use v8unpack::element::datetime_to_ticks;
use v8unpack::AddressFormat;

pub fn block_header(format: AddressFormat, data_size: u64, page_size: u64, next: u64) -> Vec<u8> {
    let text = match format {
        AddressFormat::Narrow => format!("\r\n{data_size:08x} {page_size:08x} {next:08x} \r\n"),
        AddressFormat::Wide   => format!("\r\n{data_size:016x} {page_size:016x} {next:016x} \r\n"),
    };
    text.into_bytes()
}

pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
}

// ── Image ────────────────────────────────────────────────────────────────────

/// Logical address space of a container under construction.
pub struct Image {
    pub format: AddressFormat,
    bytes:      Vec<u8>,
}

impl Image {
    pub fn new(format: AddressFormat) -> Self {
        Self { format, bytes: Vec::new() }
    }

    pub fn end(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn append(&mut self, bytes: &[u8]) -> u64 {
        let at = self.end();
        self.bytes.extend_from_slice(bytes);
        at
    }

    pub fn patch(&mut self, at: u64, bytes: &[u8]) {
        let at = at as usize;
        self.bytes[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Single-page block whose page is exactly the payload.
    pub fn append_block(&mut self, payload: &[u8]) -> u64 {
        let len = payload.len() as u64;
        let at = self.append(&block_header(self.format, len, len, self.format.sentinel()));
        self.append(payload);
        at
    }

    /// Chain with one block per page, linked in slice order.  With
    /// `reversed`, the pages are laid out back to front in the image.
    /// `declared` defaults to the total payload length.
    pub fn append_chain(&mut self, pages: &[&[u8]], declared: Option<u64>, reversed: bool) -> u64 {
        let declared = declared.unwrap_or_else(|| pages.iter().map(|p| p.len() as u64).sum());
        let header_len = self.format.block_header_len() as u64;

        let mut order: Vec<usize> = (0..pages.len()).collect();
        if reversed {
            order.reverse();
        }
        let mut addresses = vec![0u64; pages.len()];
        let mut cursor = self.end();
        for &i in &order {
            addresses[i] = cursor;
            cursor += header_len + pages[i].len() as u64;
        }

        for &i in &order {
            let next = addresses.get(i + 1).copied().unwrap_or(self.format.sentinel());
            let page_size = pages[i].len() as u64;
            self.append(&block_header(self.format, declared, page_size, next));
            self.append(pages[i]);
        }
        addresses[0]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = vec![0u8; self.format.seek_offset() as usize];
        out.extend_from_slice(&self.bytes);
        out
    }
}

// ── Container fixtures ───────────────────────────────────────────────────────

pub struct Entry {
    pub name:     String,
    pub created:  NaiveDateTime,
    pub modified: NaiveDateTime,
    /// `None` stores a data address of 0.
    pub data:     Option<Vec<u8>>,
}

impl Entry {
    pub fn new(name: &str, data: &[u8]) -> Self {
        Self {
            name:     name.to_owned(),
            created:  at(2020, 1, 2, 3, 4, 5),
            modified: at(2021, 6, 7, 8, 9, 10),
            data:     Some(data.to_vec()),
        }
    }

    pub fn empty(name: &str) -> Self {
        Self { data: None, ..Self::new(name, b"") }
    }

    pub fn times(mut self, created: NaiveDateTime, modified: NaiveDateTime) -> Self {
        self.created = created;
        self.modified = modified;
        self
    }
}

pub fn header_payload(entry: &Entry) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&datetime_to_ticks(entry.created).unwrap().to_le_bytes());
    payload.extend_from_slice(&datetime_to_ticks(entry.modified).unwrap().to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    for unit in entry.name.encode_utf16() {
        payload.extend_from_slice(&unit.to_le_bytes());
    }
    payload.extend_from_slice(&[0u8; 8]);
    payload
}

fn put_field(out: &mut Vec<u8>, format: AddressFormat, value: u64) {
    match format {
        AddressFormat::Narrow => out.extend_from_slice(&(value as u32).to_le_bytes()),
        AddressFormat::Wide   => out.extend_from_slice(&value.to_le_bytes()),
    }
}

pub fn container_header(format: AddressFormat, free_page: u64, page_size: u32, storage_version: u32) -> Vec<u8> {
    let mut out = Vec::new();
    put_field(&mut out, format, free_page);
    out.extend_from_slice(&page_size.to_le_bytes());
    out.extend_from_slice(&storage_version.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// A complete container: header, address table, then one header block and
/// one single-page data block per entry.
pub fn build_container(format: AddressFormat, entries: &[Entry]) -> Vec<u8> {
    let mut image = Image::new(format);
    image.append(&container_header(format, format.sentinel(), 512, 1));

    let table_len = entries.len() * format.element_address_len();
    let table_at = image.append_block(&vec![0u8; table_len]);
    let records_at = table_at + format.block_header_len() as u64;

    let mut table = Vec::with_capacity(table_len);
    for entry in entries {
        let header_at = image.append_block(&header_payload(entry));
        let data_at = match &entry.data {
            Some(data) => image.append_block(data),
            None => 0,
        };
        put_field(&mut table, format, header_at);
        put_field(&mut table, format, data_at);
        put_field(&mut table, format, format.sentinel());
    }
    image.patch(records_at, &table);
    image.into_bytes()
}
