//! Decoding of the inotify event stream
//!
//! A single `read` on an inotify descriptor returns zero or more whole
//! records, each a fixed 16-byte header followed by a NUL-padded name:
//!
//! ```text
//! | watch_id: i32 | mask: u32 | cookie: u32 | name_len: u32 | name[name_len] |
//! ```
//!
//! All header fields are in native byte order.

use std::ffi::OsStr;
use std::mem;
use std::os::unix::ffi::OsStrExt;

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::mask::EventMask;

/// Size of the fixed record header
pub const HEADER_LEN: usize = 16;

/// Names are padded so the next header stays aligned to this boundary
const NAME_ALIGN: usize = HEADER_LEN;

const _: () = assert!(mem::size_of::<libc::inotify_event>() == HEADER_LEN);

/// Malformed event buffer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated event record at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// One decoded change event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventRecord {
    /// Watch the event was reported on
    pub watch_id: i32,
    /// What happened
    pub mask: EventMask,
    /// Pairs a MOVED_FROM with its MOVED_TO, zero otherwise
    pub cookie: u32,
    /// Entry name inside the watched directory, trailing NULs stripped.
    /// Empty when the event concerns the watched object itself.
    pub name: Vec<u8>,
}

impl EventRecord {
    pub fn new(watch_id: i32, mask: EventMask, cookie: u32, name: impl Into<Vec<u8>>) -> Self {
        Self {
            watch_id,
            mask,
            cookie,
            name: name.into(),
        }
    }

    /// Name as an OS string
    pub fn name_os(&self) -> &OsStr {
        OsStr::from_bytes(&self.name)
    }

    /// True when the event is about the watched object, not a child entry
    pub fn is_self(&self) -> bool {
        self.name.is_empty()
    }

    /// Length of the padded name field as the kernel writes it
    fn padded_name_len(&self) -> usize {
        if self.name.is_empty() {
            0
        } else {
            (self.name.len() + 1).div_ceil(NAME_ALIGN) * NAME_ALIGN
        }
    }

    /// Number of bytes [`encode`](Self::encode) writes
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.padded_name_len()
    }

    /// Write the record in kernel layout
    pub fn encode<B: BufMut>(&self, out: &mut B) {
        let padded = self.padded_name_len();
        out.put_i32_ne(self.watch_id);
        out.put_u32_ne(self.mask.bits());
        out.put_u32_ne(self.cookie);
        out.put_u32_ne(padded as u32);
        out.put_slice(&self.name);
        out.put_bytes(0, padded - self.name.len());
    }
}

/// Iterator over the records in one read buffer
///
/// Stops after the first [`DecodeError`].
#[derive(Debug)]
pub struct Events<'a> {
    buffer: &'a [u8],
    offset: usize,
    fused: bool,
}

impl<'a> Events<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            offset: 0,
            fused: false,
        }
    }

    fn truncated(&mut self, needed: usize) -> DecodeError {
        self.fused = true;
        DecodeError::Truncated {
            offset: self.offset,
            needed,
            available: self.buffer.len() - self.offset,
        }
    }
}

impl Iterator for Events<'_> {
    type Item = Result<EventRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused || self.offset >= self.buffer.len() {
            return None;
        }

        let mut rest = &self.buffer[self.offset..];
        if rest.len() < HEADER_LEN {
            return Some(Err(self.truncated(HEADER_LEN)));
        }

        let watch_id = rest.get_i32_ne();
        let mask = EventMask::from_bits_retain(rest.get_u32_ne());
        let cookie = rest.get_u32_ne();
        let name_len = rest.get_u32_ne() as usize;

        if rest.len() < name_len {
            return Some(Err(self.truncated(HEADER_LEN + name_len)));
        }

        let raw = &rest[..name_len];
        let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        self.offset += HEADER_LEN + name_len;

        Some(Ok(EventRecord {
            watch_id,
            mask,
            cookie,
            name: raw[..end].to_vec(),
        }))
    }
}

/// Decode every record in `buffer`
///
/// An empty buffer yields an empty vector, which callers treat as
/// end-of-stream.
pub fn decode(buffer: &[u8]) -> Result<Vec<EventRecord>, DecodeError> {
    Events::new(buffer).collect()
}

/// Encode records back-to-back into one buffer
pub fn encode(records: &[EventRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.iter().map(EventRecord::encoded_len).sum());
    for record in records {
        record.encode(&mut out);
    }
    out
}
