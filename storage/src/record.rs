//! On-page record layout.
//!
//! A record is written at an arbitrary offset inside a data page:
//!
//! ```text
//! +---------+-------------+---------------+-----------+-------------+
//! | deleted | key_len u32 | value_len u32 | key bytes | value bytes |
//! |  1 byte |   LE        |   LE          |           |             |
//! +---------+-------------+---------------+-----------+-------------+
//! ```
//!
//! Callers validate bounds before invoking any of these helpers.

use bytes::{Buf, BufMut};

const DELETED_FLAG_SIZE: usize = 1;
const LENGTH_FIELD_SIZE: usize = 4;

/// Size of the fixed record header (flag + two lengths).
pub const RECORD_HEADER_SIZE: usize = DELETED_FLAG_SIZE + 2 * LENGTH_FIELD_SIZE;

const LIVE: u8 = 0;
const DELETED: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub deleted: bool,
    pub key_len: u32,
    pub value_len: u32,
}

impl RecordHeader {
    pub fn record_len(&self) -> usize {
        record_length(self.key_len as usize, self.value_len as usize)
    }
}

/// Total on-page length of a record with the given key and value lengths.
pub const fn record_length(key_len: usize, value_len: usize) -> usize {
    RECORD_HEADER_SIZE + key_len + value_len
}

/// Writes a live record at `offset` and returns the offset right after it.
pub fn write_record(buf: &mut [u8], offset: usize, key: &[u8], value: &[u8]) -> usize {
    let end = offset + record_length(key.len(), value.len());
    let mut cursor = &mut buf[offset..end];
    cursor.put_u8(LIVE);
    cursor.put_u32_le(key.len() as u32);
    cursor.put_u32_le(value.len() as u32);
    cursor.put_slice(key);
    cursor.put_slice(value);
    end
}

pub fn read_header(buf: &[u8], offset: usize) -> RecordHeader {
    let mut cursor = &buf[offset..offset + RECORD_HEADER_SIZE];
    RecordHeader {
        deleted: cursor.get_u8() != LIVE,
        key_len: cursor.get_u32_le(),
        value_len: cursor.get_u32_le(),
    }
}

pub fn read_key(buf: &[u8], offset: usize, key_len: u32) -> &[u8] {
    let start = offset + RECORD_HEADER_SIZE;
    &buf[start..start + key_len as usize]
}

pub fn read_value(buf: &[u8], offset: usize, key_len: u32, value_len: u32) -> &[u8] {
    let start = offset + RECORD_HEADER_SIZE + key_len as usize;
    &buf[start..start + value_len as usize]
}

/// Flips the tombstone flag. No other byte of the record is touched.
pub fn mark_deleted(buf: &mut [u8], offset: usize) {
    buf[offset] = DELETED;
}
