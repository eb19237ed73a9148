//! Page layouts.
//!
//! Page 0 of a heap file is always the [`MetadataPage`]; every page after it
//! is a [`DataPage`]. Both are views over a caller-owned page buffer, so the
//! engine can reuse a single scratch buffer for every page it touches.

mod data;
mod meta;

pub use data::{DataPage, RecordRef, Records, DATA_SEGMENT_OFFSET};
pub(crate) use data::ensure_fits_empty_page;
pub use meta::{MetadataPage, FORMAT_VERSION, METADATA_HEADER_SIZE, METADATA_MAGIC};

use crate::record::RECORD_HEADER_SIZE;

/// Page number of the metadata page.
pub const METADATA_PAGE_NO: u32 = 0;

/// Smallest page size able to hold the metadata header and one empty record.
pub const MIN_PAGE_SIZE: usize = {
    let data = DATA_SEGMENT_OFFSET + RECORD_HEADER_SIZE;
    if data > METADATA_HEADER_SIZE {
        data
    } else {
        METADATA_HEADER_SIZE
    }
};

#[inline]
fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
