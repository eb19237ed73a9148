//! Metadata page (always page 0).
//!
//! ```text
//! [0, 8)   data page count     u64 LE  (0 = fresh file)
//! [8, 12)  magic               "HKV1"
//! [12, 16) format version      u32 LE
//! [16, 20) page size           u32 LE
//! [20, 24) max page count      u32 LE
//! [24, 28) CRC32 of [0, 24)    u32 LE
//! ```
//!
//! The count excludes the metadata page itself. The rest of the page is
//! unused.

use super::{read_u32, read_u64, write_u32, write_u64, METADATA_PAGE_NO};
use crate::{Result, StorageError};

const PAGE_COUNT_FIELD: usize = 0;
const MAGIC_FIELD: usize = 8;
const VERSION_FIELD: usize = 12;
const PAGE_SIZE_FIELD: usize = 16;
const MAX_PAGE_COUNT_FIELD: usize = 20;
const CHECKSUM_FIELD: usize = 24;

pub const METADATA_HEADER_SIZE: usize = CHECKSUM_FIELD + 4;

/// Magic number identifying heap files
pub const METADATA_MAGIC: [u8; 4] = *b"HKV1";

pub const FORMAT_VERSION: u32 = 1;

pub struct MetadataPage<'a> {
    data: &'a mut [u8],
}

impl<'a> MetadataPage<'a> {
    /// True if the buffer has never been written: every byte is zero.
    ///
    /// Anything else must pass [`MetadataPage::open`] before it is trusted.
    pub fn is_fresh(data: &[u8]) -> bool {
        data.len() >= METADATA_HEADER_SIZE && data.iter().all(|b| *b == 0)
    }

    /// Writes a new header into a zero-filled page buffer.
    pub fn create(data: &'a mut [u8], page_size: u32, max_page_count: u32) -> Result<Self> {
        check_len(data)?;

        data[MAGIC_FIELD..MAGIC_FIELD + 4].copy_from_slice(&METADATA_MAGIC);
        write_u32(data, VERSION_FIELD, FORMAT_VERSION);
        write_u32(data, PAGE_SIZE_FIELD, page_size);
        write_u32(data, MAX_PAGE_COUNT_FIELD, max_page_count);
        write_u64(data, PAGE_COUNT_FIELD, 0);

        let mut page = Self { data };
        page.update_checksum();
        Ok(page)
    }

    /// Wraps an existing metadata page, validating it against `page_size`.
    pub fn open(data: &'a mut [u8], page_size: u32) -> Result<Self> {
        check_len(data)?;

        let page = Self { data };
        page.validate(page_size)?;
        Ok(page)
    }

    pub fn data_page_count(&self) -> u64 {
        read_u64(self.data, PAGE_COUNT_FIELD)
    }

    pub fn set_data_page_count(&mut self, count: u64) {
        write_u64(self.data, PAGE_COUNT_FIELD, count);
        self.update_checksum();
    }

    pub fn page_size(&self) -> u32 {
        read_u32(self.data, PAGE_SIZE_FIELD)
    }

    pub fn max_page_count(&self) -> u32 {
        read_u32(self.data, MAX_PAGE_COUNT_FIELD)
    }

    pub fn set_max_page_count(&mut self, max_page_count: u32) {
        write_u32(self.data, MAX_PAGE_COUNT_FIELD, max_page_count);
        self.update_checksum();
    }

    pub fn verify_checksum(&self) -> bool {
        read_u32(self.data, CHECKSUM_FIELD) == self.compute_checksum()
    }

    fn validate(&self, page_size: u32) -> Result<()> {
        if self.data[MAGIC_FIELD..MAGIC_FIELD + 4] != METADATA_MAGIC {
            return Err(corrupted("wrong magic number".to_string()));
        }

        let version = read_u32(self.data, VERSION_FIELD);
        if version > FORMAT_VERSION {
            return Err(corrupted(format!("unsupported file version: {}", version)));
        }

        if !self.verify_checksum() {
            return Err(StorageError::ChecksumMismatch(METADATA_PAGE_NO));
        }

        if self.page_size() != page_size {
            return Err(StorageError::InvalidConfig(format!(
                "invalid page size: file uses {}, configured {}",
                self.page_size(),
                page_size
            )));
        }

        Ok(())
    }

    fn compute_checksum(&self) -> u32 {
        crc32fast::hash(&self.data[..CHECKSUM_FIELD])
    }

    fn update_checksum(&mut self) {
        let checksum = self.compute_checksum();
        write_u32(self.data, CHECKSUM_FIELD, checksum);
    }
}

fn check_len(data: &[u8]) -> Result<()> {
    if data.len() < METADATA_HEADER_SIZE {
        return Err(StorageError::InvalidBufferSize {
            expected: METADATA_HEADER_SIZE,
            actual: data.len(),
        });
    }
    Ok(())
}

fn corrupted(reason: String) -> StorageError {
    StorageError::Corrupted {
        page_no: METADATA_PAGE_NO,
        reason,
    }
}
