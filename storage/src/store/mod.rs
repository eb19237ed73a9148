//! Backing media for heap files.
//!
//! A [`PageStore`] moves whole pages between a caller-owned buffer and the
//! medium: page `n` lives at byte offset `n * page_size`. The [`Pager`]
//! wraps a store together with the single page-sized scratch buffer the
//! engine works in.

mod file;
mod memory;
#[cfg(feature = "mmap")]
mod mmap;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "mmap")]
pub use mmap::MmapStore;

use crate::{Result, StorageError};
use std::ops::Range;

/// Largest file a single mapping (or in-memory buffer) can cover.
pub const MAX_MAPPING_BYTES: u64 = isize::MAX as u64;

pub trait PageStore: Send {
    /// Size of every page in bytes.
    fn page_size(&self) -> usize;

    /// Number of addressable pages, metadata page included.
    fn page_count(&self) -> u32;

    /// Copies page `page_no` into `buf`, which must be exactly one page long.
    fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> Result<()>;

    /// Copies `buf` over page `page_no`.
    fn write_page(&mut self, page_no: u32, buf: &[u8]) -> Result<()>;

    /// Flushes written pages to durable storage.
    fn sync(&mut self) -> Result<()>;
}

/// Total length of a medium holding `page_count` pages of `page_size` bytes.
///
/// Fails with `UnsupportedFileSize` if one mapping cannot address it.
pub fn file_len(page_count: u32, page_size: u32) -> Result<u64> {
    let requested = u128::from(page_count) * u128::from(page_size);
    if requested > u128::from(MAX_MAPPING_BYTES) {
        return Err(StorageError::UnsupportedFileSize {
            requested,
            limit: MAX_MAPPING_BYTES,
        });
    }
    Ok(requested as u64)
}

/// Byte range of `page_no`, after checking the page exists and `buf_len`
/// matches the page size.
fn page_range(
    page_no: u32,
    page_count: u32,
    page_size: usize,
    buf_len: usize,
) -> Result<Range<usize>> {
    if page_no >= page_count {
        return Err(StorageError::PageNotFound(page_no));
    }

    if buf_len != page_size {
        return Err(StorageError::InvalidBufferSize {
            expected: page_size,
            actual: buf_len,
        });
    }

    let start = page_no as usize * page_size;
    Ok(start..start + page_size)
}

/// Page store adapter: loads pages into a scratch buffer and writes that
/// buffer back.
///
/// Nothing is cached between calls; every load reads the medium again.
pub struct Pager<S> {
    store: S,
    scratch: Vec<u8>,
}

impl<S: PageStore> Pager<S> {
    pub fn new(store: S) -> Self {
        let scratch = vec![0u8; store.page_size()];
        Self { store, scratch }
    }

    pub fn page_size(&self) -> usize {
        self.scratch.len()
    }

    pub fn page_count(&self) -> u32 {
        self.store.page_count()
    }

    /// Reads page `page_no` into the scratch buffer and hands it out.
    pub fn load_page(&mut self, page_no: u32) -> Result<&mut [u8]> {
        self.store.read_page(page_no, &mut self.scratch)?;
        Ok(&mut self.scratch)
    }

    /// Zero-fills the scratch buffer for a page about to be initialized.
    pub fn allocate_zeroed_page(&mut self, page_no: u32) -> Result<&mut [u8]> {
        if page_no >= self.store.page_count() {
            return Err(StorageError::PageNotFound(page_no));
        }

        self.scratch.fill(0);
        Ok(&mut self.scratch)
    }

    /// Writes the scratch buffer back to page `page_no`.
    pub fn store_page(&mut self, page_no: u32) -> Result<()> {
        self.store.write_page(page_no, &self.scratch)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
