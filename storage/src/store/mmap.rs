//! Single-mapping page store.
//!
//! The whole heap file is mapped once, read/write, for the lifetime of the
//! store. Loading and storing a page are plain slice copies. Files too large
//! for one mapping are rejected up front with `UnsupportedFileSize`.

use super::{file_len, page_range, PageStore};
use crate::Result;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;

pub struct MmapStore {
    file: File,
    mmap: MmapMut,
    page_size: usize,
    page_count: u32,
}

impl MmapStore {
    /// Opens or creates `path` and maps its first `page_count` pages.
    ///
    /// A shorter file is extended before anything is read from it; callers
    /// that must not touch foreign files check page 0 first.
    pub fn open(path: &Path, page_count: u32, page_size: u32) -> Result<Self> {
        let len = file_len(page_count, page_size)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.metadata()?.len() < len {
            file.set_len(len)?;
        }

        // SAFETY: the mapping is only reachable through this store, which
        // owns the file handle, and every access is bounds-checked by
        // `page_range`. Concurrent modification of the file by another
        // process is not supported.
        let mmap = unsafe { MmapOptions::new().len(len as usize).map_mut(&file)? };

        Ok(Self {
            file,
            mmap,
            page_size: page_size as usize,
            page_count,
        })
    }
}

impl PageStore for MmapStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> Result<()> {
        let range = page_range(page_no, self.page_count, self.page_size, buf.len())?;
        buf.copy_from_slice(&self.mmap[range]);
        Ok(())
    }

    fn write_page(&mut self, page_no: u32, buf: &[u8]) -> Result<()> {
        let range = page_range(page_no, self.page_count, self.page_size, buf.len())?;
        self.mmap[range].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.mmap.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
