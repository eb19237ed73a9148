// storage/src/store/file.rs

use super::{file_len, page_range, PageStore};
use crate::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Page store doing explicit positioned reads and writes on a file.
pub struct FileStore {
    file: File,
    page_size: usize,
    page_count: u32,
}

impl FileStore {
    /// Opens or creates `path`, extending it to hold `page_count` pages.
    ///
    /// An existing longer file is left as is; only its first `page_count`
    /// pages are addressed.
    /// A shorter one is extended before anything is read from it.
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

        Ok(Self {
            file,
            page_size: page_size as usize,
            page_count,
        })
    }
}

impl PageStore for FileStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> Result<()> {
        let range = page_range(page_no, self.page_count, self.page_size, buf.len())?;

        self.file.seek(SeekFrom::Start(range.start as u64))?;
        self.file.read_exact(buf)?;

        Ok(())
    }

    fn write_page(&mut self, page_no: u32, buf: &[u8]) -> Result<()> {
        let range = page_range(page_no, self.page_count, self.page_size, buf.len())?;

        self.file.seek(SeekFrom::Start(range.start as u64))?;
        self.file.write_all(buf)?;

        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
