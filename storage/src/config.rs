//! Heap file configuration.

use crate::page::MIN_PAGE_SIZE;
use crate::store::file_len;
use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for overrides, e.g. `HEAPKV_PAGE_SIZE`.
pub const ENV_PREFIX: &str = "HEAPKV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapFileConfig {
    /// Size of every page in bytes, fixed when the file is created.
    pub page_size: u32,
    /// Hard ceiling on the number of data pages.
    pub max_page_count: u32,
    /// How many key → page hints to keep; 0 disables them.
    pub page_hint_capacity: usize,
}

impl Default for HeapFileConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            max_page_count: 1024,
            page_hint_capacity: 1024,
        }
    }
}

impl HeapFileConfig {
    pub fn new(max_page_count: u32, page_size: u32) -> Self {
        Self {
            page_size,
            max_page_count,
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_page_count(mut self, max_page_count: u32) -> Self {
        self.max_page_count = max_page_count;
        self
    }

    pub fn with_page_hint_capacity(mut self, capacity: usize) -> Self {
        self.page_hint_capacity = capacity;
        self
    }

    /// Loads a configuration file (TOML, YAML or JSON, by extension) with
    /// `HEAPKV_*` environment variables layered on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Pages in the backing file: the metadata page plus every data page.
    pub fn file_page_count(&self) -> u32 {
        self.max_page_count.saturating_add(1)
    }

    pub fn validate(&self) -> Result<()> {
        if (self.page_size as usize) < MIN_PAGE_SIZE {
            return Err(StorageError::InvalidConfig(format!(
                "page size {} is below the minimum of {}",
                self.page_size, MIN_PAGE_SIZE
            )));
        }

        if self.max_page_count == 0 {
            return Err(StorageError::InvalidConfig(
                "max page count must be at least 1".to_string(),
            ));
        }

        if self.max_page_count == u32::MAX {
            return Err(StorageError::InvalidConfig(format!(
                "max page count must be below {}",
                u32::MAX
            )));
        }

        file_len(self.file_page_count(), self.page_size)?;
        Ok(())
    }
}
