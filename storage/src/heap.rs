//! Heap file engine.
//!
//! Implements `get`/`put`/`remove` over the metadata page and data pages
//! `1..=n`. Every operation holds one lock for its whole duration, so the
//! remove-then-append sequence inside `put` is atomic with respect to other
//! callers.
//!
//! A `put` decides everything that can fail for reasons other than I/O
//! (serialization, record size, the page ceiling) before it tombstones the
//! previous value. If the medium fails between the tombstone and the append,
//! the old value is gone and the new one was never written; callers that
//! need more than at-most-once writes must retry the `put` themselves.

use crate::config::HeapFileConfig;
use crate::hints::{scan_order, PageHints};
use crate::page::{ensure_fits_empty_page, DataPage, MetadataPage, METADATA_PAGE_NO};
use crate::record::record_length;
use crate::serializer::{BincodeSerializer, Serializer};
use crate::store::{MemoryStore, PageStore, Pager};
use crate::{Result, StorageError};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Store used by [`HeapFile::open`].
#[cfg(feature = "mmap")]
pub type DefaultStore = crate::store::MmapStore;
#[cfg(not(feature = "mmap"))]
pub type DefaultStore = crate::store::FileStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub data_pages: u32,
    pub live_records: u64,
    pub dead_records: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

pub struct HeapFile<S, Z = BincodeSerializer> {
    inner: Mutex<HeapFileInner<S>>,
    serializer: Z,
    config: HeapFileConfig,
}

impl HeapFile<DefaultStore> {
    /// Opens or creates the heap file at `path`.
    pub fn open(path: impl AsRef<Path>, max_page_count: u32, page_size: u32) -> Result<Self> {
        Self::open_with_config(path, HeapFileConfig::new(max_page_count, page_size))
    }

    /// Opens or creates the heap file at `path` with explicit settings.
    ///
    /// An existing file is checked before it is grown or mapped, so a file
    /// that is not a heap file, or one written with another page size, is
    /// rejected without being modified.
    pub fn open_with_config(path: impl AsRef<Path>, config: HeapFileConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        check_existing_file(path, &config)?;
        let store = DefaultStore::open(path, config.file_page_count(), config.page_size)?;
        Self::with_store(store, config)
    }
}

/// Validates the metadata page of an existing, non-empty file at `path`.
fn check_existing_file(path: &Path, config: &HeapFileConfig) -> Result<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut page = Vec::with_capacity(config.page_size as usize);
    file.take(u64::from(config.page_size)).read_to_end(&mut page)?;
    page.resize(config.page_size as usize, 0);

    if MetadataPage::is_fresh(&page) {
        return Ok(());
    }

    let meta = MetadataPage::open(&mut page, config.page_size)?;
    if meta.data_page_count() > u64::from(config.max_page_count) {
        return Err(StorageError::InvalidConfig(format!(
            "file already holds {} data pages, more than the configured maximum of {}",
            meta.data_page_count(),
            config.max_page_count
        )));
    }
    Ok(())
}

impl HeapFile<MemoryStore> {
    /// A heap file that lives only in memory.
    pub fn in_memory(config: HeapFileConfig) -> Result<Self> {
        config.validate()?;
        let store = MemoryStore::new(config.file_page_count(), config.page_size)?;
        Self::with_store(store, config)
    }
}

impl<S: PageStore> HeapFile<S> {
    pub fn with_store(store: S, config: HeapFileConfig) -> Result<Self> {
        Self::with_store_and_serializer(store, config, BincodeSerializer)
    }
}

impl<S: PageStore, Z: Serializer> HeapFile<S, Z> {
    /// Builds a heap file on top of `store`, initializing it if it is fresh.
    ///
    /// The store must use the configured page size and hold at least the
    /// metadata page plus `max_page_count` data pages.
    pub fn with_store_and_serializer(store: S, config: HeapFileConfig, serializer: Z) -> Result<Self> {
        config.validate()?;

        if store.page_size() != config.page_size as usize {
            return Err(StorageError::InvalidConfig(format!(
                "store page size {} does not match configured page size {}",
                store.page_size(),
                config.page_size
            )));
        }

        if store.page_count() < config.file_page_count() {
            return Err(StorageError::InvalidConfig(format!(
                "store holds {} pages, {} needed",
                store.page_count(),
                config.file_page_count()
            )));
        }

        let mut inner = HeapFileInner {
            pager: Pager::new(store),
            hints: PageHints::new(config.page_hint_capacity),
            page_size: config.page_size,
            max_page_count: config.max_page_count,
        };
        inner.initialize()?;

        Ok(Self {
            inner: Mutex::new(inner),
            serializer,
            config,
        })
    }

    /// Swaps the serializer used for keys and values.
    pub fn with_serializer<Z2: Serializer>(self, serializer: Z2) -> HeapFile<S, Z2> {
        HeapFile {
            inner: self.inner,
            serializer,
            config: self.config,
        }
    }

    pub fn get<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        let key = self.serializer.serialize(key)?;
        let value = self.inner.lock().find(&key)?;
        value
            .map(|bytes| self.serializer.deserialize(&bytes))
            .transpose()
    }

    pub fn contains_key<K>(&self, key: &K) -> Result<bool>
    where
        K: Serialize + ?Sized,
    {
        let key = self.serializer.serialize(key)?;
        Ok(self.inner.lock().find(&key)?.is_some())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put<K, V>(&self, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let key = self.serializer.serialize(key)?;
        let value = self.serializer.serialize(value)?;
        self.inner.lock().put(&key, &value)
    }

    /// Removes `key`, returning the value it held.
    pub fn remove<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        let key = self.serializer.serialize(key)?;
        let value = self.inner.lock().remove(&key)?;
        value
            .map(|bytes| self.serializer.deserialize(&bytes))
            .transpose()
    }

    /// Number of allocated data pages, as recorded in the metadata page.
    pub fn data_page_count(&self) -> Result<u32> {
        self.inner.lock().data_page_count()
    }

    pub fn stats(&self) -> Result<HeapStats> {
        self.inner.lock().stats()
    }

    pub fn config(&self) -> &HeapFileConfig {
        &self.config
    }

    pub fn sync(&self) -> Result<()> {
        self.inner.lock().pager.sync()
    }

    /// Flushes the medium and releases it.
    pub fn close(self) -> Result<()> {
        self.inner.into_inner().pager.sync()
    }

    pub fn into_store(self) -> S {
        self.inner.into_inner().pager.into_store()
    }
}

struct HeapFileInner<S> {
    pager: Pager<S>,
    hints: PageHints,
    page_size: u32,
    max_page_count: u32,
}

impl<S: PageStore> HeapFileInner<S> {
    fn initialize(&mut self) -> Result<()> {
        let buf = self.pager.load_page(METADATA_PAGE_NO)?;

        if MetadataPage::is_fresh(buf) {
            MetadataPage::create(buf, self.page_size, self.max_page_count)?;
            self.pager.store_page(METADATA_PAGE_NO)?;
            self.allocate_page(0, None)?;

            info!(
                "initialized heap file: page size {}, up to {} data pages",
                self.page_size, self.max_page_count
            );
            return Ok(());
        }

        let mut meta = MetadataPage::open(buf, self.page_size)?;
        let count = meta.data_page_count();
        if count > u64::from(self.max_page_count) {
            return Err(StorageError::InvalidConfig(format!(
                "file already holds {} data pages, more than the configured maximum of {}",
                count, self.max_page_count
            )));
        }

        if meta.max_page_count() != self.max_page_count {
            meta.set_max_page_count(self.max_page_count);
            self.pager.store_page(METADATA_PAGE_NO)?;
        }

        // Header written, first data page never counted.
        if count == 0 {
            warn!("heap file was never fully initialized, allocating data page 1");
            self.allocate_page(0, None)?;
        }

        debug!(
            "opened heap file with {} of {} data pages",
            count, self.max_page_count
        );
        Ok(())
    }

    fn data_page_count(&mut self) -> Result<u32> {
        let buf = self.pager.load_page(METADATA_PAGE_NO)?;
        let count = MetadataPage::open(buf, self.page_size)?.data_page_count();

        u32::try_from(count)
            .ok()
            .filter(|count| (1..=self.max_page_count).contains(count))
            .ok_or_else(|| StorageError::Corrupted {
                page_no: METADATA_PAGE_NO,
                reason: format!(
                    "data page count {} outside 1..={}",
                    count, self.max_page_count
                ),
            })
    }

    fn find(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let hash = PageHints::key_hash(key);
        let page_count = self.data_page_count()?;

        for page_no in scan_order(self.hints.get(hash), page_count) {
            let buf = self.pager.load_page(page_no)?;
            if let Some(value) = DataPage::open(page_no, buf)?.find_record(key)? {
                trace!("found {} byte key on page {}", key.len(), page_no);
                self.hints.record(hash, page_no);
                return Ok(Some(value));
            }
        }

        self.hints.forget(hash);
        Ok(None)
    }

    fn remove(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let hash = PageHints::key_hash(key);
        let page_count = self.data_page_count()?;

        for page_no in scan_order(self.hints.get(hash), page_count) {
            let buf = self.pager.load_page(page_no)?;
            let removed = DataPage::open(page_no, buf)?.remove_record(key)?;
            if let Some(value) = removed {
                self.pager.store_page(page_no)?;
                self.hints.forget(hash);
                trace!("removed {} byte key from page {}", key.len(), page_no);
                return Ok(Some(value));
            }
        }

        self.hints.forget(hash);
        Ok(None)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        ensure_fits_empty_page(
            self.pager.page_size(),
            record_length(key.len(), value.len()),
        )?;

        let last_page = self.data_page_count()?;
        let buf = self.pager.load_page(last_page)?;
        let fits = DataPage::open(last_page, buf)?.has_room_for(key.len(), value.len())?;
        if !fits && last_page >= self.max_page_count {
            warn!("heap file is full: all {} data pages in use", self.max_page_count);
            return Err(StorageError::TooManyPages(self.max_page_count));
        }

        self.remove(key)?;

        // Tombstones never free space, so `fits` still holds after the remove.
        let added = if fits {
            let buf = self.pager.load_page(last_page)?;
            DataPage::open(last_page, buf)?.add_record(key, value)?
        } else {
            false
        };

        let page_no = if added {
            self.pager.store_page(last_page)?;
            last_page
        } else {
            self.allocate_page(last_page, Some((key, value)))?
        };

        self.hints.record(PageHints::key_hash(key), page_no);
        trace!("stored {} byte key on page {}", key.len(), page_no);
        Ok(())
    }

    /// Appends data page `page_count + 1`, optionally seeded with one record.
    ///
    /// The page is written before the metadata page, so it only becomes
    /// visible once it is fully in place.
    fn allocate_page(&mut self, page_count: u32, first_record: Option<(&[u8], &[u8])>) -> Result<u32> {
        if page_count >= self.max_page_count {
            warn!("heap file is full: all {} data pages in use", self.max_page_count);
            return Err(StorageError::TooManyPages(self.max_page_count));
        }

        let page_no = page_count + 1;
        let buf = self.pager.allocate_zeroed_page(page_no)?;
        let mut page = DataPage::init(page_no, buf);
        if let Some((key, value)) = first_record {
            let added = page.add_record(key, value)?;
            debug_assert!(added, "record must fit in an empty page");
        }
        self.pager.store_page(page_no)?;

        let buf = self.pager.load_page(METADATA_PAGE_NO)?;
        MetadataPage::open(buf, self.page_size)?.set_data_page_count(u64::from(page_no));
        self.pager.store_page(METADATA_PAGE_NO)?;

        debug!("allocated data page {} of {}", page_no, self.max_page_count);
        Ok(page_no)
    }

    fn stats(&mut self) -> Result<HeapStats> {
        let page_count = self.data_page_count()?;
        let mut stats = HeapStats {
            data_pages: page_count,
            ..HeapStats::default()
        };

        for page_no in 1..=page_count {
            let buf = self.pager.load_page(page_no)?;
            let page = DataPage::open(page_no, buf)?;
            for record in page.records() {
                if record?.deleted {
                    stats.dead_records += 1;
                } else {
                    stats.live_records += 1;
                }
            }
            stats.used_bytes += page.used_space() as u64;
            stats.free_bytes += page.free_space() as u64;
        }

        Ok(stats)
    }
}
