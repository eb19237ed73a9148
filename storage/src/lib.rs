//! Storage engine for HeapKV
//!
//! This crate provides an embedded key-value store persisted as a single
//! heap file of fixed-size pages: a metadata page at index 0 followed by
//! data pages holding packed, tombstoned records. Lookups scan the data
//! pages in order; there is no index.

pub mod config;
pub mod heap;
pub mod hints;
pub mod page;
pub mod record;
pub mod serializer;
pub mod store;

pub use config::HeapFileConfig;
pub use heap::{DefaultStore, HeapFile, HeapStats};
pub use page::{DataPage, MetadataPage};
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer};
#[cfg(feature = "mmap")]
pub use store::MmapStore;
pub use store::{FileStore, MemoryStore, PageStore, Pager};

use thiserror::Error;

/// Boxed error produced by a [`Serializer`] implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record of {record_len} bytes cannot fit in an empty page of {page_size} bytes")]
    RecordTooLarge { record_len: usize, page_size: usize },

    #[error("The limit of the number of pages is {0}. It cannot be exceeded.")]
    TooManyPages(u32),

    #[error("File of {requested} bytes exceeds the single mapping limit of {limit} bytes")]
    UnsupportedFileSize { requested: u128, limit: u64 },

    #[error("Page {0} not found")]
    PageNotFound(u32),

    #[error("Invalid buffer size: expected {expected}, got {actual}")]
    InvalidBufferSize { expected: usize, actual: usize },

    #[error("Corrupted page {page_no}: {reason}")]
    Corrupted { page_no: u32, reason: String },

    #[error("Checksum mismatch for page {0}")]
    ChecksumMismatch(u32),

    #[error("Serialization failed: {0}")]
    Serialize(#[source] BoxError),

    #[error("Deserialization failed: {0}")]
    Deserialize(#[source] BoxError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
