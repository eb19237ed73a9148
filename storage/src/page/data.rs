//! Data page: a free-space offset followed by a packed run of records.
//!
//! ```text
//! +----------------------+ offset 0
//! | free_space_offset u32|
//! +----------------------+ offset 4 (DATA_SEGMENT_OFFSET)
//! | record | record | ...|
//! +----------------------+ free_space_offset
//! | free space           |
//! +----------------------+ page_size
//! ```
//!
//! Records are only ever appended. Removing a record flips its tombstone flag
//! in place; the bytes it occupies are never reclaimed, so the free-space
//! offset only grows.

use super::{read_u32, write_u32};
use crate::record::{self, record_length, RecordHeader, RECORD_HEADER_SIZE};
use crate::{Result, StorageError};

const FREE_SPACE_OFFSET_FIELD: usize = 0;

/// Offset of the first record, right after the page's own header.
pub const DATA_SEGMENT_OFFSET: usize = FREE_SPACE_OFFSET_FIELD + 4;

pub struct DataPage<'a> {
    page_no: u32,
    data: &'a mut [u8],
}

impl<'a> DataPage<'a> {
    /// Turns a zero-filled buffer into an empty data page.
    pub fn init(page_no: u32, data: &'a mut [u8]) -> Self {
        debug_assert!(page_no > 0, "page 0 is reserved for metadata");

        let mut page = Self { page_no, data };
        page.set_free_space_offset(DATA_SEGMENT_OFFSET);
        page
    }

    /// Wraps a buffer holding a previously initialized data page.
    pub fn open(page_no: u32, data: &'a mut [u8]) -> Result<Self> {
        debug_assert!(page_no > 0, "page 0 is reserved for metadata");

        if data.len() < DATA_SEGMENT_OFFSET {
            return Err(StorageError::InvalidBufferSize {
                expected: DATA_SEGMENT_OFFSET,
                actual: data.len(),
            });
        }

        let page = Self { page_no, data };
        let free = page.free_space_offset();
        if free < DATA_SEGMENT_OFFSET || free > page.capacity() {
            return Err(StorageError::Corrupted {
                page_no,
                reason: format!(
                    "free space offset {} outside {}..={}",
                    free,
                    DATA_SEGMENT_OFFSET,
                    page.capacity()
                ),
            });
        }

        Ok(page)
    }

    pub fn page_no(&self) -> u32 {
        self.page_no
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn free_space_offset(&self) -> usize {
        read_u32(self.data, FREE_SPACE_OFFSET_FIELD) as usize
    }

    fn set_free_space_offset(&mut self, offset: usize) {
        write_u32(self.data, FREE_SPACE_OFFSET_FIELD, offset as u32);
    }

    pub fn free_space(&self) -> usize {
        self.capacity() - self.free_space_offset()
    }

    /// Whether a record of this shape fits in the page's remaining space.
    ///
    /// Fails with `RecordTooLarge` if it could not fit even in an empty page.
    pub fn has_room_for(&self, key_len: usize, value_len: usize) -> Result<bool> {
        let record_len = record_length(key_len, value_len);
        ensure_fits_empty_page(self.capacity(), record_len)?;
        Ok(record_len <= self.free_space())
    }

    /// Appends a record at the free-space offset.
    ///
    /// Returns `Ok(false)` without writing anything when the page is too full;
    /// the caller is expected to move on to a fresh page.
    pub fn add_record(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        if !self.has_room_for(key.len(), value.len())? {
            return Ok(false);
        }

        let offset = self.free_space_offset();
        let next = record::write_record(self.data, offset, key, value);
        self.set_free_space_offset(next);
        Ok(true)
    }

    /// Value bytes of the live record whose key equals `key`.
    pub fn find_record(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .find_offset(key)?
            .map(|(offset, header)| self.value_at(offset, &header).to_vec()))
    }

    /// Tombstones the live record for `key` and returns its value.
    pub fn remove_record(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some((offset, header)) = self.find_offset(key)? else {
            return Ok(None);
        };

        let value = self.value_at(offset, &header).to_vec();
        record::mark_deleted(self.data, offset);
        Ok(Some(value))
    }

    /// Iterates over every record on the page, tombstoned ones included.
    pub fn records(&self) -> Records<'_> {
        Records {
            page_no: self.page_no,
            data: &*self.data,
            cursor: DATA_SEGMENT_OFFSET,
            end: self.free_space_offset(),
            failed: false,
        }
    }

    pub fn used_space(&self) -> usize {
        self.free_space_offset()
    }

    pub fn fill_percentage(&self) -> f32 {
        (self.used_space() as f32 / self.capacity() as f32) * 100.0
    }

    fn find_offset(&self, key: &[u8]) -> Result<Option<(usize, RecordHeader)>> {
        let end = self.free_space_offset();
        let mut offset = DATA_SEGMENT_OFFSET;

        while offset < end {
            let header = header_at(self.data, self.page_no, offset, end)?;
            // Length check first; the key bytes are only compared on a match.
            if !header.deleted
                && header.key_len as usize == key.len()
                && record::read_key(self.data, offset, header.key_len) == key
            {
                return Ok(Some((offset, header)));
            }
            offset += header.record_len();
        }

        Ok(None)
    }

    fn value_at(&self, offset: usize, header: &RecordHeader) -> &[u8] {
        record::read_value(self.data, offset, header.key_len, header.value_len)
    }
}

/// Fails if a record of `record_len` bytes could never fit in a page of
/// `page_size` bytes.
pub(crate) fn ensure_fits_empty_page(page_size: usize, record_len: usize) -> Result<()> {
    if DATA_SEGMENT_OFFSET + record_len > page_size {
        return Err(StorageError::RecordTooLarge {
            record_len,
            page_size,
        });
    }
    Ok(())
}

/// Reads the header at `offset`, checking that the whole record lies before
/// `end`.
fn header_at(data: &[u8], page_no: u32, offset: usize, end: usize) -> Result<RecordHeader> {
    if offset + RECORD_HEADER_SIZE > end {
        return Err(StorageError::Corrupted {
            page_no,
            reason: format!(
                "record header at {} runs past free space offset {}",
                offset, end
            ),
        });
    }

    let header = record::read_header(data, offset);
    let record_end = offset as u64
        + RECORD_HEADER_SIZE as u64
        + u64::from(header.key_len)
        + u64::from(header.value_len);
    if record_end > end as u64 {
        return Err(StorageError::Corrupted {
            page_no,
            reason: format!(
                "record at {} ends at {}, past free space offset {}",
                offset, record_end, end
            ),
        });
    }

    Ok(header)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'p> {
    pub offset: usize,
    pub deleted: bool,
    pub key: &'p [u8],
    pub value: &'p [u8],
}

pub struct Records<'p> {
    page_no: u32,
    data: &'p [u8],
    cursor: usize,
    end: usize,
    failed: bool,
}

impl<'p> Iterator for Records<'p> {
    type Item = Result<RecordRef<'p>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.end {
            return None;
        }

        let offset = self.cursor;
        match header_at(self.data, self.page_no, offset, self.end) {
            Ok(header) => {
                self.cursor += header.record_len();
                Some(Ok(RecordRef {
                    offset,
                    deleted: header.deleted,
                    key: record::read_key(self.data, offset, header.key_len),
                    value: record::read_value(
                        self.data,
                        offset,
                        header.key_len,
                        header.value_len,
                    ),
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_SIZE: usize = 4096;

    fn empty_buffer() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    #[test]
    fn test_page_creation() {
        let mut buf = empty_buffer();
        let page = DataPage::init(42, &mut buf);

        assert_eq!(page.page_no(), 42);
        assert_eq!(page.free_space_offset(), DATA_SEGMENT_OFFSET);
        assert_eq!(page.free_space(), PAGE_SIZE - DATA_SEGMENT_OFFSET);
        assert_eq!(page.records().count(), 0);
        assert_eq!(&buf[0..4], &[4, 0, 0, 0]);
    }

    #[test]
    fn test_add_record() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);

        assert!(page.add_record(b"key", b"value").unwrap());

        assert_eq!(
            page.find_record(b"key").unwrap().as_deref(),
            Some(&b"value"[..])
        );
        assert_eq!(
            page.free_space_offset(),
            DATA_SEGMENT_OFFSET + record_length(3, 5)
        );
    }

    #[test]
    fn test_add_multiple_records() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);

        for i in 1..=5 {
            let key = format!("key{}", i);
            let value = format!("value{}", i);
            assert!(page.add_record(key.as_bytes(), value.as_bytes()).unwrap());
        }

        assert_eq!(
            page.find_record(b"key3").unwrap().as_deref(),
            Some(&b"value3"[..])
        );
        assert_eq!(page.find_record(b"key6").unwrap(), None);
    }

    #[test]
    fn test_add_and_then_remove_record() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);
        page.add_record(b"key", b"value").unwrap();
        let offset_before = page.free_space_offset();

        let removed = page.remove_record(b"key").unwrap();

        assert_eq!(removed.as_deref(), Some(&b"value"[..]));
        assert_eq!(page.find_record(b"key").unwrap(), None);
        assert_eq!(page.remove_record(b"key").unwrap(), None);
        // Tombstones never give space back
        assert_eq!(page.free_space_offset(), offset_before);
    }

    #[test]
    fn test_scan_skips_tombstones() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);
        page.add_record(b"a", b"first").unwrap();
        page.add_record(b"b", b"second").unwrap();
        page.add_record(b"c", b"third").unwrap();

        page.remove_record(b"b").unwrap();
        page.add_record(b"b", b"again").unwrap();

        assert_eq!(page.find_record(b"c").unwrap().as_deref(), Some(&b"third"[..]));
        assert_eq!(page.find_record(b"b").unwrap().as_deref(), Some(&b"again"[..]));

        let deleted: Vec<bool> = page.records().map(|r| r.unwrap().deleted).collect();
        assert_eq!(deleted, vec![false, true, false, false]);
    }

    #[test]
    fn test_same_length_keys_are_compared_by_bytes() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);
        page.add_record(b"key1", b"one").unwrap();
        page.add_record(b"key2", b"two").unwrap();

        assert_eq!(page.find_record(b"key2").unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(page.find_record(b"key").unwrap(), None);
        assert_eq!(page.find_record(b"key22").unwrap(), None);
    }

    #[test]
    fn test_overflow_page() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);
        let value = vec![0u8; 2 * 1024];

        let first = page.add_record(b"key1", &value).unwrap();
        let offset = page.free_space_offset();
        let second = page.add_record(b"key2", &value).unwrap();

        assert!(first, "adding first record should succeed");
        assert!(!second, "adding second record should fail");
        assert_eq!(page.free_space_offset(), offset);
        assert_eq!(page.find_record(b"key2").unwrap(), None);
    }

    #[test]
    fn test_record_too_big_for_new_page() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);
        let value = vec![0u8; 4 * 1024];

        let err = page.add_record(b"key", &value).unwrap_err();

        assert!(matches!(
            err,
            StorageError::RecordTooLarge {
                page_size: PAGE_SIZE,
                ..
            }
        ));
        assert_eq!(page.free_space_offset(), DATA_SEGMENT_OFFSET);
    }

    #[test]
    fn test_record_filling_page_exactly() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);
        let value_len = PAGE_SIZE - DATA_SEGMENT_OFFSET - RECORD_HEADER_SIZE - 1;

        assert!(page.add_record(b"k", &vec![7u8; value_len]).unwrap());
        assert_eq!(page.free_space(), 0);

        // Would fit in an empty page, so this is a plain "page full".
        assert!(!page.add_record(b"", b"").unwrap());
        assert_eq!(page.find_record(b"k").unwrap().map(|v| v.len()), Some(value_len));
    }

    #[test]
    fn test_open_existing_page() {
        let mut buf = empty_buffer();
        {
            let mut page = DataPage::init(3, &mut buf);
            page.add_record(b"persisted", b"yes").unwrap();
        }

        let page = DataPage::open(3, &mut buf).unwrap();

        assert_eq!(
            page.find_record(b"persisted").unwrap().as_deref(),
            Some(&b"yes"[..])
        );
    }

    #[test]
    fn test_open_rejects_bad_free_space_offset() {
        let mut buf = empty_buffer();
        assert!(matches!(
            DataPage::open(1, &mut buf),
            Err(StorageError::Corrupted { page_no: 1, .. })
        ));

        buf[0..4].copy_from_slice(&(PAGE_SIZE as u32 + 1).to_le_bytes());
        assert!(matches!(
            DataPage::open(1, &mut buf),
            Err(StorageError::Corrupted { page_no: 1, .. })
        ));
    }

    #[test]
    fn test_scan_detects_truncated_record() {
        let mut buf = empty_buffer();
        {
            let mut page = DataPage::init(2, &mut buf);
            page.add_record(b"key", b"value").unwrap();
        }
        // Claim a value far longer than what was written.
        buf[DATA_SEGMENT_OFFSET + 5..DATA_SEGMENT_OFFSET + 9].copy_from_slice(&1000u32.to_le_bytes());

        let page = DataPage::open(2, &mut buf).unwrap();

        assert!(matches!(
            page.find_record(b"other"),
            Err(StorageError::Corrupted { page_no: 2, .. })
        ));
        let mut records = page.records();
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());
    }

    #[test]
    fn test_page_fills_up() {
        let mut buf = empty_buffer();
        let mut page = DataPage::init(1, &mut buf);
        let value = vec![b'X'; 100];

        let mut count = 0u32;
        while page
            .add_record(format!("{:04}", count).as_bytes(), &value)
            .unwrap()
        {
            count += 1;
        }

        // (4096 - 4) / (9 + 4 + 100) = 36 records
        assert_eq!(count, 36);
        assert!(page.fill_percentage() > 95.0);
        assert_eq!(page.records().count(), 36);
    }
}
