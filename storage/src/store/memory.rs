use super::{file_len, page_range, PageStore};
use crate::Result;

/// In-memory page store.
///
/// Not persistent: all pages are lost when the store is dropped, unless the
/// bytes are taken out with [`MemoryStore::into_bytes`].
pub struct MemoryStore {
    data: Vec<u8>,
    page_size: usize,
    page_count: u32,
}

impl MemoryStore {
    /// Creates a zero-filled store of `page_count` pages.
    pub fn new(page_count: u32, page_size: u32) -> Result<Self> {
        let len = file_len(page_count, page_size)? as usize;

        Ok(Self {
            data: vec![0u8; len],
            page_size: page_size as usize,
            page_count,
        })
    }

    /// Rebuilds a store from bytes previously taken with `into_bytes`,
    /// padding with zeroes up to `page_count` pages.
    pub fn from_bytes(mut data: Vec<u8>, page_count: u32, page_size: u32) -> Result<Self> {
        let len = file_len(page_count, page_size)? as usize;
        if data.len() < len {
            data.resize(len, 0);
        }

        Ok(Self {
            data,
            page_size: page_size as usize,
            page_count,
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl PageStore for MemoryStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> Result<()> {
        let range = page_range(page_no, self.page_count, self.page_size, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_page(&mut self, page_no: u32, buf: &[u8]) -> Result<()> {
        let range = page_range(page_no, self.page_count, self.page_size, buf.len())?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    #[test]
    fn test_read_write_page() {
        let mut store = MemoryStore::new(4, 16).unwrap();
        store.write_page(3, &[7u8; 16]).unwrap();

        let mut buf = [0u8; 16];
        store.read_page(3, &mut buf).unwrap();
        assert_eq!(buf, [7u8; 16]);

        store.read_page(2, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn test_out_of_range_page() {
        let mut store = MemoryStore::new(2, 16).unwrap();
        let mut buf = [0u8; 16];

        assert!(matches!(
            store.read_page(2, &mut buf),
            Err(StorageError::PageNotFound(2))
        ));
        assert!(matches!(
            store.write_page(5, &buf),
            Err(StorageError::PageNotFound(5))
        ));
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut store = MemoryStore::new(2, 8).unwrap();
        store.write_page(1, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let bytes = store.into_bytes();
        assert_eq!(bytes.len(), 16);

        let mut store = MemoryStore::from_bytes(bytes, 3, 8).unwrap();
        let mut buf = [0u8; 8];
        store.read_page(1, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        store.read_page(2, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 8]);
    }
}
