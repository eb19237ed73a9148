//! Best-effort key → page hints.
//!
//! Remembers the data page a key was last seen on so lookups can check that
//! page first. Hints are keyed by a CRC32 of the serialized key, so two keys
//! may share a hint; a hint is only ever a starting point and a miss on the
//! hinted page always falls back to scanning every other page.
//!
//! The map is capped; once full, the oldest hint is evicted.

use std::collections::{HashMap, VecDeque};

pub struct PageHints {
    capacity: usize,
    pages: HashMap<u32, u32>,
    order: VecDeque<u32>,
}

impl PageHints {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pages: HashMap::with_capacity(capacity.min(4096)),
            order: VecDeque::new(),
        }
    }

    pub fn key_hash(key: &[u8]) -> u32 {
        crc32fast::hash(key)
    }

    pub fn get(&self, hash: u32) -> Option<u32> {
        self.pages.get(&hash).copied()
    }

    pub fn record(&mut self, hash: u32, page_no: u32) {
        if self.capacity == 0 {
            return;
        }

        if self.pages.insert(hash, page_no).is_none() {
            self.order.push_back(hash);
        }

        while self.pages.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.pages.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn forget(&mut self, hash: u32) {
        if self.pages.remove(&hash).is_some() {
            self.order.retain(|h| *h != hash);
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Data page numbers to scan, hinted page first, then `1..=page_count`
/// without repeating it.
pub fn scan_order(hint: Option<u32>, page_count: u32) -> impl Iterator<Item = u32> {
    let hint = hint.filter(|page_no| (1..=page_count).contains(page_no));
    hint.into_iter()
        .chain((1..=page_count).filter(move |page_no| Some(*page_no) != hint))
}
