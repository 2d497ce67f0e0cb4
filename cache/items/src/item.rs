//! Item records.
//!
//! Each cached entry lives in one slot of the cache's item arena. The
//! record holds:
//! - Identity (key) and client metadata (flags, expiry)
//! - The pre-rendered `" <flags> <bytes>\r\n"` suffix
//! - Payload bytes, including the trailing `\r\n`
//! - Intrusive LRU links (arena indices)
//! - Reference count and lifecycle state
//!
//! The total size charged against the memory budget is
//! `ITEM_HEADER_SIZE + key + 1 + suffix + payload`.

use std::fmt::Write;

use crate::allocator::{Chunk, ClassId};
use crate::config::ITEM_HEADER_SIZE;

/// Index of an item in the cache's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(usize);

impl ItemId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle state of an item record.
///
/// A vacant arena slot is the free state; it has no record at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Freshly allocated, not yet visible through the index or LRU.
    Allocated,
    /// Present in the lookup index and in its class's LRU.
    Linked,
    /// Unlinked while still held. Reclaimed on the last release.
    Orphaned,
}

/// Render the metadata suffix for an item.
pub fn render_suffix(flags: u32, payload_len: usize) -> String {
    let mut suffix = String::with_capacity(24);
    let _ = write!(suffix, " {} {}\r\n", flags, payload_len.saturating_sub(2));
    suffix
}

/// Total size of an item as charged to its size class, or `None` if it
/// does not fit in a `usize`.
#[inline]
pub fn total_size(key_len: usize, suffix_len: usize, payload_len: usize) -> Option<usize> {
    (ITEM_HEADER_SIZE + 1)
        .checked_add(key_len)?
        .checked_add(suffix_len)?
        .checked_add(payload_len)
}

/// A cached entry.
#[derive(Debug)]
pub(crate) struct Item {
    key: Box<[u8]>,
    class_id: ClassId,
    flags: u32,
    suffix: Box<str>,
    expire_at: Option<u32>,
    value: Box<[u8]>,
    chunk: Option<Chunk>,
    pub(crate) last_touch: u32,
    pub(crate) refcount: u32,
    pub(crate) state: ItemState,
    pub(crate) prev: Option<ItemId>,
    pub(crate) next: Option<ItemId>,
}

impl Item {
    /// Build a record in allocator-provided storage.
    ///
    /// The new item has one holder (the caller) and is not linked.
    pub(crate) fn new(
        key: &[u8],
        flags: u32,
        suffix: String,
        expire_at: Option<u32>,
        payload_len: usize,
        chunk: Chunk,
        now: u32,
    ) -> Self {
        Self {
            key: key.into(),
            class_id: chunk.class_id(),
            flags,
            suffix: suffix.into_boxed_str(),
            expire_at,
            value: vec![0; payload_len].into_boxed_slice(),
            chunk: Some(chunk),
            last_touch: now,
            refcount: 1,
            state: ItemState::Allocated,
            prev: None,
            next: None,
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> &[u8] {
        &self.key
    }

    #[inline]
    pub(crate) fn class_id(&self) -> ClassId {
        self.class_id
    }

    #[inline]
    pub(crate) fn flags(&self) -> u32 {
        self.flags
    }

    #[inline]
    pub(crate) fn suffix(&self) -> &str {
        &self.suffix
    }

    #[inline]
    pub(crate) fn expire_at(&self) -> Option<u32> {
        self.expire_at
    }

    #[inline]
    pub(crate) fn payload_len(&self) -> usize {
        self.value.len()
    }

    #[inline]
    pub(crate) fn value(&self) -> &[u8] {
        &self.value
    }

    #[inline]
    pub(crate) fn value_mut(&mut self) -> &mut [u8] {
        &mut self.value
    }

    #[inline]
    pub(crate) fn is_linked(&self) -> bool {
        self.state == ItemState::Linked
    }

    /// Whether the item's expiry time has passed.
    #[inline]
    pub(crate) fn is_expired(&self, now: u32) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }

    /// Total size charged to the item's class.
    ///
    /// The sum was bounds checked when the item was acquired.
    #[inline]
    pub(crate) fn total_size(&self) -> usize {
        ITEM_HEADER_SIZE + self.key.len() + 1 + self.suffix.len() + self.value.len()
    }

    /// Give the item's storage back, leaving it owned by no class.
    pub(crate) fn take_chunk(&mut self) -> Option<Chunk> {
        self.class_id = 0;
        self.chunk.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_suffix() {
        assert_eq!(render_suffix(0, 12), " 0 10\r\n");
        assert_eq!(render_suffix(4294967295, 2), " 4294967295 0\r\n");
    }

    #[test]
    fn test_total_size() {
        // header + "foo" + terminator + " 0 5\r\n" + "hello\r\n"
        assert_eq!(total_size(3, 6, 7), Some(ITEM_HEADER_SIZE + 3 + 1 + 6 + 7));
    }

    #[test]
    fn test_total_size_overflow() {
        assert_eq!(total_size(1, 8, usize::MAX - 8), None);
        assert_eq!(total_size(usize::MAX, 0, 0), None);
        let largest = usize::MAX - ITEM_HEADER_SIZE - 1;
        assert_eq!(total_size(0, 0, largest), Some(usize::MAX));
    }

    #[test]
    fn test_item_new() {
        let suffix = render_suffix(7, 12);
        let item = Item::new(b"key", 7, suffix, Some(500), 12, Chunk::new(3, 0, 1), 42);

        assert_eq!(item.key(), b"key");
        assert_eq!(item.class_id(), 3);
        assert_eq!(item.flags(), 7);
        assert_eq!(item.suffix(), " 7 10\r\n");
        assert_eq!(item.payload_len(), 12);
        assert_eq!(item.refcount, 1);
        assert_eq!(item.state, ItemState::Allocated);
        assert_eq!(item.last_touch, 42);
        assert_eq!(item.total_size(), ITEM_HEADER_SIZE + 3 + 1 + 7 + 12);
        assert!(item.prev.is_none() && item.next.is_none());
    }

    #[test]
    fn test_item_expiry() {
        let item = Item::new(b"k", 0, render_suffix(0, 2), Some(100), 2, Chunk::new(1, 0, 0), 0);
        assert!(!item.is_expired(99));
        assert!(item.is_expired(100));

        let forever = Item::new(b"k", 0, render_suffix(0, 2), None, 2, Chunk::new(1, 0, 0), 0);
        assert!(!forever.is_expired(u32::MAX));
    }

    #[test]
    fn test_take_chunk_clears_class() {
        let mut item = Item::new(b"k", 0, render_suffix(0, 2), None, 2, Chunk::new(5, 2, 9), 0);
        let chunk = item.take_chunk().unwrap();
        assert_eq!(chunk.class_id(), 5);
        assert_eq!(item.class_id(), 0);
        assert!(item.take_chunk().is_none());
    }
}
