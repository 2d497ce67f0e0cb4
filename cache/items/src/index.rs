//! Key to item lookup index.

use ahash::AHashMap;

use crate::item::ItemId;

/// Key to item association kept consistent with LRU membership.
///
/// Only the cache's linkage code mutates the index, and always together
/// with the item's LRU bucket.
pub trait LookupIndex: Send {
    /// Associate `key` with `id`. The key must not already be present.
    fn insert(&mut self, key: &[u8], id: ItemId);

    /// Remove `key`, returning the item it pointed to.
    fn remove(&mut self, key: &[u8]) -> Option<ItemId>;

    /// Find the item for `key`.
    fn get(&self, key: &[u8]) -> Option<ItemId>;

    /// Number of keys in the index.
    fn len(&self) -> usize;

    /// Whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash map backed index.
#[derive(Debug, Default)]
pub struct HashIndex {
    map: AHashMap<Box<[u8]>, ItemId>,
}

impl HashIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: AHashMap::with_capacity(capacity),
        }
    }
}

impl LookupIndex for HashIndex {
    fn insert(&mut self, key: &[u8], id: ItemId) {
        let previous = self.map.insert(key.into(), id);
        assert!(
            previous.is_none(),
            "key inserted into the index while already present"
        );
    }

    fn remove(&mut self, key: &[u8]) -> Option<ItemId> {
        self.map.remove(key)
    }

    fn get(&self, key: &[u8]) -> Option<ItemId> {
        self.map.get(key).copied()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut index = HashIndex::new();
        assert!(index.is_empty());

        index.insert(b"alpha", ItemId::new(3));
        index.insert(b"beta", ItemId::new(7));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(b"alpha"), Some(ItemId::new(3)));
        assert_eq!(index.get(b"gamma"), None);

        assert_eq!(index.remove(b"alpha"), Some(ItemId::new(3)));
        assert_eq!(index.remove(b"alpha"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already present")]
    fn test_duplicate_insert_panics() {
        let mut index = HashIndex::with_capacity(4);
        index.insert(b"alpha", ItemId::new(1));
        index.insert(b"alpha", ItemId::new(2));
    }
}
