//! Holder handles for items.

use std::fmt;

use crate::allocator::ClassId;
use crate::cache::ItemCache;
use crate::item::{Item, ItemId, ItemState};

/// One reference to an item.
///
/// While a guard exists its item is never reclaimed, even if it is
/// unlinked or evicted from view in the meantime. Dropping the guard
/// releases the reference; the last release of an unlinked item gives its
/// storage back to the allocator. Cloning a guard adds a holder.
///
/// Accessors take the cache lock for the duration of the call.
pub struct ItemGuard<'a> {
    cache: &'a ItemCache,
    id: ItemId,
}

impl<'a> ItemGuard<'a> {
    /// Wrap a reference that has already been counted.
    pub(crate) fn new(cache: &'a ItemCache, id: ItemId) -> Self {
        Self { cache, id }
    }

    pub(crate) fn cache(&self) -> &'a ItemCache {
        self.cache
    }

    fn with<R>(&self, f: impl FnOnce(&Item) -> R) -> R {
        let inner = self.cache.lock();
        f(inner.item(self.id))
    }

    /// Arena index of the item.
    #[inline]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// The item's key.
    pub fn key(&self) -> Vec<u8> {
        self.with(|item| item.key().to_vec())
    }

    /// Opaque client flags.
    pub fn flags(&self) -> u32 {
        self.with(Item::flags)
    }

    /// Payload length, including the `\r\n` terminator.
    pub fn payload_len(&self) -> usize {
        self.with(Item::payload_len)
    }

    /// The pre-rendered `" <flags> <bytes>\r\n"` suffix.
    pub fn suffix(&self) -> String {
        self.with(|item| item.suffix().to_owned())
    }

    /// Absolute expiry time, if any.
    pub fn expire_at(&self) -> Option<u32> {
        self.with(Item::expire_at)
    }

    /// Size class of the item.
    pub fn class_id(&self) -> ClassId {
        self.with(Item::class_id)
    }

    /// Total size charged against the class.
    pub fn total_size(&self) -> usize {
        self.with(Item::total_size)
    }

    /// Time of the last LRU repositioning.
    pub fn last_touch(&self) -> u32 {
        self.with(|item| item.last_touch)
    }

    /// Number of holders, this guard included.
    pub fn refcount(&self) -> u32 {
        self.with(|item| item.refcount)
    }

    /// Lifecycle state.
    pub fn state(&self) -> ItemState {
        self.with(|item| item.state)
    }

    /// Copy of the payload bytes.
    pub fn value(&self) -> Vec<u8> {
        self.with(|item| item.value().to_vec())
    }

    /// Copy `data` into the start of the payload.
    ///
    /// # Panics
    ///
    /// Panics if `data` is longer than the payload.
    pub fn write_value(&self, data: &[u8]) {
        let mut inner = self.cache.lock();
        inner.item_mut(self.id).value_mut()[..data.len()].copy_from_slice(data);
    }

    /// Release this reference now.
    pub fn release(self) {
        drop(self);
    }
}

impl Clone for ItemGuard<'_> {
    fn clone(&self) -> Self {
        self.cache.retain(self.id);
        Self::new(self.cache, self.id)
    }
}

impl Drop for ItemGuard<'_> {
    fn drop(&mut self) {
        self.cache.release(self.id);
    }
}

impl fmt::Debug for ItemGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemGuard").field("id", &self.id).finish()
    }
}
