//! The item cache: linkage, allocation with eviction, and the lifecycle API.
//!
//! All state (arena, LRU buckets, lookup index, allocator, counters) lives
//! behind one lock. Every operation takes it once, does a bounded amount of
//! work and releases it, so index and LRU membership are never observed out
//! of step.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use slab::Slab;
use tracing::{debug, trace};

use crate::allocator::{ClassId, SlabAllocator, SlabPool};
use crate::clock::{Clock, CoarseClock};
use crate::config::{ItemCacheConfig, MAX_KEY_LEN, MAX_PAYLOAD_LEN, UPDATE_INTERVAL};
use crate::error::{CacheError, CacheResult, ConfigError};
use crate::guard::ItemGuard;
use crate::index::{HashIndex, LookupIndex};
use crate::item::{Item, ItemId, ItemState, render_suffix, total_size};
use crate::lru::LruBuckets;
use crate::stats::ItemCounters;

/// Cache state guarded by the cache lock.
pub(crate) struct Inner {
    pub(crate) items: Slab<Item>,
    pub(crate) lru: LruBuckets,
    pub(crate) allocator: Box<dyn SlabAllocator>,
    pub(crate) index: Box<dyn LookupIndex>,
    pub(crate) counters: ItemCounters,
    /// Items touched at or before this time are treated as flushed.
    pub(crate) oldest_live: Option<u32>,
}

impl Inner {
    pub(crate) fn new(
        allocator: Box<dyn SlabAllocator>,
        index: Box<dyn LookupIndex>,
        started: u64,
    ) -> Self {
        Self {
            items: Slab::new(),
            lru: LruBuckets::new(allocator.largest_class()),
            allocator,
            index,
            counters: ItemCounters {
                started,
                ..Default::default()
            },
            oldest_live: None,
        }
    }

    #[inline]
    pub(crate) fn item(&self, id: ItemId) -> &Item {
        &self.items[id.index()]
    }

    #[inline]
    pub(crate) fn item_mut(&mut self, id: ItemId) -> &mut Item {
        &mut self.items[id.index()]
    }

    /// Allocate and initialize a record for a new item.
    ///
    /// On allocator exhaustion, evicts at most one unreferenced item from the
    /// tail of the same class and retries once.
    pub(crate) fn acquire(
        &mut self,
        key: &[u8],
        flags: u32,
        expire_at: Option<u32>,
        payload_len: usize,
        now: u32,
        policy: EvictionPolicy,
    ) -> CacheResult<ItemId> {
        if key.len() > MAX_KEY_LEN {
            return Err(CacheError::KeyTooLong);
        }
        if payload_len < 2 {
            return Err(CacheError::PayloadTooShort);
        }

        let suffix = render_suffix(flags, payload_len);
        let size =
            total_size(key.len(), suffix.len(), payload_len).ok_or(CacheError::OversizedEntry)?;
        let class_id = self
            .allocator
            .classify(size)
            .ok_or(CacheError::OversizedEntry)?;

        let chunk = match self.allocator.allocate(class_id) {
            Some(chunk) => chunk,
            None => {
                if !policy.evict_to_free {
                    debug!(class_id, size, "class exhausted and eviction is disabled");
                    return Err(CacheError::OutOfMemory);
                }
                self.evict(class_id, policy.scan_depth);
                match self.allocator.allocate(class_id) {
                    Some(chunk) => chunk,
                    None => {
                        debug!(class_id, size, "class exhausted after eviction attempt");
                        return Err(CacheError::OutOfMemory);
                    }
                }
            }
        };

        let item = Item::new(key, flags, suffix, expire_at, payload_len, chunk, now);
        Ok(ItemId::new(self.items.insert(item)))
    }

    /// Unlink the first unreferenced item within `scan_depth` of the class
    /// tail. Returns whether anything was evicted.
    pub(crate) fn evict(&mut self, class_id: ClassId, scan_depth: usize) -> bool {
        let victim = self
            .lru
            .walk_from_tail(class_id, &self.items)
            .take(scan_depth)
            .find(|(_, item)| item.refcount == 0)
            .map(|(id, _)| id);

        match victim {
            Some(id) => {
                trace!(class_id, "evicting item from LRU tail");
                self.unlink(id);
                self.counters.evictions += 1;
                true
            }
            None => false,
        }
    }

    /// Make an item reachable through the index and its class's LRU.
    ///
    /// An item already linked under the same key is unlinked first.
    pub(crate) fn link(&mut self, id: ItemId, now: u32) -> CacheResult<()> {
        let item = self.item(id);
        assert_ne!(item.state, ItemState::Linked, "item is already linked");
        if item.payload_len() >= MAX_PAYLOAD_LEN {
            return Err(CacheError::OversizedEntry);
        }

        if let Some(existing) = self.index.get(item.key()) {
            self.unlink(existing);
        }

        let item = &mut self.items[id.index()];
        item.state = ItemState::Linked;
        item.last_touch = now;
        let size = item.total_size() as u64;
        self.index.insert(item.key(), id);

        self.counters.curr_bytes += size;
        self.counters.curr_items += 1;
        self.counters.total_items += 1;

        self.lru.push_front(&mut self.items, id);
        Ok(())
    }

    /// Remove an item from the index and its LRU, reclaiming it if nobody
    /// holds it. Held items become orphans until their last release.
    pub(crate) fn unlink(&mut self, id: ItemId) {
        let item = &mut self.items[id.index()];
        if item.state == ItemState::Linked {
            item.state = ItemState::Orphaned;
            let size = item.total_size() as u64;
            let removed = self.index.remove(item.key());
            assert_eq!(removed, Some(id), "index and LRU disagree about an item");

            self.counters.curr_bytes -= size;
            self.counters.curr_items -= 1;

            self.lru.unlink(&mut self.items, id);
        }

        if self.item(id).refcount == 0 {
            self.reclaim(id);
        }
    }

    /// Return an item's storage to the allocator.
    fn reclaim(&mut self, id: ItemId) {
        let item = self.item(id);
        assert!(
            item.refcount == 0 && !item.is_linked(),
            "reclaiming an item that is still held or linked"
        );

        let mut item = self.items.remove(id.index());
        let size = item.total_size();
        if let Some(chunk) = item.take_chunk() {
            self.allocator.release(chunk, size);
        }
        self.counters.reclaimed += 1;
    }

    /// Add a holder.
    pub(crate) fn retain(&mut self, id: ItemId) {
        self.item_mut(id).refcount += 1;
    }

    /// Drop a holder, reclaiming the item if it was the last one and the
    /// item is not linked.
    pub(crate) fn release(&mut self, id: ItemId) {
        let item = self.item_mut(id);
        assert!(item.refcount > 0, "released an item with no holders");
        item.refcount -= 1;
        if item.refcount == 0 && !item.is_linked() {
            self.reclaim(id);
        }
    }

    /// Move a linked item to the head of its LRU if it has not been moved
    /// in the last `UPDATE_INTERVAL` seconds.
    pub(crate) fn touch(&mut self, id: ItemId, now: u32) -> bool {
        let item = self.item(id);
        if !item.is_linked() || now.saturating_sub(item.last_touch) < UPDATE_INTERVAL {
            return false;
        }

        self.lru.unlink(&mut self.items, id);
        self.item_mut(id).last_touch = now;
        self.lru.push_front(&mut self.items, id);
        true
    }

    /// Unlink `old` and link `new` in one step.
    pub(crate) fn swap(&mut self, old: ItemId, new: ItemId, now: u32) -> CacheResult<()> {
        if self.item(new).payload_len() >= MAX_PAYLOAD_LEN {
            return Err(CacheError::OversizedEntry);
        }
        self.unlink(old);
        self.link(new, now)
    }

    /// Look up a live item and add a holder.
    ///
    /// Expired items, and items older than the flush cutoff, are unlinked
    /// on the way.
    pub(crate) fn get(&mut self, key: &[u8], now: u32) -> Option<ItemId> {
        let id = self.index.get(key)?;
        let item = self.item(id);

        let flushed = self
            .oldest_live
            .is_some_and(|cutoff| cutoff <= now && item.last_touch <= cutoff);

        if flushed || item.is_expired(now) {
            self.unlink(id);
            return None;
        }

        self.retain(id);
        Some(id)
    }

    /// Unlink the item stored under `key`.
    pub(crate) fn delete(&mut self, key: &[u8]) -> bool {
        match self.index.get(key) {
            Some(id) => {
                self.unlink(id);
                true
            }
            None => false,
        }
    }
}

/// How `acquire` behaves when a class is exhausted.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvictionPolicy {
    pub(crate) evict_to_free: bool,
    pub(crate) scan_depth: usize,
}

/// Slab-classed item cache with per-class LRU eviction.
///
/// # Example
///
/// ```
/// use item_cache::ItemCache;
///
/// let cache = ItemCache::builder()
///     .memory_limit(4 * 1024 * 1024)
///     .build()
///     .unwrap();
///
/// let item = cache.acquire(b"greeting", 0, None, 7).unwrap();
/// item.write_value(b"hello\r\n");
/// cache.insert(&item).unwrap();
/// drop(item);
///
/// let found = cache.get(b"greeting").unwrap();
/// assert_eq!(found.value(), b"hello\r\n");
/// ```
pub struct ItemCache {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    policy: EvictionPolicy,
}

impl ItemCache {
    /// Create a new builder.
    pub fn builder() -> ItemCacheBuilder {
        ItemCacheBuilder::new()
    }

    /// Create a cache with the default slab pool and hash index.
    pub fn new(config: ItemCacheConfig) -> Result<Self, ConfigError> {
        ItemCacheBuilder::from_config(config).build()
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    #[inline]
    fn id_of(&self, item: &ItemGuard<'_>) -> ItemId {
        debug_assert!(
            std::ptr::eq(item.cache(), self),
            "item guard belongs to another cache"
        );
        item.id()
    }

    /// Current cache time, in seconds since start.
    ///
    /// Operations that stamp items read the clock while holding the cache
    /// lock, so stamps are applied in the order they were read.
    #[inline]
    pub fn now(&self) -> u32 {
        self.clock.now()
    }

    /// Allocate a new, unlinked item.
    ///
    /// The returned guard is the item's only holder. Write the payload with
    /// [`ItemGuard::write_value`] and make it visible with
    /// [`insert`](Self::insert). Dropping the guard without inserting gives
    /// the storage back.
    ///
    /// `payload_len` counts the value plus its `\r\n` terminator. When the
    /// item's class is full, at most one unreferenced item near the class's
    /// LRU tail is evicted to make room.
    pub fn acquire(
        &self,
        key: &[u8],
        flags: u32,
        expire_at: Option<u32>,
        payload_len: usize,
    ) -> CacheResult<ItemGuard<'_>> {
        let mut inner = self.lock();
        let now = self.now();
        let id = inner.acquire(key, flags, expire_at, payload_len, now, self.policy)?;
        drop(inner);
        Ok(ItemGuard::new(self, id))
    }

    /// Whether an item with this key, flags and payload length maps to a
    /// size class.
    pub fn fits(&self, key: &[u8], flags: u32, payload_len: usize) -> bool {
        let suffix = render_suffix(flags, payload_len);
        total_size(key.len(), suffix.len(), payload_len)
            .is_some_and(|size| self.lock().allocator.classify(size).is_some())
    }

    /// Link an acquired item into the index and its LRU.
    ///
    /// Replaces any item already stored under the same key.
    pub fn insert(&self, item: &ItemGuard<'_>) -> CacheResult<()> {
        let id = self.id_of(item);
        let mut inner = self.lock();
        let now = self.now();
        inner.link(id, now)
    }

    /// Unlink a held item. It stays readable through the guard and is
    /// reclaimed when the last holder releases it.
    pub fn unlink(&self, item: &ItemGuard<'_>) {
        let id = self.id_of(item);
        self.lock().unlink(id);
    }

    /// Reposition an item at the head of its LRU, at most once per
    /// `UPDATE_INTERVAL`. Returns whether the item moved.
    pub fn touch(&self, item: &ItemGuard<'_>) -> bool {
        let id = self.id_of(item);
        let mut inner = self.lock();
        let now = self.now();
        inner.touch(id, now)
    }

    /// Atomically replace `old` with `new`.
    pub fn swap(&self, old: &ItemGuard<'_>, new: &ItemGuard<'_>) -> CacheResult<()> {
        let old = self.id_of(old);
        let new = self.id_of(new);
        let mut inner = self.lock();
        let now = self.now();
        inner.swap(old, new, now)
    }

    /// Find a live item by key.
    pub fn get(&self, key: &[u8]) -> Option<ItemGuard<'_>> {
        let mut inner = self.lock();
        let now = self.now();
        let id = inner.get(key, now)?;
        drop(inner);
        Some(ItemGuard::new(self, id))
    }

    /// Unlink the item stored under `key`. Returns whether one was found.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.lock().delete(key)
    }

    /// Drop one holder of an item.
    pub(crate) fn release(&self, id: ItemId) {
        self.lock().release(id);
    }

    /// Add one holder to an item.
    pub(crate) fn retain(&self, id: ItemId) {
        self.lock().retain(id);
    }
}

/// Builder for [`ItemCache`].
pub struct ItemCacheBuilder {
    config: ItemCacheConfig,
    clock: Option<Arc<dyn Clock>>,
    allocator: Option<Box<dyn SlabAllocator>>,
    index: Option<Box<dyn LookupIndex>>,
}

impl Default for ItemCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemCacheBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ItemCacheConfig::default())
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ItemCacheConfig) -> Self {
        Self {
            config,
            clock: None,
            allocator: None,
            index: None,
        }
    }

    /// Set the memory limit in bytes.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.config.memory_limit = bytes;
        self
    }

    /// Set the page size in bytes. This is also the largest class.
    pub fn page_size(mut self, bytes: usize) -> Self {
        self.config.page_size = bytes;
        self
    }

    /// Set the payload room of the smallest class.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes;
        self
    }

    /// Set the growth factor between classes. Must be > 1.0.
    pub fn growth_factor(mut self, factor: f64) -> Self {
        self.config.growth_factor = factor;
        self
    }

    /// Enable or disable eviction when a class is exhausted.
    pub fn evict_to_free(mut self, enabled: bool) -> Self {
        self.config.evict_to_free = enabled;
        self
    }

    /// Set how many tail items an eviction examines.
    pub fn eviction_scan_depth(mut self, depth: usize) -> Self {
        self.config.eviction_scan_depth = depth;
        self
    }

    /// Use a custom clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a custom allocator instead of a [`SlabPool`] built from the
    /// configuration. Pool sizing settings are then ignored.
    pub fn allocator(mut self, allocator: impl SlabAllocator + 'static) -> Self {
        self.allocator = Some(Box::new(allocator));
        self
    }

    /// Use a custom lookup index.
    pub fn index(mut self, index: impl LookupIndex + 'static) -> Self {
        self.index = Some(Box::new(index));
        self
    }

    /// Build the cache.
    pub fn build(self) -> Result<ItemCache, ConfigError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(CoarseClock::new()));
        let allocator = match self.allocator {
            Some(allocator) => allocator,
            None => Box::new(SlabPool::new(&self.config)),
        };
        let index = self
            .index
            .unwrap_or_else(|| Box::new(HashIndex::new()));

        debug!(
            memory_limit = self.config.memory_limit,
            page_size = self.config.page_size,
            classes = allocator.largest_class(),
            evict_to_free = self.config.evict_to_free,
            "item cache created"
        );

        Ok(ItemCache {
            inner: Mutex::new(Inner::new(allocator, index, clock.started())),
            clock,
            policy: EvictionPolicy {
                evict_to_free: self.config.evict_to_free,
                scan_depth: self.config.eviction_scan_depth,
            },
        })
    }
}
