//! Slab-classed item cache core with per-class LRU eviction.
//!
//! This crate owns the lifecycle of every cached item: allocation from a
//! size-classed slab allocator, linkage into a lookup index and a per-class
//! recency list, reference counted access, eviction when a class runs out of
//! memory, and bulk invalidation.
//!
//! # Architecture
//!
//! ```text
//! +---------------------------------------------+
//! |                 ItemCache                   |
//! |                (one Mutex)                  |
//! |                                             |
//! |  +---------------+    +------------------+  |
//! |  | LookupIndex   |    | Item arena       |  |
//! |  | key -> ItemId |--->| (slab::Slab)     |  |
//! |  +---------------+    +------------------+  |
//! |                          ^                  |
//! |  +-----------------------|--------------+   |
//! |  | LruBuckets            |              |   |
//! |  | class 1: head <-> ... <-> tail       |   |
//! |  | class 2: head <-> ... <-> tail       |   |
//! |  | ...                                  |   |
//! |  +--------------------------------------+   |
//! |                                             |
//! |  +--------------------------------------+   |
//! |  | SlabAllocator (SlabPool)             |   |
//! |  | pages carved on demand per class     |   |
//! |  +--------------------------------------+   |
//! +---------------------------------------------+
//! ```
//!
//! # Item lifecycle
//!
//! - [`ItemCache::acquire`] allocates an unlinked item and returns an
//!   [`ItemGuard`] holding one reference. If the class is full, one
//!   unreferenced item near the class's LRU tail is evicted first.
//! - [`ItemCache::insert`] links it: the item becomes visible through
//!   [`ItemCache::get`] and joins the head of its class's LRU.
//! - [`ItemCache::touch`] moves it back to the head, at most once a minute.
//! - [`ItemCache::swap`], [`ItemCache::unlink`] and [`ItemCache::delete`]
//!   take it out of the index and LRU. Storage is reclaimed as soon as no
//!   guard holds the item.
//!
//! # Example
//!
//! ```
//! use item_cache::ItemCache;
//!
//! let cache = ItemCache::builder()
//!     .memory_limit(4 * 1024 * 1024)
//!     .build()
//!     .unwrap();
//!
//! let item = cache.acquire(b"key", 0, None, 7).unwrap();
//! item.write_value(b"value\r\n");
//! cache.insert(&item).unwrap();
//!
//! let newer = cache.acquire(b"key", 0, None, 7).unwrap();
//! newer.write_value(b"newer\r\n");
//! cache.swap(&item, &newer).unwrap();
//!
//! // the old value stays readable while it is held
//! assert_eq!(item.value(), b"value\r\n");
//! assert_eq!(cache.get(b"key").unwrap().value(), b"newer\r\n");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod allocator;
mod cache;
mod class;
mod clock;
mod config;
mod error;
mod flush;
mod guard;
mod index;
mod item;
mod lru;
mod stats;

pub use allocator::{Chunk, ClassId, PoolClassStats, SlabAllocator, SlabPool};
pub use cache::{ItemCache, ItemCacheBuilder};
pub use class::{CHUNK_ALIGN, MAX_CLASSES, class_sizes};
pub use clock::{Clock, CoarseClock, ManualClock};
pub use config::{
    DEFAULT_EVICTION_SCAN_DEPTH, DUMP_BUDGET, ITEM_HEADER_SIZE, ItemCacheConfig, MAX_KEY_LEN,
    MAX_PAYLOAD_LEN, UPDATE_INTERVAL,
};
pub use error::{CacheError, CacheResult, ConfigError};
pub use guard::ItemGuard;
pub use index::{HashIndex, LookupIndex};
pub use item::{ItemId, ItemState, render_suffix, total_size};
pub use stats::{
    CacheDump, ClassItemStats, DumpEntry, HISTOGRAM_BUCKETS, HISTOGRAM_GRANULARITY, ItemCounters,
};
