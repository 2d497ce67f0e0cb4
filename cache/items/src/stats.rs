//! Read-only introspection: counters, per-class stats, dumps, histograms.

use std::collections::BTreeMap;
use std::fmt;

use crate::allocator::ClassId;
use crate::cache::{Inner, ItemCache};
use crate::config::DUMP_BUDGET;

/// Size histogram granularity in bytes.
pub const HISTOGRAM_GRANULARITY: usize = 32;

/// Number of histogram buckets. Larger items are not counted.
pub const HISTOGRAM_BUCKETS: usize = 32768;

/// Length of the `END\r\n` terminator plus one byte of slack.
const DUMP_TERMINATOR_RESERVE: usize = 6;

/// Cache-wide counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ItemCounters {
    /// Items currently linked.
    pub curr_items: u64,
    /// Total size of linked items.
    pub curr_bytes: u64,
    /// Items ever linked.
    pub total_items: u64,
    /// Items unlinked to make room for an allocation.
    pub evictions: u64,
    /// Item records whose storage went back to the allocator.
    pub reclaimed: u64,
    /// Unix time the cache started.
    pub started: u64,
}

/// Live count and age of one size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassItemStats {
    /// Class ID.
    pub class_id: ClassId,
    /// Items linked in this class.
    pub count: usize,
    /// Seconds since the class's least recently touched item was touched.
    pub age: u32,
}

/// One line of a class dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpEntry {
    /// The item's key.
    pub key: Vec<u8>,
    /// Payload length, including the terminator.
    pub payload_len: usize,
    /// Seconds since the item was last touched.
    pub age: u32,
    /// Unix time of the last touch.
    pub touched_at: u64,
}

impl DumpEntry {
    fn line(&self) -> String {
        format!(
            "ITEM {} [{} b; {} s]\r\n",
            String::from_utf8_lossy(&self.key),
            self.payload_len.saturating_sub(2),
            self.touched_at
        )
    }
}

/// Items of one class, most recently touched first.
///
/// Renders as `ITEM <key> [<bytes> b; <unix time> s]` lines followed by an
/// `END` terminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDump {
    /// Entries, head first.
    pub entries: Vec<DumpEntry>,
    /// Whether the walk stopped because the output budget ran out.
    pub truncated: bool,
    rendered: String,
}

impl CacheDump {
    /// Rendered size in bytes, terminator included.
    pub fn len_bytes(&self) -> usize {
        self.rendered.len() + "END\r\n".len()
    }
}

impl fmt::Display for CacheDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)?;
        f.write_str("END\r\n")
    }
}

impl Inner {
    pub(crate) fn stats_per_class(&self, now: u32) -> Vec<ClassItemStats> {
        self.lru
            .classes()
            .filter_map(|class_id| {
                let tail = self.lru.tail(class_id)?;
                Some(ClassItemStats {
                    class_id,
                    count: self.lru.len(class_id),
                    age: now.saturating_sub(self.item(tail).last_touch),
                })
            })
            .collect()
    }

    pub(crate) fn dump(&self, class_id: ClassId, limit: usize, now: u32, budget: usize) -> CacheDump {
        let mut dump = CacheDump::default();

        for (_, item) in self.lru.walk_from_head(class_id, &self.items) {
            if limit != 0 && dump.entries.len() >= limit {
                break;
            }

            let entry = DumpEntry {
                key: item.key().to_vec(),
                payload_len: item.payload_len(),
                age: now.saturating_sub(item.last_touch),
                touched_at: self.counters.started + item.last_touch as u64,
            };
            let line = entry.line();
            if dump.rendered.len() + line.len() + DUMP_TERMINATOR_RESERVE > budget {
                dump.truncated = true;
                break;
            }

            dump.rendered.push_str(&line);
            dump.entries.push(entry);
        }

        dump
    }

    pub(crate) fn size_histogram(&self) -> BTreeMap<usize, u64> {
        let mut histogram = BTreeMap::new();

        for class_id in self.lru.classes() {
            for (_, item) in self.lru.walk_from_head(class_id, &self.items) {
                let bucket = item.total_size().div_ceil(HISTOGRAM_GRANULARITY);
                if bucket < HISTOGRAM_BUCKETS {
                    *histogram.entry(bucket * HISTOGRAM_GRANULARITY).or_insert(0) += 1;
                }
            }
        }

        histogram
    }
}

impl ItemCache {
    /// Cache-wide counters.
    pub fn counters(&self) -> ItemCounters {
        self.lock().counters
    }

    /// Live count and tail age for every non-empty class.
    pub fn stats_per_class(&self) -> Vec<ClassItemStats> {
        let inner = self.lock();
        inner.stats_per_class(self.now())
    }

    /// Up to `limit` items of a class, most recently touched first
    /// (`0` means no limit). Stops early rather than exceed a 2MB rendered
    /// size. An unknown class yields an empty dump.
    pub fn dump(&self, class_id: ClassId, limit: usize) -> CacheDump {
        let inner = self.lock();
        inner.dump(class_id, limit, self.now(), DUMP_BUDGET)
    }

    /// Count of linked items per 32-byte size bucket, keyed by the bucket's
    /// upper bound. Walks every item, so keep it off hot paths.
    pub fn size_histogram(&self) -> BTreeMap<usize, u64> {
        self.lock().size_histogram()
    }

    /// Chunks of a class currently handed out by the allocator.
    pub fn chunks_in_use(&self, class_id: ClassId) -> usize {
        self.lock().allocator.in_use(class_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::tests::test_cache;
    use crate::clock::ManualClock;
    use crate::config::ITEM_HEADER_SIZE;

    fn store(cache: &ItemCache, key: &[u8], payload_len: usize) -> ClassId {
        let item = cache.acquire(key, 0, None, payload_len).unwrap();
        cache.insert(&item).unwrap();
        item.class_id()
    }

    #[test]
    fn test_stats_per_class() {
        let clock = Arc::new(ManualClock::new(10));
        let cache = test_cache(clock.clone());

        let small = store(&cache, b"a", 4);
        clock.set(20);
        store(&cache, b"b", 4);
        let large = store(&cache, b"c", 300);
        assert_ne!(small, large);

        clock.set(50);
        let stats = cache.stats_per_class();
        assert_eq!(
            stats,
            vec![
                ClassItemStats {
                    class_id: small,
                    count: 2,
                    age: 40,
                },
                ClassItemStats {
                    class_id: large,
                    count: 1,
                    age: 30,
                },
            ]
        );
    }

    #[test]
    fn test_dump_order_and_limit() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = test_cache(clock.clone());

        let mut class_id = 0;
        for (i, key) in [b"k1", b"k2", b"k3"].iter().enumerate() {
            clock.set(i as u32);
            class_id = store(&cache, *key, 12);
        }

        let dump = cache.dump(class_id, 0);
        let keys: Vec<_> = dump.entries.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec![b"k3".to_vec(), b"k2".to_vec(), b"k1".to_vec()]);
        assert!(!dump.truncated);
        assert_eq!(dump.entries[2].age, 2);
        assert_eq!(dump.entries[0].payload_len, 12);
        assert_eq!(
            dump.to_string(),
            "ITEM k3 [10 b; 2 s]\r\nITEM k2 [10 b; 1 s]\r\nITEM k1 [10 b; 0 s]\r\nEND\r\n"
        );
        assert_eq!(dump.len_bytes(), dump.to_string().len());

        let limited = cache.dump(class_id, 2);
        assert_eq!(limited.entries.len(), 2);
        assert!(!limited.truncated);
    }

    #[test]
    fn test_dump_budget() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = test_cache(clock);

        let mut class_id = 0;
        for key in [b"k1", b"k2", b"k3"] {
            class_id = store(&cache, key, 4);
        }

        // each line is "ITEM kN [2 b; 0 s]\r\n", 20 bytes
        let dump = cache.lock().dump(class_id, 0, 0, 20 * 2 + 6);
        assert_eq!(dump.entries.len(), 2);
        assert!(dump.truncated);
        assert!(dump.to_string().ends_with("END\r\n"));
        assert!(dump.len_bytes() <= 20 * 2 + 6);
    }

    #[test]
    fn test_dump_unknown_class() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = test_cache(clock);

        let dump = cache.dump(0, 0);
        assert!(dump.entries.is_empty());
        assert_eq!(dump.to_string(), "END\r\n");
        assert!(cache.dump(250, 0).entries.is_empty());
    }

    #[test]
    fn test_size_histogram() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = test_cache(clock);

        // header + "a" + terminator + " 0 2\r\n" + payload
        let base = ITEM_HEADER_SIZE + 1 + 1 + 6;
        store(&cache, b"a", 64 - base);
        store(&cache, b"b", 64 - base);
        store(&cache, b"c", 65 - base);

        let histogram = cache.size_histogram();
        assert_eq!(histogram.get(&64), Some(&2));
        assert_eq!(histogram.get(&96), Some(&1));
        assert_eq!(histogram.values().sum::<u64>(), 3);
    }

    #[test]
    fn test_counters() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = test_cache(clock);

        store(&cache, b"a", 4);
        store(&cache, b"b", 4);
        cache.delete(b"a");

        let counters = cache.counters();
        assert_eq!(counters.curr_items, 1);
        assert_eq!(counters.total_items, 2);
        assert_eq!(counters.reclaimed, 1);
        assert_eq!(counters.evictions, 0);
        assert_eq!(
            counters.curr_bytes,
            (ITEM_HEADER_SIZE + 1 + 1 + " 0 2\r\n".len() + 4) as u64
        );
    }
}
