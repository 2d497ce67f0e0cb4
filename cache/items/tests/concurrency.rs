//! Multi-threaded smoke tests.
//!
//! Several threads share one cache and hammer it with mixed operations
//! under memory pressure. Afterwards, with every guard dropped, the
//! allocator's view and the LRU's view of the cache must agree, and every
//! class list must still be ordered by touch time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use item_cache::{Clock, ItemCache, ItemGuard};

const THREADS: u64 = 4;
const OPS_PER_THREAD: usize = 5_000;
const KEYS: usize = 256;

fn make_key(i: usize) -> Vec<u8> {
    format!("key:{i:016x}").into_bytes()
}

/// Value stored under a key. Every writer of a key writes the same bytes,
/// so a reader can verify what it gets back.
fn make_value(key: &[u8], len: usize) -> Vec<u8> {
    let mut value: Vec<u8> = key.iter().copied().cycle().take(len - 2).collect();
    value.extend_from_slice(b"\r\n");
    value
}

fn value_len(i: usize) -> usize {
    16 + (i * 37) % 400
}

fn shared_cache() -> ItemCache {
    ItemCache::builder()
        .memory_limit(64 * 1024)
        .page_size(4096)
        .build()
        .expect("Failed to create cache")
}

fn worker(cache: &ItemCache, seed: u64) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut held: Vec<ItemGuard<'_>> = Vec::new();

    for _ in 0..OPS_PER_THREAD {
        let i = rng.gen_range(0..KEYS);
        let key = make_key(i);
        let len = value_len(i);

        match rng.gen_range(0..100) {
            0..=39 => {
                if let Ok(item) = cache.acquire(&key, i as u32, None, len) {
                    item.write_value(&make_value(&key, len));
                    cache.insert(&item).unwrap();
                }
            }
            40..=79 => {
                if let Some(item) = cache.get(&key) {
                    assert_eq!(item.key(), key);
                    assert_eq!(item.flags(), i as u32);
                    assert_eq!(item.value(), make_value(&key, len));
                    cache.touch(&item);
                    if rng.gen_bool(0.1) {
                        held.push(item);
                    }
                }
            }
            80..=89 => {
                cache.delete(&key);
            }
            90..=94 => {
                if let Some(old) = cache.get(&key) {
                    if let Ok(new) = cache.acquire(&key, i as u32, None, len) {
                        new.write_value(&make_value(&key, len));
                        cache.swap(&old, &new).unwrap();
                    }
                }
            }
            _ => {
                if !held.is_empty() {
                    let idx = rng.gen_range(0..held.len());
                    let item = held.swap_remove(idx);
                    // orphaned or not, the bytes stay intact while held
                    assert_eq!(item.value(), make_value(&item.key(), item.payload_len()));
                }
            }
        }
    }
}

#[test]
fn test_concurrent_mixed_operations() {
    let cache = shared_cache();

    thread::scope(|s| {
        for seed in 0..THREADS {
            let cache = &cache;
            s.spawn(move || worker(cache, seed));
        }
    });

    let counters = cache.counters();
    let per_class = cache.stats_per_class();

    let linked: usize = per_class.iter().map(|s| s.count).sum();
    assert_eq!(counters.curr_items, linked as u64);

    // with no holders left, every allocated chunk belongs to a linked item
    for stats in &per_class {
        assert_eq!(cache.chunks_in_use(stats.class_id), stats.count);
        assert_eq!(cache.dump(stats.class_id, 0).entries.len(), stats.count);
    }

    // every item that was ever linked is either still linked or reclaimed
    assert!(counters.total_items >= counters.curr_items);
    assert!(counters.reclaimed >= counters.total_items - counters.curr_items);

    // each list is still ordered by touch time, and agrees with the index
    for stats in &per_class {
        let dump = cache.dump(stats.class_id, 0);
        for pair in dump.entries.windows(2) {
            assert!(
                pair[0].touched_at >= pair[1].touched_at,
                "class {} out of order: {:?} before {:?}",
                stats.class_id,
                pair[0],
                pair[1]
            );
        }
        for entry in &dump.entries {
            let item = cache.get(&entry.key).expect("listed item missing from index");
            assert_eq!(item.class_id(), stats.class_id);
        }
    }
}

/// Clock whose next read blocks until released, or until a timeout.
///
/// The blocked read returns `stalled_at`; all other reads return `now`.
struct StallingClock {
    now: AtomicU32,
    stalled_at: u32,
    stall_next: AtomicBool,
    stalled: Mutex<bool>,
    cond: Condvar,
}

impl StallingClock {
    fn new(now: u32) -> Self {
        Self {
            now: AtomicU32::new(now),
            stalled_at: now,
            stall_next: AtomicBool::new(false),
            stalled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn wait_until_stalled(&self) {
        let mut stalled = self.stalled.lock();
        self.cond.wait_while(&mut stalled, |stalled| !*stalled);
    }

    fn resume(&self) {
        *self.stalled.lock() = false;
        self.cond.notify_all();
    }
}

impl Clock for StallingClock {
    fn now(&self) -> u32 {
        if !self.stall_next.swap(false, Ordering::SeqCst) {
            return self.now.load(Ordering::SeqCst);
        }

        let mut stalled = self.stalled.lock();
        *stalled = true;
        self.cond.notify_all();
        self.cond
            .wait_while_for(&mut stalled, |stalled| *stalled, Duration::from_millis(200));
        self.stalled_at
    }

    fn started(&self) -> u64 {
        0
    }
}

#[test]
fn test_insert_stamps_in_lock_order() {
    let clock = Arc::new(StallingClock::new(100));
    let cache = ItemCache::builder()
        .memory_limit(64 * 1024)
        .page_size(4096)
        .clock(clock.clone())
        .build()
        .unwrap();

    let slow = cache.acquire(b"slow", 0, None, 10).unwrap();
    let fast = cache.acquire(b"fast", 0, None, 10).unwrap();
    let class_id = slow.class_id();
    assert_eq!(fast.class_id(), class_id);

    thread::scope(|s| {
        // the slow insert reads time 100, then stalls
        clock.stall_next.store(true, Ordering::SeqCst);
        s.spawn(|| cache.insert(&slow).unwrap());
        clock.wait_until_stalled();

        // time moves on and a second insert happens meanwhile
        clock.now.store(101, Ordering::SeqCst);
        cache.insert(&fast).unwrap();
        clock.resume();
    });

    let dump = cache.dump(class_id, 0);
    let order: Vec<_> = dump
        .entries
        .iter()
        .map(|e| (e.key.clone(), e.touched_at))
        .collect();
    assert_eq!(order, vec![(b"fast".to_vec(), 101), (b"slow".to_vec(), 100)]);

    drop(slow);
    drop(fast);
    assert_eq!(cache.flush_recent(101), 1);
    assert!(cache.get(b"fast").is_none());
    assert!(cache.get(b"slow").is_some());
}

#[test]
fn test_concurrent_readers_see_complete_values() {
    let cache = shared_cache();

    for i in 0..32 {
        let key = make_key(i);
        let len = value_len(i);
        let item = cache.acquire(&key, i as u32, None, len).unwrap();
        item.write_value(&make_value(&key, len));
        cache.insert(&item).unwrap();
    }

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for round in 0..1_000 {
                    let i = round % 32;
                    let key = make_key(i);
                    let item = cache.get(&key).expect("item missing");
                    assert_eq!(item.value(), make_value(&key, value_len(i)));
                }
            });
        }
    });

    assert_eq!(cache.counters().curr_items, 32);
}
