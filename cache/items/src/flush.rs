//! Bulk invalidation of recently touched items.
//!
//! Every class list is ordered by non-increasing `last_touch` from the head,
//! so a sweep for items touched at or after a cutoff can stop at the first
//! older item. Older items are left to the lazy cutoff check on `get`.

use tracing::debug;

use crate::cache::{Inner, ItemCache};

impl Inner {
    /// Unlink every item touched at or after `cutoff`. Returns the number
    /// of items unlinked.
    pub(crate) fn flush_recent(&mut self, cutoff: u32) -> usize {
        let mut flushed = 0;

        for class_id in self.lru.classes() {
            let mut cursor = self.lru.head(class_id);
            while let Some(id) = cursor {
                let item = self.item(id);
                if item.last_touch < cutoff {
                    break;
                }
                cursor = item.next;
                self.unlink(id);
                flushed += 1;
            }
        }

        flushed
    }
}

impl ItemCache {
    /// Unlink every item touched at or after `cutoff`.
    ///
    /// Cost is proportional to the number of items newer than the cutoff,
    /// not to the size of the cache. Returns the number of items unlinked.
    pub fn flush_recent(&self, cutoff: u32) -> usize {
        let flushed = self.lock().flush_recent(cutoff);
        debug!(cutoff, flushed, "flushed recent items");
        flushed
    }

    /// Invalidate every item, now or after `delay` seconds.
    ///
    /// Sets the cache-wide cutoff to one second before the flush time, sweeps
    /// items touched since then, and lets `get` treat anything older than
    /// the cutoff as gone once the cutoff has passed.
    pub fn flush_all(&self, delay: Option<u32>) {
        let mut inner = self.lock();
        let now = self.now();
        let cutoff = match delay {
            Some(delay) if delay > 0 => now.saturating_add(delay) - 1,
            _ => now.saturating_sub(1),
        };

        inner.oldest_live = Some(cutoff);
        let flushed = inner.flush_recent(cutoff);
        drop(inner);

        debug!(cutoff, flushed, "flush_all");
    }

    /// The cache-wide flush cutoff, if one was set.
    pub fn oldest_live(&self) -> Option<u32> {
        self.lock().oldest_live
    }
}
