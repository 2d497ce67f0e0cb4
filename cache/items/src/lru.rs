//! Per-class LRU lists over the item arena.
//!
//! Each class has a doubly linked recency list threaded through the items'
//! `prev`/`next` arena indices. The head is the most recently touched item
//! and the tail is the eviction end. Both push and unlink are O(1). Acting
//! on an item that does not belong to the bucket it claims is a programming
//! error and panics instead of corrupting the list.

use slab::Slab;

use crate::allocator::ClassId;
use crate::item::{Item, ItemId};

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    head: Option<ItemId>,
    tail: Option<ItemId>,
    count: usize,
}

/// Head, tail and live count for every size class.
#[derive(Debug)]
pub(crate) struct LruBuckets {
    buckets: Vec<Bucket>,
}

impl LruBuckets {
    /// Create empty buckets for classes `1..=largest_class`.
    pub(crate) fn new(largest_class: ClassId) -> Self {
        Self {
            buckets: vec![Bucket::default(); largest_class as usize + 1],
        }
    }

    #[inline]
    fn bucket(&self, class_id: ClassId) -> Option<&Bucket> {
        if class_id == 0 {
            return None;
        }
        self.buckets.get(class_id as usize)
    }

    fn bucket_mut(&mut self, class_id: ClassId) -> &mut Bucket {
        assert!(
            class_id != 0 && (class_id as usize) < self.buckets.len(),
            "class {class_id} has no LRU bucket"
        );
        &mut self.buckets[class_id as usize]
    }

    /// Iterate over every class id that has a bucket.
    pub(crate) fn classes(&self) -> impl Iterator<Item = ClassId> + use<> {
        (1..self.buckets.len()).map(|id| id as ClassId)
    }

    /// Most recently touched item of a class.
    #[inline]
    pub(crate) fn head(&self, class_id: ClassId) -> Option<ItemId> {
        self.bucket(class_id)?.head
    }

    /// Least recently touched item of a class.
    #[inline]
    pub(crate) fn tail(&self, class_id: ClassId) -> Option<ItemId> {
        self.bucket(class_id)?.tail
    }

    /// Number of items linked in a class.
    #[inline]
    pub(crate) fn len(&self, class_id: ClassId) -> usize {
        self.bucket(class_id).map_or(0, |b| b.count)
    }

    /// Make `id` the new head of its class's list.
    pub(crate) fn push_front(&mut self, items: &mut Slab<Item>, id: ItemId) {
        let class_id = items[id.index()].class_id();
        let bucket = self.bucket_mut(class_id);

        assert_ne!(bucket.head, Some(id), "item is already the head of its bucket");
        assert_eq!(
            bucket.head.is_some(),
            bucket.tail.is_some(),
            "bucket head and tail out of sync"
        );

        let item = &mut items[id.index()];
        assert!(
            item.prev.is_none() && item.next.is_none(),
            "item pushed while still in a list"
        );
        item.next = bucket.head;

        if let Some(old_head) = bucket.head {
            items[old_head.index()].prev = Some(id);
        } else {
            // List was empty, this is also the tail
            bucket.tail = Some(id);
        }

        bucket.head = Some(id);
        bucket.count += 1;
    }

    /// Splice `id` out of its class's list.
    pub(crate) fn unlink(&mut self, items: &mut Slab<Item>, id: ItemId) {
        let (class_id, prev, next) = {
            let item = &items[id.index()];
            (item.class_id(), item.prev, item.next)
        };
        let bucket = self.bucket_mut(class_id);

        match prev {
            Some(prev) => {
                assert_eq!(items[prev.index()].next, Some(id), "broken LRU link");
                items[prev.index()].next = next;
            }
            None => {
                assert_eq!(bucket.head, Some(id), "item is not in this bucket");
                bucket.head = next;
            }
        }

        match next {
            Some(next) => {
                assert_eq!(items[next.index()].prev, Some(id), "broken LRU link");
                items[next.index()].prev = prev;
            }
            None => {
                assert_eq!(bucket.tail, Some(id), "item is not in this bucket");
                bucket.tail = prev;
            }
        }

        let item = &mut items[id.index()];
        item.prev = None;
        item.next = None;
        bucket.count -= 1;
    }

    /// Walk a class from most to least recently touched.
    pub(crate) fn walk_from_head<'a>(&self, class_id: ClassId, items: &'a Slab<Item>) -> Walk<'a> {
        Walk {
            items,
            cursor: self.head(class_id),
            forward: true,
        }
    }

    /// Walk a class from least to most recently touched.
    pub(crate) fn walk_from_tail<'a>(&self, class_id: ClassId, items: &'a Slab<Item>) -> Walk<'a> {
        Walk {
            items,
            cursor: self.tail(class_id),
            forward: false,
        }
    }
}

/// Iterator over one class's list.
pub(crate) struct Walk<'a> {
    items: &'a Slab<Item>,
    cursor: Option<ItemId>,
    forward: bool,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (ItemId, &'a Item);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let item = &self.items[id.index()];
        self.cursor = if self.forward { item.next } else { item.prev };
        Some((id, item))
    }
}
