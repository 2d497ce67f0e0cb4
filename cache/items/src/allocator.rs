//! Slab allocator interface and the page-based pool behind it.
//!
//! The item cache only needs three things from an allocator: map an item's
//! total size to a class, hand out a chunk of a class, and take a chunk
//! back. [`SlabPool`] is the default implementation; it carves pages from a
//! fixed memory limit and assigns each page to one class on demand. Once
//! every page is assigned, a class can only satisfy allocations from chunks
//! its own items give back, which is what drives per-class eviction.

use crate::class::{SlabClass, class_sizes};
use crate::config::ItemCacheConfig;

/// Size class identifier. Class 0 means "owned by no class".
pub type ClassId = u8;

/// Storage for one item, handed out by a [`SlabAllocator`].
///
/// A chunk is not `Clone`: returning it to the allocator consumes it, so
/// a chunk cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
pub struct Chunk {
    class_id: ClassId,
    page: u32,
    slot: u32,
}

impl Chunk {
    /// Create a chunk handle. Only allocators should need this.
    pub fn new(class_id: ClassId, page: u32, slot: u32) -> Self {
        Self {
            class_id,
            page,
            slot,
        }
    }

    /// The class this chunk belongs to.
    #[inline]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// The page this chunk was carved from.
    #[inline]
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Slot index within the page.
    #[inline]
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

/// Size-classed memory provider for the item cache.
pub trait SlabAllocator: Send {
    /// Smallest class whose chunks hold `total_size` bytes, or `None` if
    /// no class is large enough.
    fn classify(&self, total_size: usize) -> Option<ClassId>;

    /// Take a chunk from `class_id`, or `None` if the class is exhausted.
    fn allocate(&mut self, class_id: ClassId) -> Option<Chunk>;

    /// Return a chunk that held an item of `total_size` bytes.
    fn release(&mut self, chunk: Chunk, total_size: usize);

    /// Chunk size of a class.
    fn chunk_size(&self, class_id: ClassId) -> Option<usize>;

    /// Highest valid class id.
    fn largest_class(&self) -> ClassId;

    /// Number of chunks of `class_id` currently handed out.
    fn in_use(&self, class_id: ClassId) -> usize;
}

/// Memory statistics for one class of a [`SlabPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolClassStats {
    /// Class ID.
    pub class_id: ClassId,
    /// Chunk size in bytes.
    pub chunk_size: usize,
    /// Chunks per page.
    pub per_page: usize,
    /// Pages assigned to this class.
    pub pages: u32,
    /// Chunks currently handed out.
    pub used_chunks: usize,
    /// Chunks available without assigning a new page.
    pub free_chunks: usize,
}

/// Page-based slab allocator.
#[derive(Debug)]
pub struct SlabPool {
    /// Classes indexed by `class_id - 1`.
    classes: Vec<SlabClass>,
    /// Chunk sizes indexed by class id (index 0 unused).
    sizes: Vec<usize>,
    page_size: usize,
    page_limit: usize,
    pages_used: usize,
}

impl SlabPool {
    /// Create a pool sized by the configuration.
    pub fn new(config: &ItemCacheConfig) -> Self {
        let sizes = class_sizes(config.chunk_size, config.page_size, config.growth_factor);
        let classes = sizes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, &size)| SlabClass::new(id as ClassId, size, config.page_size))
            .collect();

        Self {
            classes,
            sizes,
            page_size: config.page_size,
            page_limit: config.page_count(),
            pages_used: 0,
        }
    }

    #[inline]
    fn class(&self, class_id: ClassId) -> Option<&SlabClass> {
        self.classes.get((class_id as usize).checked_sub(1)?)
    }

    #[inline]
    fn class_mut(&mut self, class_id: ClassId) -> Option<&mut SlabClass> {
        self.classes.get_mut((class_id as usize).checked_sub(1)?)
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages assigned to classes so far.
    pub fn pages_used(&self) -> usize {
        self.pages_used
    }

    /// Maximum number of pages.
    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    /// Statistics for a class.
    pub fn class_stats(&self, class_id: ClassId) -> Option<PoolClassStats> {
        let class = self.class(class_id)?;
        Some(PoolClassStats {
            class_id,
            chunk_size: class.chunk_size(),
            per_page: class.per_page(),
            pages: class.pages(),
            used_chunks: class.in_use(),
            free_chunks: class.free_chunks(),
        })
    }
}

impl SlabAllocator for SlabPool {
    fn classify(&self, total_size: usize) -> Option<ClassId> {
        if total_size == 0 {
            return None;
        }
        // Binary search for the smallest class >= total_size
        let idx = match self.sizes[1..].binary_search(&total_size) {
            Ok(idx) | Err(idx) => idx,
        };
        if idx < self.classes.len() {
            Some((idx + 1) as ClassId)
        } else {
            None
        }
    }

    fn allocate(&mut self, class_id: ClassId) -> Option<Chunk> {
        let can_grow = self.pages_used < self.page_limit;
        let next_page = self.pages_used as u32;
        let class = self.class_mut(class_id)?;

        if let Some(chunk) = class.pop() {
            return Some(chunk);
        }

        if !can_grow {
            return None;
        }

        class.add_page(next_page);
        let chunk = class.pop();
        self.pages_used += 1;
        chunk
    }

    fn release(&mut self, chunk: Chunk, total_size: usize) {
        let class_id = chunk.class_id();
        let Some(class) = self.class_mut(class_id) else {
            panic!("chunk released for unknown class {class_id}");
        };
        debug_assert!(
            total_size <= class.chunk_size(),
            "item of {total_size} bytes released into class {class_id} of {} byte chunks",
            class.chunk_size()
        );
        class.push(chunk);
    }

    fn chunk_size(&self, class_id: ClassId) -> Option<usize> {
        self.class(class_id).map(SlabClass::chunk_size)
    }

    fn largest_class(&self) -> ClassId {
        self.classes.len() as ClassId
    }

    fn in_use(&self, class_id: ClassId) -> usize {
        self.class(class_id).map_or(0, SlabClass::in_use)
    }
}
