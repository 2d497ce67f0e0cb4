//! Slab class sizing and per-class chunk free lists.
//!
//! Class sizes follow the classic memcached layout: the smallest class holds
//! the item header plus `chunk_size` bytes, each following class is
//! `growth_factor` times larger (8-byte aligned), up to half a page. The
//! largest class is always one whole page.

use crate::allocator::{Chunk, ClassId};
use crate::config::ITEM_HEADER_SIZE;

/// Upper bound on the number of classes, including the unused class 0.
pub const MAX_CLASSES: usize = 200;

/// Chunk sizes are rounded up to this alignment.
pub const CHUNK_ALIGN: usize = 8;

/// Compute chunk sizes for every class.
///
/// Index 0 of the returned table is the "no class" slot and is always 0.
pub fn class_sizes(chunk_size: usize, page_size: usize, growth_factor: f64) -> Vec<usize> {
    let mut sizes = vec![0];
    let mut size = ITEM_HEADER_SIZE + chunk_size;

    while sizes.len() < MAX_CLASSES - 1 && size <= page_size / 2 {
        if size % CHUNK_ALIGN != 0 {
            size += CHUNK_ALIGN - (size % CHUNK_ALIGN);
        }
        sizes.push(size);
        // Guarantee forward progress for factors close to 1.0
        size = ((size as f64 * growth_factor) as usize).max(size + CHUNK_ALIGN);
    }

    sizes.push(page_size);
    sizes
}

/// Chunks of one size, carved from pages assigned to this class.
#[derive(Debug)]
pub(crate) struct SlabClass {
    class_id: ClassId,
    chunk_size: usize,
    per_page: usize,
    pages: u32,
    free: Vec<Chunk>,
    in_use: usize,
}

impl SlabClass {
    pub(crate) fn new(class_id: ClassId, chunk_size: usize, page_size: usize) -> Self {
        Self {
            class_id,
            chunk_size,
            per_page: (page_size / chunk_size).max(1),
            pages: 0,
            free: Vec::new(),
            in_use: 0,
        }
    }

    #[inline]
    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub(crate) fn per_page(&self) -> usize {
        self.per_page
    }

    #[inline]
    pub(crate) fn pages(&self) -> u32 {
        self.pages
    }

    #[inline]
    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    #[inline]
    pub(crate) fn free_chunks(&self) -> usize {
        self.free.len()
    }

    /// Split a newly assigned page into chunks.
    pub(crate) fn add_page(&mut self, page: u32) {
        // Reverse so slot 0 is handed out first
        for slot in (0..self.per_page as u32).rev() {
            self.free.push(Chunk::new(self.class_id, page, slot));
        }
        self.pages += 1;
    }

    /// Take a free chunk.
    pub(crate) fn pop(&mut self) -> Option<Chunk> {
        let chunk = self.free.pop()?;
        self.in_use += 1;
        Some(chunk)
    }

    /// Return a chunk to the free list.
    pub(crate) fn push(&mut self, chunk: Chunk) {
        assert_eq!(
            chunk.class_id(),
            self.class_id,
            "chunk returned to the wrong class"
        );
        assert!(self.in_use > 0, "chunk released with no chunks in use");
        self.in_use -= 1;
        self.free.push(chunk);
    }
}
