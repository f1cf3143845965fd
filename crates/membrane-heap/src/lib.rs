//! Host-side allocator for foreign module requests
//!
//! Services malloc/realloc/free issued from inside a foreign module, backed
//! entirely by host-side bookkeeping: a bump cursor over the allocatable
//! region plus a map of every block ever carved out. Freed blocks stay in
//! the map for reuse; they are never physically removed and adjacent free
//! blocks are never coalesced, so long allocate/free churn fragments
//! monotonically.

use std::collections::BTreeMap;

use membrane_memory::{Addr, LinearMemory, MemoryError};
use thiserror::Error;

/// Allocation faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum HeapError {
    /// No bump space left and no free block large enough
    #[error("out of memory: no space for {requested} bytes")]
    OutOfMemory { requested: u32 },
    /// realloc/free on an address the heap never handed out
    #[error("no block at {addr}")]
    UnknownBlock { addr: Addr },
    /// Linear memory fault while zero-filling or copying
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Bookkeeping record for one allocated or free byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    /// Start of the block
    pub addr: Addr,
    /// Size in bytes (always a multiple of 4)
    pub size: u32,
    /// Whether the block is available for reuse
    pub free: bool,
}

/// Round up to the next multiple of 4.
fn align4(size: u32) -> u32 {
    size.wrapping_add(3) & !3
}

/// Block-splitting allocator over one allocatable region of linear memory.
///
/// The region bounds come from the collaborator that owns the memory layout
/// (for a wasm module, typically its `__heap_base`/`__heap_end` globals);
/// `region_end - region_start` is the hard capacity.
pub struct Heap {
    region_start: u32,
    region_end: u32,
    /// Boundary above which memory is untouched; only ever advances
    cursor: u32,
    blocks: BTreeMap<u32, Block>,
}

impl Heap {
    /// Create a heap over `[region_start, region_end)`.
    pub fn new(region_start: u32, region_end: u32) -> Self {
        Self {
            region_start,
            region_end,
            cursor: region_start,
            blocks: BTreeMap::new(),
        }
    }

    /// Total allocatable bytes.
    pub fn capacity(&self) -> u32 {
        self.region_end - self.region_start
    }

    /// Untouched bytes above the bump cursor.
    pub fn unused_space(&self) -> u32 {
        self.region_end - self.cursor
    }

    /// Number of blocks ever carved out (free ones included).
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes currently held by non-free blocks.
    pub fn live_bytes(&self) -> u32 {
        self.blocks.values().filter(|b| !b.free).map(|b| b.size).sum()
    }

    /// All bookkeeping records, in address order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Allocate `size` bytes, zero-filled.
    ///
    /// Size is rounded up to the next multiple of 4. While untouched space
    /// above the cursor exceeds the request, allocation bumps; after that,
    /// free blocks are reused — whole when at most twice the request, split
    /// once otherwise. Fails when neither path can satisfy the request.
    pub fn malloc(&mut self, mem: &mut LinearMemory, size: u32) -> Result<Addr, HeapError> {
        let size = align4(size);
        tracing::debug!(size, "malloc");

        if self.unused_space() > size {
            let addr = Addr(self.cursor);
            self.blocks.insert(addr.0, Block { addr, size, free: false });
            self.cursor += size;
            mem.fill(addr, size as usize, 0)?;
            return Ok(addr);
        }

        let candidate = self
            .blocks
            .values()
            .find(|b| b.free && b.size >= size)
            .copied()
            .ok_or(HeapError::OutOfMemory { requested: size })?;

        if candidate.size <= size.saturating_mul(2) {
            // Near-exact fit: hand the whole block over rather than leaving
            // a sliver too small to ever satisfy another request.
            let block = self.blocks.get_mut(&candidate.addr.0).expect("candidate exists");
            block.free = false;
            let (addr, len) = (block.addr, block.size);
            mem.fill(addr, len as usize, 0)?;
            return Ok(addr);
        }

        // Single-level split: the old owner keeps the aligned half, the
        // remainder becomes a new free block. Once split, never rejoined.
        let keep = align4(candidate.size.div_ceil(2));
        let remainder = candidate.size - keep;
        if remainder > 0 {
            let leftover = Block {
                addr: candidate.addr.offset(keep),
                size: remainder,
                free: true,
            };
            self.blocks.insert(leftover.addr.0, leftover);
        }
        let block = self.blocks.get_mut(&candidate.addr.0).expect("candidate exists");
        block.size = keep;
        block.free = false;
        mem.fill(candidate.addr, keep as usize, 0)?;
        Ok(candidate.addr)
    }

    /// Move the allocation at `addr` into a fresh block of `size` bytes,
    /// copying `min(old, new)` bytes.
    ///
    /// A null `addr` delegates to [`malloc`](Self::malloc). The superseded
    /// block is NOT marked free: the caller frees it, or it leaks. That
    /// matches the behavior this allocator replaces and is contractual.
    pub fn realloc(
        &mut self,
        mem: &mut LinearMemory,
        addr: Addr,
        size: u32,
    ) -> Result<Addr, HeapError> {
        if addr.is_null() {
            return self.malloc(mem, size);
        }
        let old_size = self
            .blocks
            .get(&addr.0)
            .map(|b| b.size)
            .ok_or(HeapError::UnknownBlock { addr })?;
        let new_addr = self.malloc(mem, size)?;
        mem.copy(new_addr, addr, old_size.min(size) as usize)?;
        Ok(new_addr)
    }

    /// Mark the block at `addr` free for reuse.
    ///
    /// Freeing null is reported and ignored; freeing an address the heap
    /// never handed out is fatal. Adjacent free blocks are not merged.
    pub fn free(&mut self, addr: Addr) -> Result<(), HeapError> {
        if addr.is_null() {
            tracing::error!("attempt to free null address");
            return Ok(());
        }
        let block = self
            .blocks
            .get_mut(&addr.0)
            .ok_or(HeapError::UnknownBlock { addr })?;
        block.free = true;
        Ok(())
    }
}
