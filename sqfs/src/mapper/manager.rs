//! Block-sliced cache of mapper windows (component E). Slices the backend
//! into fixed-size blocks and caches each block's bytes in a reference-
//! counted map (A), with an LRU ring (B) to keep recently touched blocks
//! alive under churn even after their last real handle is dropped.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::lru::LruRing;
use crate::rcmap::RcMap;

use super::{MapperBackend, Window};

/// Owns a backend and serves `map(offset, length)` windows, which may span
/// several cache blocks chained into one contiguous owned buffer.
pub struct MapManager {
    backend: Arc<dyn MapperBackend>,
    block_size: u64,
    blocks: RcMap<u64, Arc<[u8]>>,
    lru: LruRing<u64, Arc<[u8]>>,
}

impl MapManager {
    /// `block_size` must be a power of two; `lru_size` bounds the number of
    /// blocks the LRU ring keeps alive beyond in-flight handles.
    pub fn new(backend: Arc<dyn MapperBackend>, block_size: u64, lru_size: usize) -> Self {
        debug_assert!(block_size.is_power_of_two());
        let blocks = RcMap::new();
        let lru = LruRing::new(blocks.clone(), lru_size);
        Self {
            backend,
            block_size,
            blocks,
            lru,
        }
    }

    pub fn size(&self) -> u64 {
        self.backend.size()
    }

    fn block_at(&self, index: u64) -> Result<Arc<[u8]>> {
        let backend = self.backend.clone();
        let block_size = self.block_size;
        let size = backend.size();
        let handle = self.blocks.get_or_build(index, move || {
            let start = index * block_size;
            let len = block_size.min(size.saturating_sub(start));
            if len == 0 {
                return Err(Error::OutOfBounds);
            }
            let mut buf = vec![0u8; len as usize];
            backend.read_at(start, &mut buf)?;
            Ok(Arc::from(buf))
        })?;
        self.lru.touch(&index);
        Ok(handle.value().clone())
    }

    /// Return a window of `length` bytes starting at `offset`. Windows that
    /// fit in a single block are returned without copying (`Window::Shared`);
    /// windows spanning multiple blocks are assembled into an owned buffer.
    pub fn map(&self, offset: u64, length: u64) -> Result<Window> {
        let end = offset.checked_add(length).ok_or(Error::OutOfBounds)?;
        if end > self.backend.size() {
            return Err(Error::OutOfBounds);
        }
        if length == 0 {
            return Ok(Window::Owned(Vec::new()));
        }

        let first_block = offset / self.block_size;
        let last_block = (end - 1) / self.block_size;

        if first_block == last_block {
            let block = self.block_at(first_block)?;
            let start = (offset % self.block_size) as usize;
            let len = length as usize;
            if start == 0 && len == block.len() {
                return Ok(Window::Shared(block));
            }
            return Ok(Window::Owned(block[start..start + len].to_vec()));
        }

        let mut buf = Vec::with_capacity(length as usize);
        for index in first_block..=last_block {
            let block = self.block_at(index)?;
            let block_start = index * self.block_size;
            let lo = offset.max(block_start) - block_start;
            let hi = end.min(block_start + block.len() as u64) - block_start;
            buf.extend_from_slice(&block[lo as usize..hi as usize]);
        }
        Ok(Window::Owned(buf))
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }
}
