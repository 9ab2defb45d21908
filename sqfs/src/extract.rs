//! The decompression cache (component G): decompresses a block once,
//! memoizes it by `(compressed_offset, compressed_size)`, and dedups
//! concurrent requests for the same block.
//!
//! The memoization and at-most-one-build dedup reuse the same
//! [`crate::rcmap::RcMap`] + [`crate::lru::LruRing`] pairing as the map
//! manager (E) — a slot's `Initializing` state and condvar wait already
//! implement the "install an unresolved future, waiters wake on resolve"
//! algorithm verbatim, so there is no separate bespoke slot type here.
//! [`crate::future`] and [`crate::threadpool`] (component C) come in for
//! the *speculative* half: [`ExtractManager::prefetch`] lets a caller kick
//! decompression of a block off on the worker pool and get back a
//! [`crate::future::Future`] to wait on later, which is how the file
//! content iterator (L) overlaps decompression with consumption.

use std::sync::Arc;

use crate::compression::Compressor;
use crate::error::{Error, Result};
use crate::future::{self, Future};
use crate::lru::LruRing;
use crate::mapper::MapManager;
use crate::rcmap::RcMap;
use crate::threadpool::ThreadPool;

/// Cache key: the compressed block's location and on-disk size.
pub type ExtractKey = (u64, u32);

/// How strictly the decompressed length of a block is validated. Data
/// blocks know their exact decompressed size ahead of time; metablocks
/// only know an upper bound (8 KiB).
#[derive(Clone, Copy, Debug)]
pub enum SizeConstraint {
    Exact(usize),
    AtMost(usize),
}

pub struct ExtractManager {
    mapper: Arc<MapManager>,
    codec: Compressor,
    slots: RcMap<ExtractKey, Arc<[u8]>>,
    lru: LruRing<ExtractKey, Arc<[u8]>>,
}

impl ExtractManager {
    pub fn new(mapper: Arc<MapManager>, codec: Compressor, lru_size: usize) -> Self {
        let slots = RcMap::new();
        let lru = LruRing::new(slots.clone(), lru_size);
        Self {
            mapper,
            codec,
            slots,
            lru,
        }
    }

    fn build(
        &self,
        offset: u64,
        on_disk_size: u32,
        compressed: bool,
        constraint: SizeConstraint,
    ) -> Result<Arc<[u8]>> {
        let window = self.mapper.map(offset, on_disk_size as u64)?;
        let raw = window.as_slice();
        if !compressed {
            let ok = match constraint {
                SizeConstraint::Exact(n) => raw.len() == n,
                SizeConstraint::AtMost(n) => raw.len() <= n,
            };
            if !ok {
                return Err(Error::CorruptedDatablock(offset));
            }
            return Ok(Arc::from(raw.to_vec()));
        }
        let buf = match constraint {
            SizeConstraint::Exact(n) => self.codec.decompress(raw, n)?,
            SizeConstraint::AtMost(n) => self.codec.decompress_bounded(raw, n)?,
        };
        Ok(Arc::from(buf))
    }

    /// Resolve and cache the decompressed contents of the block at
    /// `offset` with the given on-disk framing. `compressed` reflects the
    /// block header's "uncompressed" flag (inverted); `constraint` states
    /// whether the decompressed length is known exactly or only bounded.
    pub fn get(
        &self,
        offset: u64,
        on_disk_size: u32,
        compressed: bool,
        constraint: SizeConstraint,
    ) -> Result<Arc<[u8]>> {
        let key = (offset, on_disk_size);
        let handle = self
            .slots
            .get_or_build(key, || self.build(offset, on_disk_size, compressed, constraint))?;
        self.lru.touch(&key);
        Ok(handle.value().clone())
    }

    /// Kick off decompression of a block on `pool` without blocking the
    /// caller. The returned future resolves once the block is in cache (or
    /// failed to decompress); a subsequent [`ExtractManager::get`] for the
    /// same key is then effectively free.
    pub fn prefetch(
        self: &Arc<Self>,
        pool: &ThreadPool,
        offset: u64,
        on_disk_size: u32,
        compressed: bool,
        constraint: SizeConstraint,
    ) -> Future<ExtractKey, Arc<[u8]>> {
        let key = (offset, on_disk_size);
        let (promise, future) = future::promise(key);
        let this = self.clone();
        pool.schedule(move || match this.get(offset, on_disk_size, compressed, constraint) {
            Ok(buf) => promise.resolve(buf),
            Err(e) => promise.fail(e),
        });
        future
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
