//! Memory-mapped file backend. Reads are plain memory copies out of the
//! mapping; the OS page cache handles the actual I/O and sharing, so
//! concurrent reads of disjoint windows never contend on a lock here.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use super::{check_bounds, MapperBackend};
use crate::error::Result;

pub struct MmapBackend {
    mmap: Mmap,
}

impl MmapBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is only ever read; truncation/mutation of the
        // backing file by another process while mapped is the caller's
        // responsibility to avoid, same contract as `memmap2::Mmap::map`.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }
}

impl MapperBackend for MmapBackend {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len() as u64, self.size())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.mmap[start..start + buf.len()]);
        Ok(())
    }
}
