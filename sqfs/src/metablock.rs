//! Metablock reader (component H): a cursor over a logical stream of 8 KiB
//! metablocks, joining adjacent compressed blocks transparently.
//!
//! Grounded in `klhowell-squinter`'s `MetadataReader`/`MetadataBlockReader`
//! (`squashfs/block.rs`, `squashfs/metadata.rs`): the header is a
//! `u16` with bit 15 marking "uncompressed", the low 15 bits the on-disk
//! size, and reads naturally roll into the next block when the current one
//! is exhausted. This version is expressed over the extract cache (G)
//! instead of a `Read`/`Seek` stream, so "roll to next block" means
//! re-resolving through [`ExtractManager::get`] rather than continuing to
//! pull bytes off a shared reader.

use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::extract::{ExtractManager, SizeConstraint};
use crate::mapper::MapManager;

const METABLOCK_SIZE: usize = 8192;

struct LoadedBlock {
    outer: u64,
    next_outer: u64,
    data: Arc<[u8]>,
}

/// A view returned by [`MetablockCursor::peek`]: either a zero-copy slice of
/// one cached metablock, or an owned buffer assembled across a block
/// boundary (the "2x8KiB scratch" of spec §4.H).
pub enum View {
    Block(Arc<[u8]>, std::ops::Range<usize>),
    Owned(Vec<u8>),
}

impl View {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            View::Block(data, range) => &data[range.clone()],
            View::Owned(buf) => buf,
        }
    }
}

/// Cursor `{outer_offset, inner_offset}` over a metablock stream, per spec
/// §4.H. `outer` is an absolute archive byte offset of a metablock's
/// compressed header; `inner` is a byte offset within that block's
/// decompressed payload (`inner < 8192`).
#[derive(Clone)]
pub struct MetablockCursor {
    extract: Arc<ExtractManager>,
    mapper: Arc<MapManager>,
    outer: u64,
    inner: usize,
    current: Option<Arc<LoadedBlockShared>>,
}

/// Shared so `Clone` (used to fork a cursor for lookahead without disturbing
/// the original, e.g. directory index scans) does not force a re-fetch.
struct LoadedBlockShared(LoadedBlock);

impl MetablockCursor {
    pub fn new(extract: Arc<ExtractManager>, mapper: Arc<MapManager>, outer: u64, inner: usize) -> Self {
        Self {
            extract,
            mapper,
            outer,
            inner,
            current: None,
        }
    }

    pub fn outer(&self) -> u64 {
        self.outer
    }

    pub fn inner(&self) -> usize {
        self.inner
    }

    fn read_header(&self, at: u64) -> Result<(u32, bool)> {
        let window = self.mapper.map(at, 2)?;
        let raw = window.as_slice();
        let header = u16::from_le_bytes([raw[0], raw[1]]);
        let size = (header & 0x7FFF) as u32;
        let uncompressed = header & 0x8000 != 0;
        if size as usize > METABLOCK_SIZE {
            return Err(Error::CorruptedMetablock(at));
        }
        Ok((size, uncompressed))
    }

    fn load(&self, outer: u64) -> Result<LoadedBlock> {
        let (size, uncompressed) = self.read_header(outer)?;
        let data = self
            .extract
            .get(outer + 2, size, !uncompressed, SizeConstraint::AtMost(METABLOCK_SIZE))?;
        Ok(LoadedBlock {
            outer,
            next_outer: outer + 2 + size as u64,
            data,
        })
    }

    fn ensure_current(&mut self) -> Result<()> {
        if self.current.as_ref().map(|c| c.0.outer) != Some(self.outer) {
            if self.inner >= METABLOCK_SIZE {
                return Err(Error::CorruptedMetablock(self.outer));
            }
            self.current = Some(Arc::new(LoadedBlockShared(self.load(self.outer)?)));
        }
        Ok(())
    }

    /// Absolute reposition. `inner` must be `< 8192`.
    pub fn seek(&mut self, outer: u64, inner: usize) -> Result<()> {
        if inner >= METABLOCK_SIZE {
            return Err(Error::CorruptedMetablock(outer));
        }
        self.outer = outer;
        self.inner = inner;
        self.current = None;
        Ok(())
    }

    /// Advance the cursor by `n` decompressed bytes, crossing metablock
    /// boundaries as needed.
    pub fn advance(&mut self, mut n: usize) -> Result<()> {
        while n > 0 {
            self.ensure_current()?;
            let cur = self.current.as_ref().unwrap();
            let avail = cur.0.data.len() - self.inner;
            if n <= avail {
                self.inner += n;
                return Ok(());
            }
            n -= avail;
            let next_outer = cur.0.next_outer;
            self.outer = next_outer;
            self.inner = 0;
            self.current = None;
        }
        Ok(())
    }

    /// Return a contiguous view of the next `n` decompressed bytes without
    /// advancing the cursor. Straddling a metablock boundary copies into an
    /// owned scratch buffer; callers that want to consume the bytes should
    /// follow with [`MetablockCursor::advance`].
    pub fn peek(&mut self, n: usize) -> Result<View> {
        self.ensure_current()?;
        let cur = self.current.as_ref().unwrap().clone();
        let avail = cur.0.data.len() - self.inner;
        if n <= avail {
            return Ok(View::Block(cur.0.data.clone(), self.inner..self.inner + n));
        }

        let mut buf = Vec::with_capacity(n);
        buf.extend_from_slice(&cur.0.data[self.inner..]);
        let mut next_outer = cur.0.next_outer;
        while buf.len() < n {
            let nb = self.load(next_outer)?;
            if nb.data.is_empty() {
                return Err(Error::CorruptedMetablock(next_outer));
            }
            let need = n - buf.len();
            let take = need.min(nb.data.len());
            buf.extend_from_slice(&nb.data[..take]);
            next_outer = nb.next_outer;
        }
        Ok(View::Owned(buf))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let v = self.peek(n)?;
        let out = v.as_slice().to_vec();
        self.advance(n)?;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok((&self.read_bytes(2)?[..]).read_u16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok((&self.read_bytes(4)?[..]).read_u32::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok((&self.read_bytes(8)?[..]).read_u64::<LittleEndian>()?)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compressor;
    use crate::mapper::StaticBackend;

    fn metablock_header(size: u16, uncompressed: bool) -> [u8; 2] {
        let mut h = size;
        if uncompressed {
            h |= 0x8000;
        }
        h.to_le_bytes()
    }

    fn build_archive(blocks: &[&[u8]]) -> (Vec<u8>, Vec<u64>) {
        let mut buf = Vec::new();
        let mut offsets = Vec::new();
        for b in blocks {
            offsets.push(buf.len() as u64);
            buf.extend_from_slice(&metablock_header(b.len() as u16, true));
            buf.extend_from_slice(b);
        }
        (buf, offsets)
    }

    fn cursor(data: Vec<u8>, outer: u64, inner: usize) -> MetablockCursor {
        let backend = Arc::new(StaticBackend::new(data));
        let mapper = Arc::new(MapManager::new(backend, 4096, 8));
        let extract = Arc::new(ExtractManager::new(mapper.clone(), Compressor::None, 8));
        MetablockCursor::new(extract, mapper, outer, inner)
    }

    #[test]
    fn reads_within_single_block() {
        let (data, offsets) = build_archive(&[&[1, 2, 3, 4, 5, 6, 7, 8]]);
        let mut c = cursor(data, offsets[0], 2);
        assert_eq!(c.read_bytes(3).unwrap(), vec![3, 4, 5]);
        assert_eq!(c.read_u8().unwrap(), 6);
    }

    #[test]
    fn crosses_block_boundary_transparently() {
        let (data, offsets) = build_archive(&[&[1, 2, 3, 4], &[5, 6, 7, 8]]);
        let mut c = cursor(data, offsets[0], 2);
        // 2 bytes remain in block 0, then 4 more from block 1.
        let out = c.read_bytes(6).unwrap();
        assert_eq!(out, vec![3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn seek_repositions_absolutely() {
        let (data, offsets) = build_archive(&[&[9, 9], &[1, 2, 3]]);
        let mut c = cursor(data, offsets[0], 0);
        c.seek(offsets[1], 1).unwrap();
        assert_eq!(c.read_bytes(2).unwrap(), vec![2, 3]);
    }

    #[test]
    fn inner_out_of_range_is_rejected() {
        let (data, offsets) = build_archive(&[&[1, 2, 3]]);
        let mut c = cursor(data, offsets[0], 0);
        assert!(c.seek(offsets[0], 8192).is_err());
    }
}
