//! File content iterator (component L): streams a regular file's bytes out
//! of its data block list and fragment tail.
//!
//! Grounded in `klhowell-squinter`'s `FileDataReader` (`squashfs/file.rs`)
//! for the block-list-then-fragment layout and the "sparse block has
//! on-disk size zero" convention; re-expressed over the extract cache (G)
//! instead of `Read`/`Seek`, and extended with speculative block prefetch
//! through the worker pool (C) per spec §4.L, which the teacher's reader
//! does not do (it pulls blocks synchronously, one at a time).

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::extract::{ExtractKey, ExtractManager, SizeConstraint};
use crate::future::Future;
use crate::inode::{BlockHeader, FileInfo};
use crate::tables::FragmentEntry;
use crate::threadpool::ThreadPool;

/// How many data blocks ahead of the one just returned get spawned onto the
/// thread pool, when one is configured.
const PREFETCH_DEPTH: usize = 2;

/// The resolved location of a file's fragment tail: which fragment block it
/// lives in, and where within that block's decompressed bytes it starts.
#[derive(Debug, Clone, Copy)]
pub struct FragmentLocation {
    pub entry: FragmentEntry,
    pub block_offset: u32,
}

struct FragmentState {
    location: FragmentLocation,
    tail_len: usize,
    emitted: bool,
}

/// Sequential reader over one file's data, yielding one contiguous chunk
/// per [`FileContentIterator::next`] call: a decompressed data block, a
/// locally synthesized run of sparse zeros, or the fragment tail slice.
pub struct FileContentIterator {
    extract: Arc<ExtractManager>,
    pool: Option<ThreadPool>,
    blocks_start: u64,
    block_size: u64,
    file_size: u64,
    headers: Vec<BlockHeader>,
    /// `offsets[i]` is the absolute archive offset of block `i`;
    /// `offsets[headers.len()]` is the offset just past the last block.
    offsets: Vec<u64>,
    fragment: Option<FragmentState>,
    next_block: usize,
    prefetched: VecDeque<(usize, Future<ExtractKey, Arc<[u8]>>)>,
    last_chunk_start: Option<u64>,
}

impl FileContentIterator {
    pub fn new(
        extract: Arc<ExtractManager>,
        pool: Option<ThreadPool>,
        info: &FileInfo,
        block_size: u32,
        fragment: Option<FragmentLocation>,
    ) -> Result<Self> {
        let headers: Vec<BlockHeader> = info.block_sizes.iter().map(|&raw| BlockHeader::parse(raw)).collect();
        let mut offsets = Vec::with_capacity(headers.len() + 1);
        let mut cursor = info.blocks_start;
        for h in &headers {
            offsets.push(cursor);
            cursor += h.on_disk_size as u64;
        }
        offsets.push(cursor);

        let full_bytes = block_size as u64 * headers.len() as u64;
        let fragment = match fragment {
            Some(location) => {
                if info.file_size < full_bytes {
                    return Err(Error::CorruptedInode("file size smaller than block list covers"));
                }
                let tail_len = (info.file_size - full_bytes) as usize;
                Some(FragmentState {
                    location,
                    tail_len,
                    emitted: false,
                })
            }
            None => None,
        };

        Ok(Self {
            extract,
            pool,
            blocks_start: info.blocks_start,
            block_size: block_size as u64,
            file_size: info.file_size,
            headers,
            offsets,
            fragment,
            next_block: 0,
            prefetched: VecDeque::new(),
            last_chunk_start: None,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Logical file offset at which the chunk returned by the most recent
    /// [`FileContentIterator::next`] call begins.
    pub fn last_chunk_start(&self) -> Option<u64> {
        self.last_chunk_start
    }

    fn block_logical_len(&self, index: usize) -> usize {
        if index + 1 < self.headers.len() || self.fragment.is_some() {
            self.block_size as usize
        } else {
            let full = self.block_size * (self.headers.len() as u64 - 1);
            (self.file_size - full) as usize
        }
    }

    fn schedule_prefetch(&mut self, from: usize) {
        let Some(pool) = self.pool.clone() else { return };
        for idx in from..(from + PREFETCH_DEPTH).min(self.headers.len()) {
            if self.prefetched.iter().any(|(i, _)| *i == idx) {
                continue;
            }
            let header = self.headers[idx];
            if header.sparse {
                continue;
            }
            let future = self.extract.prefetch(
                &pool,
                self.offsets[idx],
                header.on_disk_size,
                header.compressed,
                SizeConstraint::Exact(self.block_logical_len(idx)),
            );
            self.prefetched.push_back((idx, future));
        }
    }

    fn take_prefetched(&mut self, index: usize) -> Option<Future<ExtractKey, Arc<[u8]>>> {
        let pos = self.prefetched.iter().position(|(i, _)| *i == index)?;
        Some(self.prefetched.remove(pos).unwrap().1)
    }

    fn read_block(&mut self, index: usize) -> Result<Arc<[u8]>> {
        let header = self.headers[index];
        if header.sparse {
            return Ok(Arc::from(vec![0u8; self.block_logical_len(index)]));
        }
        if let Some(future) = self.take_prefetched(index) {
            return future.wait();
        }
        self.extract.get(
            self.offsets[index],
            header.on_disk_size,
            header.compressed,
            SizeConstraint::Exact(self.block_logical_len(index)),
        )
    }

    fn read_fragment(&mut self) -> Result<Arc<[u8]>> {
        let frag = self.fragment.as_mut().expect("read_fragment without fragment");
        frag.emitted = true;
        let block = self.extract.get(
            frag.location.entry.start,
            frag.location.entry.on_disk_size,
            frag.location.entry.compressed,
            SizeConstraint::AtMost(self.block_size as usize),
        )?;
        let start = frag.location.block_offset as usize;
        let end = start + frag.tail_len;
        if end > block.len() {
            return Err(Error::CorruptedDatablock(frag.location.entry.start));
        }
        Ok(Arc::from(block[start..end].to_vec()))
    }

    /// Return the next contiguous chunk of file data, or `None` once every
    /// block and the fragment tail (if any) has been emitted.
    pub fn next(&mut self) -> Result<Option<Arc<[u8]>>> {
        if self.next_block < self.headers.len() {
            let index = self.next_block;
            self.next_block += 1;
            let data = self.read_block(index)?;
            self.last_chunk_start = Some(index as u64 * self.block_size);
            self.schedule_prefetch(self.next_block);
            return Ok(Some(data));
        }
        if let Some(frag) = &self.fragment {
            if !frag.emitted {
                let start = self.block_size * self.headers.len() as u64;
                let data = self.read_fragment()?;
                self.last_chunk_start = Some(start);
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    /// Reposition so the next [`FileContentIterator::next`] call returns the
    /// chunk containing `offset`. Cheap (a no-op) when `offset` already
    /// falls within the chunk about to be returned.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.file_size {
            return Err(Error::OutOfBounds);
        }
        let full_blocks = self.headers.len() as u64 * self.block_size;
        if offset >= full_blocks {
            self.next_block = self.headers.len();
            if let Some(frag) = &mut self.fragment {
                frag.emitted = offset == self.file_size;
            }
        } else {
            let target = (offset / self.block_size) as usize;
            if target != self.next_block {
                self.prefetched.clear();
            }
            self.next_block = target;
            if let Some(frag) = &mut self.fragment {
                frag.emitted = false;
            }
        }
        Ok(())
    }
}

/// Random-access wrapper over [`FileContentIterator`]: walks or seeks
/// block-by-block to satisfy arbitrary `(offset, length)` reads, reusing the
/// block already in hand when the request stays within it.
pub struct FileReader {
    iter: FileContentIterator,
    current: Option<(u64, Arc<[u8]>)>,
}

impl FileReader {
    pub fn new(iter: FileContentIterator) -> Self {
        Self { iter, current: None }
    }

    fn chunk_covering(&mut self, offset: u64) -> Result<&(u64, Arc<[u8]>)> {
        let needs_fetch = match &self.current {
            Some((start, data)) => offset < *start || offset >= start + data.len() as u64,
            None => true,
        };
        if needs_fetch {
            self.iter.seek(offset)?;
            let data = self.iter.next()?.ok_or(Error::OutOfBounds)?;
            let start = self.iter.last_chunk_start().expect("next() just returned Some");
            self.current = Some((start, data));
        }
        Ok(self.current.as_ref().unwrap())
    }

    /// Read `buf.len()` bytes starting at `offset`, which must lie within
    /// the file (`offset + buf.len() <= file_size`).
    pub fn advance(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if offset.checked_add(buf.len() as u64).ok_or(Error::OutOfBounds)? > self.iter.file_size() {
            return Err(Error::OutOfBounds);
        }
        let mut done = 0usize;
        let mut pos = offset;
        while done < buf.len() {
            let (start, data) = self.chunk_covering(pos)?.clone();
            let within = (pos - start) as usize;
            let avail = data.len() - within;
            let take = avail.min(buf.len() - done);
            buf[done..done + take].copy_from_slice(&data[within..within + take]);
            done += take;
            pos += take as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compressor;
    use crate::mapper::{MapManager, StaticBackend};

    fn build_archive(blocks: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for b in blocks {
            buf.extend_from_slice(b);
        }
        buf
    }

    fn iterator(data: Vec<u8>, info: &FileInfo, block_size: u32, fragment: Option<FragmentLocation>) -> FileContentIterator {
        let backend = Arc::new(StaticBackend::new(data));
        let mapper = Arc::new(MapManager::new(backend, 4096, 8));
        let extract = Arc::new(ExtractManager::new(mapper, Compressor::None, 8));
        FileContentIterator::new(extract, None, info, block_size, fragment).unwrap()
    }

    #[test]
    fn reads_whole_blocks_without_fragment() {
        let data = build_archive(&[&[1, 2, 3, 4], &[5, 6, 7, 8]]);
        let info = FileInfo {
            blocks_start: 0,
            frag_index: None,
            block_offset: 0,
            file_size: 8,
            block_sizes: vec![4, 4],
            xattr_index: None,
        };
        let mut it = iterator(data, &info, 4, None);
        assert_eq!(&*it.next().unwrap().unwrap(), &[1, 2, 3, 4]);
        assert_eq!(&*it.next().unwrap().unwrap(), &[5, 6, 7, 8]);
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn sparse_block_is_synthesized_zero() {
        let data = build_archive(&[&[1, 2, 3, 4]]);
        let info = FileInfo {
            blocks_start: 0,
            frag_index: None,
            block_offset: 0,
            file_size: 8,
            block_sizes: vec![0, 4],
            xattr_index: None,
        };
        let mut it = iterator(data, &info, 4, None);
        assert_eq!(&*it.next().unwrap().unwrap(), &[0, 0, 0, 0]);
        assert_eq!(&*it.next().unwrap().unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn fragment_tail_is_sliced_from_fragment_block() {
        let data = build_archive(&[&[1, 2, 3, 4], &[9, 9, 9, 5, 6, 9, 9]]);
        let info = FileInfo {
            blocks_start: 0,
            frag_index: Some(0),
            block_offset: 0,
            file_size: 6,
            block_sizes: vec![4],
            xattr_index: None,
        };
        let fragment = FragmentLocation {
            entry: FragmentEntry {
                start: 4,
                on_disk_size: 7,
                compressed: false,
            },
            block_offset: 3,
        };
        let mut it = iterator(data, &info, 4, Some(fragment));
        assert_eq!(&*it.next().unwrap().unwrap(), &[1, 2, 3, 4]);
        assert_eq!(&*it.next().unwrap().unwrap(), &[5, 6]);
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn random_access_reads_span_blocks() {
        let data = build_archive(&[&[1, 2, 3, 4], &[5, 6, 7, 8]]);
        let info = FileInfo {
            blocks_start: 0,
            frag_index: None,
            block_offset: 0,
            file_size: 8,
            block_sizes: vec![4, 4],
            xattr_index: None,
        };
        let it = iterator(data, &info, 4, None);
        let mut reader = FileReader::new(it);
        let mut buf = [0u8; 4];
        reader.advance(2, &mut buf).unwrap();
        assert_eq!(buf, [3, 4, 5, 6]);
    }
}
