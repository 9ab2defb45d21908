//! Directory reader (component K): iterates directory entries through a
//! metablock cursor, with an optional directory index for fast by-name
//! lookup.
//!
//! On-disk layout (header `(count, start, inode_base)` + `count+1` entries
//! `(offset, inode_delta, type, name_len, name)`) grounded in
//! `klhowell-squinter`'s `metadata::DirTable`/`DirEntry`; the 3-byte
//! terminator convention for `inode.size` and the directory index's sparse
//! prefix map are from spec §4.K, which the teacher does not implement (it
//! always linear-scans). The index entries themselves are parsed out of an
//! `ExtDir` inode body (see `inode::read_directory_index`) and handed to
//! [`DirectoryReader::for_inode`], which is what lets
//! [`DirectoryReader::find_with_index`] skip ahead instead of scanning from
//! the start.

use std::sync::Arc;

use num_enum::TryFromPrimitive;

use crate::error::{Error, Result};
use crate::extract::ExtractManager;
use crate::inode::{DirInfo, InodeKind, InodeRef};
use crate::mapper::MapManager;
use crate::metablock::MetablockCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl EntryType {
    /// Directory entries carry the same inode-type tag as the inode table
    /// (spec §3), so resolve it through `InodeKind`'s `num_enum` conversion
    /// and reuse [`entry_type_from_inode_kind`] rather than re-deriving the
    /// basic/extended mapping here.
    fn from_inode_type(v: u16) -> Result<Self> {
        let kind = InodeKind::try_from_primitive(v).map_err(|_| Error::CorruptedDirectory("unknown entry type"))?;
        Ok(entry_type_from_inode_kind(kind))
    }
}

struct HeaderState {
    remaining_in_header: u32,
    inode_base: u32,
    block_start: u32,
}

/// One directory's index, a sparse `(index_entry_offset -> name prefix)`
/// map letting [`DirectoryReader::find`] skip ahead instead of always
/// scanning from the start (spec §4.K).
#[derive(Debug, Clone)]
pub struct DirectoryIndexEntry {
    pub index: u32,
    pub start: u32,
    pub name: Vec<u8>,
}

/// Iterates the entries of one directory, seeded at `(directory_table +
/// inode.block_start, inode.block_offset)` and stopping after
/// `inode.file_size - 3` decompressed bytes (the on-disk size includes a
/// 3-byte terminator, per spec §4.K).
pub struct DirectoryReader {
    cursor: MetablockCursor,
    remaining: i64,
    header: Option<HeaderState>,
    current: Option<CurrentEntry>,
    dir_table_offset: u64,
    index: Vec<DirectoryIndexEntry>,
}

#[derive(Debug, Clone)]
struct CurrentEntry {
    name: Vec<u8>,
    inode_ref: InodeRef,
    entry_type: EntryType,
    inode_number: u32,
}

impl DirectoryReader {
    pub fn for_inode(
        extract: Arc<ExtractManager>,
        mapper: Arc<MapManager>,
        dir_table_offset: u64,
        dir: &DirInfo,
    ) -> Result<Self> {
        if dir.file_size < 3 {
            return Err(Error::CorruptedDirectory("directory size smaller than terminator"));
        }
        let cursor = MetablockCursor::new(
            extract,
            mapper,
            dir_table_offset + dir.block_start as u64,
            dir.block_offset as usize,
        );
        Ok(Self {
            cursor,
            remaining: dir.file_size as i64 - 3,
            header: None,
            current: None,
            dir_table_offset,
            index: dir.index.clone(),
        })
    }

    fn read_header(&mut self) -> Result<bool> {
        if self.remaining <= 0 {
            return Ok(false);
        }
        let count = self.cursor.read_u32()? + 1;
        let block_start = self.cursor.read_u32()?;
        let inode_base = self.cursor.read_u32()?;
        self.remaining -= 12;
        self.header = Some(HeaderState {
            remaining_in_header: count,
            inode_base,
            block_start,
        });
        Ok(true)
    }

    fn read_entry(&mut self) -> Result<CurrentEntry> {
        let header = self.header.as_mut().expect("read_entry called without header");
        let offset = self.cursor.read_u16()?;
        let inode_delta = self.cursor.read_i16()?;
        let entry_type = EntryType::from_inode_type(self.cursor.read_u16()?)?;
        let name_len = self.cursor.read_u16()? as usize + 1;
        let name = self.cursor.read_bytes(name_len)?;
        self.remaining -= 8 + name_len as i64;
        header.remaining_in_header -= 1;

        let inode_number = (header.inode_base as i64 + inode_delta as i64) as u32;
        let inode_ref = InodeRef::new(header.block_start as u64, offset);
        Ok(CurrentEntry {
            name,
            inode_ref,
            entry_type,
            inode_number,
        })
    }

    /// Advance to the next entry. Returns `false` at end of directory.
    pub fn next(&mut self) -> Result<bool> {
        loop {
            let need_header = match &self.header {
                Some(h) if h.remaining_in_header > 0 => false,
                _ => true,
            };
            if need_header {
                if !self.read_header()? {
                    self.current = None;
                    return Ok(false);
                }
            }
            self.current = Some(self.read_entry()?);
            return Ok(true);
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.current.as_ref().expect("next() not called or returned false").name
    }

    pub fn inode_ref(&self) -> InodeRef {
        self.current.as_ref().expect("next() not called or returned false").inode_ref
    }

    pub fn entry_type(&self) -> EntryType {
        self.current.as_ref().expect("next() not called or returned false").entry_type
    }

    pub fn inode_number(&self) -> u32 {
        self.current.as_ref().expect("next() not called or returned false").inode_number
    }

    /// Look up `name` by linear scan from the current position (normally
    /// the start of the directory). Case-sensitive, byte-lexicographic,
    /// stops early once the scanned name exceeds `name`.
    pub fn find(&mut self, name: &[u8]) -> Result<bool> {
        while self.next()? {
            match self.name().cmp(name) {
                std::cmp::Ordering::Equal => return Ok(true),
                std::cmp::Ordering::Greater => return Ok(false),
                std::cmp::Ordering::Less => continue,
            }
        }
        Ok(false)
    }

    /// Look up `name` using this directory's index when it carries one
    /// (an `ExtDir`): seek to the last index entry whose prefix is `<=
    /// name`, then linear-scan from there. Falls back to a plain scan from
    /// the current position for a `BasicDir`, which carries no index.
    pub fn find_with_index(&mut self, name: &[u8]) -> Result<bool> {
        let seed = self.index.iter().rev().find(|e| e.name.as_slice() <= name).cloned();
        if let Some(seed) = seed {
            self.cursor.seek(self.dir_table_offset + seed.start as u64, 0)?;
            self.header = None;
        }
        self.find(name)
    }
}

pub fn entry_type_from_inode_kind(kind: InodeKind) -> EntryType {
    match kind {
        InodeKind::BasicDir | InodeKind::ExtDir => EntryType::Directory,
        InodeKind::BasicFile | InodeKind::ExtFile => EntryType::File,
        InodeKind::BasicSymlink | InodeKind::ExtSymlink => EntryType::Symlink,
        InodeKind::BasicBlockDev | InodeKind::ExtBlockDev => EntryType::BlockDevice,
        InodeKind::BasicCharDev | InodeKind::ExtCharDev => EntryType::CharDevice,
        InodeKind::BasicFifo | InodeKind::ExtFifo => EntryType::Fifo,
        InodeKind::BasicSocket | InodeKind::ExtSocket => EntryType::Socket,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compressor;
    use crate::mapper::StaticBackend;

    fn build_dir(entries: &[(&str, u16, i16, u16)]) -> (Vec<u8>, DirInfo) {
        // One header covering all entries, at archive offset 0 (dir table
        // also starts at 0, so block_start = 0).
        let mut payload = Vec::new();
        payload.extend_from_slice(&((entries.len() as u32) - 1).to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes()); // block_start
        payload.extend_from_slice(&100u32.to_le_bytes()); // inode_base
        for (name, offset, inode_delta, entry_type) in entries {
            payload.extend_from_slice(&offset.to_le_bytes());
            payload.extend_from_slice(&inode_delta.to_le_bytes());
            payload.extend_from_slice(&entry_type.to_le_bytes());
            payload.extend_from_slice(&((name.len() as u16) - 1).to_le_bytes());
            payload.extend_from_slice(name.as_bytes());
        }
        payload.extend_from_slice(&[0u8; 3]); // terminator bytes counted in file_size

        let mut buf = Vec::new();
        let header = (payload.len() as u16) | 0x8000; // uncompressed flag set
        buf.extend_from_slice(&header.to_le_bytes());
        buf.extend_from_slice(&payload);

        let dir = DirInfo {
            block_start: 0,
            link_count: 1,
            file_size: payload.len() as u32,
            block_offset: 0,
            parent_inode: 1,
            index_count: 0,
            xattr_index: None,
            index: Vec::new(),
        };
        (buf, dir)
    }

    fn header_and_entries(block_start: u32, inode_base: u32, entries: &[(&str, u16, i16, u16)]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&((entries.len() as u32) - 1).to_le_bytes());
        payload.extend_from_slice(&block_start.to_le_bytes());
        payload.extend_from_slice(&inode_base.to_le_bytes());
        for (name, offset, inode_delta, entry_type) in entries {
            payload.extend_from_slice(&offset.to_le_bytes());
            payload.extend_from_slice(&inode_delta.to_le_bytes());
            payload.extend_from_slice(&entry_type.to_le_bytes());
            payload.extend_from_slice(&((name.len() as u16) - 1).to_le_bytes());
            payload.extend_from_slice(name.as_bytes());
        }
        payload
    }

    fn metablock(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((payload.len() as u16) | 0x8000).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn reader(data: Vec<u8>, dir: &DirInfo) -> DirectoryReader {
        let backend = Arc::new(StaticBackend::new(data));
        let mapper = Arc::new(MapManager::new(backend, 4096, 8));
        let extract = Arc::new(ExtractManager::new(mapper.clone(), Compressor::None, 8));
        DirectoryReader::for_inode(extract, mapper, 0, dir).unwrap()
    }

    #[test]
    fn iterates_entries_in_order() {
        let (data, dir) = build_dir(&[("a", 0, 0, 2), ("b", 4, 1, 2), ("c", 8, 2, 2)]);
        let mut r = reader(data, &dir);
        let mut names = Vec::new();
        while r.next().unwrap() {
            names.push(r.name().to_vec());
        }
        assert_eq!(names, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn find_locates_middle_entry() {
        let (data, dir) = build_dir(&[("a", 0, 0, 2), ("b", 4, 1, 2), ("c", 8, 2, 2)]);
        let mut r = reader(data, &dir);
        assert!(r.find(b"b").unwrap());
        assert_eq!(r.inode_number(), 101);
    }

    #[test]
    fn find_misses_absent_name() {
        let (data, dir) = build_dir(&[("a", 0, 0, 2), ("c", 8, 2, 2)]);
        let mut r = reader(data, &dir);
        assert!(!r.find(b"b").unwrap());
    }

    /// The first header's entries carry a deliberately invalid entry type,
    /// so a linear scan starting from the top would bubble up
    /// `CorruptedDirectory` before ever reaching "m". A correct
    /// `find_with_index` seeks straight past that header into the second
    /// one, where the type is valid.
    #[test]
    fn find_with_index_seeks_past_the_indexed_block() {
        let block1 = header_and_entries(0, 100, &[("a", 0, 0, 99), ("b", 4, 1, 99)]);
        let block2 = header_and_entries(0, 100, &[("m", 0, 12, 2), ("z", 4, 13, 2)]);
        let mut block2_padded = block2.clone();
        block2_padded.extend_from_slice(&[0u8; 3]); // terminator, end of stream

        let mb1 = metablock(&block1);
        let block2_outer = mb1.len() as u64;
        let mut data = mb1;
        data.extend_from_slice(&metablock(&block2_padded));

        let dir = DirInfo {
            block_start: 0,
            link_count: 1,
            file_size: (block1.len() + block2_padded.len()) as u32,
            block_offset: 0,
            parent_inode: 1,
            index_count: 1,
            xattr_index: None,
            index: vec![DirectoryIndexEntry {
                index: block1.len() as u32,
                start: block2_outer as u32,
                name: b"m".to_vec(),
            }],
        };

        let mut r = reader(data, &dir);
        assert!(r.find_with_index(b"m").unwrap());
        assert_eq!(r.inode_number(), 112);
    }
}
