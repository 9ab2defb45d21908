//! Inode reader (component J): decodes inode variants from the inode
//! metablock stream and exposes typed accessors.
//!
//! Field layout grounded in `klhowell-squinter`'s `metadata::Inode` /
//! `InodeExtendedInfo` (basic variants) supplemented with the extended
//! (`Ext*`) variant layouts from the public SquashFS 4.0 on-disk format,
//! since the teacher only implemented a subset. `xattr_index` on every
//! extended variant is the field that makes extended variants "extended" —
//! confirmed by `src/xattr.h`'s lookup table shape, which every `Ext*`
//! inode indexes into.

use num_enum::TryFromPrimitive;

use crate::directory::DirectoryIndexEntry;
use crate::error::{Error, Result};
use crate::metablock::MetablockCursor;

/// Packed `(outer_offset : 48, inner_offset : 16)` locator into the inode
/// metablock stream (spec §3 "Inode reference").
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeRef(u64);

impl InodeRef {
    pub fn new(outer_offset: u64, inner_offset: u16) -> Self {
        debug_assert!(outer_offset < (1u64 << 48));
        Self((outer_offset << 16) | inner_offset as u64)
    }

    pub fn from_raw(v: u64) -> Self {
        Self(v)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn outer_offset(self) -> u64 {
        self.0 >> 16
    }

    pub fn inner_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl std::fmt::Debug for InodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.outer_offset(), self.inner_offset())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum InodeKind {
    BasicDir = 1,
    BasicFile = 2,
    BasicSymlink = 3,
    BasicBlockDev = 4,
    BasicCharDev = 5,
    BasicFifo = 6,
    BasicSocket = 7,
    ExtDir = 8,
    ExtFile = 9,
    ExtSymlink = 10,
    ExtBlockDev = 11,
    ExtCharDev = 12,
    ExtFifo = 13,
    ExtSocket = 14,
}

impl InodeKind {
    fn from_u16(v: u16) -> Result<Self> {
        Self::try_from_primitive(v).map_err(|_| Error::CorruptedInode("unknown inode type"))
    }

    pub fn is_dir(self) -> bool {
        matches!(self, InodeKind::BasicDir | InodeKind::ExtDir)
    }

    pub fn is_file(self) -> bool {
        matches!(self, InodeKind::BasicFile | InodeKind::ExtFile)
    }

    pub fn is_symlink(self) -> bool {
        matches!(self, InodeKind::BasicSymlink | InodeKind::ExtSymlink)
    }
}

#[derive(Debug, Clone)]
pub struct DirInfo {
    pub block_start: u32,
    pub link_count: u32,
    pub file_size: u32,
    pub block_offset: u16,
    pub parent_inode: u32,
    pub index_count: u16,
    pub xattr_index: Option<u32>,
    /// The `index_count` directory-index entries trailing an `ExtDir`
    /// inode body on disk (spec §4.K); empty for `BasicDir`, which carries
    /// no index.
    pub index: Vec<DirectoryIndexEntry>,
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub blocks_start: u64,
    pub frag_index: Option<u32>,
    pub block_offset: u32,
    pub file_size: u64,
    pub block_sizes: Vec<u32>,
    pub xattr_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SymlinkInfo {
    pub link_count: u32,
    pub target: Vec<u8>,
    pub xattr_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub link_count: u32,
    pub device_number: u32,
    pub xattr_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct IpcInfo {
    pub link_count: u32,
    pub xattr_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum InodeBody {
    Dir(DirInfo),
    File(FileInfo),
    Symlink(SymlinkInfo),
    Device(DeviceInfo),
    Ipc(IpcInfo),
}

const NO_XATTR: u32 = 0xFFFF_FFFF;
const NO_FRAGMENT: u32 = 0xFFFF_FFFF;

fn xattr_opt(v: u32) -> Option<u32> {
    if v == NO_XATTR {
        None
    } else {
        Some(v)
    }
}

fn frag_opt(v: u32) -> Option<u32> {
    if v == NO_FRAGMENT {
        None
    } else {
        Some(v)
    }
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub kind: InodeKind,
    pub permissions: u16,
    pub uid_index: u16,
    pub gid_index: u16,
    pub mtime: u32,
    pub inode_number: u32,
    pub body: InodeBody,
    /// Where this inode ended, so sequential scans can continue from
    /// [`Inode::next_ref`] without re-decoding.
    next_ref: InodeRef,
}

impl Inode {
    /// Decode the inode at `ref_`, reading through `cursor` (already
    /// positioned at the inode table's metablock stream start, i.e. owned
    /// and seeked by the caller to `ref_`).
    pub fn read(cursor: &mut MetablockCursor, at: InodeRef, block_size: u32) -> Result<Self> {
        cursor.seek(at.outer_offset(), at.inner_offset() as usize)?;
        let kind = InodeKind::from_u16(cursor.read_u16()?)?;
        let permissions = cursor.read_u16()?;
        let uid_index = cursor.read_u16()?;
        let gid_index = cursor.read_u16()?;
        let mtime = cursor.read_u32()?;
        let inode_number = cursor.read_u32()?;

        let body = match kind {
            InodeKind::BasicDir => InodeBody::Dir(DirInfo {
                block_start: cursor.read_u32()?,
                link_count: cursor.read_u32()?,
                file_size: cursor.read_u16()? as u32,
                block_offset: cursor.read_u16()?,
                parent_inode: cursor.read_u32()?,
                index_count: 0,
                xattr_index: None,
                index: Vec::new(),
            }),
            InodeKind::ExtDir => {
                let link_count = cursor.read_u32()?;
                let file_size = cursor.read_u32()?;
                let block_start = cursor.read_u32()?;
                let parent_inode = cursor.read_u32()?;
                let index_count = cursor.read_u16()?;
                let block_offset = cursor.read_u16()?;
                let xattr_index = xattr_opt(cursor.read_u32()?);
                // `index_count` directory-index entries trail the fixed
                // body on disk; they must be consumed here so `next_ref`
                // (below) lands after them rather than mid-index.
                let index = read_directory_index(cursor, index_count)?;
                InodeBody::Dir(DirInfo {
                    block_start,
                    link_count,
                    file_size,
                    block_offset,
                    parent_inode,
                    index_count,
                    xattr_index,
                    index,
                })
            }
            InodeKind::BasicFile => {
                let blocks_start = cursor.read_u32()? as u64;
                let frag_index = frag_opt(cursor.read_u32()?);
                let block_offset = cursor.read_u32()?;
                let file_size = cursor.read_u32()? as u64;
                let block_sizes = read_block_sizes(cursor, file_size, frag_index.is_some(), block_size)?;
                InodeBody::File(FileInfo {
                    blocks_start,
                    frag_index,
                    block_offset,
                    file_size,
                    block_sizes,
                    xattr_index: None,
                })
            }
            InodeKind::ExtFile => {
                let blocks_start = cursor.read_u64()?;
                let file_size = cursor.read_u64()?;
                let sparse = cursor.read_u64()?;
                let _ = sparse;
                let link_count = cursor.read_u32()?;
                let _ = link_count;
                let frag_index = frag_opt(cursor.read_u32()?);
                let block_offset = cursor.read_u32()?;
                let xattr_index = xattr_opt(cursor.read_u32()?);
                let block_sizes = read_block_sizes(cursor, file_size, frag_index.is_some(), block_size)?;
                InodeBody::File(FileInfo {
                    blocks_start,
                    frag_index,
                    block_offset,
                    file_size,
                    block_sizes,
                    xattr_index,
                })
            }
            InodeKind::BasicSymlink | InodeKind::ExtSymlink => {
                let link_count = cursor.read_u32()?;
                let target_size = cursor.read_u32()? as usize;
                let target = cursor.read_bytes(target_size)?;
                let xattr_index = if kind == InodeKind::ExtSymlink {
                    xattr_opt(cursor.read_u32()?)
                } else {
                    None
                };
                InodeBody::Symlink(SymlinkInfo {
                    link_count,
                    target,
                    xattr_index,
                })
            }
            InodeKind::BasicBlockDev | InodeKind::BasicCharDev => InodeBody::Device(DeviceInfo {
                link_count: cursor.read_u32()?,
                device_number: cursor.read_u32()?,
                xattr_index: None,
            }),
            InodeKind::ExtBlockDev | InodeKind::ExtCharDev => {
                let link_count = cursor.read_u32()?;
                let device_number = cursor.read_u32()?;
                let xattr_index = xattr_opt(cursor.read_u32()?);
                InodeBody::Device(DeviceInfo {
                    link_count,
                    device_number,
                    xattr_index,
                })
            }
            InodeKind::BasicFifo | InodeKind::BasicSocket => InodeBody::Ipc(IpcInfo {
                link_count: cursor.read_u32()?,
                xattr_index: None,
            }),
            InodeKind::ExtFifo | InodeKind::ExtSocket => {
                let link_count = cursor.read_u32()?;
                let xattr_index = xattr_opt(cursor.read_u32()?);
                InodeBody::Ipc(IpcInfo {
                    link_count,
                    xattr_index,
                })
            }
        };

        let next_ref = InodeRef::new(cursor.outer(), cursor.inner() as u16);

        Ok(Self {
            kind,
            permissions,
            uid_index,
            gid_index,
            mtime,
            inode_number,
            body,
            next_ref,
        })
    }

    /// The reference immediately following this inode, for sequential scans.
    pub fn next_ref(&self) -> InodeRef {
        self.next_ref
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }

    pub fn as_dir(&self) -> Result<&DirInfo> {
        match &self.body {
            InodeBody::Dir(d) => Ok(d),
            _ => Err(Error::WrongInodeType),
        }
    }

    pub fn as_file(&self) -> Result<&FileInfo> {
        match &self.body {
            InodeBody::File(f) => Ok(f),
            _ => Err(Error::WrongInodeType),
        }
    }

    pub fn as_symlink(&self) -> Result<&SymlinkInfo> {
        match &self.body {
            InodeBody::Symlink(s) => Ok(s),
            _ => Err(Error::WrongInodeType),
        }
    }

    pub fn xattr_index(&self) -> Option<u32> {
        match &self.body {
            InodeBody::Dir(d) => d.xattr_index,
            InodeBody::File(f) => f.xattr_index,
            InodeBody::Symlink(s) => s.xattr_index,
            InodeBody::Device(d) => d.xattr_index,
            InodeBody::Ipc(i) => i.xattr_index,
        }
    }

    /// Unix permission bits plus the file-type bits `stat(2)` expects in
    /// `st_mode`.
    pub fn mode(&self) -> u32 {
        let type_bits: u32 = match self.kind {
            InodeKind::BasicBlockDev | InodeKind::ExtBlockDev => 0o060000,
            InodeKind::BasicCharDev | InodeKind::ExtCharDev => 0o020000,
            InodeKind::BasicDir | InodeKind::ExtDir => 0o040000,
            InodeKind::BasicFile | InodeKind::ExtFile => 0o100000,
            InodeKind::BasicFifo | InodeKind::ExtFifo => 0o010000,
            InodeKind::BasicSocket | InodeKind::ExtSocket => 0o140000,
            InodeKind::BasicSymlink | InodeKind::ExtSymlink => 0o120000,
        };
        type_bits | self.permissions as u32
    }
}

fn read_block_sizes(
    cursor: &mut MetablockCursor,
    file_size: u64,
    has_fragment: bool,
    block_size: u32,
) -> Result<Vec<u32>> {
    let full_blocks = if has_fragment {
        file_size / block_size as u64
    } else {
        file_size.div_ceil(block_size as u64)
    };
    let mut sizes = Vec::with_capacity(full_blocks as usize);
    for _ in 0..full_blocks {
        sizes.push(cursor.read_u32()?);
    }
    Ok(sizes)
}

/// Parses the on-disk directory-index entries trailing an `ExtDir` inode
/// body: `count` records of `(index : u32, start : u32, name_size : u32,
/// name[name_size + 1])`, per the public SquashFS 4.0 layout.
fn read_directory_index(cursor: &mut MetablockCursor, count: u16) -> Result<Vec<DirectoryIndexEntry>> {
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let index = cursor.read_u32()?;
        let start = cursor.read_u32()?;
        let name_size = cursor.read_u32()? as usize;
        let name = cursor.read_bytes(name_size + 1)?;
        entries.push(DirectoryIndexEntry { index, start, name });
    }
    Ok(entries)
}

/// Decode a data-block-list entry: bit 24 = uncompressed, bits 0..=23 = size
/// (value 0 means sparse, per spec §3 "Data block").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub on_disk_size: u32,
    pub compressed: bool,
    pub sparse: bool,
}

impl BlockHeader {
    pub fn parse(raw: u32) -> Self {
        let on_disk_size = raw & 0x00FF_FFFF;
        let compressed = raw & 0x0100_0000 == 0;
        Self {
            on_disk_size,
            compressed,
            sparse: on_disk_size == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_ref_packs_and_unpacks() {
        let r = InodeRef::new(12345, 99);
        assert_eq!(r.outer_offset(), 12345);
        assert_eq!(r.inner_offset(), 99);
    }

    #[test]
    fn block_header_detects_sparse() {
        let h = BlockHeader::parse(0);
        assert!(h.sparse);
        assert_eq!(h.on_disk_size, 0);
    }

    #[test]
    fn block_header_detects_uncompressed_flag() {
        let h = BlockHeader::parse(0x0100_0000 | 42);
        assert!(!h.compressed);
        assert_eq!(h.on_disk_size, 42);
        assert!(!h.sparse);
    }
}
