//! The 96-byte fixed superblock (spec §3) at the start of every archive
//! (after the caller-supplied `archive_offset`).
//!
//! Field layout grounded in `klhowell-squinter`'s `squashfs/superblock.rs`;
//! this version reads from an in-memory slice fetched through the mapper
//! rather than a `Read` stream, since this crate's mapper (component D/E)
//! hands back byte windows rather than exposing a seekable stream.

use bitflags::bitflags;

use crate::compression::Compressor;
use crate::error::{Error, Result};
use crate::inode::InodeRef;

pub const MAGIC: u32 = 0x7371_7368;
pub const SUPERBLOCK_SIZE: usize = 96;

bitflags! {
    pub struct SuperblockFlags: u16 {
        const INODES_UNCOMPRESSED = 0x0001;
        const DATABLOCKS_UNCOMPRESSED = 0x0002;
        const FRAGMENTS_UNCOMPRESSED = 0x0008;
        const FRAGMENTS_NOT_USED = 0x0010;
        const FRAGMENTS_ALWAYS_GENERATED = 0x0020;
        const DATA_DEDUPLICATED = 0x0040;
        const NFS_EXPORT_EXISTS = 0x0080;
        const XATTRS_UNCOMPRESSED = 0x0100;
        const NO_XATTRS = 0x0200;
        const COMPRESSOR_OPTIONS_PRESENT = 0x0400;
        const ID_TABLE_UNCOMPRESSED = 0x0800;
    }
}

/// Sentinel used by several superblock fields ("table absent"). Per spec §9
/// open question (a), the same bit pattern can also mean "end marker" in
/// other contexts, so detection is always field-local, never global.
pub const ABSENT: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub struct Superblock {
    pub magic: u32,
    pub inode_count: u32,
    pub mod_time: u32,
    pub block_size: u32,
    pub frag_count: u32,
    pub compressor: Compressor,
    pub block_log: u16,
    pub flags: SuperblockFlags,
    pub id_count: u16,
    pub version_major: u16,
    pub version_minor: u16,
    pub root_inode: InodeRef,
    pub bytes_used: u64,
    pub id_table: u64,
    pub xattr_table: Option<u64>,
    pub inode_table: u64,
    pub dir_table: u64,
    pub frag_table: Option<u64>,
    pub export_table: Option<u64>,
}

macro_rules! le_u16 {
    ($b:expr, $o:expr) => {
        u16::from_le_bytes([$b[$o], $b[$o + 1]])
    };
}
macro_rules! le_u32 {
    ($b:expr, $o:expr) => {
        u32::from_le_bytes([$b[$o], $b[$o + 1], $b[$o + 2], $b[$o + 3]])
    };
}
macro_rules! le_u64 {
    ($b:expr, $o:expr) => {
        u64::from_le_bytes([
            $b[$o],
            $b[$o + 1],
            $b[$o + 2],
            $b[$o + 3],
            $b[$o + 4],
            $b[$o + 5],
            $b[$o + 6],
            $b[$o + 7],
        ])
    };
}

impl Superblock {
    pub fn parse(buf: &[u8], archive_size: u64) -> Result<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(Error::SuperblockTooSmall);
        }
        let magic = le_u32!(buf, 0);
        if magic != MAGIC {
            return Err(Error::WrongMagic);
        }
        let inode_count = le_u32!(buf, 4);
        let mod_time = le_u32!(buf, 8);
        let block_size = le_u32!(buf, 12);
        let frag_count = le_u32!(buf, 16);
        let compressor = Compressor::from_id(le_u16!(buf, 20))?;
        let block_log = le_u16!(buf, 22);
        let flags = SuperblockFlags::from_bits_truncate(le_u16!(buf, 24));
        let id_count = le_u16!(buf, 26);
        let version_major = le_u16!(buf, 28);
        let version_minor = le_u16!(buf, 30);
        let root_inode = InodeRef::from_raw(le_u64!(buf, 32));
        let bytes_used = le_u64!(buf, 40);
        let id_table = le_u64!(buf, 48);
        let xattr_table = absent_none(le_u64!(buf, 56));
        let inode_table = le_u64!(buf, 64);
        let dir_table = le_u64!(buf, 72);
        let frag_table = absent_none(le_u64!(buf, 80));
        let export_table = absent_none(le_u64!(buf, 88));

        if version_major != 4 {
            return Err(Error::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }
        if !block_size.is_power_of_two() || !(4096..=1 << 20).contains(&block_size) {
            return Err(Error::CorruptedInode("block size out of range"));
        }
        if block_size.trailing_zeros() as u16 != block_log {
            return Err(Error::CorruptedInode("block_log does not match block_size"));
        }
        if bytes_used > archive_size {
            return Err(Error::OutOfBounds);
        }
        check_ascending(id_table, xattr_table, inode_table, dir_table, frag_table, export_table)?;

        Ok(Self {
            magic,
            inode_count,
            mod_time,
            block_size,
            frag_count,
            compressor,
            block_log,
            flags,
            id_count,
            version_major,
            version_minor,
            root_inode,
            bytes_used,
            id_table,
            xattr_table,
            inode_table,
            dir_table,
            frag_table,
            export_table,
        })
    }
}

fn absent_none(v: u64) -> Option<u64> {
    if v == ABSENT {
        None
    } else {
        Some(v)
    }
}

/// Offsets that are present must be strictly ascending, in table order:
/// id, xattr, inode, directory, fragment, export.
fn check_ascending(
    id_table: u64,
    xattr_table: Option<u64>,
    inode_table: u64,
    dir_table: u64,
    frag_table: Option<u64>,
    export_table: Option<u64>,
) -> Result<()> {
    let present: Vec<u64> = [
        Some(id_table),
        xattr_table,
        Some(inode_table),
        Some(dir_table),
        frag_table,
        export_table,
    ]
    .into_iter()
    .flatten()
    .collect();
    if present.windows(2).all(|w| w[0] < w[1]) {
        Ok(())
    } else {
        Err(Error::CorruptedInode("table offsets are not strictly ascending"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_bytes() -> Vec<u8> {
        let mut b = vec![0u8; SUPERBLOCK_SIZE];
        b[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        b[4..8].copy_from_slice(&0u32.to_le_bytes()); // inode_count
        b[8..12].copy_from_slice(&0u32.to_le_bytes()); // mod_time
        b[12..16].copy_from_slice(&131072u32.to_le_bytes()); // block_size
        b[16..20].copy_from_slice(&0u32.to_le_bytes()); // frag_count
        b[20..22].copy_from_slice(&1u16.to_le_bytes()); // gzip
        b[22..24].copy_from_slice(&17u16.to_le_bytes()); // block_log = log2(131072)
        b[24..26].copy_from_slice(&0u16.to_le_bytes()); // flags
        b[26..28].copy_from_slice(&0u16.to_le_bytes()); // id_count
        b[28..30].copy_from_slice(&4u16.to_le_bytes()); // version_major
        b[30..32].copy_from_slice(&0u16.to_le_bytes()); // version_minor
        b[32..40].copy_from_slice(&0u64.to_le_bytes()); // root_inode
        b[40..48].copy_from_slice(&(SUPERBLOCK_SIZE as u64).to_le_bytes()); // bytes_used
        b[48..56].copy_from_slice(&96u64.to_le_bytes()); // id_table
        b[56..64].copy_from_slice(&ABSENT.to_le_bytes()); // xattr_table
        b[64..72].copy_from_slice(&104u64.to_le_bytes()); // inode_table
        b[72..80].copy_from_slice(&112u64.to_le_bytes()); // dir_table
        b[80..88].copy_from_slice(&ABSENT.to_le_bytes()); // frag_table
        b[88..96].copy_from_slice(&ABSENT.to_le_bytes()); // export_table
        b
    }

    #[test]
    fn parses_valid_superblock() {
        let b = valid_bytes();
        let sb = Superblock::parse(&b, SUPERBLOCK_SIZE as u64).unwrap();
        assert_eq!(sb.magic, MAGIC);
        assert_eq!(sb.block_size, 131072);
        assert!(sb.xattr_table.is_none());
        assert!(sb.frag_table.is_none());
    }

    #[test]
    fn too_small_is_rejected() {
        let err = Superblock::parse(&[0u8; 10], 10).unwrap_err();
        assert!(matches!(err, Error::SuperblockTooSmall));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let b = vec![0u8; SUPERBLOCK_SIZE];
        let err = Superblock::parse(&b, SUPERBLOCK_SIZE as u64).unwrap_err();
        assert!(matches!(err, Error::WrongMagic));
    }

    #[test]
    fn descending_offsets_are_rejected() {
        let mut b = valid_bytes();
        // Swap inode_table and dir_table so they are no longer ascending.
        b[64..72].copy_from_slice(&200u64.to_le_bytes());
        b[72..80].copy_from_slice(&112u64.to_le_bytes());
        assert!(Superblock::parse(&b, SUPERBLOCK_SIZE as u64).is_err());
    }
}
