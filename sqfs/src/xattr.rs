//! Xattr iterator (component M): streams `(prefix, name, value)` triples
//! out of the xattr key/value metablock stream pointed to by an inode's
//! xattr index.
//!
//! Entry layout (`SquashXattrKey { type, name_size, name }` /
//! `SquashXattrValue { value_size, value }`) grounded in
//! `original_source/src/xattr.h`; the teacher (`klhowell-squinter`) stubs
//! xattrs out entirely (`AttributeValue`/`ExtendedAttribute` in
//! `metadata.rs` are `#[allow(dead_code)]` and never read), so this module
//! is built from the original C header plus spec §4.M and §3's "Xattr"
//! paragraph.

use crate::error::{Error, Result};
use crate::metablock::MetablockCursor;
use crate::tables::XattrIdEntry;

const PREFIXES: [&str; 3] = ["user.", "trusted.", "security."];
const OUT_OF_LINE_BIT: u16 = 0x0100;
const PREFIX_MASK: u16 = 0x00FF;

#[derive(Debug, Clone)]
pub struct XattrEntry {
    pub prefix: &'static str,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

/// Streams the xattr entries for one inode, given its `XattrIdEntry` (from
/// [`crate::tables::XattrIdTable`]) and the archive offset at which the
/// xattr key/value stream begins (`XattrIdTable::kv_start`).
pub struct XattrIterator {
    cursor: MetablockCursor,
    kv_start: u64,
    remaining: u32,
}

impl XattrIterator {
    pub fn new(mut cursor: MetablockCursor, kv_start: u64, entry: &XattrIdEntry) -> Result<Self> {
        cursor.seek(
            kv_start + entry.xattr_ref.outer_offset(),
            entry.xattr_ref.inner_offset() as usize,
        )?;
        Ok(Self {
            cursor,
            kv_start,
            remaining: entry.count,
        })
    }

    /// Read and return the next entry, or `None` at the end of this
    /// inode's xattr sequence.
    pub fn next(&mut self) -> Result<Option<XattrEntry>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let raw_type = self.cursor.read_u16()?;
        let name_len = self.cursor.read_u16()? as usize;
        let name = self.cursor.read_bytes(name_len)?;
        let prefix = PREFIXES
            .get((raw_type & PREFIX_MASK) as usize)
            .copied()
            .ok_or(Error::CorruptedXattr("unknown xattr prefix"))?;

        let value_len = self.cursor.read_u32()? as usize;
        let value = if raw_type & OUT_OF_LINE_BIT != 0 {
            if value_len != 8 {
                return Err(Error::CorruptedXattr("out-of-line value size must be 8"));
            }
            let raw_ref = self.cursor.read_u64()?;
            self.read_out_of_line(raw_ref)?
        } else {
            self.cursor.read_bytes(value_len)?
        };

        Ok(Some(XattrEntry { prefix, name, value }))
    }

    fn read_out_of_line(&self, raw_ref: u64) -> Result<Vec<u8>> {
        let outer = raw_ref >> 16;
        let inner = (raw_ref & 0xFFFF) as usize;
        let mut scratch = self.cursor.clone();
        scratch.seek(self.kv_start + outer, inner)?;
        let len = scratch.read_u32()? as usize;
        scratch.read_bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compressor;
    use crate::extract::ExtractManager;
    use crate::mapper::{MapManager, StaticBackend};
    use std::sync::Arc;

    fn build_stream(entries: &[(u16, &[u8], &[u8])]) -> Vec<u8> {
        let mut payload = Vec::new();
        for (ty, name, value) in entries {
            payload.extend_from_slice(&ty.to_le_bytes());
            payload.extend_from_slice(&(name.len() as u16).to_le_bytes());
            payload.extend_from_slice(name);
            payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
            payload.extend_from_slice(value);
        }
        let header = (payload.len() as u16) | 0x8000;
        let mut buf = Vec::new();
        buf.extend_from_slice(&header.to_le_bytes());
        buf.extend_from_slice(&payload);
        buf
    }

    fn cursor(data: Vec<u8>) -> MetablockCursor {
        let backend = Arc::new(StaticBackend::new(data));
        let mapper = Arc::new(MapManager::new(backend, 4096, 8));
        let extract = Arc::new(ExtractManager::new(mapper.clone(), Compressor::None, 8));
        MetablockCursor::new(extract, mapper, 0, 0)
    }

    #[test]
    fn reads_inline_entry() {
        let data = build_stream(&[(0, b"k", b"v")]);
        let entry = XattrIdEntry {
            xattr_ref: crate::inode::InodeRef::new(0, 0),
            count: 1,
            size: data.len() as u32,
        };
        let mut it = XattrIterator::new(cursor(data), 0, &entry).unwrap();
        let e = it.next().unwrap().unwrap();
        assert_eq!(e.prefix, "user.");
        assert_eq!(e.name, b"k");
        assert_eq!(e.value, b"v");
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn rejects_unknown_prefix() {
        let data = build_stream(&[(99, b"k", b"v")]);
        let entry = XattrIdEntry {
            xattr_ref: crate::inode::InodeRef::new(0, 0),
            count: 1,
            size: data.len() as u32,
        };
        let mut it = XattrIterator::new(cursor(data), 0, &entry).unwrap();
        assert!(it.next().is_err());
    }
}
