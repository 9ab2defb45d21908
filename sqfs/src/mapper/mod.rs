//! Backend-agnostic windows onto the raw archive bytes (component D), and the
//! block-sliced cache of those windows (component E).

mod file;
mod manager;
mod static_buf;

#[cfg(feature = "mmap")]
mod mmap;
#[cfg(feature = "http")]
mod http;

pub use file::FileBackend;
pub use manager::MapManager;
pub use static_buf::StaticBackend;

#[cfg(feature = "mmap")]
pub use mmap::MmapBackend;
#[cfg(feature = "http")]
pub use http::HttpBackend;

use crate::error::{Error, Result};

/// Capability set that every mapper backend implements: open a byte source,
/// report its size, and read an arbitrary window of it.
///
/// Implementations must guarantee that concurrent reads of disjoint windows
/// do not block each other (spec §4.D) — e.g. by using positional reads
/// (`pread`) rather than a shared seek cursor.
pub trait MapperBackend: Send + Sync {
    /// Total size of the underlying byte source, in bytes.
    fn size(&self) -> u64;

    /// Read exactly `buf.len()` bytes starting at `offset` into `buf`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// A contiguous, read-only view of archive bytes, either a zero-copy slice
/// backed by a cached window or an owned buffer spanning multiple windows.
pub enum Window {
    Shared(std::sync::Arc<[u8]>),
    Owned(Vec<u8>),
}

impl Window {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Window::Shared(a) => a,
            Window::Owned(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate that `[offset, offset+len)` lies within `size`, returning
/// [`Error::OutOfBounds`] otherwise. Shared by every backend's `read_at`.
pub(crate) fn check_bounds(offset: u64, len: u64, size: u64) -> Result<()> {
    let end = offset.checked_add(len).ok_or(Error::OutOfBounds)?;
    if end > size {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}

/// Wraps another backend to expose the region starting at `archive_offset`
/// as if it were the whole source, with an optional `size` override for
/// backends that cannot report their own length (e.g. a memory buffer
/// fetched without a trailing length, or an HTTP source with no `HEAD`
/// support). Lets `archive_offset` (spec §6 configuration table) apply
/// uniformly regardless of which backend the caller picked.
pub struct OffsetBackend {
    inner: std::sync::Arc<dyn MapperBackend>,
    archive_offset: u64,
    size: u64,
}

impl OffsetBackend {
    pub fn new(inner: std::sync::Arc<dyn MapperBackend>, archive_offset: u64, size: Option<u64>) -> Result<Self> {
        let inner_size = inner.size();
        if archive_offset > inner_size {
            return Err(Error::OutOfBounds);
        }
        let default_size = inner_size - archive_offset;
        let size = match size {
            Some(s) if s <= default_size => s,
            Some(_) => return Err(Error::OutOfBounds),
            None => default_size,
        };
        Ok(Self {
            inner,
            archive_offset,
            size,
        })
    }
}

impl MapperBackend for OffsetBackend {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len() as u64, self.size)?;
        self.inner.read_at(self.archive_offset + offset, buf)
    }
}

#[cfg(test)]
mod offset_tests {
    use super::*;
    use static_buf::StaticBackend;
    use std::sync::Arc;

    #[test]
    fn reads_are_relative_to_offset() {
        let inner = Arc::new(StaticBackend::new((0u8..32).collect::<Vec<_>>()));
        let offset = OffsetBackend::new(inner, 10, None).unwrap();
        assert_eq!(offset.size(), 22);
        let mut buf = [0u8; 4];
        offset.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [10, 11, 12, 13]);
    }

    #[test]
    fn size_override_is_honored() {
        let inner = Arc::new(StaticBackend::new((0u8..32).collect::<Vec<_>>()));
        let offset = OffsetBackend::new(inner, 4, Some(8)).unwrap();
        assert_eq!(offset.size(), 8);
        let mut buf = [0u8; 8];
        offset.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6, 7, 8, 9, 10, 11]);
    }
}
