//! Static in-memory buffer backend: wraps an already-loaded byte slice.
//! Used by tests and by callers who have already fetched the archive into
//! memory (e.g. a container-embedded image).

use std::sync::Arc;

use super::{check_bounds, MapperBackend};
use crate::error::Result;

pub struct StaticBackend {
    data: Arc<[u8]>,
}

impl StaticBackend {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl MapperBackend for StaticBackend {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len() as u64, self.size())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_within_bounds() {
        let backend = StaticBackend::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        backend.read_at(1, &mut buf).unwrap();
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn out_of_bounds_errors() {
        let backend = StaticBackend::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 4];
        assert!(backend.read_at(0, &mut buf).is_err());
    }
}
