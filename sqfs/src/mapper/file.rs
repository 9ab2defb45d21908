//! pread-based file backend: positional reads so disjoint windows never
//! serialize behind a shared seek cursor, unlike a plain `BufReader<File>`.

use std::fs::File;
use std::path::Path;

use super::{check_bounds, MapperBackend};
use crate::error::Result;

pub struct FileBackend {
    file: File,
    size: u64,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[cfg(unix)]
fn positioned_read(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(not(unix))]
fn positioned_read(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    // Portable fallback: serializes reads through a process-wide file handle
    // lock. Non-unix targets trade away the "disjoint reads never block each
    // other" guarantee in exchange for working at all without platform
    //-specific positional I/O.
    use std::io::{Read, Seek, SeekFrom};
    use std::sync::Mutex;
    static FALLBACK_LOCK: Mutex<()> = Mutex::new(());
    let _guard = FALLBACK_LOCK.lock().unwrap();
    let mut file = file.try_clone()?;
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

impl MapperBackend for FileBackend {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len() as u64, self.size)?;
        positioned_read(&self.file, offset, buf)?;
        Ok(())
    }
}
