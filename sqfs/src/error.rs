//! Error kinds surfaced by every layer of the archive reader.

use std::fmt;

/// Top-level error type for all fallible operations in this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("archive is too small to contain a superblock")]
    SuperblockTooSmall,
    #[error("wrong magic number in superblock")]
    WrongMagic,
    #[error("unsupported SquashFS version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("unsupported compression id {0}")]
    UnsupportedCompression(u16),
    #[error("corrupted metablock at offset {0}")]
    CorruptedMetablock(u64),
    #[error("corrupted data block at offset {0}")]
    CorruptedDatablock(u64),
    #[error("corrupted inode: {0}")]
    CorruptedInode(&'static str),
    #[error("corrupted directory table: {0}")]
    CorruptedDirectory(&'static str),
    #[error("corrupted xattr table: {0}")]
    CorruptedXattr(&'static str),
    #[error("inode is not of the requested type")]
    WrongInodeType,
    #[error("not found")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("not a symlink")]
    NotASymlink,
    #[error("symlink loop (exceeded depth {0})")]
    SymlinkLoop(u32),
    #[error("access out of bounds of the archive")]
    OutOfBounds,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("out of memory")]
    NoMemory,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lightweight tag used by the extract/map caches to remember *why* a slot failed,
/// without retaining the (possibly large) original error.
#[derive(Clone)]
pub struct CachedError(std::sync::Arc<Error>);

impl CachedError {
    pub fn new(e: Error) -> Self {
        Self(std::sync::Arc::new(e))
    }
}

impl fmt::Debug for CachedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for CachedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for CachedError {}

impl From<CachedError> for Error {
    fn from(e: CachedError) -> Self {
        match std::sync::Arc::try_unwrap(e.0) {
            Ok(inner) => inner,
            Err(shared) => Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                shared.to_string(),
            )),
        }
    }
}
