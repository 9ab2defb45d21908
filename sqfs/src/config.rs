//! Archive-open configuration (spec §6's configuration table): a plain
//! builder-ish struct for library callers. The CLI (`sqfs-cli`) defines its
//! own `clap::Args` struct with matching fields and converts into this one,
//! the same split `klhowell-squinter`/`squinter-cli` draw between the
//! dependency-light library and the `clap`-using binary crate.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte offset where the archive begins inside the source, for images
    /// embedded in another file.
    pub archive_offset: u64,

    /// Override for sources without an intrinsic length (memory without a
    /// known trailing size, HTTP without a `HEAD`-reported length). `None`
    /// means "trust the backend".
    pub source_size: Option<u64>,

    /// Mapper slice size; `0` means "use the archive's block size".
    pub mapper_block_size: u64,

    /// Mapper cache capacity (blocks); `0` means "use the built-in default".
    pub mapper_lru_size: usize,

    /// Decompression cache capacity (blocks); `0` means "use the built-in
    /// default".
    pub compression_lru_size: usize,

    /// Symlink loop bound for the path walker; `0` means "use the built-in
    /// default".
    pub max_symlink_depth: u32,

    /// Worker threads for speculative prefetch; `None` disables the pool
    /// and runs all work on the calling thread.
    pub threads: Option<usize>,
}

pub(crate) const DEFAULT_MAPPER_LRU_SIZE: usize = 32;
pub(crate) const DEFAULT_COMPRESSION_LRU_SIZE: usize = 128;
pub(crate) const DEFAULT_MAX_SYMLINK_DEPTH: u32 = 100;

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_offset: 0,
            source_size: None,
            mapper_block_size: 0,
            mapper_lru_size: 0,
            compression_lru_size: 0,
            max_symlink_depth: 0,
            threads: None,
        }
    }
}

impl Config {
    pub(crate) fn mapper_lru_size(&self) -> usize {
        if self.mapper_lru_size == 0 {
            DEFAULT_MAPPER_LRU_SIZE
        } else {
            self.mapper_lru_size
        }
    }

    pub(crate) fn compression_lru_size(&self) -> usize {
        if self.compression_lru_size == 0 {
            DEFAULT_COMPRESSION_LRU_SIZE
        } else {
            self.compression_lru_size
        }
    }

    pub(crate) fn max_symlink_depth(&self) -> u32 {
        if self.max_symlink_depth == 0 {
            DEFAULT_MAX_SYMLINK_DEPTH
        } else {
            self.max_symlink_depth
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fields_fall_back_to_defaults() {
        let c = Config::default();
        assert_eq!(c.mapper_lru_size(), DEFAULT_MAPPER_LRU_SIZE);
        assert_eq!(c.compression_lru_size(), DEFAULT_COMPRESSION_LRU_SIZE);
        assert_eq!(c.max_symlink_depth(), DEFAULT_MAX_SYMLINK_DEPTH);
    }

    #[test]
    fn nonzero_fields_are_honored() {
        let c = Config {
            mapper_lru_size: 7,
            compression_lru_size: 9,
            max_symlink_depth: 3,
            ..Config::default()
        };
        assert_eq!(c.mapper_lru_size(), 7);
        assert_eq!(c.compression_lru_size(), 9);
        assert_eq!(c.max_symlink_depth(), 3);
    }
}
