//! Shared argument parsing and archive-opening glue for the `sqfscat` and
//! `sqfsls` binaries: a thin `clap` layer over [`sqfs::Config`], the same
//! split `klhowell-squinter`/`squinter-cli` draw between the
//! dependency-light library and its CLI crate's `clap::Parser` structs.

use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use sqfs::{Archive, Config};

/// Archive location plus the subset of [`sqfs::Config`] worth exposing on
/// the command line, flattened into every subcommand.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the SquashFS image.
    pub archive: PathBuf,

    /// Byte offset where the archive begins inside `archive` (for images
    /// embedded in another file).
    #[arg(long, default_value_t = 0)]
    pub archive_offset: u64,

    /// Mapper slice size in bytes; 0 uses the archive's own block size.
    #[arg(long, default_value_t = 0)]
    pub mapper_block_size: u64,

    /// Mapper cache capacity in blocks; 0 uses the built-in default.
    #[arg(long, default_value_t = 0)]
    pub mapper_lru_size: usize,

    /// Decompression cache capacity in blocks; 0 uses the built-in default.
    #[arg(long, default_value_t = 0)]
    pub compression_lru_size: usize,

    /// Symlink loop bound; 0 uses the built-in default (100).
    #[arg(long, default_value_t = 0)]
    pub max_symlink_depth: u32,

    /// Worker threads for speculative block prefetch; omit to run
    /// everything on the calling thread.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Enable debug-level logging.
    #[arg(long)]
    pub debug: bool,
}

impl CommonArgs {
    pub fn config(&self) -> Config {
        Config {
            archive_offset: self.archive_offset,
            source_size: None,
            mapper_block_size: self.mapper_block_size,
            mapper_lru_size: self.mapper_lru_size,
            compression_lru_size: self.compression_lru_size,
            max_symlink_depth: self.max_symlink_depth,
            threads: self.threads,
        }
    }

    pub fn open(&self) -> anyhow::Result<Archive> {
        setup_logger(self.debug)?;
        Ok(Archive::open_file(&self.archive, &self.config())?)
    }
}

pub fn setup_logger(debug: bool) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(Some(tracing_subscriber::fmt::layer().with_filter(if debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::WARN
        })))
        .init();
    Ok(())
}
