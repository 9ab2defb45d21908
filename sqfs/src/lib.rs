//! `sqfs` is a read-only, concurrent, random-access reader for the
//! SquashFS on-disk archive format. It decodes an image previously written
//! by `mksquashfs` and exposes a hierarchical filesystem view over it: path
//! lookup, directory iteration, file content reads, extended attributes,
//! tree traversal, and export/NFS handle resolution.
//!
//! # Usage Example
//! ```no_run
//! use sqfs::archive::Archive;
//! use sqfs::config::Config;
//!
//! fn print_root_listing() -> sqfs::error::Result<()> {
//!     let archive = Archive::open_file("rootfs.squashfs", &Config::default())?;
//!     let root = archive.root_inode()?;
//!     let mut dir = archive.open_dir(&root)?;
//!     while dir.next()? {
//!         println!("{}", String::from_utf8_lossy(dir.name()));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//! - **gzip** (default) — zlib/gzip decompression via `flate2`.
//! - **xz** (default) — LZMA/XZ decompression via `lzma-rs`.
//! - **zstd** (default) — Zstandard decompression via `ruzstd`.
//! - **lz4** — LZ4 block decompression via `lz4_flex`.
//! - **lzo** — reserved for an in-process LZO decoder; absent one, images
//!   compressed with `-comp lzo` are rejected with `UnsupportedCompression`
//!   rather than shelling out to an external helper.
//! - **mmap** (default) — memory-mapped file backend.
//! - **http** — HTTP range-GET backend for remote archives.
//!
//! This crate only reads archives; writing, modifying, or FUSE-mounting a
//! SquashFS image is out of scope.

pub mod archive;
pub mod compression;
pub mod config;
pub mod directory;
pub mod error;
pub mod extract;
mod filedata;
mod future;
pub mod inode;
mod lru;
pub mod mapper;
mod metablock;
pub mod path;
mod rcmap;
pub mod superblock;
pub mod tables;
mod threadpool;
pub mod tree;
pub mod xattr;

pub use archive::Archive;
pub use config::Config;
pub use error::{Error, Result};
pub use filedata::{FileContentIterator, FileReader, FragmentLocation};
pub use threadpool::ThreadPool;
