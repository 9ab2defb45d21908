//! Path walker (component N): resolves a `/`-separated path to an inode,
//! following symlinks with a depth bound.
//!
//! Grounded in spec §4.N; `klhowell-squinter`'s `SquashFs::path_to_inode`
//! (`squashfs/mod.rs`) walks the same way (split path, look up each
//! segment through the directory reader, follow symlinks with a hop
//! counter) and is the structural model here, generalized to distinguish
//! "follow the final component" from "always resolve intermediate
//! symlinks" per spec.

use std::collections::VecDeque;

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::inode::Inode;

fn split_segments(path: &[u8]) -> VecDeque<Vec<u8>> {
    path.split(|&b| b == b'/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_vec())
        .collect()
}

/// Resolve `path` against `archive`, starting at the root inode.
///
/// Intermediate path components are always resolved through any symlink
/// they name (a directory lookup cannot continue through a symlink
/// otherwise); the final component is followed only when `follow` is true,
/// matching the `open(2)`-style distinction between `stat` and `lstat`.
pub fn open(archive: &Archive, path: &[u8], follow: bool) -> Result<Inode> {
    let mut working_dir = archive.root_inode()?;
    let mut result = working_dir.clone();
    let mut remaining = split_segments(path);
    let mut depth = 0u32;

    while let Some(segment) = remaining.pop_front() {
        if !working_dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        let mut dir = archive.open_dir(&working_dir)?;
        if !dir.find_with_index(&segment)? {
            return Err(Error::NotFound);
        }
        let resolved = archive.inode_at(dir.inode_ref())?;
        let is_final = remaining.is_empty();

        if resolved.is_symlink() && (!is_final || follow) {
            depth += 1;
            if depth > archive.max_symlink_depth() {
                return Err(Error::SymlinkLoop(archive.max_symlink_depth()));
            }
            let target = resolved.as_symlink()?.target.clone();
            if target.first() == Some(&b'/') {
                working_dir = archive.root_inode()?;
            }
            let mut components = split_segments(&target);
            while let Some(c) = components.pop_back() {
                remaining.push_front(c);
            }
            result = working_dir.clone();
        } else {
            result = resolved.clone();
            working_dir = resolved;
        }
    }

    Ok(result)
}
