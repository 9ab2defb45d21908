//! Dump file contents (or extended attributes) out of a SquashFS image to
//! stdout, in the spirit of `unsquashfs --cat`. Grounded in
//! `squinter-cli`'s `unsquashfs.rs` (`cat_files`/`cat_and_descend_dir`) and
//! `squinter/examples/subtree.rs`'s `read_tree_sqfs`, which stream file
//! content through `std::io::copy` the same way.

use std::io::Write;

use anyhow::{bail, Context};
use clap::Parser;

use sqfs_cli::CommonArgs;

#[derive(Parser, Debug)]
#[command(about = "Print file contents or extended attributes from a SquashFS image")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// One or more paths inside the archive to print.
    paths: Vec<String>,

    /// Print extended attributes instead of file content.
    #[arg(long)]
    xattrs: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.paths.is_empty() {
        bail!("at least one path inside the archive is required");
    }
    let archive = cli.common.open()?;

    for path in &cli.paths {
        let inode = sqfs::path::open(&archive, path.as_bytes(), true)
            .with_context(|| format!("resolving {path}"))?;

        if cli.xattrs {
            print_xattrs(&archive, &inode, path)?;
            continue;
        }

        if !inode.is_file() {
            bail!("{path} is not a regular file");
        }
        let mut reader = archive.file_content(&inode)?;
        let stdout = std::io::stdout();
        let mut stdout = stdout.lock();
        while let Some(chunk) = reader.next()? {
            stdout.write_all(&chunk)?;
        }
    }
    Ok(())
}

fn print_xattrs(archive: &sqfs::Archive, inode: &sqfs::inode::Inode, path: &str) -> anyhow::Result<()> {
    let Some(mut xattrs) = archive.xattrs(inode)? else {
        return Ok(());
    };
    while let Some(entry) = xattrs.next()? {
        println!(
            "{path}: {}{}={}",
            entry.prefix,
            String::from_utf8_lossy(&entry.name),
            String::from_utf8_lossy(&entry.value)
        );
    }
    Ok(())
}
