//! List directory contents of a SquashFS image, in the spirit of
//! `unsquashfs -l`/`ls`. Grounded in `squinter-cli`'s `unsquashfs.rs`
//! (`list_filesystem`/`print_and_descend_dir`), generalized to use the
//! library's own pre-order [`sqfs::tree::TreeWalker`] instead of
//! hand-rolled recursion when `--recursive` is given.

use clap::Parser;

use sqfs::inode::Inode;
use sqfs::tree::{Event, TreeWalker};
use sqfs::Archive;
use sqfs_cli::CommonArgs;

#[derive(Parser, Debug)]
#[command(about = "List directory entries in a SquashFS image")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Directory to list; defaults to the root.
    #[arg(default_value = "/")]
    path: String,

    /// Recurse into subdirectories (pre-order).
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Show permissions, uid/gid and size alongside each name.
    #[arg(short, long)]
    long: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let archive = cli.common.open()?;

    let inode = sqfs::path::open(&archive, cli.path.as_bytes(), true)?;
    if !inode.is_dir() {
        print_entry(&archive, &cli.path, &inode, cli.long)?;
        return Ok(());
    }

    if cli.recursive {
        list_recursive(&archive, &inode, &cli.path, cli.long)
    } else {
        list_one_level(&archive, &inode, cli.long)
    }
}

fn list_one_level(archive: &Archive, dir_inode: &Inode, long: bool) -> anyhow::Result<()> {
    let mut dir = archive.open_dir(dir_inode)?;
    while dir.next()? {
        let name = String::from_utf8_lossy(dir.name()).into_owned();
        let inode = archive.inode_at(dir.inode_ref())?;
        print_entry(archive, &name, &inode, long)?;
    }
    Ok(())
}

fn list_recursive(archive: &Archive, root: &Inode, root_path: &str, long: bool) -> anyhow::Result<()> {
    let mut walker = TreeWalker::new(archive, root)?.with_cycle_detection();
    while let Some(event) = walker.next()? {
        match event {
            Event::DirectoryBegin(inode) | Event::File(inode) => {
                let joined = joined_path(root_path, walker.path());
                print_entry(archive, &joined, &inode, long)?;
            }
            Event::DirectoryEnd => {}
        }
    }
    Ok(())
}

fn joined_path(root: &str, segments: &[Vec<u8>]) -> String {
    let mut out = root.trim_end_matches('/').to_string();
    for segment in segments {
        out.push('/');
        out.push_str(&String::from_utf8_lossy(segment));
    }
    out
}

fn print_entry(archive: &Archive, name: &str, inode: &Inode, long: bool) -> anyhow::Result<()> {
    if !long {
        println!("{name}");
        return Ok(());
    }

    let size = match inode.as_file() {
        Ok(f) => f.file_size,
        Err(_) => 0,
    };
    let uid = archive.resolve_id(inode.uid_index)?;
    let gid = archive.resolve_id(inode.gid_index)?;
    println!(
        "{:>6o} {:>6}/{:<6} {:>10} {}",
        inode.mode() & 0o7777,
        uid,
        gid,
        size,
        name
    );
    Ok(())
}
