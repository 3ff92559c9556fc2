//! `OpenDir`, `ReadDir`, `ReleaseDirHandle`.
//!
//! `OpenDir` snapshots the full child list once; `ReadDir` serializes
//! slices of that snapshot from a given offset into the bit-exact dirent
//! wire buffer — a later directory mutation is invisible to a handle
//! already open.

use crate::context::ServerContext;
use crate::icd::handle::DirEntrySnapshot;
use crate::icd::ROOT_INODE;
use jdfs_proto::{dirent::encoded_len, Dirent, JdfsErrno, WireFileType};
use std::os::unix::fs::MetadataExt;

fn parent_inode(ctx: &ServerContext, inode: u64, path: &std::path::Path) -> u64 {
    if inode == ROOT_INODE {
        return ROOT_INODE;
    }
    match path.parent() {
        Some(parent_rel) if !parent_rel.as_os_str().is_empty() => {
            let host_parent = ctx.host_path(parent_rel);
            std::fs::symlink_metadata(&host_parent).map(|m| m.ino()).unwrap_or(ROOT_INODE)
        }
        _ => ROOT_INODE,
    }
}

pub fn open_dir(ctx: &ServerContext, inode: u64) -> Result<u64, JdfsErrno> {
    let path = ctx.resolved_path(inode)?;
    let children = ctx.rebuild_children(inode, &path)?;

    let mut entries = vec![
        DirEntrySnapshot {
            name: ".".into(),
            inode,
            file_type: WireFileType::Directory,
        },
        DirEntrySnapshot {
            name: "..".into(),
            inode: parent_inode(ctx, inode, &path),
            file_type: WireFileType::Directory,
        },
    ];
    for (name, child_inode) in children {
        let (snap, _) = ctx.icd.get_inode(child_inode, false).ok_or(JdfsErrno::Io)?;
        entries.push(DirEntrySnapshot {
            name,
            inode: child_inode,
            file_type: snap.attr.file_type,
        });
    }

    ctx.icd.create_dir_handle(inode, entries).ok_or(JdfsErrno::Noent)
}

/// Packs entries from `offset` forward into a buffer no larger than
/// `buf_size`, in the FUSE dirent ABI. An empty return means end of
/// directory.
pub fn read_dir(ctx: &ServerContext, handle: u64, offset: u64, buf_size: u32) -> Result<Vec<u8>, JdfsErrno> {
    let entries = ctx.icd.get_dir_handle(handle).ok_or(JdfsErrno::Inval)?;
    let mut out = Vec::new();
    let mut idx = offset as usize;
    while idx < entries.len() {
        let entry = &entries[idx];
        let name = entry.name.to_str().map(|s| s.as_bytes().to_vec()).unwrap_or_default();
        let next_offset = (idx + 1) as u64;
        let want = encoded_len(name.len());
        if !out.is_empty() && out.len() + want > buf_size as usize {
            break;
        }
        let kind = match entry.file_type {
            WireFileType::RegularFile => 0,
            WireFileType::Directory => 1,
            WireFileType::Symlink => 2,
        };
        Dirent {
            inode: entry.inode,
            next_offset,
            kind,
            name,
        }
        .encode(&mut out);
        idx += 1;
    }
    Ok(out)
}

pub fn release_dir_handle(ctx: &ServerContext, handle: u64) -> Result<(), JdfsErrno> {
    ctx.icd.release_dir_handle(handle);
    Ok(())
}
