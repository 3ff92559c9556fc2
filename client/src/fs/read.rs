//! Read-side operations: `lookup`, `opendir`/`readdir`/`releasedir`,
//! `open`/`read`, `readlink`, `statfs`.

use super::attr::to_fuse_attr;
use super::FsWrapper;
use fuser::{FileType, ReplyAttr as _, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen, ReplyStatfs, Request};
use jdfs_proto::WireFileType;
use std::ffi::OsStr;
use std::time::Duration;

fn fuse_kind(kind: u32) -> FileType {
    match kind {
        1 => FileType::Directory,
        2 => FileType::Symlink,
        _ => FileType::RegularFile,
    }
}

pub(super) fn lookup(fs: &FsWrapper, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    match fs.run_blocking(async move { rpc.lookup_inode(parent, &name).await }) {
        Ok(entry) => {
            let ttl = Duration::from_millis(entry.entry_valid_ms);
            reply.entry(&ttl, &to_fuse_attr(entry.attr), entry.generation);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn opendir(fs: &FsWrapper, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.open_dir(ino).await }) {
        Ok(handle) => reply.opened(handle, 0),
        Err(err) => reply.error(err.to_errno()),
    }
}

/// Pulls entries starting at `offset` and replays them into the reply
/// buffer, stopping at the first one that doesn't fit — the kernel calls
/// back with that entry's offset to resume, matching `ICDirHandle`'s own
/// snapshot-indexed semantics (spec §4.6).
pub(super) fn readdir(fs: &FsWrapper, _req: &Request, ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectory) {
    let rpc = fs.fs.rpc.clone();
    let _ = ino;
    match fs.run_blocking(async move { rpc.read_dir(fh, offset as u64, 64 * 1024).await }) {
        Ok(entries) => {
            for entry in entries {
                let name = std::ffi::OsStr::from_bytes(&entry.name);
                if reply.add(entry.inode, entry.next_offset as i64, fuse_kind(entry.kind), name) {
                    break;
                }
            }
            reply.ok();
        }
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn releasedir(fs: &FsWrapper, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: fuser::ReplyEmpty) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.release_dir_handle(fh).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn open(fs: &FsWrapper, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.open_file(ino, flags).await }) {
        Ok(handle) => reply.opened(handle, 0),
        Err(err) => reply.error(err.to_errno()),
    }
}

#[allow(clippy::too_many_arguments)]
pub(super) fn read(fs: &FsWrapper, _req: &Request<'_>, _ino: u64, fh: u64, offset: i64, size: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyData) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.read_file(fh, offset as u64, size).await }) {
        Ok(data) => reply.data(&data),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn readlink(fs: &FsWrapper, _req: &Request, ino: u64, reply: ReplyData) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.read_symlink(ino).await }) {
        Ok(target) => reply.data(&target),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn statfs(fs: &FsWrapper, _req: &Request, _ino: u64, reply: ReplyStatfs) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.statfs().await }) {
        Ok(info) => reply.statfs(info.blocks, info.bfree, info.bavail, info.files, info.ffree, info.bsize, info.namelen, info.frsize),
        Err(err) => reply.error(err.to_errno()),
    }
}

#[allow(unused_imports)]
use std::os::unix::ffi::OsStrExt;
