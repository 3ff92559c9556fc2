//! Creation operations: `create`, `mkdir`, `symlink`, `link`.
//!
//! None of these allocate a local inode number — the server's `CreateFile`/
//! `Mkdir`/`CreateSymlink`/`CreateLink` calls are authoritative and return
//! the real inode the kernel should use (spec §4.4).

use super::attr::to_fuse_attr;
use super::FsWrapper;
use fuser::{ReplyCreate, ReplyEntry, Request};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

#[allow(clippy::too_many_arguments)]
pub(super) fn create(
    fs: &FsWrapper,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    mode: u32,
    _umask: u32,
    flags: i32,
    reply: ReplyCreate,
) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    match fs.run_blocking(async move { rpc.create_file(parent, &name, mode, flags).await }) {
        Ok((entry, handle)) => {
            let ttl = Duration::from_millis(entry.attr_valid_ms);
            reply.created(&ttl, &to_fuse_attr(entry.attr), entry.generation, handle, flags as u32);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn mkdir(fs: &FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    match fs.run_blocking(async move { rpc.mkdir(parent, &name, mode).await }) {
        Ok(entry) => {
            let ttl = Duration::from_millis(entry.entry_valid_ms);
            reply.entry(&ttl, &to_fuse_attr(entry.attr), entry.generation);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn symlink(fs: &FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, link: &Path, reply: ReplyEntry) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    let target = link.as_os_str().to_os_string();
    match fs.run_blocking(async move { rpc.create_symlink(parent, &name, &target).await }) {
        Ok(entry) => {
            let ttl = Duration::from_millis(entry.entry_valid_ms);
            reply.entry(&ttl, &to_fuse_attr(entry.attr), entry.generation);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn link(fs: &FsWrapper, _req: &Request<'_>, ino: u64, newparent: u64, newname: &OsStr, reply: ReplyEntry) {
    let rpc = fs.fs.rpc.clone();
    let newname = newname.to_os_string();
    match fs.run_blocking(async move { rpc.create_link(ino, newparent, &newname).await }) {
        Ok(entry) => {
            let ttl = Duration::from_millis(entry.entry_valid_ms);
            reply.entry(&ttl, &to_fuse_attr(entry.attr), entry.generation);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}
