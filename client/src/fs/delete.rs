//! Removal operations: `rmdir`, `unlink`.
//!
//! Both are single RPC calls — no client-side recursion or emptiness
//! pre-check. The server's real `remove_dir`/`remove_file` syscalls
//! already produce `ENOTEMPTY`/`ENOENT` naturally (spec §4.4).

use super::FsWrapper;
use fuser::{ReplyEmpty, Request};
use std::ffi::OsStr;

pub(super) fn rmdir(fs: &FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    match fs.run_blocking(async move { rpc.rmdir(parent, &name).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn unlink(fs: &FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    match fs.run_blocking(async move { rpc.unlink(parent, &name).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}
