//! Extended-attribute passthrough: `getxattr`/`setxattr`/`listxattr`/
//! `removexattr`, forwarded to the server's own host-filesystem xattr
//! calls (spec §4.4) rather than stubbed out.

use super::FsWrapper;
use crate::rpc::XattrReply;
use fuser::{ReplyEmpty, ReplyXattr, Request};
use std::ffi::OsStr;

pub(super) fn getxattr(fs: &FsWrapper, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    match fs.run_blocking(async move { rpc.get_xattr(ino, &name, size).await }) {
        Ok(XattrReply::Size(n)) => reply.size(n),
        Ok(XattrReply::Data(data)) => reply.data(&data),
        Err(err) => reply.error(err.to_errno()),
    }
}

#[allow(clippy::too_many_arguments)]
pub(super) fn setxattr(
    fs: &FsWrapper,
    _req: &Request,
    ino: u64,
    name: &OsStr,
    value: &[u8],
    flags: i32,
    _position: u32,
    reply: ReplyEmpty,
) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    let value = value.to_vec();
    match fs.run_blocking(async move { rpc.set_xattr(ino, &name, &value, flags).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn listxattr(fs: &FsWrapper, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.list_xattr(ino, size).await }) {
        Ok(XattrReply::Size(n)) => reply.size(n),
        Ok(XattrReply::Data(data)) => reply.data(&data),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn removexattr(fs: &FsWrapper, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    match fs.run_blocking(async move { rpc.remove_xattr(ino, &name).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}
