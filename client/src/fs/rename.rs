//! `rename`: a single atomic RPC call — the server does the actual
//! `std::fs::rename`, so there is no client-side copy-then-delete here
//! (spec §4.4).

use super::FsWrapper;
use fuser::{ReplyEmpty, Request};
use std::ffi::OsStr;

#[allow(clippy::too_many_arguments)]
pub(super) fn rename(
    fs: &FsWrapper,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    newparent: u64,
    newname: &OsStr,
    _flags: u32,
    reply: ReplyEmpty,
) {
    let rpc = fs.fs.rpc.clone();
    let name = name.to_os_string();
    let newname = newname.to_os_string();
    match fs.run_blocking(async move { rpc.rename(parent, &name, newparent, &newname).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}
