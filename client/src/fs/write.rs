//! Write-side operations: `write`/`flush`/`fsync`/`release`.
//!
//! Every call here is a direct positional `pwrite`/`fsync`/`close` against
//! the handle the server handed back from `open`/`create` — there is no
//! client-side write buffering to reassemble on release (spec §4.4: the
//! server is the only place file content lives).

use super::FsWrapper;
use fuser::{ReplyEmpty, ReplyWrite, Request};

#[allow(clippy::too_many_arguments)]
pub(super) fn write(
    fs: &FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    offset: i64,
    data: &[u8],
    _write_flags: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyWrite,
) {
    let rpc = fs.fs.rpc.clone();
    let data = data.to_vec();
    match fs.run_blocking(async move { rpc.write_file(fh, offset as u64, &data).await }) {
        Ok(written) => reply.written(written),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn flush(fs: &FsWrapper, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.flush_file(fh).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub(super) fn fsync(fs: &FsWrapper, _req: &Request<'_>, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.sync_file(fh).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}

/// `release` waits for `RELEASE_FILE_HANDLE` to complete before replying,
/// which on the server side means waiting out every read already in
/// flight against this handle (spec §5) — the kernel will not reuse `fh`
/// until this call returns.
pub(super) fn release(
    fs: &FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    _flags: i32,
    _lock_owner: Option<u64>,
    _flush: bool,
    reply: ReplyEmpty,
) {
    let rpc = fs.fs.rpc.clone();
    match fs.run_blocking(async move { rpc.release_file_handle(fh).await }) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}
