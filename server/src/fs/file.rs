//! `OpenFile`, `ReadFile`, `WriteFile`, `SyncFile`, `FlushFile`,
//! `ReleaseFileHandle`.
//!
//! `ReadFile`/`WriteFile` bump the handle's op counter before the
//! transport that carried the call is released (the increment happens
//! inside the icd lock, well before the caller's reply is even built),
//! which is what makes a concurrent `release` safe to simply wait on the
//! counter.

use crate::context::ServerContext;
use jdfs_proto::JdfsErrno;
use std::os::unix::fs::FileExt;

pub fn open_file(ctx: &ServerContext, inode: u64, flags: i32) -> Result<u64, JdfsErrno> {
    let path = ctx.resolved_path(inode)?;
    let host = ctx.host_path(&path);
    let writable = flags & (libc::O_WRONLY | libc::O_RDWR) != 0;

    let mut options = std::fs::OpenOptions::new();
    options.read(flags & libc::O_WRONLY == 0).write(writable);
    if flags & libc::O_APPEND != 0 {
        options.append(true);
    }
    let file = options.open(&host).map_err(JdfsErrno::from)?;
    ctx.icd.create_file_handle(inode, file, writable).ok_or(JdfsErrno::Noent)
}

/// `pread`s `size` bytes at `offset`. End-of-file returns success with
/// however many bytes were actually read, possibly zero — never an error.
pub fn read_file(ctx: &ServerContext, handle: u64, offset: u64, size: u32) -> Result<Vec<u8>, JdfsErrno> {
    let snapshot = ctx.icd.get_file_handle(handle, true).ok_or(JdfsErrno::Inval)?;
    let result = (|| -> std::io::Result<Vec<u8>> {
        let mut buf = ctx.buffers.acquire(size as usize);
        let n = snapshot.file.read_at(&mut buf, offset)?;
        buf.truncate(n);
        Ok(buf.to_vec())
    })();
    ctx.icd.release_op(&snapshot);
    result.map_err(JdfsErrno::from)
}

pub fn write_file(ctx: &ServerContext, handle: u64, offset: u64, data: &[u8]) -> Result<u32, JdfsErrno> {
    let snapshot = ctx.icd.get_file_handle(handle, true).ok_or(JdfsErrno::Inval)?;
    if !snapshot.writable {
        ctx.icd.release_op(&snapshot);
        return Err(JdfsErrno::Inval);
    }
    let result = snapshot.file.write_at(data, offset);
    ctx.icd.release_op(&snapshot);
    result.map(|n| n as u32).map_err(JdfsErrno::from)
}

pub fn sync_file(ctx: &ServerContext, handle: u64) -> Result<(), JdfsErrno> {
    let snapshot = ctx.icd.get_file_handle(handle, true).ok_or(JdfsErrno::Inval)?;
    let result = snapshot.file.sync_all();
    ctx.icd.release_op(&snapshot);
    result.map_err(JdfsErrno::from)
}

/// `flush` has no distinct host syscall for a plain file (unlike network
/// filesystems that buffer client-side); honored as a no-op success, the
/// same stance the kernel's own local filesystems take.
pub fn flush_file(_ctx: &ServerContext, _handle: u64) -> Result<(), JdfsErrno> {
    Ok(())
}

pub async fn release_file_handle(ctx: &ServerContext, handle: u64) -> Result<(), JdfsErrno> {
    ctx.icd.release_file_handle(handle).await;
    Ok(())
}
