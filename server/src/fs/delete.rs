//! `RmDir`, `Unlink`: stat the parent, issue the host removal,
//! invalidate the parent's children map. Open handles to an unlinked
//! regular file survive — the handle's own file descriptor keeps the
//! inode alive at the host filesystem, exactly as POSIX unlink does.

use crate::context::ServerContext;
use crate::icd::join_relative;
use jdfs_proto::JdfsErrno;
use std::ffi::OsStr;

pub fn rmdir(ctx: &ServerContext, parent: u64, name: &OsStr) -> Result<(), JdfsErrno> {
    let parent_path = ctx.resolved_path(parent)?;
    let host = ctx.host_path(&join_relative(&parent_path, name));
    std::fs::remove_dir(&host).map_err(JdfsErrno::from)?;
    ctx.icd.invalidate_children(parent);
    Ok(())
}

pub fn unlink(ctx: &ServerContext, parent: u64, name: &OsStr) -> Result<(), JdfsErrno> {
    let parent_path = ctx.resolved_path(parent)?;
    let host = ctx.host_path(&join_relative(&parent_path, name));
    std::fs::remove_file(&host).map_err(JdfsErrno::from)?;
    ctx.icd.invalidate_children(parent);
    Ok(())
}
