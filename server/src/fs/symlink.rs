//! `ReadSymlink`: `readlink` through the resolved path.

use crate::context::ServerContext;
use jdfs_proto::JdfsErrno;
use std::os::unix::ffi::OsStrExt;

pub fn read_symlink(ctx: &ServerContext, inode: u64) -> Result<Vec<u8>, JdfsErrno> {
    let path = ctx.resolved_path(inode)?;
    let host = ctx.host_path(&path);
    let target = std::fs::read_link(&host).map_err(JdfsErrno::from)?;
    Ok(target.as_os_str().as_bytes().to_vec())
}
