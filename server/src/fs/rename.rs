//! `Rename(oldParent, oldName, newParent, newName)`: stat both parents
//! (same inode means a single invalidation, otherwise two), rename,
//! invalidate both children maps.

use crate::context::ServerContext;
use crate::icd::join_relative;
use jdfs_proto::JdfsErrno;
use std::ffi::OsStr;

pub fn rename(ctx: &ServerContext, old_parent: u64, old_name: &OsStr, new_parent: u64, new_name: &OsStr) -> Result<(), JdfsErrno> {
    let old_parent_path = ctx.resolved_path(old_parent)?;
    let new_parent_path = if new_parent == old_parent {
        old_parent_path.clone()
    } else {
        ctx.resolved_path(new_parent)?
    };

    let from = ctx.host_path(&join_relative(&old_parent_path, old_name));
    let to = ctx.host_path(&join_relative(&new_parent_path, new_name));
    std::fs::rename(&from, &to).map_err(JdfsErrno::from)?;

    ctx.icd.invalidate_children(old_parent);
    if new_parent != old_parent {
        ctx.icd.invalidate_children(new_parent);
    }
    Ok(())
}
