//! `MkDir`, `CreateFile`, `CreateSymlink`, `CreateLink`: stat the parent,
//! perform the host operation, `lstat` the new child, load it
//! into the registry at refcount 1, invalidate the parent's children map.

use crate::context::metadata_to_attr;
use crate::context::ServerContext;
use crate::icd::{join_relative, LoadedMeta};
use jdfs_proto::{ChildInodeEntry, JdfsErrno};
use std::ffi::OsStr;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::Instant;

fn load_new_child(ctx: &ServerContext, parent: u64, child_path: &Path) -> Result<ChildInodeEntry, JdfsErrno> {
    let host = ctx.host_path(child_path);
    let meta = std::fs::symlink_metadata(&host).map_err(JdfsErrno::from)?;
    let attr = metadata_to_attr(meta.ino(), &meta);
    ctx.icd.load_inode(
        1,
        LoadedMeta {
            inode: meta.ino(),
            dev: meta.dev(),
            attr,
            path: child_path.to_path_buf(),
        },
        &[],
        None,
        Instant::now(),
    );
    ctx.icd.invalidate_children(parent);
    Ok(ChildInodeEntry {
        inode: meta.ino(),
        generation: 0,
        attr,
        attr_valid_ms: ctx.meta_attrs_cache_ttl.as_millis() as u64,
        entry_valid_ms: ctx.dir_children_cache_ttl.as_millis() as u64,
    })
}

pub fn mkdir(ctx: &ServerContext, parent: u64, name: &OsStr, mode: u32) -> Result<ChildInodeEntry, JdfsErrno> {
    let parent_path = ctx.resolved_path(parent)?;
    let child_path = join_relative(&parent_path, name);
    let host = ctx.host_path(&child_path);
    std::fs::create_dir(&host).map_err(JdfsErrno::from)?;
    std::fs::set_permissions(&host, std::os::unix::fs::PermissionsExt::from_mode(mode)).map_err(JdfsErrno::from)?;
    load_new_child(ctx, parent, &child_path)
}

/// `CreateFile(parent, name, mode, flags)`: creates and opens in one step,
/// returning the entry plus a freshly registered file handle id.
pub fn create_file(ctx: &ServerContext, parent: u64, name: &OsStr, mode: u32, flags: i32) -> Result<(ChildInodeEntry, u64), JdfsErrno> {
    let parent_path = ctx.resolved_path(parent)?;
    let child_path = join_relative(&parent_path, name);
    let host = ctx.host_path(&child_path);

    let mut options = std::fs::OpenOptions::new();
    options.read(true).write(true).create(true).truncate(flags & libc::O_TRUNC != 0);
    if flags & libc::O_EXCL != 0 {
        options.create_new(true);
    }
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, mode);
    let file = options.open(&host).map_err(JdfsErrno::from)?;

    let entry = load_new_child(ctx, parent, &child_path)?;
    let handle = ctx.icd.create_file_handle(entry.inode, file, true).ok_or(JdfsErrno::Noent)?;
    Ok((entry, handle))
}

pub fn create_symlink(ctx: &ServerContext, parent: u64, name: &OsStr, target: &OsStr) -> Result<ChildInodeEntry, JdfsErrno> {
    let parent_path = ctx.resolved_path(parent)?;
    let child_path = join_relative(&parent_path, name);
    let host = ctx.host_path(&child_path);
    std::os::unix::fs::symlink(target, &host).map_err(JdfsErrno::from)?;
    load_new_child(ctx, parent, &child_path)
}

/// `CreateLink(inode, newParent, newName)`: hard-links an existing inode
/// under a new name. The source's own `reachedThrough` list gains the new
/// path once the registry reloads it.
pub fn create_link(ctx: &ServerContext, inode: u64, new_parent: u64, new_name: &OsStr) -> Result<ChildInodeEntry, JdfsErrno> {
    let source_path = ctx.resolved_path(inode)?;
    let parent_path = ctx.resolved_path(new_parent)?;
    let new_path = join_relative(&parent_path, new_name);
    std::fs::hard_link(ctx.host_path(&source_path), ctx.host_path(&new_path)).map_err(JdfsErrno::from)?;
    load_new_child(ctx, new_parent, &new_path)
}
