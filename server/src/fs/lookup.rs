//! `LookUpInode`, `GetInodeAttributes`, `SetInodeAttributes`,
//! `ForgetInode`.

use crate::context::{metadata_to_attr, ServerContext};
use crate::icd::{LoadedMeta, ROOT_INODE};
use jdfs_proto::{ChildInodeEntry, InodeAttributes, JdfsErrno};
use std::ffi::OsStr;
use std::os::unix::fs::MetadataExt;
use std::time::Instant;

pub fn lookup_inode(ctx: &ServerContext, parent: u64, name: &OsStr) -> Result<ChildInodeEntry, JdfsErrno> {
    ctx.lookup(parent, name)
}

pub fn get_inode_attributes(ctx: &ServerContext, inode: u64) -> Result<InodeAttributes, JdfsErrno> {
    ctx.refresh_attrs(inode)
}

/// Which of `{size, mode, atime, mtime}` a `SetInodeAttributes` call
/// carries — mirrors the kernel's setattr valid-bits mask.
#[derive(Default)]
pub struct SetAttrRequest {
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub atime: Option<std::time::SystemTime>,
    pub mtime: Option<std::time::SystemTime>,
}

/// `SetInodeAttributes(inode, {size?, mode?, mtime?})`: re-stats as
/// `GetInodeAttributes` does, opens the file writably if it's
/// a regular file the caller may write, applies each requested change,
/// then re-stats and returns the fresh attributes.
pub fn set_inode_attributes(ctx: &ServerContext, inode: u64, req: SetAttrRequest) -> Result<InodeAttributes, JdfsErrno> {
    let path = ctx.resolved_path(inode)?;
    let host = ctx.host_path(&path);

    if let Some(size) = req.size {
        let file = std::fs::OpenOptions::new().write(true).open(&host).map_err(JdfsErrno::from)?;
        file.set_len(size).map_err(JdfsErrno::from)?;
    }
    if let Some(mode) = req.mode {
        let perm = std::fs::Permissions::from_mode(mode);
        std::fs::set_permissions(&host, perm).map_err(JdfsErrno::from)?;
    }
    if req.atime.is_some() || req.mtime.is_some() {
        let meta = std::fs::symlink_metadata(&host).map_err(JdfsErrno::from)?;
        let atime = req.atime.unwrap_or_else(|| meta.accessed().unwrap_or(std::time::UNIX_EPOCH));
        let mtime = req.mtime.unwrap_or_else(|| meta.modified().unwrap_or(std::time::UNIX_EPOCH));
        let times = fs_set_times::SystemTimeSpec::from(atime, mtime);
        times.apply(&host).map_err(JdfsErrno::from)?;
    }

    let meta = std::fs::symlink_metadata(&host).map_err(JdfsErrno::from)?;
    let attr = metadata_to_attr(inode, &meta);
    ctx.icd.load_inode(
        0,
        LoadedMeta {
            inode,
            dev: meta.dev(),
            attr,
            path,
        },
        &[],
        None,
        Instant::now(),
    );
    Ok(attr)
}

/// `ForgetInode(inode, n)`: decrements refcount by `n`, reaping the
/// record at zero (the root inode is never forgotten).
pub fn forget_inode(ctx: &ServerContext, inode: u64, n: i64) {
    if inode != ROOT_INODE {
        ctx.icd.forget_inode(inode, n);
    }
}

use std::os::unix::fs::PermissionsExt;

/// A tiny `utimensat` wrapper — `std::fs` has no atime/mtime setter, and
/// pulling in a whole filetime crate for two timestamps is unwarranted;
/// this module stays self-contained using `libc`, the crate already in
/// the stack for every other raw syscall here.
mod fs_set_times {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;
    use std::time::SystemTime;

    pub struct SystemTimeSpec {
        atime: SystemTime,
        mtime: SystemTime,
    }

    impl SystemTimeSpec {
        pub fn from(atime: SystemTime, mtime: SystemTime) -> Self {
            SystemTimeSpec { atime, mtime }
        }

        pub fn apply(&self, path: &Path) -> std::io::Result<()> {
            let c_path = CString::new(path.as_os_str().as_bytes())?;
            let specs = [to_timespec(self.atime), to_timespec(self.mtime)];
            let rc = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), specs.as_ptr(), 0) };
            if rc != 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    }

    fn to_timespec(t: SystemTime) -> libc::timespec {
        match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => libc::timespec {
                tv_sec: d.as_secs() as libc::time_t,
                tv_nsec: d.subsec_nanos() as libc::c_long,
            },
            Err(e) => {
                let d = e.duration();
                libc::timespec {
                    tv_sec: -(d.as_secs() as libc::time_t) - 1,
                    tv_nsec: (1_000_000_000 - d.subsec_nanos()) as libc::c_long,
                }
            }
        }
    }
}
