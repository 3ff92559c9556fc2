//! `GetXattr`/`SetXattr`/`ListXattr`/`RemoveXattr`: pass through to the
//! host's own xattr syscalls, via the resolved path (the
//! `l`-prefixed calls so a symlink's own attributes are addressed, never
//! the target's). Host "no such attribute" maps to the portable
//! `Noattr`, the same `cfg(target_os = "macos")` split the rest of this
//! codebase uses for that errno.
//!
//! Linux and macOS expose different C signatures for the same four
//! syscalls (macOS folds the "don't follow symlinks" behavior into an
//! `options` flag rather than a separate `l`-prefixed function); `sys`
//! below is the only part of this module that differs by platform.

use crate::context::ServerContext;
use jdfs_proto::JdfsErrno;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;

fn path_and_name(ctx: &ServerContext, inode: u64, name: &std::ffi::OsStr) -> Result<(CString, CString), JdfsErrno> {
    let path = ctx.resolved_path(inode)?;
    let host = ctx.host_path(&path);
    let c_path = CString::new(host.as_os_str().as_bytes()).map_err(|_| JdfsErrno::Inval)?;
    let c_name = CString::new(name.as_bytes()).map_err(|_| JdfsErrno::Inval)?;
    Ok((c_path, c_name))
}

/// `size == 0` is the kernel's "how big would the value be" probe: the
/// returned `Vec` carries the real value but the dispatcher truncates its
/// reply to a bare length in that case, same as the read-probe pattern
/// the codec uses for `read`/`readdir`.
pub fn get_xattr(ctx: &ServerContext, inode: u64, name: &std::ffi::OsStr) -> Result<Vec<u8>, JdfsErrno> {
    let (c_path, c_name) = path_and_name(ctx, inode, name)?;
    let needed = sys::getxattr(&c_path, &c_name, std::ptr::null_mut(), 0);
    if needed < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let mut buf = vec![0u8; needed as usize];
    if needed == 0 {
        return Ok(buf);
    }
    let got = sys::getxattr(&c_path, &c_name, buf.as_mut_ptr(), buf.len());
    if got < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    buf.truncate(got as usize);
    Ok(buf)
}

pub fn set_xattr(ctx: &ServerContext, inode: u64, name: &std::ffi::OsStr, value: &[u8], flags: i32) -> Result<(), JdfsErrno> {
    let (c_path, c_name) = path_and_name(ctx, inode, name)?;
    let rc = sys::setxattr(&c_path, &c_name, value, flags);
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

pub fn list_xattr(ctx: &ServerContext, inode: u64) -> Result<Vec<u8>, JdfsErrno> {
    let path = ctx.resolved_path(inode)?;
    let host = ctx.host_path(&path);
    let c_path = CString::new(host.as_os_str().as_bytes()).map_err(|_| JdfsErrno::Inval)?;
    let needed = sys::listxattr(&c_path, std::ptr::null_mut(), 0);
    if needed < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let mut buf = vec![0u8; needed as usize];
    if needed == 0 {
        return Ok(buf);
    }
    let got = sys::listxattr(&c_path, buf.as_mut_ptr(), buf.len());
    if got < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    buf.truncate(got as usize);
    Ok(buf)
}

pub fn remove_xattr(ctx: &ServerContext, inode: u64, name: &std::ffi::OsStr) -> Result<(), JdfsErrno> {
    let (c_path, c_name) = path_and_name(ctx, inode, name)?;
    let rc = sys::removexattr(&c_path, &c_name);
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
mod sys {
    use std::ffi::CString;

    pub fn getxattr(path: &CString, name: &CString, buf: *mut u8, len: usize) -> isize {
        // SAFETY: `path`/`name` are valid nul-terminated strings; `buf` is
        // either null (size probe) or sized to `len`.
        unsafe { libc::lgetxattr(path.as_ptr(), name.as_ptr(), buf as *mut libc::c_void, len) }
    }

    pub fn setxattr(path: &CString, name: &CString, value: &[u8], flags: i32) -> i32 {
        // SAFETY: `value` is valid for `value.len()` bytes for the call's duration.
        unsafe { libc::lsetxattr(path.as_ptr(), name.as_ptr(), value.as_ptr() as *const libc::c_void, value.len(), flags) }
    }

    pub fn listxattr(path: &CString, buf: *mut u8, len: usize) -> isize {
        // SAFETY: `buf` is either null (size probe) or sized to `len`.
        unsafe { libc::llistxattr(path.as_ptr(), buf as *mut libc::c_char, len) }
    }

    pub fn removexattr(path: &CString, name: &CString) -> i32 {
        // SAFETY: `path`/`name` are valid nul-terminated strings.
        unsafe { libc::lremovexattr(path.as_ptr(), name.as_ptr()) }
    }
}

#[cfg(target_os = "macos")]
mod sys {
    use std::ffi::CString;

    const NOFOLLOW: i32 = libc::XATTR_NOFOLLOW;

    pub fn getxattr(path: &CString, name: &CString, buf: *mut u8, len: usize) -> isize {
        // SAFETY: see the Linux variant; `XATTR_NOFOLLOW` makes this the
        // symlink-not-target equivalent of `lgetxattr`.
        unsafe { libc::getxattr(path.as_ptr(), name.as_ptr(), buf as *mut libc::c_void, len, 0, NOFOLLOW) }
    }

    pub fn setxattr(path: &CString, name: &CString, value: &[u8], flags: i32) -> i32 {
        // SAFETY: `value` is valid for `value.len()` bytes for the call's duration.
        unsafe {
            libc::setxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr() as *const libc::c_void,
                value.len(),
                0,
                flags | NOFOLLOW,
            )
        }
    }

    pub fn listxattr(path: &CString, buf: *mut u8, len: usize) -> isize {
        // SAFETY: `buf` is either null (size probe) or sized to `len`.
        unsafe { libc::listxattr(path.as_ptr(), buf as *mut libc::c_char, len, NOFOLLOW) }
    }

    pub fn removexattr(path: &CString, name: &CString) -> i32 {
        // SAFETY: `path`/`name` are valid nul-terminated strings.
        unsafe { libc::removexattr(path.as_ptr(), name.as_ptr(), NOFOLLOW) }
    }
}
