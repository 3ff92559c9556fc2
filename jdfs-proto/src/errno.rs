//! The wire-canonical error taxonomy (spec §7).
//!
//! Both ends translate host `errno` values into this small, portable set
//! before they ever touch the wire. `NOATTR` is carried as the host's
//! `ENODATA` value so a Linux server and a macOS client agree on the byte
//! that crosses the wire even though the two platforms spell the libc
//! constant differently.

use std::io;

/// Portable error codes transported between client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JdfsErrno {
    #[error("success")]
    Okay,
    #[error("file exists")]
    Exist,
    #[error("invalid argument")]
    Inval,
    #[error("i/o error")]
    Io,
    #[error("no such file or directory")]
    Noent,
    #[error("function not implemented")]
    Nosys,
    #[error("not a directory")]
    Notdir,
    #[error("directory not empty")]
    Notempty,
    #[error("result too large")]
    Range,
    #[error("no space left on device")]
    Nospc,
    #[error("attribute not found")]
    Noattr,
}

impl JdfsErrno {
    /// Wire representation: a small fixed integer, stable across versions.
    pub fn to_wire(self) -> i32 {
        match self {
            JdfsErrno::Okay => 0,
            JdfsErrno::Exist => 1,
            JdfsErrno::Inval => 2,
            JdfsErrno::Io => 3,
            JdfsErrno::Noent => 4,
            JdfsErrno::Nosys => 5,
            JdfsErrno::Notdir => 6,
            JdfsErrno::Notempty => 7,
            JdfsErrno::Range => 8,
            JdfsErrno::Nospc => 9,
            JdfsErrno::Noattr => 10,
        }
    }

    /// Unknown wire codes fall back to `Io`, matching the host-errno fallback rule.
    pub fn from_wire(code: i32) -> Self {
        match code {
            0 => JdfsErrno::Okay,
            1 => JdfsErrno::Exist,
            2 => JdfsErrno::Inval,
            4 => JdfsErrno::Noent,
            5 => JdfsErrno::Nosys,
            6 => JdfsErrno::Notdir,
            7 => JdfsErrno::Notempty,
            8 => JdfsErrno::Range,
            9 => JdfsErrno::Nospc,
            10 => JdfsErrno::Noattr,
            _ => JdfsErrno::Io,
        }
    }

    /// The POSIX errno a FUSE reply should carry for this code.
    pub fn to_errno(self) -> i32 {
        match self {
            JdfsErrno::Okay => 0,
            JdfsErrno::Exist => libc::EEXIST,
            JdfsErrno::Inval => libc::EINVAL,
            JdfsErrno::Io => libc::EIO,
            JdfsErrno::Noent => libc::ENOENT,
            JdfsErrno::Nosys => libc::ENOSYS,
            JdfsErrno::Notdir => libc::ENOTDIR,
            JdfsErrno::Notempty => libc::ENOTEMPTY,
            JdfsErrno::Range => libc::ERANGE,
            JdfsErrno::Nospc => libc::ENOSPC,
            #[cfg(target_os = "macos")]
            JdfsErrno::Noattr => libc::ENOATTR,
            #[cfg(not(target_os = "macos"))]
            JdfsErrno::Noattr => libc::ENODATA,
        }
    }

    /// Maps a host errno (as observed on the server, from a failed syscall)
    /// into the portable taxonomy. Unknown host errnos fall back to `Io`.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            0 => JdfsErrno::Okay,
            libc::EEXIST => JdfsErrno::Exist,
            libc::EINVAL => JdfsErrno::Inval,
            libc::ENOENT => JdfsErrno::Noent,
            libc::ENOSYS => JdfsErrno::Nosys,
            libc::ENOTDIR => JdfsErrno::Notdir,
            libc::ENOTEMPTY => JdfsErrno::Notempty,
            libc::ERANGE => JdfsErrno::Range,
            libc::ENOSPC => JdfsErrno::Nospc,
            #[cfg(target_os = "macos")]
            libc::ENOATTR => JdfsErrno::Noattr,
            #[cfg(not(target_os = "macos"))]
            libc::ENODATA => JdfsErrno::Noattr,
            _ => JdfsErrno::Io,
        }
    }

    /// Maps a failed syscall's `io::Error` the same way.
    pub fn from_io_error(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => Self::from_errno(errno),
            None => JdfsErrno::Io,
        }
    }
}

impl From<io::Error> for JdfsErrno {
    fn from(err: io::Error) -> Self {
        JdfsErrno::from_io_error(&err)
    }
}
