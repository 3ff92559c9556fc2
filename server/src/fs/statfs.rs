//! `StatFS`: `fstatvfs` on the session's held-open root directory fd.

use crate::context::ServerContext;
use jdfs_proto::{JdfsErrno, Token};
use std::mem::MaybeUninit;
use std::os::unix::io::AsRawFd;

pub struct StatfsInfo {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

impl StatfsInfo {
    pub fn to_token(&self) -> Token {
        Token::List(vec![
            Token::Int(self.blocks as i64),
            Token::Int(self.bfree as i64),
            Token::Int(self.bavail as i64),
            Token::Int(self.files as i64),
            Token::Int(self.ffree as i64),
            Token::Int(self.bsize as i64),
            Token::Int(self.namelen as i64),
            Token::Int(self.frsize as i64),
        ])
    }
}

pub fn statfs(ctx: &ServerContext) -> Result<StatfsInfo, JdfsErrno> {
    let mut buf: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
    // SAFETY: `ctx.root_dir`'s fd stays open for the session's lifetime
    // and `buf` is sized for `fstatvfs` by construction.
    let rc = unsafe { libc::fstatvfs(ctx.root_dir.as_raw_fd(), buf.as_mut_ptr()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    // SAFETY: `statvfs` returned success, so `buf` is fully initialized.
    let stat = unsafe { buf.assume_init() };
    Ok(StatfsInfo {
        blocks: stat.f_blocks,
        bfree: stat.f_bfree,
        bavail: stat.f_bavail,
        files: stat.f_files,
        ffree: stat.f_ffree,
        bsize: stat.f_bsize as u32,
        namelen: stat.f_namemax as u32,
        frsize: stat.f_frsize as u32,
    })
}
