//! The FUSE-facing side of the client: `ClientFs` holds the RPC handle and
//! the loaded config; `FsWrapper` is the `fuser::Filesystem` impl that
//! dispatches each kernel callback into the matching submodule.
//!
//! There is no local inode table, path cache, or attribute cache here —
//! the server's in-core directory (spec §4.6) is the single source of
//! truth and the kernel's own attr/entry cache (driven by the TTLs each
//! reply carries) is the only cache on this side of the wire.

use crate::config::Config;
use crate::rpc::RpcClient;
use fuser::{
    Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request,
};
use std::ffi::OsStr;
use std::future::Future;

mod attr;
mod create;
mod delete;
mod read;
mod rename;
mod write;
mod xattr;

/// Shared state behind every `FsWrapper` clone: one RPC connection and the
/// locally configured kernel-cache ceilings.
pub struct ClientFs {
    pub(crate) rpc: RpcClient,
    pub(crate) config: Config,
    runtime: tokio::runtime::Runtime,
}

impl ClientFs {
    pub fn new(rpc: RpcClient, config: Config, runtime: tokio::runtime::Runtime) -> Self {
        ClientFs { rpc, config, runtime }
    }
}

/// The `fuser::Filesystem` impl. Cheap to clone — it is just an `Arc`
/// around [`ClientFs`] — so every callback clones it into the blocking
/// call rather than holding a lock across the RPC round trip.
#[derive(Clone)]
pub struct FsWrapper {
    pub(crate) fs: std::sync::Arc<ClientFs>,
}

impl FsWrapper {
    pub fn new(fs: ClientFs) -> Self {
        FsWrapper { fs: std::sync::Arc::new(fs) }
    }

    /// Spawns `fut` onto the background runtime as its own task — distinct
    /// from the calling fuser worker thread — and blocks that thread until
    /// it completes. This is the per-op task every submodule's bridge to
    /// the async `RpcClient` goes through; a panic inside `fut` is
    /// re-raised here rather than swallowed by the join failure.
    pub(crate) fn run_blocking<F>(&self, fut: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.fs.runtime.block_on(async move {
            match tokio::spawn(fut).await {
                Ok(out) => out,
                Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
            }
        })
    }

    /// Runs `fut` inline on the calling thread with no task spawn. `forget`
    /// uses this: the kernel issues these in bursts and the handler must
    /// stay cheap, not pay for a fresh task per call.
    pub(crate) fn run_inline<F: Future>(&self, fut: F) -> F::Output {
        self.fs.runtime.block_on(fut)
    }
}

impl Filesystem for FsWrapper {
    fn getattr(&mut self, req: &Request, ino: u64, reply: ReplyAttr) {
        attr::getattr(self, req, ino, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        crtime: Option<std::time::SystemTime>,
        chgtime: Option<std::time::SystemTime>,
        bkuptime: Option<std::time::SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        attr::setattr(
            self, req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime,
            bkuptime, flags, reply,
        );
    }

    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        read::lookup(self, req, parent, name, reply);
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        let rpc = self.fs.rpc.clone();
        let _ = self.run_inline(async move { rpc.forget_inode(ino, nlookup).await });
    }

    fn opendir(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        read::opendir(self, req, ino, flags, reply);
    }

    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, reply: ReplyDirectory) {
        read::readdir(self, req, ino, fh, offset, reply);
    }

    fn releasedir(&mut self, req: &Request<'_>, ino: u64, fh: u64, flags: i32, reply: ReplyEmpty) {
        read::releasedir(self, req, ino, fh, flags, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        read::open(self, req, ino, flags, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        read::read(self, req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    fn readlink(&mut self, req: &Request, ino: u64, reply: ReplyData) {
        read::readlink(self, req, ino, reply);
    }

    fn statfs(&mut self, req: &Request, ino: u64, reply: ReplyStatfs) {
        read::statfs(self, req, ino, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        write::write(self, req, ino, fh, offset, data, write_flags, flags, lock_owner, reply);
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        write::release(self, req, ino, fh, flags, lock_owner, flush, reply);
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        write::flush(self, req, ino, fh, lock_owner, reply);
    }

    fn fsync(&mut self, req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        write::fsync(self, req, ino, fh, datasync, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        create::create(self, req, parent, name, mode, umask, flags, reply);
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: ReplyEntry) {
        create::mkdir(self, req, parent, name, mode, umask, reply);
    }

    fn symlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, link: &std::path::Path, reply: ReplyEntry) {
        create::symlink(self, req, parent, name, link, reply);
    }

    fn link(&mut self, req: &Request<'_>, ino: u64, newparent: u64, newname: &OsStr, reply: ReplyEntry) {
        create::link(self, req, ino, newparent, newname, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::unlink(self, req, parent, name, reply);
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::rmdir(self, req, parent, name, reply);
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        rename::rename(self, req, parent, name, newparent, newname, flags, reply);
    }

    fn getxattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        xattr::getxattr(self, req, ino, name, size, reply);
    }

    fn setxattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        position: u32,
        reply: ReplyEmpty,
    ) {
        xattr::setxattr(self, req, ino, name, value, flags, position, reply);
    }

    fn listxattr(&mut self, req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        xattr::listxattr(self, req, ino, size, reply);
    }

    fn removexattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        xattr::removexattr(self, req, ino, name, reply);
    }

    fn destroy(&mut self) {
        tracing::info!("filesystem session ending");
    }
}
