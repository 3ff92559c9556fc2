//! The filesystem interface, client side: one method per FUSE op, each
//! opening a conversation on the command connection with the positional
//! argument order `jdfsd`'s dispatch table expects, and decoding the
//! typed result or the portable error it comes back with.
//!
//! Every method here is a thin, uniform shim over [`RpcHandle::call`] —
//! none of them retry, cache, or otherwise second-guess the server. The
//! one exception is `get_xattr`/`list_xattr`'s size-probe branch, which
//! mirrors the asymmetry already built into the wire call itself: a
//! `size` of zero asks for a byte count instead of the data.

use jdfs_proto::{ops, ChildInodeEntry, Dirent, InodeAttributes, JdfsErrno, RpcHandle, Token};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::time::SystemTime;

#[derive(Clone)]
pub struct RpcClient {
    conn: RpcHandle,
}

/// A `SetInodeAttributes` request: every field left `None` is left
/// untouched on the server, matching `jdfsd`'s own `SetAttrRequest`.
#[derive(Default)]
pub struct SetAttrRequest {
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
}

pub struct StatfsReply {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

/// `GetXAttr`/`ListXAttr` answer a zero-size probe with a byte count and
/// any other size with the data itself (or `ERANGE` if it doesn't fit).
pub enum XattrReply {
    Size(u32),
    Data(Vec<u8>),
}

fn name_token(name: &OsStr) -> Token {
    Token::Str(String::from_utf8_lossy(name.as_bytes()).into_owned())
}

fn time_parts(t: SystemTime) -> (i64, u32) {
    let wt = jdfs_proto::WireTime::from_system_time(t);
    (wt.secs, wt.nanos)
}

impl RpcClient {
    pub fn new(conn: RpcHandle) -> Self {
        RpcClient { conn }
    }

    /// Runs one conversation and translates a nonzero error code into the
    /// corresponding `Err` — every call site below builds on this instead
    /// of repeating the error check.
    async fn call(&self, name: &str, args: &[Token], payloads: &[&[u8]]) -> Result<jdfs_proto::conversation::Response, JdfsErrno> {
        let resp = self.conn.call(name, args, payloads).await.map_err(|_| JdfsErrno::Io)?;
        if resp.error != 0 {
            return Err(JdfsErrno::from_wire(resp.error));
        }
        Ok(resp)
    }

    fn attr_result(resp: &jdfs_proto::conversation::Response) -> Result<InodeAttributes, JdfsErrno> {
        resp.results.first().and_then(InodeAttributes::from_token).ok_or(JdfsErrno::Io)
    }

    fn entry_result(resp: &jdfs_proto::conversation::Response) -> Result<ChildInodeEntry, JdfsErrno> {
        resp.results.first().and_then(ChildInodeEntry::from_token).ok_or(JdfsErrno::Io)
    }

    pub async fn mount(&self, read_only: bool, jdfs_path: &str) -> Result<(u64, u32, u32), JdfsErrno> {
        let resp = self.call(ops::MOUNT, &[Token::Int(read_only as i64), Token::Str(jdfs_path.to_string())], &[]).await?;
        let root = resp.results.first().and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u64;
        let uid = resp.results.get(1).and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u32;
        let gid = resp.results.get(2).and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u32;
        Ok((root, uid, gid))
    }

    pub async fn statfs(&self) -> Result<StatfsReply, JdfsErrno> {
        let resp = self.call(ops::STATFS, &[], &[]).await?;
        let l = resp.results.first().and_then(Token::as_list).ok_or(JdfsErrno::Io)?;
        let i = |idx: usize| l.get(idx).and_then(Token::as_int).ok_or(JdfsErrno::Io);
        Ok(StatfsReply {
            blocks: i(0)? as u64,
            bfree: i(1)? as u64,
            bavail: i(2)? as u64,
            files: i(3)? as u64,
            ffree: i(4)? as u64,
            bsize: i(5)? as u32,
            namelen: i(6)? as u32,
            frsize: i(7)? as u32,
        })
    }

    pub async fn lookup_inode(&self, parent: u64, name: &OsStr) -> Result<ChildInodeEntry, JdfsErrno> {
        let resp = self.call(ops::LOOKUP_INODE, &[Token::Int(parent as i64), name_token(name)], &[]).await?;
        Self::entry_result(&resp)
    }

    pub async fn get_inode_attributes(&self, inode: u64) -> Result<InodeAttributes, JdfsErrno> {
        let resp = self.call(ops::GET_INODE_ATTRIBUTES, &[Token::Int(inode as i64)], &[]).await?;
        Self::attr_result(&resp)
    }

    pub async fn set_inode_attributes(&self, inode: u64, req: SetAttrRequest) -> Result<InodeAttributes, JdfsErrno> {
        let (atime_secs, atime_nanos) = req.atime.map(time_parts).unwrap_or((0, 0));
        let (mtime_secs, mtime_nanos) = req.mtime.map(time_parts).unwrap_or((0, 0));
        let args = [
            Token::Int(inode as i64),
            Token::Int(req.size.is_some() as i64),
            Token::Int(req.size.unwrap_or(0) as i64),
            Token::Int(req.mode.is_some() as i64),
            Token::Int(req.mode.unwrap_or(0) as i64),
            Token::Int(req.atime.is_some() as i64),
            Token::Int(atime_secs),
            Token::Int(atime_nanos as i64),
            Token::Int(req.mtime.is_some() as i64),
            Token::Int(mtime_secs),
            Token::Int(mtime_nanos as i64),
        ];
        let resp = self.call(ops::SET_INODE_ATTRIBUTES, &args, &[]).await?;
        Self::attr_result(&resp)
    }

    /// Fire-and-forget from the caller's point of view: `Filesystem::forget`
    /// has no reply to hold open for, so the caller spawns this without
    /// joining it.
    pub async fn forget_inode(&self, inode: u64, nlookup: u64) -> Result<(), JdfsErrno> {
        self.call(ops::FORGET_INODE, &[Token::Int(inode as i64), Token::Int(nlookup as i64)], &[]).await?;
        Ok(())
    }

    pub async fn mkdir(&self, parent: u64, name: &OsStr, mode: u32) -> Result<ChildInodeEntry, JdfsErrno> {
        let resp = self.call(ops::MKDIR, &[Token::Int(parent as i64), name_token(name), Token::Int(mode as i64)], &[]).await?;
        Self::entry_result(&resp)
    }

    pub async fn create_file(&self, parent: u64, name: &OsStr, mode: u32, flags: i32) -> Result<(ChildInodeEntry, u64), JdfsErrno> {
        let args = [Token::Int(parent as i64), name_token(name), Token::Int(mode as i64), Token::Int(flags as i64)];
        let resp = self.call(ops::CREATE_FILE, &args, &[]).await?;
        let entry = resp.results.first().and_then(ChildInodeEntry::from_token).ok_or(JdfsErrno::Io)?;
        let handle = resp.results.get(1).and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u64;
        Ok((entry, handle))
    }

    pub async fn create_symlink(&self, parent: u64, name: &OsStr, target: &OsStr) -> Result<ChildInodeEntry, JdfsErrno> {
        let args = [Token::Int(parent as i64), name_token(name), name_token(target)];
        let resp = self.call(ops::CREATE_SYMLINK, &args, &[]).await?;
        Self::entry_result(&resp)
    }

    pub async fn create_link(&self, inode: u64, new_parent: u64, new_name: &OsStr) -> Result<ChildInodeEntry, JdfsErrno> {
        let args = [Token::Int(inode as i64), Token::Int(new_parent as i64), name_token(new_name)];
        let resp = self.call(ops::CREATE_LINK, &args, &[]).await?;
        Self::entry_result(&resp)
    }

    pub async fn rename(&self, old_parent: u64, old_name: &OsStr, new_parent: u64, new_name: &OsStr) -> Result<(), JdfsErrno> {
        let args = [Token::Int(old_parent as i64), name_token(old_name), Token::Int(new_parent as i64), name_token(new_name)];
        self.call(ops::RENAME, &args, &[]).await?;
        Ok(())
    }

    pub async fn rmdir(&self, parent: u64, name: &OsStr) -> Result<(), JdfsErrno> {
        self.call(ops::RMDIR, &[Token::Int(parent as i64), name_token(name)], &[]).await?;
        Ok(())
    }

    pub async fn unlink(&self, parent: u64, name: &OsStr) -> Result<(), JdfsErrno> {
        self.call(ops::UNLINK, &[Token::Int(parent as i64), name_token(name)], &[]).await?;
        Ok(())
    }

    pub async fn open_dir(&self, inode: u64) -> Result<u64, JdfsErrno> {
        let resp = self.call(ops::OPEN_DIR, &[Token::Int(inode as i64)], &[]).await?;
        Ok(resp.results.first().and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u64)
    }

    pub async fn read_dir(&self, handle: u64, offset: u64, buf_size: u32) -> Result<Vec<Dirent>, JdfsErrno> {
        let args = [Token::Int(handle as i64), Token::Int(offset as i64), Token::Int(buf_size as i64)];
        let resp = self.call(ops::READ_DIR, &args, &[]).await?;
        Ok(jdfs_proto::dirent::decode_all(resp.payloads.first().map(Vec::as_slice).unwrap_or(&[])))
    }

    pub async fn release_dir_handle(&self, handle: u64) -> Result<(), JdfsErrno> {
        self.call(ops::RELEASE_DIR_HANDLE, &[Token::Int(handle as i64)], &[]).await?;
        Ok(())
    }

    pub async fn open_file(&self, inode: u64, flags: i32) -> Result<u64, JdfsErrno> {
        let resp = self.call(ops::OPEN_FILE, &[Token::Int(inode as i64), Token::Int(flags as i64)], &[]).await?;
        Ok(resp.results.first().and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u64)
    }

    pub async fn read_file(&self, handle: u64, offset: u64, size: u32) -> Result<Vec<u8>, JdfsErrno> {
        let args = [Token::Int(handle as i64), Token::Int(offset as i64), Token::Int(size as i64)];
        let resp = self.call(ops::READ_FILE, &args, &[]).await?;
        Ok(resp.payloads.into_iter().next().unwrap_or_default())
    }

    pub async fn write_file(&self, handle: u64, offset: u64, data: &[u8]) -> Result<u32, JdfsErrno> {
        let args = [Token::Int(handle as i64), Token::Int(offset as i64)];
        let resp = self.call(ops::WRITE_FILE, &args, &[data]).await?;
        Ok(resp.results.first().and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u32)
    }

    pub async fn sync_file(&self, handle: u64) -> Result<(), JdfsErrno> {
        self.call(ops::SYNC_FILE, &[Token::Int(handle as i64)], &[]).await?;
        Ok(())
    }

    pub async fn flush_file(&self, handle: u64) -> Result<(), JdfsErrno> {
        self.call(ops::FLUSH_FILE, &[Token::Int(handle as i64)], &[]).await?;
        Ok(())
    }

    pub async fn release_file_handle(&self, handle: u64) -> Result<(), JdfsErrno> {
        self.call(ops::RELEASE_FILE_HANDLE, &[Token::Int(handle as i64)], &[]).await?;
        Ok(())
    }

    pub async fn read_symlink(&self, inode: u64) -> Result<Vec<u8>, JdfsErrno> {
        let resp = self.call(ops::READ_SYMLINK, &[Token::Int(inode as i64)], &[]).await?;
        Ok(resp.payloads.into_iter().next().unwrap_or_default())
    }

    pub async fn get_xattr(&self, inode: u64, name: &OsStr, size: u32) -> Result<XattrReply, JdfsErrno> {
        let args = [Token::Int(inode as i64), name_token(name), Token::Int(size as i64)];
        let resp = self.call(ops::GET_XATTR, &args, &[]).await?;
        if size == 0 {
            Ok(XattrReply::Size(resp.results.first().and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u32))
        } else {
            Ok(XattrReply::Data(resp.payloads.into_iter().next().unwrap_or_default()))
        }
    }

    pub async fn set_xattr(&self, inode: u64, name: &OsStr, value: &[u8], flags: i32) -> Result<(), JdfsErrno> {
        let args = [Token::Int(inode as i64), name_token(name), Token::Int(flags as i64)];
        self.call(ops::SET_XATTR, &args, &[value]).await?;
        Ok(())
    }

    pub async fn list_xattr(&self, inode: u64, size: u32) -> Result<XattrReply, JdfsErrno> {
        let args = [Token::Int(inode as i64), Token::Int(size as i64)];
        let resp = self.call(ops::LIST_XATTR, &args, &[]).await?;
        if size == 0 {
            Ok(XattrReply::Size(resp.results.first().and_then(Token::as_int).ok_or(JdfsErrno::Io)? as u32))
        } else {
            Ok(XattrReply::Data(resp.payloads.into_iter().next().unwrap_or_default()))
        }
    }

    pub async fn remove_xattr(&self, inode: u64, name: &OsStr) -> Result<(), JdfsErrno> {
        self.call(ops::REMOVE_XATTR, &[Token::Int(inode as i64), name_token(name)], &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfs_proto::conversation::split;
    use jdfs_proto::{WireFileType, WireTime};
    use tokio::net::{TcpListener, TcpStream};

    async fn serving<F, Fut>(respond: F) -> RpcClient
    where
        F: FnOnce(String, Vec<Token>, Vec<Vec<u8>>, RpcHandle) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (handle, mut inbound) = split(stream);
            let (name, args, payloads) = inbound.recv().await.unwrap();
            respond(name, args, payloads, handle).await;
        });
        RpcClient::new(split(TcpStream::connect(addr).await.unwrap()).0)
    }

    fn sample_attr() -> InodeAttributes {
        InodeAttributes {
            inode: 42,
            size: 4096,
            nlink: 1,
            file_type: WireFileType::RegularFile,
            perm: 0o644,
            setuid: false,
            setgid: false,
            uid: 501,
            gid: 20,
            atime: WireTime::ZERO,
            mtime: WireTime::ZERO,
            ctime: WireTime::ZERO,
            crtime: WireTime::ZERO,
        }
    }

    #[tokio::test]
    async fn lookup_inode_sends_parent_and_name_positionally() {
        let client = serving(|name, args, _payloads, handle| async move {
            assert_eq!(name, ops::LOOKUP_INODE);
            assert_eq!(args, vec![Token::Int(7), Token::Str("report.txt".into())]);
            let entry = ChildInodeEntry {
                inode: 42,
                generation: 0,
                attr: sample_attr(),
                attr_valid_ms: 1000,
                entry_valid_ms: 1000,
            };
            handle.respond(0, &[entry.to_token()], &[]).await.unwrap();
        })
        .await;

        let entry = client.lookup_inode(7, OsStr::new("report.txt")).await.unwrap();
        assert_eq!(entry.inode, 42);
        assert_eq!(entry.attr.size, 4096);
    }

    #[tokio::test]
    async fn nonzero_error_code_becomes_the_matching_jdfs_errno() {
        let client = serving(|_name, _args, _payloads, handle| async move {
            handle.respond(JdfsErrno::Noent.to_wire(), &[], &[]).await.unwrap();
        })
        .await;

        let err = client.get_inode_attributes(99).await.unwrap_err();
        assert_eq!(err, JdfsErrno::Noent);
    }

    #[tokio::test]
    async fn write_file_carries_the_data_as_an_inline_payload_not_a_token() {
        let client = serving(|name, args, payloads, handle| async move {
            assert_eq!(name, ops::WRITE_FILE);
            assert_eq!(args, vec![Token::Int(3), Token::Int(10)]);
            assert_eq!(payloads, vec![b"hello".to_vec()]);
            handle.respond(0, &[Token::Int(5)], &[]).await.unwrap();
        })
        .await;

        let written = client.write_file(3, 10, b"hello").await.unwrap();
        assert_eq!(written, 5);
    }

    #[tokio::test]
    async fn get_xattr_with_zero_size_asks_for_a_byte_count() {
        let client = serving(|name, args, _payloads, handle| async move {
            assert_eq!(name, ops::GET_XATTR);
            assert_eq!(args[2], Token::Int(0));
            handle.respond(0, &[Token::Int(13)], &[]).await.unwrap();
        })
        .await;

        match client.get_xattr(1, OsStr::new("user.note"), 0).await.unwrap() {
            XattrReply::Size(n) => assert_eq!(n, 13),
            XattrReply::Data(_) => panic!("expected a size probe, not data"),
        }
    }

    #[tokio::test]
    async fn get_xattr_with_nonzero_size_receives_the_payload() {
        let client = serving(|name, args, _payloads, handle| async move {
            assert_eq!(name, ops::GET_XATTR);
            assert_eq!(args[2], Token::Int(64));
            handle.respond(0, &[], &[b"hello"]).await.unwrap();
        })
        .await;

        match client.get_xattr(1, OsStr::new("user.note"), 64).await.unwrap() {
            XattrReply::Data(data) => assert_eq!(data, b"hello"),
            XattrReply::Size(_) => panic!("expected data, not a size probe"),
        }
    }

    #[tokio::test]
    async fn mount_decodes_root_inode_and_ownership() {
        let client = serving(|name, args, _payloads, handle| async move {
            assert_eq!(name, ops::MOUNT);
            assert_eq!(args, vec![Token::Int(0), Token::Str("exports/home".into())]);
            handle.respond(0, &[Token::Int(1), Token::Int(501), Token::Int(20)], &[]).await.unwrap();
        })
        .await;

        let (root, uid, gid) = client.mount(false, "exports/home").await.unwrap();
        assert_eq!((root, uid, gid), (1, 501, 20));
    }
}
