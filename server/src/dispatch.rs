//! The command-connection dispatch table: decodes one `read_command`
//! frame's positional tokens into typed arguments, runs the matching
//! exported-fs method, pushes any resulting invalidation, and packs the
//! outcome the way `write_response` expects.
//!
//! Every exported-fs call here follows the same final shape: a blocking
//! host-filesystem call wrapped in `tokio::task::spawn_blocking`, so the
//! one task handling this conversation never stalls the Tokio worker
//! thread on local I/O. A join failure (the blocking task panicked) is
//! itself a programming fault and is allowed to propagate as a panic.

use crate::context::ServerContext;
use crate::fs::{self, SetAttrRequest};
use jdfs_proto::{ops, ChildInodeEntry, JdfsErrno, Token};
use std::ffi::{OsStr, OsString};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub struct Reply {
    pub error: i32,
    pub results: Vec<Token>,
    pub payloads: Vec<Vec<u8>>,
}

impl Reply {
    fn ok(results: Vec<Token>) -> Self {
        Reply {
            error: 0,
            results,
            payloads: Vec::new(),
        }
    }

    fn ok_with_payload(payload: Vec<u8>) -> Self {
        Reply {
            error: 0,
            results: Vec::new(),
            payloads: vec![payload],
        }
    }

    fn err(code: JdfsErrno) -> Self {
        Reply {
            error: code.to_wire(),
            results: Vec::new(),
            payloads: Vec::new(),
        }
    }
}

fn name_arg(s: &str) -> OsString {
    OsStr::new(s).to_os_string()
}

/// Guards every mutating arm: a session mounted (or launched) read-only
/// rejects the call before touching the host filesystem.
fn require_writable(ctx: &ServerContext) -> Result<(), JdfsErrno> {
    if ctx.read_only {
        Err(JdfsErrno::Inval)
    } else {
        Ok(())
    }
}

/// Runs `f` on a blocking-pool thread, cheaply `Arc`-cloning `ctx` into
/// it; the icd's own mutex, not this clone, is what actually serializes
/// concurrent access to shared state.
async fn run<T, F>(ctx: Arc<ServerContext>, f: F) -> Result<T, JdfsErrno>
where
    F: FnOnce(Arc<ServerContext>) -> Result<T, JdfsErrno> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(ctx)).await.expect("blocking fs task must not panic")
}

/// Runs one decoded command against `ctx`.
pub async fn dispatch(ctx: Arc<ServerContext>, name: &str, args: Vec<Token>, payloads: Vec<Vec<u8>>) -> Reply {
    macro_rules! int {
        ($idx:expr) => {
            match args.get($idx).and_then(Token::as_int) {
                Some(v) => v,
                None => return Reply::err(JdfsErrno::Inval),
            }
        };
    }
    macro_rules! text {
        ($idx:expr) => {
            match args.get($idx).and_then(Token::as_str) {
                Some(v) => v.to_string(),
                None => return Reply::err(JdfsErrno::Inval),
            }
        };
    }

    match name {
        // `Mount` is handled before a connection's dispatch loop begins
        // (it decides the session's effective root and constructs
        // `ServerContext` itself) — a stray post-mount `Mount` call falls
        // through to the catch-all below.
        ops::STATFS => match run(ctx, |ctx| fs::statfs(&ctx)).await {
            Ok(info) => Reply::ok(vec![info.to_token()]),
            Err(e) => Reply::err(e),
        },

        ops::LOOKUP_INODE => {
            let parent = int!(0) as u64;
            let child_name = name_arg(&text!(1));
            match run(ctx, move |ctx| fs::lookup_inode(&ctx, parent, &child_name)).await {
                Ok(entry) => Reply::ok(vec![entry.to_token()]),
                Err(e) => Reply::err(e),
            }
        }

        ops::GET_INODE_ATTRIBUTES => {
            let inode = int!(0) as u64;
            match run(ctx, move |ctx| fs::get_inode_attributes(&ctx, inode)).await {
                Ok(attr) => Reply::ok(vec![attr.to_token()]),
                Err(e) => Reply::err(e),
            }
        }

        ops::SET_INODE_ATTRIBUTES => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let inode = int!(0) as u64;
            let req = SetAttrRequest {
                size: (int!(1) != 0).then(|| int!(2) as u64),
                mode: (int!(3) != 0).then(|| int!(4) as u32),
                atime: (int!(5) != 0).then(|| system_time(int!(6), int!(7) as u32)),
                mtime: (int!(8) != 0).then(|| system_time(int!(9), int!(10) as u32)),
            };
            let truncated = req.size.is_some();
            match run(ctx.clone(), move |ctx| fs::set_inode_attributes(&ctx, inode, req)).await {
                Ok(attr) => {
                    if truncated {
                        ctx.notify.invalidate_file_content(inode, 0, attr.size as i64).await;
                    }
                    Reply::ok(vec![attr.to_token()])
                }
                Err(e) => Reply::err(e),
            }
        }

        ops::FORGET_INODE => {
            let inode = int!(0) as u64;
            let n = int!(1);
            run(ctx, move |ctx| {
                fs::forget_inode(&ctx, inode, n);
                Ok::<(), JdfsErrno>(())
            })
            .await
            .map(|_| Reply::ok(Vec::new()))
            .unwrap_or_else(Reply::err)
        }

        ops::MKDIR => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let parent = int!(0) as u64;
            let child_name = name_arg(&text!(1));
            let push_name = child_name.to_string_lossy().into_owned();
            let mode = int!(2) as u32;
            new_child_reply(ctx, parent, &push_name, move |ctx| fs::mkdir(&ctx, parent, &child_name, mode)).await
        }

        ops::CREATE_FILE => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let parent = int!(0) as u64;
            let child_name = name_arg(&text!(1));
            let push_name = child_name.to_string_lossy().into_owned();
            let mode = int!(2) as u32;
            let flags = int!(3) as i32;
            match run(ctx.clone(), move |ctx| fs::create_file(&ctx, parent, &child_name, mode, flags)).await {
                Ok((entry, handle)) => {
                    ctx.notify.invalidate_dir_entry(parent, entry.inode, &push_name).await;
                    Reply::ok(vec![entry.to_token(), Token::Int(handle as i64)])
                }
                Err(e) => Reply::err(e),
            }
        }

        ops::CREATE_SYMLINK => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let parent = int!(0) as u64;
            let child_name = name_arg(&text!(1));
            let push_name = child_name.to_string_lossy().into_owned();
            let target = name_arg(&text!(2));
            new_child_reply(ctx, parent, &push_name, move |ctx| fs::create_symlink(&ctx, parent, &child_name, &target)).await
        }

        ops::CREATE_LINK => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let inode = int!(0) as u64;
            let new_parent = int!(1) as u64;
            let new_name = name_arg(&text!(2));
            let push_name = new_name.to_string_lossy().into_owned();
            new_child_reply(ctx, new_parent, &push_name, move |ctx| fs::create_link(&ctx, inode, new_parent, &new_name)).await
        }

        ops::RENAME => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let old_parent = int!(0) as u64;
            let old_name = name_arg(&text!(1));
            let old_push_name = old_name.to_string_lossy().into_owned();
            let new_parent = int!(2) as u64;
            let new_name = name_arg(&text!(3));
            let new_push_name = new_name.to_string_lossy().into_owned();
            match run(ctx.clone(), move |ctx| fs::rename(&ctx, old_parent, &old_name, new_parent, &new_name)).await {
                Ok(()) => {
                    ctx.notify.invalidate_dir_entry(old_parent, 0, &old_push_name).await;
                    if new_parent != old_parent || new_push_name != old_push_name {
                        let moved = ctx.lookup(new_parent, OsStr::new(&new_push_name)).map(|e| e.inode).unwrap_or(0);
                        ctx.notify.invalidate_dir_entry(new_parent, moved, &new_push_name).await;
                    }
                    Reply::ok(Vec::new())
                }
                Err(e) => Reply::err(e),
            }
        }

        ops::RMDIR => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let parent = int!(0) as u64;
            let child_name = name_arg(&text!(1));
            let push_name = child_name.to_string_lossy().into_owned();
            match run(ctx.clone(), move |ctx| fs::rmdir(&ctx, parent, &child_name)).await {
                Ok(()) => {
                    ctx.notify.invalidate_dir_entry(parent, 0, &push_name).await;
                    Reply::ok(Vec::new())
                }
                Err(e) => Reply::err(e),
            }
        }

        ops::UNLINK => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let parent = int!(0) as u64;
            let child_name = name_arg(&text!(1));
            let push_name = child_name.to_string_lossy().into_owned();
            match run(ctx.clone(), move |ctx| fs::unlink(&ctx, parent, &child_name)).await {
                Ok(()) => {
                    ctx.notify.invalidate_dir_entry(parent, 0, &push_name).await;
                    Reply::ok(Vec::new())
                }
                Err(e) => Reply::err(e),
            }
        }

        ops::OPEN_DIR => {
            let inode = int!(0) as u64;
            match run(ctx, move |ctx| fs::open_dir(&ctx, inode)).await {
                Ok(handle) => Reply::ok(vec![Token::Int(handle as i64)]),
                Err(e) => Reply::err(e),
            }
        }

        ops::READ_DIR => {
            let handle = int!(0) as u64;
            let offset = int!(1) as u64;
            let buf_size = int!(2) as u32;
            match run(ctx, move |ctx| fs::read_dir(&ctx, handle, offset, buf_size)).await {
                Ok(buf) => Reply::ok_with_payload(buf),
                Err(e) => Reply::err(e),
            }
        }

        ops::RELEASE_DIR_HANDLE => {
            let handle = int!(0) as u64;
            run(ctx, move |ctx| fs::release_dir_handle(&ctx, handle))
                .await
                .map(|_| Reply::ok(Vec::new()))
                .unwrap_or_else(Reply::err)
        }

        ops::OPEN_FILE => {
            let inode = int!(0) as u64;
            let flags = int!(1) as i32;
            match run(ctx, move |ctx| fs::open_file(&ctx, inode, flags)).await {
                Ok(handle) => Reply::ok(vec![Token::Int(handle as i64)]),
                Err(e) => Reply::err(e),
            }
        }

        ops::READ_FILE => {
            let handle = int!(0) as u64;
            let offset = int!(1) as u64;
            let size = int!(2) as u32;
            match run(ctx, move |ctx| fs::read_file(&ctx, handle, offset, size)).await {
                Ok(buf) => Reply::ok_with_payload(buf),
                Err(e) => Reply::err(e),
            }
        }

        ops::WRITE_FILE => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let handle = int!(0) as u64;
            let offset = int!(1) as u64;
            let data = payloads.into_iter().next().unwrap_or_default();
            let written_len = data.len() as i64;
            let inode = ctx.icd.get_file_handle(handle, false).map(|h| h.inode);
            match run(ctx.clone(), move |ctx| fs::write_file(&ctx, handle, offset, &data)).await {
                Ok(n) => {
                    if let Some(inode) = inode {
                        ctx.notify.invalidate_file_content(inode, offset as i64, written_len).await;
                    }
                    Reply::ok(vec![Token::Int(n as i64)])
                }
                Err(e) => Reply::err(e),
            }
        }

        ops::SYNC_FILE => {
            let handle = int!(0) as u64;
            run(ctx, move |ctx| fs::sync_file(&ctx, handle)).await.map(|_| Reply::ok(Vec::new())).unwrap_or_else(Reply::err)
        }

        ops::FLUSH_FILE => {
            let handle = int!(0) as u64;
            run(ctx, move |ctx| fs::flush_file(&ctx, handle)).await.map(|_| Reply::ok(Vec::new())).unwrap_or_else(Reply::err)
        }

        ops::RELEASE_FILE_HANDLE => {
            let handle = int!(0) as u64;
            match fs::release_file_handle(&ctx, handle).await {
                Ok(()) => Reply::ok(Vec::new()),
                Err(e) => Reply::err(e),
            }
        }

        ops::READ_SYMLINK => {
            let inode = int!(0) as u64;
            match run(ctx, move |ctx| fs::read_symlink(&ctx, inode)).await {
                Ok(buf) => Reply::ok_with_payload(buf),
                Err(e) => Reply::err(e),
            }
        }

        ops::GET_XATTR => {
            let inode = int!(0) as u64;
            let attr_name = name_arg(&text!(1));
            let size = int!(2) as usize;
            match run(ctx, move |ctx| fs::get_xattr(&ctx, inode, &attr_name)).await {
                Ok(value) if size == 0 => Reply::ok(vec![Token::Int(value.len() as i64)]),
                Ok(value) if value.len() > size => Reply::err(JdfsErrno::Range),
                Ok(value) => Reply::ok_with_payload(value),
                Err(e) => Reply::err(e),
            }
        }

        ops::SET_XATTR => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let inode = int!(0) as u64;
            let attr_name = name_arg(&text!(1));
            let flags = int!(2) as i32;
            let value = payloads.into_iter().next().unwrap_or_default();
            run(ctx, move |ctx| fs::set_xattr(&ctx, inode, &attr_name, &value, flags))
                .await
                .map(|_| Reply::ok(Vec::new()))
                .unwrap_or_else(Reply::err)
        }

        ops::LIST_XATTR => {
            let inode = int!(0) as u64;
            let size = int!(1) as usize;
            match run(ctx, move |ctx| fs::list_xattr(&ctx, inode)).await {
                Ok(list) if size == 0 => Reply::ok(vec![Token::Int(list.len() as i64)]),
                Ok(list) if list.len() > size => Reply::err(JdfsErrno::Range),
                Ok(list) => Reply::ok_with_payload(list),
                Err(e) => Reply::err(e),
            }
        }

        ops::REMOVE_XATTR => {
            if let Err(e) = require_writable(&ctx) {
                return Reply::err(e);
            }
            let inode = int!(0) as u64;
            let attr_name = name_arg(&text!(1));
            run(ctx, move |ctx| fs::remove_xattr(&ctx, inode, &attr_name))
                .await
                .map(|_| Reply::ok(Vec::new()))
                .unwrap_or_else(Reply::err)
        }

        _ => Reply::err(JdfsErrno::Nosys),
    }
}

/// Shared tail for `MkDir`/`CreateSymlink`/`CreateLink`: run the blocking
/// creation, and on success push the parent's directory-entry
/// invalidation before replying with the new entry.
async fn new_child_reply<F>(ctx: Arc<ServerContext>, parent: u64, push_name: &str, f: F) -> Reply
where
    F: FnOnce(Arc<ServerContext>) -> Result<ChildInodeEntry, JdfsErrno> + Send + 'static,
{
    match run(ctx.clone(), f).await {
        Ok(entry) => {
            ctx.notify.invalidate_dir_entry(parent, entry.inode, push_name).await;
            Reply::ok(vec![entry.to_token()])
        }
        Err(e) => Reply::err(e),
    }
}

fn system_time(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        SystemTime::UNIX_EPOCH - Duration::new((-secs) as u64, 0) + Duration::from_nanos(nanos as u64)
    }
}
