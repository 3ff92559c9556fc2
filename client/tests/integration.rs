//! End-to-end `RpcClient` session tests: a single scripted fake server
//! handles a realistic multi-call sequence over one persistent command
//! connection, the same way `jdfsd` would — proving `RpcClient`'s calls
//! compose correctly across a session, not just in isolation.
//!
//! `rpc.rs`'s own inline unit tests already cover one call at a time in
//! isolation; these tests cover a session: several conversations in a
//! row on the connection `RpcHandle`'s transport mutex serializes,
//! matching the shape real mount/create/write/read/release traffic
//! takes.

use client::rpc::{RpcClient, SetAttrRequest};
use jdfs_proto::conversation::split;
use jdfs_proto::{ops, ChildInodeEntry, InodeAttributes, JdfsErrno, Token, WireFileType, WireTime};
use tokio::net::{TcpListener, TcpStream};

fn sample_attr(inode: u64, file_type: WireFileType, size: u64) -> InodeAttributes {
    InodeAttributes {
        inode,
        size,
        nlink: 1,
        file_type,
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

fn sample_entry(inode: u64) -> ChildInodeEntry {
    ChildInodeEntry {
        inode,
        generation: 0,
        attr: sample_attr(inode, WireFileType::RegularFile, 0),
        attr_valid_ms: 1_000,
        entry_valid_ms: 5_000,
    }
}

/// Spawns a fake `jdfsd` that serves every conversation on one connection
/// in order, replying to each recognized op name and `Nosys` to anything
/// it doesn't script — a session-scale stand-in for the real dispatch
/// table.
async fn scripted_server() -> RpcClient {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (handle, mut inbound) = split(stream);
        while let Some((name, args, payloads)) = inbound.recv().await {
            match name.as_str() {
                ops::MOUNT => {
                    handle.respond(0, &[Token::Int(1), Token::Int(501), Token::Int(20)], &[]).await.unwrap();
                }
                ops::LOOKUP_INODE => {
                    let child_name = args.get(1).and_then(Token::as_str).unwrap_or_default();
                    if child_name == "missing.txt" {
                        handle.respond(JdfsErrno::Noent.to_wire(), &[], &[]).await.unwrap();
                    } else {
                        handle.respond(0, &[sample_entry(42).to_token()], &[]).await.unwrap();
                    }
                }
                ops::CREATE_FILE => {
                    let entry = sample_entry(99);
                    handle.respond(0, &[entry.to_token(), Token::Int(7)], &[]).await.unwrap();
                }
                ops::WRITE_FILE => {
                    let n = payloads.first().map(Vec::len).unwrap_or(0);
                    handle.respond(0, &[Token::Int(n as i64)], &[]).await.unwrap();
                }
                ops::READ_FILE => {
                    handle.respond(0, &[], &[b"written by the fake server"]).await.unwrap();
                }
                ops::SET_INODE_ATTRIBUTES => {
                    handle.respond(0, &[sample_attr(99, WireFileType::RegularFile, 0).to_token()], &[]).await.unwrap();
                }
                ops::RELEASE_FILE_HANDLE => {
                    handle.respond(0, &[], &[]).await.unwrap();
                }
                _ => {
                    handle.respond(JdfsErrno::Nosys.to_wire(), &[], &[]).await.unwrap();
                }
            }
        }
    });

    RpcClient::new(split(TcpStream::connect(addr).await.unwrap()).0)
}

/// A realistic session: mount, miss a lookup, create a file, write to
/// it, read it back, and release the handle — each call landing on the
/// same connection, in order, with the right payload shape.
#[tokio::test]
async fn full_session_mount_create_write_read_release() {
    let rpc = scripted_server().await;

    let (root, uid, gid) = rpc.mount(false, "/").await.unwrap();
    assert_eq!((root, uid, gid), (1, 501, 20));

    let miss = rpc.lookup_inode(root, std::ffi::OsStr::new("missing.txt")).await;
    assert!(matches!(miss, Err(JdfsErrno::Noent)));

    let (entry, handle) = rpc.create_file(root, std::ffi::OsStr::new("new.txt"), 0o644, 0).await.unwrap();
    assert_eq!(entry.inode, 99);

    let written = rpc.write_file(handle, 0, b"hello").await.unwrap();
    assert_eq!(written as usize, b"hello".len());

    let read_back = rpc.read_file(handle, 0, 64).await.unwrap();
    assert_eq!(read_back.as_slice(), b"written by the fake server");

    rpc.release_file_handle(handle).await.unwrap();
}

/// `SetInodeAttributes` with only a size change (a truncate) still goes
/// through the same `RpcClient::call` error-mapping path as every other
/// op, within the same session as the rest of a typical write workflow.
#[tokio::test]
async fn set_attributes_after_create_uses_the_same_session() {
    let rpc = scripted_server().await;
    rpc.mount(false, "/").await.unwrap();
    let (entry, handle) = rpc.create_file(1, std::ffi::OsStr::new("truncated.txt"), 0o644, 0).await.unwrap();
    rpc.release_file_handle(handle).await.unwrap();

    let attr = rpc
        .set_inode_attributes(entry.inode, SetAttrRequest { size: Some(0), mode: None, atime: None, mtime: None })
        .await
        .unwrap();
    assert_eq!(attr.inode, 99);
}

/// A call the fake server doesn't recognize still decodes as a portable
/// `JdfsErrno`, not a transport-level failure — exercising the same
/// wire-error path a real `Nosys` from `jdfsd` would take.
#[tokio::test]
async fn unscripted_call_surfaces_as_a_portable_errno() {
    let rpc = scripted_server().await;
    let err = rpc.forget_inode(0, 0).await;
    assert!(matches!(err, Err(JdfsErrno::Nosys)));
}
