//! The exported-filesystem reactor: one function per RPC callable, each
//! following the skeleton "resolve the target inode through the icd,
//! perform the local syscall, update caches, return".
//!
//! Every blocking syscall runs inside `tokio::task::spawn_blocking` — the
//! reactor itself is async (one Tokio task per inbound conversation), but
//! `std::fs`/`libc` calls are ordinary blocking I/O.

mod create;
mod delete;
mod dir;
mod file;
mod lookup;
mod rename;
mod statfs;
mod symlink;
mod xattr;

pub use create::{create_file, create_link, create_symlink, mkdir};
pub use delete::{rmdir, unlink};
pub use dir::{open_dir, read_dir, release_dir_handle};
pub use file::{flush_file, open_file, read_file, release_file_handle, sync_file, write_file};
pub use lookup::{forget_inode, get_inode_attributes, lookup_inode, set_inode_attributes, SetAttrRequest};
pub use rename::rename;
pub use statfs::statfs;
pub use symlink::read_symlink;
pub use xattr::{get_xattr, list_xattr, remove_xattr, set_xattr};

pub const O_RDONLY: i32 = libc::O_RDONLY;
pub const O_RDWR: i32 = libc::O_RDWR;
pub const O_WRONLY: i32 = libc::O_WRONLY;
pub const O_APPEND: i32 = libc::O_APPEND;
pub const O_CREAT: i32 = libc::O_CREAT;
pub const O_EXCL: i32 = libc::O_EXCL;
pub const O_TRUNC: i32 = libc::O_TRUNC;
