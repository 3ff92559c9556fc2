//! The callable names exposed on the command connection (spec §6) and on
//! the notify connection. Centralized here so client and server can never
//! drift on spelling.

pub const MOUNT: &str = "Mount";
pub const STATFS: &str = "StatFS";
pub const LOOKUP_INODE: &str = "LookUpInode";
pub const GET_INODE_ATTRIBUTES: &str = "GetInodeAttributes";
pub const SET_INODE_ATTRIBUTES: &str = "SetInodeAttributes";
pub const FORGET_INODE: &str = "ForgetInode";
pub const MKDIR: &str = "MkDir";
pub const CREATE_FILE: &str = "CreateFile";
pub const CREATE_SYMLINK: &str = "CreateSymlink";
pub const CREATE_LINK: &str = "CreateLink";
pub const RENAME: &str = "Rename";
pub const RMDIR: &str = "RmDir";
pub const UNLINK: &str = "Unlink";
pub const OPEN_DIR: &str = "OpenDir";
pub const READ_DIR: &str = "ReadDir";
pub const RELEASE_DIR_HANDLE: &str = "ReleaseDirHandle";
pub const OPEN_FILE: &str = "OpenFile";
pub const READ_FILE: &str = "ReadFile";
pub const WRITE_FILE: &str = "WriteFile";
pub const SYNC_FILE: &str = "SyncFile";
pub const FLUSH_FILE: &str = "FlushFile";
pub const RELEASE_FILE_HANDLE: &str = "ReleaseFileHandle";
pub const READ_SYMLINK: &str = "ReadSymlink";
pub const GET_XATTR: &str = "GetXattr";
pub const SET_XATTR: &str = "SetXattr";
pub const LIST_XATTR: &str = "ListXattr";
pub const REMOVE_XATTR: &str = "RemoveXattr";

/// Pushed server → client on the notify connection; never a reply.
pub const INVALIDATE_FILE_CONTENT: &str = "InvalidateFileContent";
pub const INVALIDATE_DIR_ENTRY: &str = "InvalidateDirEntry";

/// Default TCP port for the command/notify connections (spec §6).
pub const DEFAULT_PORT: u16 = 1112;
