//! Open file/directory handle records.

use std::ffi::OsString;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use tokio::sync::Notify;

/// One entry in a directory's snapshotted listing: `OpenDir` snapshots
/// the directory as a list of `{offset, inode, name, type}` records.
#[derive(Clone)]
pub struct DirEntrySnapshot {
    pub name: OsString,
    pub inode: u64,
    pub file_type: jdfs_proto::WireFileType,
}

pub struct ICFileHandle {
    /// Arena index of the owning `ICInode`.
    pub owner: usize,
    /// Redundant copy of the inode id, for fast logging without a lookup.
    pub inode: u64,
    pub file: Arc<std::fs::File>,
    pub writable: bool,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    /// Outstanding-operations counter: guards close-during-read. `release`
    /// waits for this to reach zero before closing the file.
    pub op_counter: Arc<AtomicI64>,
    pub idle_notify: Arc<Notify>,
}

impl ICFileHandle {
    pub fn new(owner: usize, inode: u64, file: std::fs::File, writable: bool) -> Self {
        ICFileHandle {
            owner,
            inode,
            file: Arc::new(file),
            writable,
            prev: None,
            next: None,
            op_counter: Arc::new(AtomicI64::new(0)),
            idle_notify: Arc::new(Notify::new()),
        }
    }
}

/// A directory handle: a snapshot taken once at `opendir` time. The
/// kernel reads paged slices of it by offset; the snapshot never changes
/// underneath a slow reader even if the directory mutates meanwhile.
pub struct ICDirHandle {
    pub owner: usize,
    pub inode: u64,
    pub entries: Arc<Vec<DirEntrySnapshot>>,
}
