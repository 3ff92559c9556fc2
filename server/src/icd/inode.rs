//! The in-core inode record.

use jdfs_proto::InodeAttributes;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Instant;

/// A directory's cached children, keyed by entry name.
pub type ChildrenMap = HashMap<OsString, u64>;

pub struct ICInode {
    pub inode: u64,
    pub dev: u64,
    pub attr: InodeAttributes,
    /// Incremented by each kernel lookup/open reply, decremented by a
    /// matching `forget`. The record is destroyed at zero (except root).
    pub refcnt: i64,
    /// Ordered list of relative paths, from the export root, by which
    /// this inode has been observed. More than one entry means a hard
    /// link. Used to re-resolve the inode after renames/unlinks
    /// invalidate some of the paths.
    pub reached_through: Vec<PathBuf>,
    pub last_checked: Instant,
    pub last_children_checked: Option<Instant>,
    /// `None` when the cache is cold or was invalidated. Never mutated in
    /// place once published — invalidation replaces it with `None` so a
    /// reader holding an older clone stays sound without extra locking.
    pub children: Option<ChildrenMap>,
    /// Head of this inode's doubly linked list of open file handles
    /// (arena indices), or `None` if none are open.
    pub fh_head: Option<usize>,
}

impl ICInode {
    pub fn new(inode: u64, dev: u64, attr: InodeAttributes, refcnt: i64, path: PathBuf, checked_at: Instant) -> Self {
        ICInode {
            inode,
            dev,
            attr,
            refcnt,
            reached_through: vec![path],
            last_checked: checked_at,
            last_children_checked: None,
            children: None,
            fh_head: None,
        }
    }

    /// A snapshot of this record, safe to hand to a caller outside the
    /// icd's mutex.
    pub fn snapshot(&self) -> ICInodeSnapshot {
        ICInodeSnapshot {
            inode: self.inode,
            attr: self.attr,
            refcnt: self.refcnt,
            reached_through: self.reached_through.clone(),
            last_checked: self.last_checked,
            children: self.children.clone(),
            last_children_checked: self.last_children_checked,
        }
    }
}

#[derive(Clone)]
pub struct ICInodeSnapshot {
    pub inode: u64,
    pub attr: InodeAttributes,
    pub refcnt: i64,
    pub reached_through: Vec<PathBuf>,
    pub last_checked: Instant,
    pub children: Option<ChildrenMap>,
    pub last_children_checked: Option<Instant>,
}
