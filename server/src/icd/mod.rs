//! The in-core directory: the server's registry mapping stable inode ids
//! to cached attributes, open file/dir handles, and the paths through
//! which each inode was reached, across a namespace that mutates under
//! it.
//!
//! A single `std::sync::Mutex` guards the whole table. Every critical
//! section here is memory-only — no syscall, no wire I/O, and no handle
//! op-counter wait ever runs while the lock is held. That's why a
//! blocking std mutex is the right tool instead of `tokio::sync::Mutex`:
//! nothing inside the lock ever awaits.

mod arena;
mod inode;

pub mod handle;

pub use arena::Arena;
pub use handle::{DirEntrySnapshot, ICDirHandle, ICFileHandle};
pub use inode::{ChildrenMap, ICInode, ICInodeSnapshot};

use jdfs_proto::InodeAttributes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Session-visible id of the export root, fixed regardless of the host
/// filesystem's own root inode number.
pub const ROOT_INODE: u64 = 1;

/// Arguments to [`Icd::load_inode`]: a freshly `lstat`ed child, about to be
/// recorded or merged into the registry.
pub struct LoadedMeta {
    pub inode: u64,
    pub dev: u64,
    pub attr: InodeAttributes,
    pub path: PathBuf,
}

struct Inner {
    inodes: Arena<ICInode>,
    id_index: HashMap<u64, usize>,
    file_handles: Arena<ICFileHandle>,
    dir_handles: Arena<ICDirHandle>,
}

pub struct Icd {
    inner: Mutex<Inner>,
    root_dev: u64,
}

/// A snapshot of a handle, safe to act on outside the icd's lock.
pub struct FileHandleSnapshot {
    pub handle_id: u64,
    pub inode: u64,
    pub file: Arc<std::fs::File>,
    pub writable: bool,
    pub op_counter: Arc<std::sync::atomic::AtomicI64>,
    pub idle_notify: Arc<tokio::sync::Notify>,
}

impl Icd {
    /// `root_attr`/`root_path` describe the export root itself, loaded
    /// with an unforgettable reference count.
    pub fn new(root_dev: u64, root_attr: InodeAttributes, now: Instant) -> Self {
        let mut inodes = Arena::new();
        let mut id_index = HashMap::new();
        let root = ICInode::new(ROOT_INODE, root_dev, root_attr, 1, PathBuf::new(), now);
        let idx = inodes.insert(root);
        id_index.insert(ROOT_INODE, idx);
        Icd {
            inner: Mutex::new(Inner {
                inodes,
                id_index,
                file_handles: Arena::new(),
                dir_handles: Arena::new(),
            }),
            root_dev,
        }
    }

    pub fn root_dev(&self) -> u64 {
        self.root_dev
    }

    /// Records (or merges into) an inode's record. Nested-device children
    /// are refused, keeping nested mounts under the export root hidden.
    pub fn load_inode(
        &self,
        incref: i64,
        meta: LoadedMeta,
        outdated_paths: &[PathBuf],
        children: Option<ChildrenMap>,
        check_time: Instant,
    ) -> Option<u64> {
        if meta.dev != self.root_dev {
            tracing::warn!(inode = meta.inode, dev = meta.dev, "refusing nested-device inode");
            return None;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(&idx) = inner.id_index.get(&meta.inode) {
            let rec = inner.inodes.get_mut(idx).expect("id_index must stay consistent");
            rec.reached_through.retain(|p| !outdated_paths.iter().any(|o| o == p));
            if !rec.reached_through.iter().any(|p| p == &meta.path) {
                rec.reached_through.push(meta.path.clone());
            }
            rec.attr = meta.attr;
            if let Some(c) = children {
                let fresh = rec
                    .last_children_checked
                    .map(|prev| check_time >= prev)
                    .unwrap_or(true);
                if fresh {
                    rec.children = Some(c);
                    rec.last_children_checked = Some(check_time);
                }
            }
            rec.last_checked = check_time;
            rec.refcnt += incref;
        } else {
            let mut rec = ICInode::new(meta.inode, meta.dev, meta.attr, incref, meta.path, check_time);
            if let Some(c) = children {
                rec.children = Some(c);
                rec.last_children_checked = Some(check_time);
            }
            let idx = inner.inodes.insert(rec);
            inner.id_index.insert(meta.inode, idx);
        }
        Some(meta.inode)
    }

    /// Reads a snapshot of the inode record. When `want_handle` is set,
    /// also picks a preferred open handle (writable over read-only) and
    /// bumps its op counter atomically with the snapshot, so the handle
    /// cannot be freed by a concurrent `release` before the caller acts on
    /// it.
    pub fn get_inode(&self, inode: u64, want_handle: bool) -> Option<(ICInodeSnapshot, Option<FileHandleSnapshot>)> {
        let mut inner = self.inner.lock().unwrap();
        let idx = *inner.id_index.get(&inode)?;
        let rec_snapshot = inner.inodes.get(idx)?.snapshot();

        if !want_handle {
            return Some((rec_snapshot, None));
        }

        let mut best: Option<usize> = None;
        let mut cursor = inner.inodes.get(idx).and_then(|r| r.fh_head);
        while let Some(h_idx) = cursor {
            let h = inner.file_handles.get(h_idx).expect("fh list consistency");
            if h.writable {
                best = Some(h_idx);
                break;
            }
            if best.is_none() {
                best = Some(h_idx);
            }
            cursor = h.next;
        }

        let handle_snapshot = best.map(|h_idx| {
            let h = inner.file_handles.get(h_idx).expect("fh list consistency");
            h.op_counter.fetch_add(1, Ordering::AcqRel);
            FileHandleSnapshot {
                handle_id: h_idx as u64,
                inode: h.inode,
                file: h.file.clone(),
                writable: h.writable,
                op_counter: h.op_counter.clone(),
                idle_notify: h.idle_notify.clone(),
            }
        });

        Some((rec_snapshot, handle_snapshot))
    }

    /// Looks a file handle up directly by id (as `ReadFile`/`WriteFile`
    /// address it, rather than via its owning inode) and, when
    /// `inc_opc` is set, bumps its op counter atomically with the lookup
    /// so it cannot be freed by a concurrent `release` before the caller
    /// acts on it.
    pub fn get_file_handle(&self, handle_id: u64, inc_opc: bool) -> Option<FileHandleSnapshot> {
        let inner = self.inner.lock().unwrap();
        let h = inner.file_handles.get(handle_id as usize)?;
        if inc_opc {
            h.op_counter.fetch_add(1, Ordering::AcqRel);
        }
        Some(FileHandleSnapshot {
            handle_id,
            inode: h.inode,
            file: h.file.clone(),
            writable: h.writable,
            op_counter: h.op_counter.clone(),
            idle_notify: h.idle_notify.clone(),
        })
    }

    /// Releases a reference taken via [`Icd::get_inode`]'s handle op
    /// counter once the caller's syscall has completed.
    pub fn release_op(&self, snapshot: &FileHandleSnapshot) {
        if snapshot.op_counter.fetch_sub(1, Ordering::AcqRel) == 1 {
            snapshot.idle_notify.notify_waiters();
        }
    }

    /// Decrements refcount by `n`; destroys the record at zero (root is
    /// never forgotten).
    pub fn forget_inode(&self, inode: u64, n: i64) {
        if inode == ROOT_INODE {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let Some(&idx) = inner.id_index.get(&inode) else {
            return;
        };
        let rec = inner.inodes.get_mut(idx).expect("id_index consistency");
        rec.refcnt -= n;
        if rec.refcnt <= 0 {
            inner.id_index.remove(&inode);
            inner.inodes.remove(idx);
        }
    }

    /// Clears a directory's cached children map. The map itself is never
    /// mutated in place; a reader holding a prior clone stays sound.
    pub fn invalidate_children(&self, inode: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&idx) = inner.id_index.get(&inode) {
            if let Some(rec) = inner.inodes.get_mut(idx) {
                rec.children = None;
            }
        }
    }

    pub fn create_dir_handle(&self, inode: u64, entries: Vec<DirEntrySnapshot>) -> Option<u64> {
        let mut inner = self.inner.lock().unwrap();
        let owner = *inner.id_index.get(&inode)?;
        let handle = ICDirHandle {
            owner,
            inode,
            entries: Arc::new(entries),
        };
        Some(inner.dir_handles.insert(handle) as u64)
    }

    pub fn get_dir_handle(&self, handle_id: u64) -> Option<Arc<Vec<DirEntrySnapshot>>> {
        let inner = self.inner.lock().unwrap();
        inner.dir_handles.get(handle_id as usize).map(|h| h.entries.clone())
    }

    pub fn release_dir_handle(&self, handle_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.dir_handles.remove(handle_id as usize);
    }

    /// Inserts a new open file handle at the head of its inode's handle
    /// list.
    pub fn create_file_handle(&self, inode: u64, file: std::fs::File, writable: bool) -> Option<u64> {
        let mut inner = self.inner.lock().unwrap();
        let owner = *inner.id_index.get(&inode)?;
        let mut new_handle = ICFileHandle::new(owner, inode, file, writable);
        let old_head = inner.inodes.get(owner).expect("owner must exist").fh_head;
        new_handle.next = old_head;
        let new_idx = inner.file_handles.insert(new_handle);
        if let Some(old_head) = old_head {
            inner.file_handles.get_mut(old_head).expect("fh list consistency").prev = Some(new_idx);
        }
        inner.inodes.get_mut(owner).expect("owner must exist").fh_head = Some(new_idx);
        Some(new_idx as u64)
    }

    /// Waits for the handle's outstanding-operations counter to drain,
    /// then unlinks and frees it, dropping the underlying file. Re-checks
    /// the counter after reacquiring the lock: a `get_inode` call can
    /// race in and grab this handle again between the wait loop observing
    /// zero and the lock being retaken, in which case we wait again
    /// rather than closing a handle with new work in flight.
    pub async fn release_file_handle(&self, handle_id: u64) {
        loop {
            let (op_counter, idle_notify) = {
                let inner = self.inner.lock().unwrap();
                match inner.file_handles.get(handle_id as usize) {
                    Some(h) => (h.op_counter.clone(), h.idle_notify.clone()),
                    None => return,
                }
            };
            loop {
                let notified = idle_notify.notified();
                if op_counter.load(Ordering::Acquire) == 0 {
                    break;
                }
                notified.await;
            }

            let mut inner = self.inner.lock().unwrap();
            if op_counter.load(Ordering::Acquire) != 0 {
                continue;
            }
            let Some(h) = inner.file_handles.remove(handle_id as usize) else {
                return;
            };
            match h.prev {
                Some(prev) => inner.file_handles.get_mut(prev).expect("fh list consistency").next = h.next,
                None => {
                    if let Some(owner) = inner.inodes.get_mut(h.owner) {
                        owner.fh_head = h.next;
                    }
                }
            }
            if let Some(next) = h.next {
                inner.file_handles.get_mut(next).expect("fh list consistency").prev = h.prev;
            }
            return;
        }
    }

    /// Re-resolves an inode's reached-through paths by `lstat`ing each in
    /// reverse-insertion order until one still names the same inode/dev
    /// pair. Returns the first valid path and any paths that no longer
    /// resolve, for the caller to pass back into a follow-up
    /// `load_inode` as outdated paths.
    pub fn reached_through_paths(&self, inode: u64) -> Vec<PathBuf> {
        let inner = self.inner.lock().unwrap();
        inner
            .id_index
            .get(&inode)
            .and_then(|&idx| inner.inodes.get(idx))
            .map(|rec| rec.reached_through.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

/// Joins an export-root-relative path with a child name.
pub fn join_relative(parent: &Path, name: &std::ffi::OsStr) -> PathBuf {
    if parent.as_os_str().is_empty() {
        PathBuf::from(name)
    } else {
        parent.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfs_proto::{InodeAttributes, WireFileType, WireTime};

    fn dummy_attr(inode: u64) -> InodeAttributes {
        InodeAttributes {
            inode,
            size: 0,
            nlink: 1,
            file_type: WireFileType::RegularFile,
            perm: 0o644,
            setuid: false,
            setgid: false,
            uid: 0,
            gid: 0,
            atime: WireTime::ZERO,
            mtime: WireTime::ZERO,
            ctime: WireTime::ZERO,
            crtime: WireTime::ZERO,
        }
    }

    #[test]
    fn refcount_balance_removes_record_only_when_it_reaches_zero() {
        let icd = Icd::new(1, dummy_attr(ROOT_INODE), Instant::now());
        let meta = LoadedMeta {
            inode: 42,
            dev: 1,
            attr: dummy_attr(42),
            path: PathBuf::from("a.txt"),
        };
        icd.load_inode(3, meta, &[], None, Instant::now());
        icd.forget_inode(42, 2);
        assert!(icd.get_inode(42, false).is_some(), "record survives at refcnt 1");
        icd.forget_inode(42, 1);
        assert!(icd.get_inode(42, false).is_none(), "record destroyed at refcnt 0");
    }

    #[test]
    fn root_is_never_forgotten() {
        let icd = Icd::new(1, dummy_attr(ROOT_INODE), Instant::now());
        icd.forget_inode(ROOT_INODE, 1_000_000);
        assert!(icd.get_inode(ROOT_INODE, false).is_some());
    }

    #[test]
    fn nested_device_children_are_refused() {
        let icd = Icd::new(1, dummy_attr(ROOT_INODE), Instant::now());
        let meta = LoadedMeta {
            inode: 99,
            dev: 2,
            attr: dummy_attr(99),
            path: PathBuf::from("mnt"),
        };
        assert!(icd.load_inode(1, meta, &[], None, Instant::now()).is_none());
        assert!(icd.get_inode(99, false).is_none());
    }

    #[test]
    fn hardlinked_inode_keeps_second_path_after_first_is_pruned() {
        let icd = Icd::new(1, dummy_attr(ROOT_INODE), Instant::now());
        let first = LoadedMeta {
            inode: 7,
            dev: 1,
            attr: dummy_attr(7),
            path: PathBuf::from("x"),
        };
        icd.load_inode(1, first, &[], None, Instant::now());
        let second = LoadedMeta {
            inode: 7,
            dev: 1,
            attr: dummy_attr(7),
            path: PathBuf::from("sub/y"),
        };
        icd.load_inode(1, second, &[], None, Instant::now());

        // Unlink "x": the caller passes it as an outdated path on the next
        // observation of inode 7.
        let third = LoadedMeta {
            inode: 7,
            dev: 1,
            attr: dummy_attr(7),
            path: PathBuf::from("sub/y"),
        };
        icd.load_inode(0, third, &[PathBuf::from("x")], None, Instant::now());

        let (snap, _) = icd.get_inode(7, false).unwrap();
        assert_eq!(snap.reached_through, vec![PathBuf::from("sub/y")]);
    }

    #[tokio::test]
    async fn release_waits_for_outstanding_reads() {
        use tempfile::NamedTempFile;
        let tmp = NamedTempFile::new().unwrap();
        let icd = Icd::new(1, dummy_attr(ROOT_INODE), Instant::now());
        let meta = LoadedMeta {
            inode: 5,
            dev: 1,
            attr: dummy_attr(5),
            path: PathBuf::from("f"),
        };
        icd.load_inode(1, meta, &[], None, Instant::now());
        let file = std::fs::File::open(tmp.path()).unwrap();
        let handle_id = icd.create_file_handle(5, file, false).unwrap();

        let (_snap, handle) = icd.get_inode(5, true).unwrap();
        let handle = handle.expect("a handle exists");
        assert_eq!(handle.op_counter.load(Ordering::Acquire), 1);

        let icd = Arc::new(icd);
        let icd2 = icd.clone();
        let release_task = tokio::spawn(async move {
            icd2.release_file_handle(handle_id).await;
        });

        tokio::task::yield_now().await;
        assert!(!release_task.is_finished(), "release must block while op is outstanding");

        icd.release_op(&handle);
        release_task.await.unwrap();
    }
}
