//! Process-wide server state, constructed once at startup and passed
//! explicitly rather than kept behind ambient globals.

use crate::buffer_pool::PageBufferPool;
use crate::icd::{Icd, LoadedMeta, ROOT_INODE};
use crate::notify::NotifyRegistry;
use jdfs_proto::{ChildInodeEntry, InodeAttributes, JdfsErrno, RpcHandle, WireFileType, WireTime};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub struct ServerContext {
    /// Absolute path of the exported directory on the host — the
    /// session's effective root after a `Mount`'s `jdfs_path` has been
    /// resolved against the server's configured export directory.
    pub export_root: PathBuf,
    /// Held open for the session's lifetime so `StatFS` can `fstatvfs`
    /// the actual mounted subtree rather than re-resolving a path.
    pub root_dir: std::fs::File,
    pub root_dev: u64,
    pub uid: u32,
    pub gid: u32,
    pub read_only: bool,
    pub meta_attrs_cache_ttl: Duration,
    pub dir_children_cache_ttl: Duration,
    pub icd: Icd,
    pub notify: NotifyRegistry,
    pub buffers: PageBufferPool,
}

impl ServerContext {
    /// Validates a client-supplied `jdfs_path` against the server's
    /// configured export directory and returns the resolved, canonical
    /// effective root for the session. Rejects any path that would
    /// escape the export directory, whether via a literal `..`
    /// component or a symlink — `canonicalize` resolves both before the
    /// prefix check runs.
    pub fn resolve_export_path(export_root: &Path, jdfs_path: &str) -> io::Result<PathBuf> {
        let canonical_root = export_root.canonicalize()?;
        let candidate = if jdfs_path.is_empty() { canonical_root.clone() } else { canonical_root.join(jdfs_path) };
        let canonical_candidate = candidate.canonicalize()?;
        if canonical_candidate != canonical_root && !canonical_candidate.starts_with(&canonical_root) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "jdfs_path escapes the export root"));
        }
        Ok(canonical_candidate)
    }

    /// Opens `effective_root` (already validated by
    /// [`Self::resolve_export_path`]) and builds the context one
    /// session's dispatch loop closes over. Called once per accepted
    /// connection, after that connection's `Mount` frame has been read.
    pub fn open(
        effective_root: PathBuf,
        read_only: bool,
        meta_attrs_cache_ms: u64,
        dir_children_cache_ms: u64,
        notify: RpcHandle,
    ) -> io::Result<Self> {
        let root_dir = std::fs::File::open(&effective_root)?;
        let meta = std::fs::symlink_metadata(&effective_root)?;
        let attr = metadata_to_attr(ROOT_INODE, &meta);
        let icd = Icd::new(meta.dev(), attr, Instant::now());
        Ok(ServerContext {
            export_root: effective_root,
            root_dir,
            root_dev: meta.dev(),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            read_only,
            meta_attrs_cache_ttl: Duration::from_millis(meta_attrs_cache_ms),
            dir_children_cache_ttl: Duration::from_millis(dir_children_cache_ms),
            icd,
            notify: NotifyRegistry::new(notify),
            buffers: PageBufferPool::new(),
        })
    }

    /// Absolute host path for an export-root-relative path.
    pub fn host_path(&self, relative: &Path) -> PathBuf {
        self.export_root.join(relative)
    }

    /// `GetInodeAttributes`: if cached within the TTL, returns the cache; else re-`lstat`s through `reachedThrough` in
    /// reverse-insertion order until one still names the same inode/dev,
    /// pruning paths that no longer resolve.
    pub fn refresh_attrs(&self, inode: u64) -> Result<InodeAttributes, JdfsErrno> {
        let (snap, _) = self.icd.get_inode(inode, false).ok_or(JdfsErrno::Noent)?;
        if snap.last_checked.elapsed() < self.meta_attrs_cache_ttl {
            return Ok(snap.attr);
        }

        let candidates = self.icd.reached_through_paths(inode);
        let mut outdated = Vec::new();
        for candidate in &candidates {
            let host = self.host_path(candidate);
            match std::fs::symlink_metadata(&host) {
                Ok(meta) if meta.ino() == inode && meta.dev() == self.root_dev => {
                    let attr = metadata_to_attr(inode, &meta);
                    self.icd.load_inode(
                        0,
                        LoadedMeta {
                            inode,
                            dev: meta.dev(),
                            attr,
                            path: candidate.clone(),
                        },
                        &outdated,
                        None,
                        Instant::now(),
                    );
                    return Ok(attr);
                }
                _ => outdated.push(candidate.clone()),
            }
        }
        // None resolved: the record is "lost" — prune every stale path we
        // tried but leave the record for forget to reap.
        self.icd.load_inode(
            0,
            LoadedMeta {
                inode,
                dev: self.root_dev,
                attr: self
                    .icd
                    .get_inode(inode, false)
                    .map(|(s, _)| s.attr)
                    .unwrap_or(zero_attr(inode)),
                path: candidates.first().cloned().unwrap_or_default(),
            },
            &outdated,
            None,
            Instant::now(),
        );
        Err(JdfsErrno::Noent)
    }

    /// Re-verifies `inode` still resolves and returns its current
    /// export-root-relative path. Used by every mutating op that needs a
    /// trustworthy path before shelling out to a syscall.
    pub fn resolved_path(&self, inode: u64) -> Result<PathBuf, JdfsErrno> {
        self.refresh_attrs(inode)?;
        self.icd.reached_through_paths(inode).into_iter().next().ok_or(JdfsErrno::Noent)
    }

    /// `LookupInode(parent, name)`: serves from the parent's cached
    /// children map when fresh; otherwise re-`readdir`s the parent,
    /// rebuilds the map, and loads every child into the registry
    /// (incrementing refcount only for the matched one).
    ///
    /// When the children map is fresh, the matched child's already-cached
    /// attributes are returned outright — `rebuild_children` already
    /// re-`lstat`s every child when it runs, so a second `lstat` here would
    /// just be redundant work the cache exists to avoid (spec §4.4).
    pub fn lookup(&self, parent: u64, name: &std::ffi::OsStr) -> Result<ChildInodeEntry, JdfsErrno> {
        let (parent_snap, _) = self.icd.get_inode(parent, false).ok_or(JdfsErrno::Noent)?;
        let parent_path = parent_snap.reached_through.first().cloned().unwrap_or_default();

        let fresh = parent_snap
            .children
            .filter(|_| parent_snap.last_children_checked.map(|t| t.elapsed() < self.dir_children_cache_ttl).unwrap_or(false));

        if let Some(children) = &fresh {
            let child_inode = *children.get(name).ok_or(JdfsErrno::Noent)?;
            if let Some((child_snap, _)) = self.icd.get_inode(child_inode, false) {
                let child_path = super::icd::join_relative(&parent_path, name);
                self.icd.load_inode(
                    1,
                    LoadedMeta {
                        inode: child_inode,
                        dev: self.root_dev,
                        attr: child_snap.attr,
                        path: child_path,
                    },
                    &[],
                    None,
                    Instant::now(),
                );
                return Ok(ChildInodeEntry {
                    inode: child_inode,
                    generation: 0,
                    attr: child_snap.attr,
                    attr_valid_ms: self.meta_attrs_cache_ttl.as_millis() as u64,
                    entry_valid_ms: self.dir_children_cache_ttl.as_millis() as u64,
                });
            }
            // The cached children map named a record that has since been
            // reaped (forgotten down to zero refcount): fall through to a
            // fresh readdir rather than trust a dangling inode number.
        }

        let children = match fresh {
            Some(children) => children,
            None => self.rebuild_children(parent, &parent_path)?,
        };

        let child_inode = *children.get(name).ok_or(JdfsErrno::Noent)?;
        let child_path = super::icd::join_relative(&parent_path, name);
        let host = self.host_path(&child_path);
        let meta = std::fs::symlink_metadata(&host).map_err(JdfsErrno::from)?;
        let attr = metadata_to_attr(child_inode, &meta);
        self.icd.load_inode(
            1,
            LoadedMeta {
                inode: child_inode,
                dev: meta.dev(),
                attr,
                path: child_path,
            },
            &[],
            None,
            Instant::now(),
        );
        Ok(ChildInodeEntry {
            inode: child_inode,
            generation: 0,
            attr,
            attr_valid_ms: self.meta_attrs_cache_ttl.as_millis() as u64,
            entry_valid_ms: self.dir_children_cache_ttl.as_millis() as u64,
        })
    }

    /// Re-`readdir`s `parent_path`, publishing a fresh children map and
    /// loading (without incrementing refcount) every child it names.
    pub fn rebuild_children(&self, parent: u64, parent_path: &Path) -> Result<super::icd::ChildrenMap, JdfsErrno> {
        let host = self.host_path(parent_path);
        let mut children = super::icd::ChildrenMap::new();
        let now = Instant::now();
        for entry in std::fs::read_dir(&host).map_err(JdfsErrno::from)? {
            let entry = entry.map_err(JdfsErrno::from)?;
            let meta = entry.metadata().map_err(JdfsErrno::from)?;
            if meta.dev() != self.root_dev {
                continue;
            }
            let name = entry.file_name();
            let child_path = super::icd::join_relative(parent_path, &name);
            let attr = metadata_to_attr(meta.ino(), &meta);
            self.icd.load_inode(
                0,
                LoadedMeta {
                    inode: meta.ino(),
                    dev: meta.dev(),
                    attr,
                    path: child_path,
                },
                &[],
                None,
                now,
            );
            children.insert(name, meta.ino());
        }
        self.icd.load_inode(
            0,
            LoadedMeta {
                inode: parent,
                dev: self.root_dev,
                attr: self.icd.get_inode(parent, false).map(|(s, _)| s.attr).unwrap_or(zero_attr(parent)),
                path: parent_path.to_path_buf(),
            },
            &[],
            Some(children.clone()),
            now,
        );
        Ok(children)
    }
}

pub fn zero_attr(inode: u64) -> InodeAttributes {
    InodeAttributes {
        inode,
        size: 0,
        nlink: 0,
        file_type: WireFileType::RegularFile,
        perm: 0,
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

/// Translates host `std::fs::Metadata` into the wire attribute type.
/// `crtime` is zero on platforms other than macOS, which have no
/// equivalent stat field to read it from.
pub fn metadata_to_attr(inode: u64, meta: &std::fs::Metadata) -> InodeAttributes {
    let mode = meta.mode();
    let file_type = if meta.file_type().is_dir() {
        WireFileType::Directory
    } else if meta.file_type().is_symlink() {
        WireFileType::Symlink
    } else {
        WireFileType::RegularFile
    };
    InodeAttributes {
        inode,
        size: meta.size(),
        nlink: meta.nlink() as u32,
        file_type,
        perm: (mode & 0o7777) as u16,
        setuid: mode & libc::S_ISUID as u32 != 0,
        setgid: mode & libc::S_ISGID as u32 != 0,
        uid: meta.uid(),
        gid: meta.gid(),
        atime: WireTime::from_system_time(meta.accessed().unwrap_or(std::time::UNIX_EPOCH)),
        mtime: WireTime::from_system_time(meta.modified().unwrap_or(std::time::UNIX_EPOCH)),
        ctime: WireTime {
            secs: meta.ctime(),
            nanos: meta.ctime_nsec() as u32,
        },
        crtime: crtime_of(meta),
    }
}

#[cfg(target_os = "macos")]
fn crtime_of(meta: &std::fs::Metadata) -> WireTime {
    meta.created()
        .map(WireTime::from_system_time)
        .unwrap_or(WireTime::ZERO)
}

#[cfg(not(target_os = "macos"))]
fn crtime_of(_meta: &std::fs::Metadata) -> WireTime {
    WireTime::ZERO
}
