//! Attribute operations: `getattr`/`setattr`, plus the wire-to-kernel
//! attribute conversion every other module in this crate reaches for.

use super::FsWrapper;
use crate::rpc::SetAttrRequest;
use fuser::{FileAttr, FileType, ReplyAttr, Request, TimeOrNow};
use jdfs_proto::{InodeAttributes, WireFileType};
use std::time::{Duration, SystemTime};

/// Translates a wire `InodeAttributes` into the kernel-facing `FileAttr`.
/// `perm` already carries the setuid/setgid/sticky bits in its top three
/// octal digits, so there is nothing left to OR in here.
pub(super) fn to_fuse_attr(attr: InodeAttributes) -> FileAttr {
    FileAttr {
        ino: attr.inode,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: attr.atime.to_system_time(),
        mtime: attr.mtime.to_system_time(),
        ctime: attr.ctime.to_system_time(),
        crtime: attr.crtime.to_system_time(),
        kind: match attr.file_type {
            WireFileType::RegularFile => FileType::RegularFile,
            WireFileType::Directory => FileType::Directory,
            WireFileType::Symlink => FileType::Symlink,
        },
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        flags: 0,
        blksize: 4096,
    }
}

fn time_or_now(t: TimeOrNow) -> SystemTime {
    match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfs_proto::WireTime;

    #[test]
    fn to_fuse_attr_leaves_perm_bits_untouched_and_maps_the_file_type() {
        let attr = InodeAttributes {
            inode: 5,
            size: 9000,
            nlink: 3,
            file_type: WireFileType::Directory,
            perm: 0o7755,
            setuid: true,
            setgid: true,
            uid: 501,
            gid: 20,
            atime: WireTime { secs: 10, nanos: 0 },
            mtime: WireTime { secs: 20, nanos: 0 },
            ctime: WireTime { secs: 30, nanos: 0 },
            crtime: WireTime::ZERO,
        };
        let fuse_attr = to_fuse_attr(attr);
        assert_eq!(fuse_attr.ino, 5);
        assert_eq!(fuse_attr.kind, FileType::Directory);
        assert_eq!(fuse_attr.perm, 0o7755);
        assert_eq!(fuse_attr.nlink, 3);
        assert_eq!(fuse_attr.blocks, 9000_u64.div_ceil(512));
    }

    #[test]
    fn to_fuse_attr_rounds_block_count_up_to_the_full_512_byte_sector() {
        let mut attr = InodeAttributes {
            inode: 1,
            size: 513,
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
        };
        assert_eq!(to_fuse_attr(attr).blocks, 2);
        attr.size = 512;
        assert_eq!(to_fuse_attr(attr).blocks, 1);
    }
}

/// FUSE `getattr`: a straight `GetInodeAttributes` call, replied with the
/// locally configured kernel TTL rather than whatever the server thinks
/// fresh is — the server's own `attr_valid_ms` only rides along on
/// `LookUpInode`/creation replies (spec §4.4), not this one.
pub(super) fn getattr(fs: &FsWrapper, _req: &Request, ino: u64, reply: ReplyAttr) {
    let rpc = fs.fs.rpc.clone();
    let ttl = Duration::from_secs(fs.fs.config.kernel_attr_timeout_seconds);
    match fs.run_blocking(async move { rpc.get_inode_attributes(ino).await }) {
        Ok(attr) => reply.attr(&ttl, &to_fuse_attr(attr)),
        Err(err) => reply.error(err.to_errno()),
    }
}

#[allow(clippy::too_many_arguments)]
pub(super) fn setattr(
    fs: &FsWrapper,
    _req: &Request<'_>,
    ino: u64,
    mode: Option<u32>,
    _uid: Option<u32>,
    _gid: Option<u32>,
    size: Option<u64>,
    atime: Option<TimeOrNow>,
    mtime: Option<TimeOrNow>,
    _ctime: Option<SystemTime>,
    _fh: Option<u64>,
    _crtime: Option<SystemTime>,
    _chgtime: Option<SystemTime>,
    _bkuptime: Option<SystemTime>,
    _flags: Option<u32>,
    reply: ReplyAttr,
) {
    let rpc = fs.fs.rpc.clone();
    let ttl = Duration::from_secs(fs.fs.config.kernel_attr_timeout_seconds);
    let req = SetAttrRequest {
        size,
        mode,
        atime: atime.map(time_or_now),
        mtime: mtime.map(time_or_now),
    };
    match fs.run_blocking(async move { rpc.set_inode_attributes(ino, req).await }) {
        Ok(attr) => reply.attr(&ttl, &to_fuse_attr(attr)),
        Err(err) => reply.error(err.to_errno()),
    }
}
