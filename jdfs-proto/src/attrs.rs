//! Shared attribute types carried over the wire (spec §3). Encoded as a
//! fixed-order `Token::List` so both ends agree on field order without a
//! schema negotiation.

use crate::token::Token;

/// Nanosecond-precision absolute time, split the way the wire carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireTime {
    pub secs: i64,
    pub nanos: u32,
}

impl WireTime {
    pub const ZERO: WireTime = WireTime { secs: 0, nanos: 0 };

    pub fn from_system_time(t: std::time::SystemTime) -> Self {
        match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => WireTime {
                secs: d.as_secs() as i64,
                nanos: d.subsec_nanos(),
            },
            Err(e) => {
                let d = e.duration();
                WireTime {
                    secs: -(d.as_secs() as i64) - 1,
                    nanos: (1_000_000_000 - d.subsec_nanos()) % 1_000_000_000,
                }
            }
        }
    }

    pub fn to_system_time(self) -> std::time::SystemTime {
        if self.secs >= 0 {
            std::time::UNIX_EPOCH + std::time::Duration::new(self.secs as u64, self.nanos)
        } else {
            std::time::UNIX_EPOCH - std::time::Duration::new((-self.secs) as u64, 0)
                + std::time::Duration::from_nanos(self.nanos as u64)
        }
    }
}

/// File type bits, independent of `fuser`/`libc` so this crate has no FUSE
/// dependency of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFileType {
    RegularFile,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeAttributes {
    pub inode: u64,
    pub size: u64,
    pub nlink: u32,
    pub file_type: WireFileType,
    pub perm: u16,
    pub setuid: bool,
    pub setgid: bool,
    pub uid: u32,
    pub gid: u32,
    pub atime: WireTime,
    pub mtime: WireTime,
    pub ctime: WireTime,
    pub crtime: WireTime,
}

impl InodeAttributes {
    pub fn to_token(self) -> Token {
        let kind = match self.file_type {
            WireFileType::RegularFile => 0,
            WireFileType::Directory => 1,
            WireFileType::Symlink => 2,
        };
        Token::List(vec![
            Token::Int(self.inode as i64),
            Token::Int(self.size as i64),
            Token::Int(self.nlink as i64),
            Token::Int(kind),
            Token::Int(self.perm as i64),
            Token::Int(self.setuid as i64),
            Token::Int(self.setgid as i64),
            Token::Int(self.uid as i64),
            Token::Int(self.gid as i64),
            Token::Int(self.atime.secs),
            Token::Int(self.atime.nanos as i64),
            Token::Int(self.mtime.secs),
            Token::Int(self.mtime.nanos as i64),
            Token::Int(self.ctime.secs),
            Token::Int(self.ctime.nanos as i64),
            Token::Int(self.crtime.secs),
            Token::Int(self.crtime.nanos as i64),
        ])
    }

    pub fn from_token(tok: &Token) -> Option<InodeAttributes> {
        let l = tok.as_list()?;
        if l.len() != 17 {
            return None;
        }
        let i = |idx: usize| l[idx].as_int();
        let file_type = match i(3)? {
            0 => WireFileType::RegularFile,
            1 => WireFileType::Directory,
            2 => WireFileType::Symlink,
            _ => return None,
        };
        Some(InodeAttributes {
            inode: i(0)? as u64,
            size: i(1)? as u64,
            nlink: i(2)? as u32,
            file_type,
            perm: i(4)? as u16,
            setuid: i(5)? != 0,
            setgid: i(6)? != 0,
            uid: i(7)? as u32,
            gid: i(8)? as u32,
            atime: WireTime {
                secs: i(9)?,
                nanos: i(10)? as u32,
            },
            mtime: WireTime {
                secs: i(11)?,
                nanos: i(12)? as u32,
            },
            ctime: WireTime {
                secs: i(13)?,
                nanos: i(14)? as u32,
            },
            crtime: WireTime {
                secs: i(15)?,
                nanos: i(16)? as u32,
            },
        })
    }
}

/// A resolved directory child, as returned by `LookUpInode`/`ReadDir`
/// (spec's `ChildInodeEntry`). Generation is always 0 — inode ids are not
/// reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildInodeEntry {
    pub inode: u64,
    pub generation: u64,
    pub attr: InodeAttributes,
    pub attr_valid_ms: u64,
    pub entry_valid_ms: u64,
}

impl ChildInodeEntry {
    pub fn to_token(self) -> Token {
        Token::List(vec![
            Token::Int(self.inode as i64),
            Token::Int(self.generation as i64),
            self.attr.to_token(),
            Token::Int(self.attr_valid_ms as i64),
            Token::Int(self.entry_valid_ms as i64),
        ])
    }

    pub fn from_token(tok: &Token) -> Option<ChildInodeEntry> {
        let l = tok.as_list()?;
        if l.len() != 5 {
            return None;
        }
        Some(ChildInodeEntry {
            inode: l[0].as_int()? as u64,
            generation: l[1].as_int()? as u64,
            attr: InodeAttributes::from_token(&l[2])?,
            attr_valid_ms: l[3].as_int()? as u64,
            entry_valid_ms: l[4].as_int()? as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_token_round_trips() {
        let attr = InodeAttributes {
            inode: 7,
            size: 4096,
            nlink: 2,
            file_type: WireFileType::Directory,
            perm: 0o755,
            setuid: false,
            setgid: true,
            uid: 501,
            gid: 20,
            atime: WireTime { secs: 123, nanos: 456 },
            mtime: WireTime { secs: 789, nanos: 10 },
            ctime: WireTime { secs: 1, nanos: 2 },
            crtime: WireTime::ZERO,
        };
        let tok = attr.to_token();
        let back = InodeAttributes::from_token(&tok).unwrap();
        assert_eq!(attr, back);
    }

    #[test]
    fn wire_time_round_trips_pre_epoch() {
        let t = std::time::UNIX_EPOCH - std::time::Duration::from_secs(100);
        let wt = WireTime::from_system_time(t);
        assert_eq!(wt.to_system_time(), t);
    }
}
