//! Wire layout for directory entries shipped from server to client on the
//! `ReadDir` conversation (spec §4.6). This mirrors the Linux kernel's own
//! `fuse_dirent` packing — little-endian, name immediately after the fixed
//! header, zero-padded out to an 8-byte boundary — so a server-side buffer
//! built by repeated `Dirent::encode` calls is exactly the shape the
//! original implementation streamed straight from its readdir syscall.
//!
//! The client does not hand this buffer to the kernel directly (it decodes
//! entries here and replays them through `fuser::ReplyDirectory::add`,
//! which repacks into the kernel ABI itself) but the two layouts coincide
//! by construction, so nothing is lost by not special-casing the RPC wire
//! format.

const HEADER_LEN: usize = 24; // inode(8) + next_offset(8) + name_len(4) + kind(4)

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub inode: u64,
    pub next_offset: u64,
    pub kind: u32,
    pub name: Vec<u8>,
}

/// Padded size of one encoded dirent for a name of `name_len` bytes.
pub fn encoded_len(name_len: usize) -> usize {
    (HEADER_LEN + name_len).div_ceil(8) * 8
}

impl Dirent {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&self.inode.to_le_bytes());
        out.extend_from_slice(&self.next_offset.to_le_bytes());
        out.extend_from_slice(&(self.name.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.kind.to_le_bytes());
        out.extend_from_slice(&self.name);
        let written = out.len() - start;
        let padded = encoded_len(self.name.len());
        out.resize(start + padded, 0);
        debug_assert_eq!(out.len() - start, padded);
        let _ = written;
    }

    /// Decodes one dirent from the front of `buf`, returning it along with
    /// the number of bytes consumed (including padding). `None` if `buf`
    /// does not hold a complete entry.
    pub fn decode(buf: &[u8]) -> Option<(Dirent, usize)> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let inode = u64::from_le_bytes(buf[0..8].try_into().ok()?);
        let next_offset = u64::from_le_bytes(buf[8..16].try_into().ok()?);
        let name_len = u32::from_le_bytes(buf[16..20].try_into().ok()?) as usize;
        let kind = u32::from_le_bytes(buf[20..24].try_into().ok()?);
        let total = encoded_len(name_len);
        if buf.len() < total {
            return None;
        }
        let name = buf[HEADER_LEN..HEADER_LEN + name_len].to_vec();
        Some((
            Dirent {
                inode,
                next_offset,
                kind,
                name,
            },
            total,
        ))
    }
}

/// Decodes a full buffer of consecutive, 8-byte-aligned dirents, such as
/// one `ReadDir` reply's payload. Returns an empty vec for an empty buffer
/// (spec's "zero means end" condition).
pub fn decode_all(mut buf: &[u8]) -> Vec<Dirent> {
    let mut out = Vec::new();
    while let Some((entry, consumed)) = Dirent::decode(buf) {
        out.push(entry);
        buf = &buf[consumed..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_name_length() {
        for name_len in 0..=255usize {
            let name: Vec<u8> = (0..name_len).map(|i| (b'a' + (i % 26) as u8)).collect();
            let d = Dirent {
                inode: 42,
                next_offset: 7,
                kind: 1,
                name: name.clone(),
            };
            let mut buf = Vec::new();
            d.encode(&mut buf);
            assert_eq!(buf.len() % 8, 0, "entry must be 8-byte aligned");
            let (decoded, consumed) = Dirent::decode(&buf).expect("decodes");
            assert_eq!(consumed, buf.len());
            assert_eq!(decoded, d);
        }
    }

    #[test]
    fn consecutive_entries_stay_aligned_and_decode_in_order() {
        let names: [&[u8]; 3] = [b"a", b"bb", b"ccccc"];
        let mut buf = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let d = Dirent {
                inode: i as u64 + 1,
                next_offset: i as u64 + 1,
                kind: 1,
                name: name.to_vec(),
            };
            assert_eq!(buf.len() % 8, 0);
            d.encode(&mut buf);
        }
        let decoded = decode_all(&buf);
        assert_eq!(decoded.len(), 3);
        for (i, entry) in decoded.iter().enumerate() {
            assert_eq!(entry.inode, i as u64 + 1);
            assert_eq!(entry.name, names[i]);
        }
    }

    #[test]
    fn empty_buffer_decodes_to_no_entries() {
        assert!(decode_all(&[]).is_empty());
    }
}
