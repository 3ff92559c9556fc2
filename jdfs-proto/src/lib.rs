//! Wire protocol shared by the `jdfc` client and `jdfsd` server: the RPC
//! conversation codec (spec §4.5/§6), the object-token literal encoding,
//! the directory-entry wire layout (spec §4.6), the shared attribute
//! types, and the portable error taxonomy (spec §7).
//!
//! Kept as its own crate, rather than folded into one binary's `src/`,
//! because both ends must decode each other's bytes identically — a
//! change to one side's notion of the wire format that isn't mirrored on
//! the other breaks the protocol silently.

pub mod attrs;
pub mod conversation;
pub mod dirent;
pub mod errno;
pub mod ops;
pub mod token;
pub mod wire;

pub use attrs::{ChildInodeEntry, InodeAttributes, WireFileType, WireTime};
pub use conversation::{InboundCommands, Response, RpcHandle};
pub use dirent::Dirent;
pub use errno::JdfsErrno;
pub use token::Token;
