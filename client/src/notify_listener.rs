//! Forwards the server's unsolicited invalidation pushes (spec §4.3/§6)
//! into the kernel's own cache via [`fuser::Notifier`].
//!
//! This runs as one background Tokio task for the lifetime of the
//! mount, reading the single RPC connection's demultiplexed inbound
//! commands in a loop; each push is a single, best-effort call into the
//! kernel, mirroring how `jdfsd`'s own `NotifyRegistry` treats a failed
//! push as unremarkable rather than fatal (the kernel may simply no
//! longer hold that inode cached). The loop ends naturally when the
//! connection closes and `recv` starts returning `None`.

use fuser::Notifier;
use jdfs_proto::{ops, InboundCommands, Token};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

pub async fn run(mut inbound: InboundCommands, notifier: Notifier) {
    while let Some((name, args, _payloads)) = inbound.recv().await {
        match name.as_str() {
            ops::INVALIDATE_FILE_CONTENT => {
                let Some(inode) = args.first().and_then(Token::as_int) else { continue };
                let Some(offset) = args.get(1).and_then(Token::as_int) else { continue };
                let Some(len) = args.get(2).and_then(Token::as_int) else { continue };
                if let Err(err) = notifier.inval_inode(inode as u64, offset, len) {
                    tracing::debug!(%err, inode, "inval_inode failed");
                }
            }
            ops::INVALIDATE_DIR_ENTRY => {
                let Some(parent) = args.first().and_then(Token::as_int) else { continue };
                let Some(child_name) = args.get(2).and_then(Token::as_str) else { continue };
                let name = OsStr::from_bytes(child_name.as_bytes());
                if let Err(err) = notifier.inval_entry(parent as u64, name) {
                    tracing::debug!(%err, parent, "inval_entry failed");
                }
            }
            other => tracing::warn!(op = other, "unexpected push on the RPC connection"),
        }
    }
    tracing::info!("rpc connection closed, notify listener exiting");
}
