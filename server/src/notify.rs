//! The outbound-push half of a session's RPC connection:
//! `InvalidateFileContent`/`InvalidateDirEntry` pushes back to the
//! client that mounted this session, multiplexed onto the same
//! connection as the command/response traffic (spec §2 item 5).
//!
//! A session has exactly one RPC connection; mutating ops push through
//! this registry rather than threading an `RpcHandle` through every call
//! site.

use jdfs_proto::{ops, RpcHandle, Token};

pub struct NotifyRegistry {
    conn: RpcHandle,
}

impl NotifyRegistry {
    pub fn new(conn: RpcHandle) -> Self {
        NotifyRegistry { conn }
    }

    /// Pushes `InvalidateFileContent(inode, offset, size)`. Best-effort: a
    /// dead connection just means the client is disconnecting anyway, so
    /// failures are logged, not propagated.
    pub async fn invalidate_file_content(&self, inode: u64, offset: i64, size: i64) {
        let args = [Token::Int(inode as i64), Token::Int(offset), Token::Int(size)];
        if let Err(err) = self.conn.push(ops::INVALIDATE_FILE_CONTENT, &args).await {
            tracing::warn!(%err, "failed to push InvalidateFileContent");
        }
    }

    /// Pushes `InvalidateDirEntry(parent, child, name)`.
    pub async fn invalidate_dir_entry(&self, parent: u64, child: u64, name: &str) {
        let args = [Token::Int(parent as i64), Token::Int(child as i64), Token::Str(name.to_string())];
        if let Err(err) = self.conn.push(ops::INVALIDATE_DIR_ENTRY, &args).await {
            tracing::warn!(%err, "failed to push InvalidateDirEntry");
        }
    }
}
