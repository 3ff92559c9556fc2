//! `jdfsd`'s reactor, factored out of `main.rs` so integration tests can
//! drive a real `ServerContext` and the real `dispatch` table without a
//! subprocess or a socket.

pub mod buffer_pool;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod fs;
pub mod icd;
pub mod notify;
