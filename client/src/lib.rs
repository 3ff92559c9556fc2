//! `jdfc`'s filesystem-interface side, factored out of `main.rs` so
//! integration tests can drive a real [`rpc::RpcClient`] against a
//! scripted server without going through `fuser`'s kernel channel.

pub mod config;
pub mod fs;
pub mod mount_url;
pub mod notify_listener;
pub mod rpc;
