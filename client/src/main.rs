//! `jdfc`: mounts a remote JDFS export at a local mountpoint (spec §6).
//!
//! `jdfc [<url>] <mountpoint>` resolves the server to talk to — either
//! from an explicit `jdfs://host[:port]/path?opt=val` argument or by
//! walking up from the mountpoint for a `__jdfs_root__` magic file — then
//! opens the single RPC connection, completes the `Mount` handshake, and
//! hands the session to `fuser`.

use clap::Parser;
use client::fs::{ClientFs, FsWrapper};
use client::rpc::RpcClient;
use client::{config, mount_url, notify_listener};
use jdfs_proto::InboundCommands;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::net::TcpStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_USAGE: u8 = 1;
const EXIT_UNRESOLVED: u8 = 2;
const EXIT_DISCONNECTED: u8 = 6;

/// `jdfc [<url>] <mountpoint>`: the URL is optional, resolved from a
/// `__jdfs_root__` magic file above the mountpoint when omitted.
#[derive(Parser, Debug)]
#[command(name = "jdfc")]
struct Cli {
    /// `jdfs://host[:port]/path?opt=val`, or the mountpoint when the URL
    /// is being resolved from a magic root file.
    first: String,

    /// The mountpoint, when `first` names an explicit URL.
    second: Option<String>,

    /// Path to a TOML config file (defaults used when absent).
    #[arg(long, default_value = "jdfc.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "jdfc=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let (url, mountpoint) = match &cli.second {
        Some(mountpoint) => (Some(cli.first.as_str()), PathBuf::from(mountpoint)),
        None => (None, PathBuf::from(&cli.first)),
    };

    let cfg = config::load_config(&cli.config);

    let target = match mount_url::resolve(url, &mountpoint) {
        Ok(target) => target,
        Err(err) => {
            tracing::error!(%err, "could not resolve jdfs URL");
            return ExitCode::from(EXIT_UNRESOLVED);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(%err, "failed to start async runtime");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let (rpc, inbound) = match runtime.block_on(connect(&target)) {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!(%err, host = %target.host, "could not reach jdfsd");
            return ExitCode::from(EXIT_DISCONNECTED);
        }
    };

    if let Err(err) = runtime.block_on(rpc.mount(target.read_only, &target.jdfs_path)) {
        tracing::error!(%err, "mount handshake failed");
        return ExitCode::from(EXIT_DISCONNECTED);
    }

    let handle = runtime.handle().clone();
    let options = mount_url::to_mount_options(&target);
    let filesystem = FsWrapper::new(ClientFs::new(rpc, cfg, runtime));

    let mut session = match fuser::Session::new(filesystem, &mountpoint, &options) {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(%err, mountpoint = %mountpoint.display(), "fuse mount failed");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    let notifier = session.notifier();
    handle.spawn(notify_listener::run(inbound, notifier));

    tracing::info!(mountpoint = %mountpoint.display(), host = %target.host, "jdfs mounted");
    if let Err(err) = session.run() {
        tracing::error!(%err, "fuse session ended with an error");
        return ExitCode::from(EXIT_DISCONNECTED);
    }
    ExitCode::SUCCESS
}

async fn connect(target: &mount_url::MountTarget) -> std::io::Result<(RpcClient, InboundCommands)> {
    let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
    let (handle, inbound) = jdfs_proto::conversation::split(stream);
    Ok((RpcClient::new(handle), inbound))
}
