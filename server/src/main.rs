//! `jdfsd`: the exported-filesystem reactor. Binds a single RPC
//! listener, and for each accepted connection reads its `Mount` frame,
//! resolves and validates the requested subtree against the configured
//! export directory, then dispatches every subsequent conversation on
//! that connection through [`dispatch::dispatch`].

use clap::Parser;
use jdfs_proto::conversation::split;
use jdfs_proto::{ops, JdfsErrno, Token};
use jdfsd::context::ServerContext;
use jdfsd::{config, dispatch};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `jdfsd <export-dir>`: serves `export-dir` over the JDFS RPC protocol.
#[derive(Parser, Debug)]
#[command(name = "jdfsd")]
struct Cli {
    /// Directory to export.
    export_root: PathBuf,

    /// Path to a TOML config file (defaults used when absent).
    #[arg(long, default_value = "jdfsd.toml")]
    config: PathBuf,

    /// Reject mutating calls regardless of what the client requests.
    #[arg(long)]
    read_only: bool,

    /// Override the RPC listener's bind address.
    #[arg(long)]
    bind: Option<std::net::IpAddr>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "jdfsd=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Arc::new(Cli::parse());
    let cfg = config::load_config(&cli.config);
    let bind_ip = cli.bind.unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    let rpc_addr = SocketAddr::from((bind_ip, cfg.rpc_port));

    let listener = match TcpListener::bind(rpc_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%rpc_addr, error = %e, "failed to bind rpc listener");
            std::process::exit(1);
        }
    };
    tracing::info!(export_root = %cli.export_root.display(), %rpc_addr, "jdfsd listening");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::info!(%peer, "connection accepted");
                let cli = cli.clone();
                let cfg = cfg.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(cli, cfg, stream).await {
                        tracing::info!(%peer, error = %e, "connection closed");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "listener accept failed");
            }
        }
    }
}

/// Serves one client connection end to end: reads the mandatory first
/// `Mount` frame, resolves the requested `jdfs_path` against the
/// server's export directory, opens a session-scoped [`ServerContext`],
/// and then loops read → dispatch → reply for as long as the connection
/// stays open. The client only ever has one conversation in flight on
/// this connection at a time (the wire-ordering guarantee is a property
/// of the client's own transport mutex), so the server just processes
/// frames in arrival order.
async fn serve_connection(cli: Arc<Cli>, cfg: config::Config, stream: tokio::net::TcpStream) -> std::io::Result<()> {
    let (handle, mut inbound) = split(stream);

    let (name, args, _payloads) = inbound
        .recv()
        .await
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed before mounting"))?;
    if name != ops::MOUNT {
        handle.respond(JdfsErrno::Inval.to_wire(), &[], &[]).await?;
        return Ok(());
    }
    let requested_read_only = args.first().and_then(Token::as_int).unwrap_or(0) != 0;
    let jdfs_path = args.get(1).and_then(Token::as_str).unwrap_or_default().to_string();

    let effective_root = match ServerContext::resolve_export_path(&cli.export_root, &jdfs_path) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(%jdfs_path, error = %e, "rejected mount outside the export root");
            handle.respond(JdfsErrno::from(e).to_wire(), &[], &[]).await?;
            return Ok(());
        }
    };

    let ctx = match ServerContext::open(
        effective_root,
        requested_read_only || cli.read_only,
        cfg.meta_attrs_cache_ms,
        cfg.dir_children_cache_ms,
        handle.clone(),
    ) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            tracing::warn!(%jdfs_path, error = %e, "failed to open session root");
            handle.respond(JdfsErrno::from(e).to_wire(), &[], &[]).await?;
            return Ok(());
        }
    };

    handle.respond(0, &[Token::Int(jdfsd::icd::ROOT_INODE as i64), Token::Int(ctx.uid as i64), Token::Int(ctx.gid as i64)], &[]).await?;

    while let Some((name, args, payloads)) = inbound.recv().await {
        let reply = dispatch::dispatch(ctx.clone(), &name, args, payloads).await;
        let payload_refs: Vec<&[u8]> = reply.payloads.iter().map(Vec::as_slice).collect();
        handle.respond(reply.error, &reply.results, &payload_refs).await?;
    }
    Ok(())
}
