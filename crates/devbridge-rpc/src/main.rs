//! Devbridge RPC Server - WebSocket bridge between a dev server and its clients.
//!
//! Connected clients get one RPC channel each over WebSocket. A one-shot JSON
//! POST route serves callers that do not keep a connection open.

mod handler;
mod host;
mod server;
mod socket;

use anyhow::Result;
use clap::Parser;
use devbridge_core::state::VersionInfo;
use devbridge_core::{
    create_server_group, BridgeOptions, CollectorConfig, EditorConfig, RpcGroupOptions,
    ServerConfig, StateCollector,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "devbridge-rpc")]
#[command(about = "WebSocket RPC bridge for dev tooling clients")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// JSON file with the host state to serve (watched for changes)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Project root used to resolve `openInEditor` paths (defaults to cwd)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Do not ask the host for custom tabs
    #[arg(long)]
    no_custom_tabs: bool,

    /// Seconds an outbound call waits for its response (0 = no limit)
    #[arg(long, default_value = "60")]
    call_timeout_secs: u64,

    /// Command used to open files in an editor
    #[arg(long, default_value = EditorConfig::DEFAULT_COMMAND)]
    editor: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Devbridge RPC Server");

    let root_dir = match args.root {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    info!("Project root: {}", root_dir.display());

    let config = CollectorConfig {
        options: BridgeOptions {
            custom_tabs: !args.no_custom_tabs,
            ..BridgeOptions::default()
        },
        versions: VersionInfo::current(None),
        root_dir,
    };

    let file_host = Arc::new(host::FileHost::new(args.state, args.editor));
    let collector = StateCollector::new(file_host.clone(), config);
    let options = RpcGroupOptions {
        call_timeout: (args.call_timeout_secs > 0).then(|| Duration::from_secs(args.call_timeout_secs)),
    };
    let group = create_server_group(&collector, options);

    // Initial host state
    file_host.apply(&collector).await?;
    let _watcher = host::watch(file_host, collector.clone())?;

    // Start the server
    let addr = server::start_server(server::AppState { group }, &args.host, args.port).await?;

    // Print port for the parent process to read (intentional stdout for IPC)
    println!("{}{}", ServerConfig::PORT_ANNOUNCE_PREFIX, addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
