use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use flowd::config::ServerConfig;
use flowd::transport::stdio::StdioTransport;
use flowd::{server, transport::ws, ServerContext};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "flowd",
    about = "Flow Host — Model Context Protocol server daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "FLOWD_PORT")]
    port: Option<u16>,

    /// Data directory for config.toml
    #[arg(long, env = "FLOWD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, env = "FLOWD_LOG")]
    log: Option<String>,

    /// Maximum concurrent client connections
    #[arg(long, env = "FLOWD_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "FLOWD_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the WebSocket server (default when no subcommand given).
    ///
    /// Runs flowd in the foreground until SIGTERM / Ctrl-C.
    Serve,
    /// Serve a single session over stdin/stdout.
    ///
    /// For MCP hosts that spawn the server as a child process. Logs go to
    /// stderr; stdout carries only protocol frames.
    Stdio,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Serve);
    let config = ServerConfig::new(args.port, args.data_dir, args.log, args.max_connections);

    // In stdio mode stdout belongs to the protocol; logs must not touch it.
    let log_to_stderr = matches!(command, Command::Stdio);
    let _log_guard = init_tracing(&config, args.log_file.as_deref(), log_to_stderr);

    let ctx = ServerContext::new(config);
    let sweeper = ctx.connections.clone().spawn_idle_sweeper();

    match command {
        Command::Serve => {
            ws::run(ctx.clone(), shutdown_signal()).await?;
        }
        Command::Stdio => {
            info!("serving one session over stdio");
            server::serve_connection(ctx.clone(), Arc::new(StdioTransport::new())).await?;
        }
    }

    sweeper.abort();
    let stats = ctx.cache.stats();
    info!(
        cache_entries = stats.entries,
        cache_hit_ratio = format!("{:.2}", stats.hit_ratio),
        "flowd stopped"
    );
    Ok(())
}

fn init_tracing(
    config: &ServerConfig,
    log_file: Option<&std::path::Path>,
    to_stderr: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(&config.log).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "flowd.log".to_string());
        let appender = tracing_appender::rolling::daily(dir, file);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else if to_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

/// Resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C; elsewhere Ctrl-C only.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
