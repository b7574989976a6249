//! LineKV - An In-Memory Key-Value Store
//!
//! This is the main entry point: `linekv serve` runs the server,
//! `linekv client` opens an interactive session against one.

use clap::{Args, Parser, Subcommand};
use linekv::config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SNAPSHOT_PATH};
use linekv::{Server, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "linekv", version, about = "In-memory key-value store over a line protocol")]
struct Cli {
    /// default log filter when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// run the server (default)
    Serve(ServeArgs),
    /// connect an interactive client
    Client(ClientArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// snapshot file loaded at startup and written at shutdown
    #[arg(long, default_value = DEFAULT_SNAPSHOT_PATH)]
    snapshot: PathBuf,

    /// disable snapshot persistence
    #[arg(long)]
    no_persist: bool,

    /// close connections idle for this many seconds
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,

    /// milliseconds between expiry sweeps
    #[arg(long, default_value_t = 1000)]
    sweep_interval_ms: u64,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            no_persist: false,
            idle_timeout: 30,
            sweep_interval_ms: 1000,
        }
    }
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            snapshot_path: (!args.no_persist).then_some(args.snapshot),
            idle_timeout: Duration::from_secs(args.idle_timeout),
            sweep_interval: Duration::from_millis(args.sweep_interval_ms.max(1)),
            ..Default::default()
        }
    }
}

#[derive(Args)]
struct ClientArgs {
    /// server host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match cli.command.unwrap_or_else(|| Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            let config = ServerConfig::from(args);
            println!(
                "LineKV v{} - listening on {}. Use Ctrl+C to shut down.",
                linekv::VERSION,
                config.bind_address()
            );
            Server::new(config).serve().await
        }
        Command::Client(args) => {
            linekv::client::run_interactive(&format!("{}:{}", args.host, args.port)).await
        }
    }
}
