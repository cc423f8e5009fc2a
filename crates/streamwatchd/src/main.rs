//! streamwatchd — the streamwatch daemon.
//!
//! Single binary that assembles the monitoring pipeline:
//! - Connection manager (HTTP management endpoint)
//! - Domain tracker + one refresh loop per instance
//! - REST API + Prometheus scrape endpoint
//!
//! # Usage
//!
//! ```text
//! streamwatchd --config /etc/streamwatch/streamwatch.toml --listen 0.0.0.0:25500
//! ```

mod daemon;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,streamwatchd=debug,streamwatch=debug";

#[derive(Parser)]
#[command(name = "streamwatchd", about = "Streams domain metrics daemon")]
struct Cli {
    /// Path to streamwatch.toml.
    #[arg(long, short, default_value = "streamwatch.toml")]
    config: PathBuf,

    /// Address to serve the API on. Overrides `server.listen`.
    #[arg(long)]
    listen: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        fmt.json().init();
    } else {
        fmt.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = daemon::load_config(&cli.config)?;
    let listen = daemon::listen_addr(&config, cli.listen.as_deref())?;
    daemon::run(config, listen).await
}
