//! TempoShare command-line client.

mod config;
mod receive;
mod send;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::CliConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Share files and wait for a receiver
    Send {
        /// Files to share
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Address to listen on (overrides `listen_addr`)
        #[arg(short, long)]
        listen: Option<String>,

        /// Share lifetime in seconds (overrides `session_ttl_secs`)
        #[arg(long)]
        ttl: Option<u64>,

        /// Prefix for the printed share URL (overrides `share_base_url`)
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Download files from a sharing peer
    Receive {
        /// Host address or share URL
        host: String,

        /// Directory to save files into (overrides `download_dir`)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Only download files with this name or id; repeatable
        #[arg(short, long = "file")]
        files: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match CliConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            CliConfig::default()
        }
    };

    match cli.command {
        Commands::Send {
            files,
            listen,
            ttl,
            base_url,
        } => {
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            if let Some(ttl) = ttl {
                config.session_ttl_secs = ttl;
            }
            if let Some(base_url) = base_url {
                config.share_base_url = base_url;
            }
            send::run(&config, files).await
        }
        Commands::Receive { host, dir, files } => {
            if let Some(dir) = dir {
                config.download_dir = dir;
            }
            receive::run(&config, &host, files).await
        }
    }
}
