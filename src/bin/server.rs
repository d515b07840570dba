//! # Server Binary Entry Point
//!
//! Thin wrapper that loads configuration and runs the relay server.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin server -- --config config/server.toml
//! cargo run --bin server -- --port 3000
//! ```
//!
//! The server will:
//! 1. Load configuration from the given TOML file (or use defaults)
//! 2. Apply `--port` / `PORT` overrides
//! 3. Serve the HTTP API and the WebSocket relay on one listener

use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

use nami_relay::common::config::{load_config, RelayConfig};
use nami_relay::server::RelayServer;

/// Command-line arguments for the server binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the server configuration file (TOML format)
    ///
    /// Example: config/server.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on, overriding the configured address's port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// INFO by default; `RUST_LOG` overrides.
/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config: RelayConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    if let Some(port) = args.port {
        let host = config
            .server
            .address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.server.address = format!("{}:{}", host, port);
    }

    let server = RelayServer::new(config)?;
    server.run().await?;

    Ok(())
}
