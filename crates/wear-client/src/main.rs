// crates/wear-client/src/main.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wear_client::config::parse_peer_addr;
use wear_client::{ClientConfig, ConnectionManager, ResolveOutcome, StaticResolver, WearClient};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[clap(name = "wear-client")]
#[clap(about = "Prints the status stream of a running wear server")]
struct Cli {
    /// Server address (`ip` or `ip:port`), overrides the config file
    #[clap(short, long)]
    server: Option<String>,

    /// TOML config file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Disconnect after this many quiet milliseconds (0 disables)
    #[clap(long)]
    stale_after_ms: Option<u64>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(server) = cli.server {
        config.server_addr = Some(server);
    }
    if let Some(ms) = cli.stale_after_ms {
        config.stale_after_ms = ms;
    }

    let addr = match config.server_addr.as_deref() {
        Some(text) => parse_peer_addr(text)?,
        None => return Err(anyhow!("no server address: pass --server or set server_addr")),
    };

    let client = Arc::new(WearClient::new(&config));
    client.on_player_status(|status| {
        println!(
            "[{}] health {:>4.1}/{:<4.1} ({:+.1})  food {:>2}",
            timestamp(),
            status.health,
            status.max_health,
            status.health_delta,
            status.food_level
        );
    });
    client.on_world_status(|world| {
        let fields: Vec<String> = world
            .fields()
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        println!("[{}] world  {}", timestamp(), fields.join(" "));
    });

    let manager = ConnectionManager::new(
        client,
        Arc::new(StaticResolver::new(addr)),
        config.resolve_retry(),
    );
    let mut connected = manager.subscribe_connected();

    loop {
        tokio::select! {
            res = manager.start() => match res {
                Ok(ResolveOutcome::Resolved(peer)) => info!(%peer, "streaming, ctrl-c to quit"),
                Ok(ResolveOutcome::Cancelled) => break,
                Err(e) => warn!(error = %e, "could not connect"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }

        tokio::select! {
            _ = connected.wait_for(|up| !*up) => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        info!(delay = ?RECONNECT_DELAY, "disconnected, retrying");
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.stop().await;
    info!("bye");
    Ok(())
}
