//! Standalone wear server with a simulated player, for trying the link
//! without a running game.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;
use wear_core::{PlayerStatus, WorldStatus};
use wear_server::{Config, StatusProvider, WearServer};

const TICK: Duration = Duration::from_secs(1);
const WORLD_EVERY_TICKS: u64 = 10;

/// Loses half a heart every tick, eats when hungry, respawns at zero.
#[derive(Default)]
struct SimulatedPlayer {
    last: Mutex<Option<PlayerStatus>>,
}

impl SimulatedPlayer {
    fn tick(&self) -> PlayerStatus {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let (health, food) = match *last {
            Some(prev) if prev.health > 0.5 => {
                let food = if prev.food_level <= 6 { 20 } else { prev.food_level - 1 };
                (prev.health - 0.5, food)
            }
            _ => (20.0, 20),
        };

        let next = PlayerStatus::following(last.as_ref(), health, 20.0, food);
        *last = Some(next);
        next
    }
}

impl StatusProvider for SimulatedPlayer {
    fn current_player_status(&self) -> Option<PlayerStatus> {
        self.last
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .map(|s| PlayerStatus::snapshot(s.health, s.max_health, s.food_level))
    }
}

fn world_at(tick: u64) -> WorldStatus {
    let time = (tick * 1000) % 24000;
    WorldStatus::new()
        .with("time", time)
        .with("weather", if (tick / 60) % 2 == 0 { "clear" } else { "rain" })
        .with("dimension", "minecraft:overworld")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        addr = %config.socket_addr_string(),
        heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
        "starting wear-server"
    );

    let player = Arc::new(SimulatedPlayer::default());
    let server = Arc::new(WearServer::new(config).with_status_provider(player.clone()));

    let producer = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            let mut tick = 0u64;
            loop {
                ticker.tick().await;
                server.enqueue(player.tick());
                if tick % WORLD_EVERY_TICKS == 0 {
                    server.enqueue(world_at(tick));
                }
                tick += 1;
            }
        })
    };

    let result = tokio::select! {
        res = server.start() => res.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
            server.shutdown();
            Ok(())
        }
    };

    producer.abort();
    result
}
