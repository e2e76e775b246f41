mod client;
mod config;
mod directory;
mod identity;
mod machine;
mod models;
mod prelude;
mod reconcile;
mod result;
mod rollcall;
mod roster;
mod rounds;
mod stats;
mod store;

pub use crate::result::Result;

use crate::{
    client::{GameplayMode, SessionClient},
    directory::SessionDirectory,
    machine::{LobbyStatus, COUNTDOWN_TICKS},
    models::{GameConfig, GameMode},
    stats::{HttpStatsProvider, StaticStatsProvider, StatsProvider},
    store::{memory::MemoryStore, SessionStore},
};

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = config::build();

    let player_id = identity::player_id(&cfg.identity_filepath)?;
    tracing::info!(player_id, "local identity loaded");

    let stats = init_stats(&cfg).await?;
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());

    run_local_session(store, stats).await?;

    return Ok(());
}

/// Short health check against the live stats service; fails open to the
/// static data path rather than blocking game start.
async fn init_stats(cfg: &config::Config) -> Result<Arc<dyn StatsProvider>> {
    let http = HttpStatsProvider::new(cfg)?;

    if stats::check_availability(&http, "nba").await {
        tracing::info!(base_url = %cfg.stats_api_base_url, "stats service online");
        return Ok(Arc::new(http));
    }

    tracing::warn!("stats service unreachable, using static data");

    let offline = StaticStatsProvider::new()
        .with_value("nba", "Ray Allen", 2008, 40)
        .with_value("nba", "Rajon Rondo", 2008, 20)
        .with_value("nba", "Paul Pierce", 2008, 60)
        .with_value("nba", "Kevin Garnett", 2008, 120);

    return Ok(Arc::new(offline));
}

/// Two simulated participants playing a short round-based game end to end:
/// create, join, ready-up, countdown, picks, advancement, results.
async fn run_local_session(
    store: Arc<dyn SessionStore>,
    stats: Arc<dyn StatsProvider>,
) -> Result {
    let directory = SessionDirectory::new(store.clone());

    let config = GameConfig {
        sport: "nba".to_string(),
        mode: GameMode::Manual,
        team: Some("BOS".to_string()),
        season: Some(2008),
        division: None,
        timer_secs: 60,
        year_min: 1990,
        year_max: 2024,
        win_target: None,
        selection_scope: None,
    };

    let (lobby, host) = directory.create("Alice", "alice", config).await?;
    tracing::info!(join_code = %lobby.join_code, "lobby created");

    let guest = directory.join(&lobby.lobby_id, "bob", "Bob").await?;

    let mode = GameplayMode::Rounds {
        total_rounds: 3,
        target_cap: 100,
    };
    let pool = vec!["BOS".to_string(), "LAL".to_string(), "CHI".to_string()];

    let mut alice = SessionClient::attach(
        store.clone(),
        stats.clone(),
        lobby.clone(),
        host,
        mode,
        pool.clone(),
    )
    .await?;
    let mut bob = SessionClient::attach(store, stats, lobby, guest, mode, pool).await?;

    bob.set_ready(true).await?;
    drain(&mut alice).await?;
    drain(&mut bob).await?;

    for _ in 0..COUNTDOWN_TICKS {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        alice.tick().await?;
        bob.tick().await?;
        if let Some(remaining) = bob.countdown_remaining() {
            tracing::info!(remaining, "countdown");
        }
    }
    drain(&mut alice).await?;
    drain(&mut bob).await?;

    let picks = [
        ("Ray Allen", "Rajon Rondo"),
        ("Paul Pierce", "Rajon Rondo"),
        ("Kevin Garnett", "Rajon Rondo"),
    ];

    for (alice_pick, bob_pick) in picks {
        if alice.status() != Some(LobbyStatus::Playing) {
            break;
        }

        alice.submit_pick(alice_pick, 2008).await?;
        drain(&mut bob).await?;
        bob.submit_pick(bob_pick, 2008).await?;
        drain(&mut alice).await?;
        drain(&mut bob).await?;
    }

    if let Some(standings) = alice.standings() {
        for (place, standing) in standings.iter().enumerate() {
            tracing::info!(
                place = place + 1,
                player = %standing.player_id,
                total = standing.total,
                busted = standing.busted,
                "final standing"
            );
        }
    }

    return Ok(());
}

async fn drain(client: &mut SessionClient) -> Result {
    loop {
        let next = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            client.pump_one(),
        )
        .await;

        match next {
            Ok(Ok(Some(_))) => continue,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(err)) => return Err(err),
            Err(_) => return Ok(()),
        }
    }
}
