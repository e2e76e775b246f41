use crate::prelude::*;

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub name: String,
    pub position: String,
    pub season: i32,
}

/// Stats/roster lookup collaborator. "No data for that combination" is a
/// valid outcome (empty list / zero value), never an error; errors mean the
/// service itself could not be reached.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn health(&self, sport: &str) -> bool;

    async fn roster(&self, sport: &str, team: &str, season: i32) -> Result<Vec<RosterEntry>>;

    async fn season_value(&self, sport: &str, player: &str, year: i32) -> Result<u32>;
}

#[derive(Deserialize)]
struct RosterResponse {
    players: Vec<RosterEntry>,
}

#[derive(Deserialize)]
struct SeasonPlayersResponse {
    players: Vec<SeasonPlayerEntry>,
}

#[derive(Deserialize)]
struct SeasonPlayerEntry {
    name: String,
    value: u32,
}

pub struct HttpStatsProvider {
    base_url: String,
    http: reqwest::Client,
}

impl HttpStatsProvider {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.stats_timeout_secs))
            .build()?;

        return Ok(Self {
            base_url: cfg.stats_api_base_url.trim_end_matches('/').to_string(),
            http,
        });
    }
}

#[async_trait]
impl StatsProvider for HttpStatsProvider {
    async fn health(&self, sport: &str) -> bool {
        let url = format!("{}/{}/health", self.base_url, sport);

        return match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                tracing::warn!(error = %err, sport, "stats health check failed");
                false
            }
        };
    }

    async fn roster(&self, sport: &str, team: &str, season: i32) -> Result<Vec<RosterEntry>> {
        let url = format!("{}/{}/roster/{}/{}", self.base_url, sport, team, season);

        let resp = self.http.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let body: RosterResponse = resp.error_for_status()?.json().await?;
        return Ok(body.players);
    }

    async fn season_value(&self, sport: &str, player: &str, year: i32) -> Result<u32> {
        let url = format!("{}/{}/players/{}", self.base_url, sport, year);

        let resp = self.http.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(0);
        }

        let body: SeasonPlayersResponse = resp.error_for_status()?.json().await?;

        let value = body
            .players
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(player))
            .map(|p| p.value)
            .unwrap_or(0);

        return Ok(value);
    }
}

/// Offline/static data path used when the live service is down. Sports with
/// no static data set simply come back empty.
#[derive(Default)]
pub struct StaticStatsProvider {
    rosters: HashMap<(String, String, i32), Vec<RosterEntry>>,
    values: HashMap<(String, String, i32), u32>,
}

impl StaticStatsProvider {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn with_roster(mut self, sport: &str, team: &str, season: i32, players: Vec<RosterEntry>) -> Self {
        self.rosters
            .insert((sport.to_string(), team.to_string(), season), players);
        return self;
    }

    pub fn with_value(mut self, sport: &str, player: &str, year: i32, value: u32) -> Self {
        self.values
            .insert((sport.to_string(), player.to_lowercase(), year), value);
        return self;
    }
}

#[async_trait]
impl StatsProvider for StaticStatsProvider {
    async fn health(&self, _sport: &str) -> bool {
        return true;
    }

    async fn roster(&self, sport: &str, team: &str, season: i32) -> Result<Vec<RosterEntry>> {
        let found = self
            .rosters
            .get(&(sport.to_string(), team.to_string(), season))
            .cloned()
            .unwrap_or_default();

        return Ok(found);
    }

    async fn season_value(&self, sport: &str, player: &str, year: i32) -> Result<u32> {
        let found = self
            .values
            .get(&(sport.to_string(), player.to_lowercase(), year))
            .copied()
            .unwrap_or(0);

        return Ok(found);
    }
}

lazy_static! {
    // Per-sport availability, filled by the first health check and kept until
    // an explicit reset (e.g. the user asks to retry online mode).
    static ref AVAILABILITY: RwLock<HashMap<String, bool>> = RwLock::new(HashMap::new());
}

/// First call per sport performs the health check and caches it; later calls
/// are answered from the cache so game start is never blocked twice on a dead
/// service.
pub async fn check_availability(provider: &dyn StatsProvider, sport: &str) -> bool {
    if let Some(cached) = AVAILABILITY.read().unwrap().get(sport) {
        return *cached;
    }

    let available = provider.health(sport).await;
    AVAILABILITY
        .write()
        .unwrap()
        .insert(sport.to_string(), available);

    return available;
}

pub fn reset_availability() {
    AVAILABILITY.write().unwrap().clear();
}
