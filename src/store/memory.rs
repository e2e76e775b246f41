use crate::{
    models::{Lobby, Player},
    prelude::*,
    store::{ChangeEvent, ChangeFeed, ChangeOp, ChangeRow, FeedRegistry, SessionStore},
};

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;

/// In-process store used by the simulation binary and the tests. Matches the
/// managed row-store contract: whole-row writes, last-writer-wins, one change
/// event per committed write.
#[derive(Default)]
pub struct MemoryStore {
    lobbies: RwLock<HashMap<String, Lobby>>,
    players: RwLock<HashMap<String, BTreeMap<String, Player>>>,
    feeds: FeedRegistry,
}

impl MemoryStore {
    pub fn new() -> Self {
        return Self::default();
    }

    fn publish(&self, op: ChangeOp, row: ChangeRow) {
        self.feeds.publish(ChangeEvent { op, row });
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_lobby(&self, lobby: &Lobby) -> Result {
        {
            let mut lobbies = self.lobbies.write().unwrap();

            let code = lobby.join_code.to_uppercase();
            if lobbies.values().any(|l| l.join_code.to_uppercase() == code) {
                return Err(GameError::DuplicateJoinCode.into());
            }
            if lobbies.contains_key(&lobby.lobby_id) {
                return Err(anyhow!("Duplicate lobby id: {}", lobby.lobby_id).into());
            }

            lobbies.insert(lobby.lobby_id.clone(), lobby.clone());
        }

        self.publish(ChangeOp::Insert, ChangeRow::Lobbies(lobby.clone()));
        return Ok(());
    }

    async fn update_lobby(&self, lobby: &Lobby) -> Result {
        {
            let mut lobbies = self.lobbies.write().unwrap();

            if !lobbies.contains_key(&lobby.lobby_id) {
                return Err(GameError::LobbyNotFound.into());
            }

            lobbies.insert(lobby.lobby_id.clone(), lobby.clone());
        }

        self.publish(ChangeOp::Update, ChangeRow::Lobbies(lobby.clone()));
        return Ok(());
    }

    async fn delete_lobby(&self, lobby_id: &str) -> Result {
        let removed = self.lobbies.write().unwrap().remove(lobby_id);
        let players = self.players.write().unwrap().remove(lobby_id);

        if let Some(lobby) = removed {
            self.publish(ChangeOp::Delete, ChangeRow::Lobbies(lobby));
        }
        for player in players.into_iter().flat_map(|m| m.into_values()) {
            self.publish(ChangeOp::Delete, ChangeRow::Players(player));
        }

        return Ok(());
    }

    async fn get_lobby(&self, lobby_id: &str) -> Result<Option<Lobby>> {
        return Ok(self.lobbies.read().unwrap().get(lobby_id).cloned());
    }

    async fn find_by_code(&self, join_code: &str) -> Result<Option<Lobby>> {
        let code = join_code.to_uppercase();

        let found = self
            .lobbies
            .read()
            .unwrap()
            .values()
            .find(|l| l.join_code.to_uppercase() == code)
            .cloned();

        return Ok(found);
    }

    async fn upsert_player(&self, player: &Player) -> Result {
        let existed = {
            let mut players = self.players.write().unwrap();

            let lobby_players = players.entry(player.lobby_id.clone()).or_default();
            lobby_players
                .insert(player.player_id.clone(), player.clone())
                .is_some()
        };

        let op = if existed {
            ChangeOp::Update
        } else {
            ChangeOp::Insert
        };
        self.publish(op, ChangeRow::Players(player.clone()));

        return Ok(());
    }

    async fn update_player(&self, player: &Player) -> Result {
        {
            let mut players = self.players.write().unwrap();

            let lobby_players = players
                .get_mut(&player.lobby_id)
                .ok_or(GameError::LobbyNotFound)?;

            if !lobby_players.contains_key(&player.player_id) {
                return Err(anyhow!("Unknown player: {}", player.player_id).into());
            }

            lobby_players.insert(player.player_id.clone(), player.clone());
        }

        self.publish(ChangeOp::Update, ChangeRow::Players(player.clone()));
        return Ok(());
    }

    async fn delete_player(&self, lobby_id: &str, player_id: &str) -> Result {
        let removed = self
            .players
            .write()
            .unwrap()
            .get_mut(lobby_id)
            .and_then(|m| m.remove(player_id));

        if let Some(player) = removed {
            self.publish(ChangeOp::Delete, ChangeRow::Players(player));
        }

        return Ok(());
    }

    async fn players(&self, lobby_id: &str) -> Result<Vec<Player>> {
        let mut players: Vec<Player> = self
            .players
            .read()
            .unwrap()
            .get(lobby_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();

        players.sort_by(|a, b| {
            (a.joined_at, &a.player_id).cmp(&(b.joined_at, &b.player_id))
        });

        return Ok(players);
    }

    async fn subscribe(&self, lobby_id: &str) -> Result<ChangeFeed> {
        return Ok(self.feeds.subscribe(lobby_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GameConfig, GameMode, DEFAULT_MAX_PLAYERS, LOBBY_STATUS_WAITING};

    fn test_config() -> GameConfig {
        return GameConfig {
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
    }

    fn test_lobby(lobby_id: &str, join_code: &str) -> Lobby {
        return Lobby {
            lobby_id: lobby_id.to_string(),
            join_code: join_code.to_string(),
            host_id: "host-1".to_string(),
            status: LOBBY_STATUS_WAITING.to_string(),
            game_config: test_config().to_value().unwrap(),
            session_state: serde_json::Value::Null,
            max_players: DEFAULT_MAX_PLAYERS,
            created_at: 0,
            started_at: None,
            finished_at: None,
        };
    }

    fn test_player(lobby_id: &str, player_id: &str, joined_at: i64) -> Player {
        return Player {
            lobby_id: lobby_id.to_string(),
            player_id: player_id.to_string(),
            name: player_id.to_string(),
            is_host: false,
            is_ready: false,
            is_connected: true,
            score: 0,
            wins: 0,
            joined_at,
        };
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_code_case_insensitively() {
        let store = MemoryStore::new();

        store.insert_lobby(&test_lobby("a", "AB32XQ")).await.unwrap();

        let err = store
            .insert_lobby(&test_lobby("b", "ab32xq"))
            .await
            .unwrap_err();

        assert_eq!(err.game_error(), Some(&GameError::DuplicateJoinCode));
    }

    #[tokio::test]
    async fn find_by_code_is_case_insensitive() {
        let store = MemoryStore::new();
        store.insert_lobby(&test_lobby("a", "AB32XQ")).await.unwrap();

        let found = store.find_by_code("ab32xq").await.unwrap();
        assert_eq!(found.map(|l| l.lobby_id), Some("a".to_string()));
    }

    #[tokio::test]
    async fn players_are_ordered_by_joined_at() {
        let store = MemoryStore::new();
        store.insert_lobby(&test_lobby("a", "AAAAAA")).await.unwrap();

        store.upsert_player(&test_player("a", "late", 20)).await.unwrap();
        store.upsert_player(&test_player("a", "early", 10)).await.unwrap();

        let players = store.players("a").await.unwrap();
        let ids: Vec<&str> = players.iter().map(|p| p.player_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn subscriber_sees_every_write_for_its_lobby_only() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe("a").await.unwrap();

        store.insert_lobby(&test_lobby("a", "AAAAAA")).await.unwrap();
        store.insert_lobby(&test_lobby("b", "BBBBBB")).await.unwrap();
        store.upsert_player(&test_player("a", "p1", 1)).await.unwrap();
        store.delete_player("a", "p1").await.unwrap();

        let first = feed.next().await.unwrap();
        assert_eq!(first.op, ChangeOp::Insert);
        assert!(matches!(first.row, ChangeRow::Lobbies(_)));

        let second = feed.next().await.unwrap();
        assert_eq!(second.op, ChangeOp::Insert);
        assert!(matches!(second.row, ChangeRow::Players(_)));
        assert_eq!(second.lobby_id(), "a");

        let third = feed.next().await.unwrap();
        assert_eq!(third.op, ChangeOp::Delete);
        assert!(matches!(third.row, ChangeRow::Players(_)));
    }

    #[tokio::test]
    async fn upsert_reports_update_for_existing_row() {
        let store = MemoryStore::new();
        store.insert_lobby(&test_lobby("a", "AAAAAA")).await.unwrap();
        store.upsert_player(&test_player("a", "p1", 1)).await.unwrap();

        let mut feed = store.subscribe("a").await.unwrap();

        let mut player = test_player("a", "p1", 1);
        player.is_ready = true;
        store.upsert_player(&player).await.unwrap();

        let event = feed.next().await.unwrap();
        assert_eq!(event.op, ChangeOp::Update);
    }
}
