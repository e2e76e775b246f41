use crate::{
    models::{
        GameConfig, Lobby, Player, DEFAULT_MAX_PLAYERS, LOBBY_STATUS_WAITING,
    },
    prelude::*,
    store::SessionStore,
};

use std::sync::Arc;

use nanoid::nanoid;

pub const JOIN_CODE_LEN: usize = 6;

// Uppercase alphanumerics minus the ambiguous glyphs I, O, 0 and 1.
pub const JOIN_CODE_CHARS: [char; 32] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U',
    'V', 'W', 'X', 'Y', 'Z', '2', '3', '4', '5', '6', '7', '8', '9',
];

const CODE_GENERATION_ATTEMPTS: u32 = 5;

pub fn generate_join_code() -> String {
    return nanoid!(JOIN_CODE_LEN, &JOIN_CODE_CHARS);
}

pub struct SessionDirectory {
    store: Arc<dyn SessionStore>,
}

impl SessionDirectory {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        return Self { store };
    }

    /// Creates the lobby row and the host's player row. Join-code collisions
    /// are resolved by unique-constraint rejection and retry; a failed host
    /// insert rolls the lobby back so no lobby exists without a host.
    pub async fn create(&self, host_name: &str, host_id: &str, config: GameConfig) -> Result<(Lobby, Player)> {
        let now = chrono::Utc::now().timestamp();

        let mut lobby = Lobby {
            lobby_id: nanoid!(),
            join_code: String::new(),
            host_id: host_id.to_string(),
            status: LOBBY_STATUS_WAITING.to_string(),
            game_config: config.to_value()?,
            session_state: serde_json::Value::Null,
            max_players: DEFAULT_MAX_PLAYERS,
            created_at: now,
            started_at: None,
            finished_at: None,
        };

        let mut inserted = false;
        for attempt in 0..CODE_GENERATION_ATTEMPTS {
            lobby.join_code = generate_join_code();

            match self.store.insert_lobby(&lobby).await {
                Ok(()) => {
                    inserted = true;
                    break;
                }
                Err(err) if err.game_error() == Some(&GameError::DuplicateJoinCode) => {
                    tracing::warn!(attempt, code = %lobby.join_code, "join code collision, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        if !inserted {
            return Err(GameError::CodeGenerationExhausted.into());
        }

        let host = Player {
            lobby_id: lobby.lobby_id.clone(),
            player_id: host_id.to_string(),
            name: host_name.to_string(),
            is_host: true,
            is_ready: true,
            is_connected: true,
            score: 0,
            wins: 0,
            joined_at: now,
        };

        if let Err(err) = self.store.upsert_player(&host).await {
            // Compensating delete: never leave a hostless lobby behind.
            if let Err(cleanup_err) = self.store.delete_lobby(&lobby.lobby_id).await {
                tracing::error!(error = %cleanup_err, "failed to roll back lobby after host insert failure");
            }
            return Err(err);
        }

        return Ok((lobby, host));
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Lobby>> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Ok(None);
        }

        return self.store.find_by_code(&code).await;
    }

    /// Joins an existing lobby. Re-joining with the same persisted player id
    /// refreshes the existing row instead of creating a duplicate; this is
    /// the reconnection path after a page reload.
    pub async fn join(&self, lobby_id: &str, player_id: &str, player_name: &str) -> Result<Player> {
        let lobby = self
            .store
            .get_lobby(lobby_id)
            .await?
            .ok_or(GameError::LobbyNotFound)?;

        let players = self.store.players(lobby_id).await?;

        if let Some(existing) = players.iter().find(|p| p.player_id == player_id) {
            let mut rejoined = existing.clone();
            rejoined.name = player_name.to_string();
            rejoined.is_connected = true;

            self.store.update_player(&rejoined).await?;
            return Ok(rejoined);
        }

        if lobby.status != LOBBY_STATUS_WAITING {
            return Err(GameError::GameAlreadyStarted.into());
        }

        if players.len() as i32 >= lobby.max_players {
            return Err(GameError::LobbyFull.into());
        }

        let player = Player {
            lobby_id: lobby_id.to_string(),
            player_id: player_id.to_string(),
            name: player_name.to_string(),
            is_host: false,
            is_ready: false,
            is_connected: true,
            score: 0,
            wins: 0,
            joined_at: chrono::Utc::now().timestamp(),
        };

        self.store.upsert_player(&player).await?;
        return Ok(player);
    }

    /// Leaving as host tears the whole lobby down; leaving as a regular
    /// player only removes that row.
    pub async fn leave(&self, lobby_id: &str, player_id: &str) -> Result {
        let lobby = self.store.get_lobby(lobby_id).await?;

        match lobby {
            Some(lobby) if lobby.host_id == player_id => {
                return self.store.delete_lobby(lobby_id).await;
            }
            Some(_) => {
                return self.store.delete_player(lobby_id, player_id).await;
            }
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::GameMode;
    use crate::store::memory::MemoryStore;
    use crate::store::{ChangeFeed, SessionStore};

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    fn test_config() -> GameConfig {
        return GameConfig {
            sport: "nba".to_string(),
            mode: GameMode::Random,
            team: None,
            season: None,
            division: None,
            timer_secs: 60,
            year_min: 1990,
            year_max: 2024,
            win_target: Some(3),
            selection_scope: None,
        };
    }

    #[tokio::test]
    async fn create_generates_codes_from_the_safe_alphabet() {
        let directory = SessionDirectory::new(Arc::new(MemoryStore::new()));

        let (lobby, host) = directory.create("Alice", "alice-1", test_config()).await.unwrap();

        assert_eq!(lobby.join_code.len(), JOIN_CODE_LEN);
        assert!(lobby.join_code.chars().all(|c| JOIN_CODE_CHARS.contains(&c)));
        for forbidden in ['I', 'O', '0', '1'] {
            assert!(!lobby.join_code.contains(forbidden));
        }

        assert!(host.is_host);
        assert!(host.is_ready);
        assert_eq!(lobby.host_id, host.player_id);
    }

    #[tokio::test]
    async fn concurrently_created_lobbies_have_unique_codes() {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(SessionDirectory::new(store));

        let mut handles = Vec::new();
        for i in 0..40 {
            let directory = directory.clone();
            handles.push(tokio::spawn(async move {
                let (lobby, _) = directory
                    .create("Host", &format!("host-{i}"), test_config())
                    .await
                    .unwrap();
                return lobby.join_code;
            }));
        }

        let mut codes = HashSet::new();
        for handle in handles {
            assert!(codes.insert(handle.await.unwrap()));
        }
    }

    #[tokio::test]
    async fn join_rejects_missing_started_and_full_lobbies() {
        let store = Arc::new(MemoryStore::new());
        let directory = SessionDirectory::new(store.clone());

        let err = directory.join("nope", "p1", "Bob").await.unwrap_err();
        assert_eq!(err.game_error(), Some(&GameError::LobbyNotFound));

        let (lobby, _) = directory.create("Alice", "alice-1", test_config()).await.unwrap();

        let mut full = lobby.clone();
        full.max_players = 1;
        store.update_lobby(&full).await.unwrap();

        let err = directory.join(&lobby.lobby_id, "p1", "Bob").await.unwrap_err();
        assert_eq!(err.game_error(), Some(&GameError::LobbyFull));

        let mut started = lobby.clone();
        started.max_players = 8;
        started.status = "playing".to_string();
        store.update_lobby(&started).await.unwrap();

        let err = directory.join(&lobby.lobby_id, "p1", "Bob").await.unwrap_err();
        assert_eq!(err.game_error(), Some(&GameError::GameAlreadyStarted));
    }

    #[tokio::test]
    async fn rejoining_with_the_same_id_updates_instead_of_duplicating() {
        let store = Arc::new(MemoryStore::new());
        let directory = SessionDirectory::new(store.clone());

        let (lobby, _) = directory.create("Alice", "alice-1", test_config()).await.unwrap();
        directory.join(&lobby.lobby_id, "bob-1", "Bob").await.unwrap();

        // Rejoin works even after the game has started.
        let mut started = lobby.clone();
        started.status = "playing".to_string();
        store.update_lobby(&started).await.unwrap();

        let rejoined = directory
            .join(&lobby.lobby_id, "bob-1", "Bobby")
            .await
            .unwrap();

        assert_eq!(rejoined.name, "Bobby");
        assert!(rejoined.is_connected);
        assert_eq!(store.players(&lobby.lobby_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn host_leaving_deletes_the_lobby() {
        let store = Arc::new(MemoryStore::new());
        let directory = SessionDirectory::new(store.clone());

        let (lobby, host) = directory.create("Alice", "alice-1", test_config()).await.unwrap();
        directory.join(&lobby.lobby_id, "bob-1", "Bob").await.unwrap();

        directory.leave(&lobby.lobby_id, &host.player_id).await.unwrap();

        assert!(store.get_lobby(&lobby.lobby_id).await.unwrap().is_none());
        assert!(store.players(&lobby.lobby_id).await.unwrap().is_empty());
    }

    /// Delegating store that fails the first player insert, to exercise the
    /// compensating lobby delete.
    struct HostInsertFailsOnce {
        inner: MemoryStore,
        failed: AtomicBool,
        seen_lobby_id: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl SessionStore for HostInsertFailsOnce {
        async fn insert_lobby(&self, lobby: &Lobby) -> Result {
            *self.seen_lobby_id.lock().unwrap() = Some(lobby.lobby_id.clone());
            return self.inner.insert_lobby(lobby).await;
        }
        async fn update_lobby(&self, lobby: &Lobby) -> Result {
            return self.inner.update_lobby(lobby).await;
        }
        async fn delete_lobby(&self, lobby_id: &str) -> Result {
            return self.inner.delete_lobby(lobby_id).await;
        }
        async fn get_lobby(&self, lobby_id: &str) -> Result<Option<Lobby>> {
            return self.inner.get_lobby(lobby_id).await;
        }
        async fn find_by_code(&self, join_code: &str) -> Result<Option<Lobby>> {
            return self.inner.find_by_code(join_code).await;
        }
        async fn upsert_player(&self, player: &Player) -> Result {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(anyhow::anyhow!("simulated write failure").into());
            }
            return self.inner.upsert_player(player).await;
        }
        async fn update_player(&self, player: &Player) -> Result {
            return self.inner.update_player(player).await;
        }
        async fn delete_player(&self, lobby_id: &str, player_id: &str) -> Result {
            return self.inner.delete_player(lobby_id, player_id).await;
        }
        async fn players(&self, lobby_id: &str) -> Result<Vec<Player>> {
            return self.inner.players(lobby_id).await;
        }
        async fn subscribe(&self, lobby_id: &str) -> Result<ChangeFeed> {
            return self.inner.subscribe(lobby_id).await;
        }
    }

    #[tokio::test]
    async fn failed_host_insert_rolls_the_lobby_back() {
        let store = Arc::new(HostInsertFailsOnce {
            inner: MemoryStore::new(),
            failed: AtomicBool::new(false),
            seen_lobby_id: std::sync::Mutex::new(None),
        });
        let directory = SessionDirectory::new(store.clone());

        let err = directory.create("Alice", "alice-1", test_config()).await;
        assert!(err.is_err());

        // No orphaned lobby without a host.
        let orphan_id = store.seen_lobby_id.lock().unwrap().clone().unwrap();
        assert!(store.get_lobby(&orphan_id).await.unwrap().is_none());

        // The directory still works once the store recovers.
        let (lobby, _) = directory.create("Alice", "alice-1", test_config()).await.unwrap();
        assert!(store.get_lobby(&lobby.lobby_id).await.unwrap().is_some());
    }
}
