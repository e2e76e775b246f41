use crate::{
    models::{Lobby, Player},
    prelude::*,
    store::{ChangeEvent, ChangeFeed, ChangeOp, ChangeRow, FeedRegistry, SessionStore},
};

use async_trait::async_trait;
use sqlx::PgPool;

const PG_UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed store. Change events are fanned out through the in-process
/// registry after each committed write; cross-process delivery is the hosting
/// platform's concern, not this store's.
pub struct PgStore {
    pool: PgPool,
    feeds: FeedRegistry,
}

impl PgStore {
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let url = cfg
            .db_connection_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;

        let pool = PgPool::connect(url).await?;

        sqlx::migrate!().run(&pool).await?;

        return Ok(Self {
            pool,
            feeds: FeedRegistry::new(),
        });
    }

    fn publish(&self, op: ChangeOp, row: ChangeRow) {
        self.feeds.publish(ChangeEvent { op, row });
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION);
    }
    return false;
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_lobby(&self, lobby: &Lobby) -> Result {
        let res = sqlx::query("INSERT INTO lobbies (lobby_id, join_code, host_id, status, game_config, session_state, max_players, created_at, started_at, finished_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(&lobby.lobby_id)
            .bind(&lobby.join_code)
            .bind(&lobby.host_id)
            .bind(&lobby.status)
            .bind(&lobby.game_config)
            .bind(&lobby.session_state)
            .bind(lobby.max_players)
            .bind(lobby.created_at)
            .bind(lobby.started_at)
            .bind(lobby.finished_at)
            .execute(&self.pool)
            .await;

        if let Err(err) = res {
            if is_unique_violation(&err) {
                return Err(GameError::DuplicateJoinCode.into());
            }
            return Err(err.into());
        }

        self.publish(ChangeOp::Insert, ChangeRow::Lobbies(lobby.clone()));
        return Ok(());
    }

    async fn update_lobby(&self, lobby: &Lobby) -> Result {
        let res = sqlx::query("UPDATE lobbies SET status = $2, game_config = $3, session_state = $4, max_players = $5, started_at = $6, finished_at = $7 WHERE lobby_id = $1")
            .bind(&lobby.lobby_id)
            .bind(&lobby.status)
            .bind(&lobby.game_config)
            .bind(&lobby.session_state)
            .bind(lobby.max_players)
            .bind(lobby.started_at)
            .bind(lobby.finished_at)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(GameError::LobbyNotFound.into());
        }

        self.publish(ChangeOp::Update, ChangeRow::Lobbies(lobby.clone()));
        return Ok(());
    }

    async fn delete_lobby(&self, lobby_id: &str) -> Result {
        let players: Vec<Player> = sqlx::query_as("SELECT * FROM players WHERE lobby_id = $1")
            .bind(lobby_id)
            .fetch_all(&self.pool)
            .await?;

        let lobby: Option<Lobby> =
            sqlx::query_as("DELETE FROM lobbies WHERE lobby_id = $1 RETURNING *")
                .bind(lobby_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(lobby) = lobby {
            self.publish(ChangeOp::Delete, ChangeRow::Lobbies(lobby));
            for player in players {
                self.publish(ChangeOp::Delete, ChangeRow::Players(player));
            }
        }

        return Ok(());
    }

    async fn get_lobby(&self, lobby_id: &str) -> Result<Option<Lobby>> {
        let lobby: Option<Lobby> =
            sqlx::query_as("SELECT * FROM lobbies WHERE lobby_id = $1 LIMIT 1")
                .bind(lobby_id)
                .fetch_optional(&self.pool)
                .await?;

        return Ok(lobby);
    }

    async fn find_by_code(&self, join_code: &str) -> Result<Option<Lobby>> {
        let lobby: Option<Lobby> =
            sqlx::query_as("SELECT * FROM lobbies WHERE UPPER(join_code) = $1 LIMIT 1")
                .bind(join_code.to_uppercase())
                .fetch_optional(&self.pool)
                .await?;

        return Ok(lobby);
    }

    async fn upsert_player(&self, player: &Player) -> Result {
        let res = sqlx::query("INSERT INTO players (lobby_id, player_id, name, is_host, is_ready, is_connected, score, wins, joined_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (lobby_id, player_id) DO UPDATE SET name = $3, is_ready = $5, is_connected = $6, score = $7, wins = $8 RETURNING (xmax = 0) AS inserted")
            .bind(&player.lobby_id)
            .bind(&player.player_id)
            .bind(&player.name)
            .bind(player.is_host)
            .bind(player.is_ready)
            .bind(player.is_connected)
            .bind(player.score)
            .bind(player.wins)
            .bind(player.joined_at)
            .fetch_one(&self.pool)
            .await?;

        let inserted: bool = sqlx::Row::try_get(&res, "inserted")?;

        let op = if inserted {
            ChangeOp::Insert
        } else {
            ChangeOp::Update
        };
        self.publish(op, ChangeRow::Players(player.clone()));

        return Ok(());
    }

    async fn update_player(&self, player: &Player) -> Result {
        let res = sqlx::query("UPDATE players SET name = $3, is_ready = $4, is_connected = $5, score = $6, wins = $7 WHERE lobby_id = $1 AND player_id = $2")
            .bind(&player.lobby_id)
            .bind(&player.player_id)
            .bind(&player.name)
            .bind(player.is_ready)
            .bind(player.is_connected)
            .bind(player.score)
            .bind(player.wins)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(anyhow::anyhow!("Unknown player: {}", player.player_id).into());
        }

        self.publish(ChangeOp::Update, ChangeRow::Players(player.clone()));
        return Ok(());
    }

    async fn delete_player(&self, lobby_id: &str, player_id: &str) -> Result {
        let player: Option<Player> = sqlx::query_as(
            "DELETE FROM players WHERE lobby_id = $1 AND player_id = $2 RETURNING *",
        )
        .bind(lobby_id)
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(player) = player {
            self.publish(ChangeOp::Delete, ChangeRow::Players(player));
        }

        return Ok(());
    }

    async fn players(&self, lobby_id: &str) -> Result<Vec<Player>> {
        let players: Vec<Player> = sqlx::query_as(
            "SELECT * FROM players WHERE lobby_id = $1 ORDER BY joined_at ASC, player_id ASC",
        )
        .bind(lobby_id)
        .fetch_all(&self.pool)
        .await?;

        return Ok(players);
    }

    async fn subscribe(&self, lobby_id: &str) -> Result<ChangeFeed> {
        return Ok(self.feeds.subscribe(lobby_id));
    }
}
