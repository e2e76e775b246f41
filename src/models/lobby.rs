use serde::{Deserialize, Serialize};
use sqlx;

pub const LOBBY_STATUS_WAITING: &str = "waiting";
pub const LOBBY_STATUS_COUNTDOWN: &str = "countdown";
pub const LOBBY_STATUS_PLAYING: &str = "playing";
pub const LOBBY_STATUS_FINISHED: &str = "finished";

pub const DEFAULT_MAX_PLAYERS: i32 = 8;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Lobby {
    pub lobby_id: String,
    pub join_code: String,
    pub host_id: String,

    pub status: String,

    pub game_config: serde_json::Value,

    /// Mode-specific blob owned by the round coordinator; everything else
    /// treats it as opaque.
    pub session_state: serde_json::Value,

    pub max_players: i32,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}
