use serde::{Deserialize, Serialize};
use sqlx;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Player {
    pub lobby_id: String,

    /// Client-generated, persisted locally across sessions. Re-using the
    /// same id after a page reload is the reconnection path.
    pub player_id: String,

    pub name: String,

    pub is_host: bool,
    pub is_ready: bool,
    pub is_connected: bool,

    pub score: i32,
    pub wins: i32,

    pub joined_at: i64,
}
