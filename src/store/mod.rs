pub mod memory;
pub mod pg;

use crate::{
    models::{Lobby, Player},
    prelude::*,
};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

const FEED_CAPACITY: usize = 64;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "table", content = "row", rename_all = "lowercase")]
pub enum ChangeRow {
    Lobbies(Lobby),
    Players(Player),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    pub row: ChangeRow,
}

impl ChangeEvent {
    pub fn lobby_id(&self) -> &str {
        return match &self.row {
            ChangeRow::Lobbies(lobby) => &lobby.lobby_id,
            ChangeRow::Players(player) => &player.lobby_id,
        };
    }
}

/// Per-lobby change notification stream. Delivery is per-row only: there is
/// no cross-row atomicity or total order across the lobby row and its player
/// rows, and consumers must tolerate duplicates and lag.
pub struct ChangeFeed {
    inner: BroadcastStream<ChangeEvent>,
}

impl ChangeFeed {
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.inner.next().await {
                Some(Ok(event)) => return Some(event),
                // Dropped events are recovered by re-reading rows, not replayed.
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "change feed lagged");
                    continue;
                }
                None => return None,
            }
        }
    }
}

/// Fan-out registry shared by store implementations: one broadcast channel
/// per lobby, created lazily on first subscribe or publish.
#[derive(Clone, Default)]
pub struct FeedRegistry {
    senders: Arc<RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn subscribe(&self, lobby_id: &str) -> ChangeFeed {
        let mut senders = self.senders.write().unwrap();

        let sender = senders
            .entry(lobby_id.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0);

        return ChangeFeed {
            inner: BroadcastStream::new(sender.subscribe()),
        };
    }

    pub fn publish(&self, event: ChangeEvent) {
        let senders = self.senders.read().unwrap();

        if let Some(sender) = senders.get(event.lobby_id()) {
            // No subscribers is fine.
            let _ = sender.send(event);
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_lobby(&self, lobby: &Lobby) -> Result;
    async fn update_lobby(&self, lobby: &Lobby) -> Result;
    async fn delete_lobby(&self, lobby_id: &str) -> Result;
    async fn get_lobby(&self, lobby_id: &str) -> Result<Option<Lobby>>;
    async fn find_by_code(&self, join_code: &str) -> Result<Option<Lobby>>;

    async fn upsert_player(&self, player: &Player) -> Result;
    async fn update_player(&self, player: &Player) -> Result;
    async fn delete_player(&self, lobby_id: &str, player_id: &str) -> Result;

    /// Players of a lobby, `joined_at` ascending (stable display order).
    async fn players(&self, lobby_id: &str) -> Result<Vec<Player>>;

    async fn subscribe(&self, lobby_id: &str) -> Result<ChangeFeed>;
}
