use crate::{
    models::{Lobby, Player},
    prelude::*,
    store::SessionStore,
};

use std::sync::Arc;

/// True iff there are at least two players and every one of them is ready.
/// Every client computes this from whatever rows it has observed; only the
/// host acts on the result.
pub fn all_ready(players: &[Player]) -> bool {
    return players.len() >= 2 && players.iter().all(|p| p.is_ready);
}

pub fn is_host(lobby: &Lobby, player_id: &str) -> bool {
    return lobby.host_id == player_id;
}

/// Orders by `joined_at` (then id, for rows created in the same second) and
/// drops duplicate player ids, keeping the first occurrence.
pub fn ordered(mut players: Vec<Player>) -> Vec<Player> {
    players.sort_by(|a, b| (a.joined_at, &a.player_id).cmp(&(b.joined_at, &b.player_id)));
    players.dedup_by(|a, b| a.player_id == b.player_id);
    return players;
}

pub async fn set_ready(store: &Arc<dyn SessionStore>, player: &Player, ready: bool) -> Result<Player> {
    let mut updated = player.clone();
    updated.is_ready = ready;

    store.update_player(&updated).await?;
    return Ok(updated);
}

pub async fn set_connected(
    store: &Arc<dyn SessionStore>,
    player: &Player,
    connected: bool,
) -> Result<Player> {
    let mut updated = player.clone();
    updated.is_connected = connected;

    store.update_player(&updated).await?;
    return Ok(updated);
}

/// Score sync is a non-critical write: a failure is logged and swallowed, the
/// next successful sync self-corrects.
pub async fn sync_score(store: &Arc<dyn SessionStore>, player: &Player, score: i32) -> Player {
    let mut updated = player.clone();
    updated.score = score;

    if let Err(err) = store.update_player(&updated).await {
        tracing::warn!(error = %err, player_id = %player.player_id, "score sync failed, will retry on next tick");
        return player.clone();
    }

    return updated;
}
