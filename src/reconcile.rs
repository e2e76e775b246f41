use crate::{
    models::{Lobby, Player},
    roster,
    store::{ChangeEvent, ChangeOp, ChangeRow},
};

/// Everything one client knows about a lobby, folded from per-row change
/// events. Events arrive with no cross-row ordering, so aggregates are always
/// re-derived from whichever rows are present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbySnapshot {
    pub lobby: Option<Lobby>,
    pub players: Vec<Player>,
}

impl LobbySnapshot {
    pub fn apply(&mut self, event: &ChangeEvent) {
        match (&event.op, &event.row) {
            (ChangeOp::Delete, ChangeRow::Lobbies(_)) => {
                self.lobby = None;
                self.players.clear();
            }
            (_, ChangeRow::Lobbies(lobby)) => {
                self.lobby = Some(lobby.clone());
            }
            (ChangeOp::Delete, ChangeRow::Players(player)) => {
                self.players.retain(|p| p.player_id != player.player_id);
            }
            (_, ChangeRow::Players(player)) => {
                self.players.retain(|p| p.player_id != player.player_id);
                self.players.push(player.clone());
                self.players = roster::ordered(std::mem::take(&mut self.players));
            }
        }
    }
}

/// Two-tier state container. The confirmed tier is fed only by the change
/// feed; the pending tier holds locally issued but unconfirmed writes.
/// Merging precedence: pending wins for rows this client owns (its own
/// player row, plus the lobby row when it is the host), confirmed wins
/// otherwise. This is what keeps a simultaneous remote pick from clobbering
/// the local optimistic view while our own write is in flight.
#[derive(Debug, Clone)]
pub struct LobbyView {
    local_player_id: String,
    confirmed: LobbySnapshot,
    pending_lobby: Option<Lobby>,
    pending_player: Option<Player>,
}

impl LobbyView {
    pub fn new(local_player_id: &str) -> Self {
        return Self {
            local_player_id: local_player_id.to_string(),
            confirmed: LobbySnapshot::default(),
            pending_lobby: None,
            pending_player: None,
        };
    }

    pub fn seed(&mut self, lobby: Lobby, players: Vec<Player>) {
        self.confirmed = LobbySnapshot {
            lobby: Some(lobby),
            players: roster::ordered(players),
        };
    }

    pub fn apply(&mut self, event: &ChangeEvent) {
        self.confirmed.apply(event);

        // An echo that already matches the pending write confirms it early.
        if let (Some(pending), Some(confirmed)) = (&self.pending_lobby, &self.confirmed.lobby) {
            if pending == confirmed {
                self.pending_lobby = None;
            }
        }
        if let Some(pending) = &self.pending_player {
            let confirmed = self
                .confirmed
                .players
                .iter()
                .find(|p| p.player_id == pending.player_id);
            if confirmed == Some(pending) {
                self.pending_player = None;
            }
        }
    }

    pub fn begin_lobby_write(&mut self, lobby: Lobby) {
        self.pending_lobby = Some(lobby);
    }

    pub fn begin_player_write(&mut self, player: Player) {
        debug_assert_eq!(player.player_id, self.local_player_id);
        self.pending_player = Some(player);
    }

    /// The store accepted the write: promote pending into confirmed so the
    /// view does not regress while the echo is still in flight. The echo
    /// re-applies the same rows, which is harmless.
    pub fn complete_write(&mut self) {
        if let Some(lobby) = self.pending_lobby.take() {
            self.confirmed.lobby = Some(lobby);
        }
        if let Some(player) = self.pending_player.take() {
            self.confirmed
                .players
                .retain(|p| p.player_id != player.player_id);
            self.confirmed.players.push(player);
            self.confirmed.players = roster::ordered(std::mem::take(&mut self.confirmed.players));
        }
    }

    /// The write failed: drop the optimistic tier, the confirmed tier is
    /// still authoritative.
    pub fn fail_write(&mut self) {
        self.pending_lobby = None;
        self.pending_player = None;
    }

    pub fn has_pending_write(&self) -> bool {
        return self.pending_lobby.is_some() || self.pending_player.is_some();
    }

    /// Effective lobby row: pending over confirmed.
    pub fn lobby(&self) -> Option<&Lobby> {
        return self.pending_lobby.as_ref().or(self.confirmed.lobby.as_ref());
    }

    /// Effective roster: confirmed rows with the local player's pending row
    /// overlaid.
    pub fn players(&self) -> Vec<Player> {
        let mut players = self.confirmed.players.clone();

        if let Some(pending) = &self.pending_player {
            players.retain(|p| p.player_id != pending.player_id);
            players.push(pending.clone());
            players = roster::ordered(players);
        }

        return players;
    }

    pub fn local_player(&self) -> Option<Player> {
        return self
            .players()
            .into_iter()
            .find(|p| p.player_id == self.local_player_id);
    }

    pub fn is_local_host(&self) -> bool {
        return self
            .lobby()
            .map(|l| roster::is_host(l, &self.local_player_id))
            .unwrap_or(false);
    }
}
