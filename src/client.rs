use crate::{
    machine::{self, Countdown, LobbyStatus, Signals, TeamSampler, Transition},
    models::{GameConfig, GameMode, Lobby, Player},
    prelude::*,
    reconcile::LobbyView,
    rollcall::{MergeSuggestion, NameGrouper, RollCallState},
    roster,
    rounds::{self, Advance, FinalScores, Pick, RoundCoordinator, RoundState, Standing},
    stats::StatsProvider,
    store::{ChangeEvent, ChangeFeed, SessionStore},
};

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameplayMode {
    /// One shot per player; finished once every connected player has
    /// submitted a final score.
    SingleRound,
    /// Turn-based: every active player picks once per round.
    Rounds { total_rounds: u32, target_cap: u32 },
    /// Free-text name collection; the host ends it when the timer is up.
    RollCall,
}

/// One participant's engine: folds the change feed through the
/// reconciliation layer, re-derives the aggregate conditions, and — only
/// when the local player is the host — acts on them.
pub struct SessionClient {
    store: Arc<dyn SessionStore>,
    stats: Arc<dyn StatsProvider>,

    lobby_id: String,
    player_id: String,
    mode: GameplayMode,

    view: LobbyView,
    feed: ChangeFeed,

    coordinator: RoundCoordinator,
    countdown: Option<Countdown>,
    sampler: TeamSampler,
}

impl SessionClient {
    pub async fn attach(
        store: Arc<dyn SessionStore>,
        stats: Arc<dyn StatsProvider>,
        lobby: Lobby,
        player: Player,
        mode: GameplayMode,
        team_pool: Vec<String>,
    ) -> Result<Self> {
        // Subscribe before the initial read so no write lands in the gap.
        let feed = store.subscribe(&lobby.lobby_id).await?;
        let players = store.players(&lobby.lobby_id).await?;

        let mut view = LobbyView::new(&player.player_id);
        view.seed(lobby.clone(), players);

        let mut client = Self {
            store,
            stats,
            lobby_id: lobby.lobby_id.clone(),
            player_id: player.player_id.clone(),
            mode,
            view,
            feed,
            coordinator: RoundCoordinator::new(),
            countdown: None,
            sampler: TeamSampler::new(team_pool),
        };

        client.sync_countdown();
        client.evaluate().await?;

        return Ok(client);
    }

    pub fn status(&self) -> Option<LobbyStatus> {
        return self.view.lobby().and_then(|l| LobbyStatus::parse(&l.status));
    }

    pub fn players(&self) -> Vec<Player> {
        return self.view.players();
    }

    pub fn is_host(&self) -> bool {
        return self.view.is_local_host();
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        return self.countdown.map(|c| c.remaining());
    }

    pub fn round_state(&self) -> Option<RoundState> {
        let lobby = self.view.lobby()?;
        return RoundState::from_value(&lobby.session_state).ok();
    }

    pub fn standings(&self) -> Option<Vec<Standing>> {
        let state = self.round_state()?;
        let order: Vec<String> = self.players().into_iter().map(|p| p.player_id).collect();
        return Some(rounds::rankings(&state, &order));
    }

    fn effective_lobby(&self) -> Result<Lobby> {
        return self
            .view
            .lobby()
            .cloned()
            .ok_or_else(|| GameError::LobbyNotFound.into());
    }

    fn local_player(&self) -> Result<Player> {
        return self
            .view
            .local_player()
            .ok_or_else(|| GameError::LobbyNotFound.into());
    }

    /// Processes one change notification. Returns `None` once the feed is
    /// closed (lobby torn down).
    pub async fn pump_one(&mut self) -> Result<Option<ChangeEvent>> {
        let Some(event) = self.feed.next().await else {
            return Ok(None);
        };

        self.view.apply(&event);
        self.sync_countdown();
        self.evaluate().await?;

        return Ok(Some(event));
    }

    /// One local countdown tick. Every client ticks its own visual countdown;
    /// only the host's expiry produces the authoritative `playing` write,
    /// via the next evaluation.
    pub async fn tick(&mut self) -> Result {
        if self.status() == Some(LobbyStatus::Countdown) {
            if let Some(countdown) = &mut self.countdown {
                countdown.tick();
            }
            self.evaluate().await?;
        }
        return Ok(());
    }

    pub async fn set_ready(&mut self, ready: bool) -> Result {
        let player = self.local_player()?;

        let mut optimistic = player.clone();
        optimistic.is_ready = ready;
        self.view.begin_player_write(optimistic);

        match roster::set_ready(&self.store, &player, ready).await {
            Ok(_) => {
                self.view.complete_write();
                self.evaluate().await?;
                return Ok(());
            }
            Err(err) => {
                self.view.fail_write();
                return Err(err);
            }
        }
    }

    /// Presence marker, e.g. on page hide/show. Disconnected players are
    /// excluded from completion conditions that gate on the live roster.
    pub async fn mark_connected(&mut self, connected: bool) -> Result {
        let player = self.local_player()?;

        let mut optimistic = player.clone();
        optimistic.is_connected = connected;
        self.view.begin_player_write(optimistic);

        match roster::set_connected(&self.store, &player, connected).await {
            Ok(_) => {
                self.view.complete_write();
                self.evaluate().await?;
                return Ok(());
            }
            Err(err) => {
                self.view.fail_write();
                return Err(err);
            }
        }
    }

    /// Confirm step of the pick flow: one atomic write that prices the pick,
    /// appends it, recomputes the total, applies the bust rule and sets the
    /// picked flag. Reads the latest known shared state and writes back the
    /// whole merged blob; the pending tier keeps a simultaneous remote pick
    /// from clobbering the local view while this write is in flight.
    pub async fn submit_pick(&mut self, pick_name: &str, year: i32) -> Result {
        let lobby = self.effective_lobby()?;
        let config = GameConfig::from_value(&lobby.game_config)?;

        let value = self
            .stats
            .season_value(&config.sport, pick_name, year)
            .await?;

        let state = RoundState::from_value(&lobby.session_state)?;
        let next = rounds::apply_pick(
            &state,
            &self.player_id,
            Pick {
                player_name: pick_name.to_string(),
                year,
                value,
            },
        );

        let mut updated = lobby;
        updated.session_state = next.to_value()?;

        // Pick confirmation is a critical write: surfaced with a retry
        // affordance, never silently dropped.
        self.write_lobby(updated).await?;
        self.evaluate().await?;

        return Ok(());
    }

    /// Single-round games: record this player's final score. First write
    /// wins per player, so a duplicate submission cannot change the result.
    pub async fn submit_final_score(&mut self, score: i32) -> Result {
        let lobby = self.effective_lobby()?;

        let mut finals = FinalScores::from_value(&lobby.session_state)?;
        finals.submit(&self.player_id, score);

        let mut updated = lobby;
        updated.session_state = finals.to_value()?;
        self.write_lobby(updated).await?;

        // Score mirror on the player row is best-effort.
        let player = self.local_player()?;
        crate::roster::sync_score(&self.store, &player, score).await;

        self.evaluate().await?;
        return Ok(());
    }

    /// Roll call: append one raw name submission to the shared list.
    pub async fn submit_name(&mut self, raw_name: &str) -> Result {
        let lobby = self.effective_lobby()?;

        let mut state = RollCallState::from_value(&lobby.session_state)?;
        state.submit(raw_name);

        let mut updated = lobby;
        updated.session_state = state.to_value()?;
        self.write_lobby(updated).await?;

        return Ok(());
    }

    /// Persist a confirm/dismiss decision on a merge suggestion produced by
    /// the dedup collaborator. First decision per key wins.
    pub async fn record_merge_decision(&mut self, suggestion_key: &str, confirmed: bool) -> Result {
        let lobby = self.effective_lobby()?;

        let mut state = RollCallState::from_value(&lobby.session_state)?;
        state.record_decision(suggestion_key, confirmed);

        let mut updated = lobby;
        updated.session_state = state.to_value()?;
        self.write_lobby(updated).await?;

        return Ok(());
    }

    pub fn roll_call_state(&self) -> Option<RollCallState> {
        let lobby = self.view.lobby()?;
        return RollCallState::from_value(&lobby.session_state).ok();
    }

    /// Runs the dedup collaborator over the current submissions and returns
    /// the suggestions still awaiting a confirm/dismiss.
    pub fn pending_suggestions(&self, grouper: &dyn NameGrouper) -> Vec<MergeSuggestion> {
        let Some(state) = self.roll_call_state() else {
            return Vec::new();
        };

        let grouped = grouper.group(&state.submissions);
        return state
            .pending(&grouped.suggestions)
            .into_iter()
            .cloned()
            .collect();
    }

    /// Host-only: end a game that has no row-derivable completion condition
    /// (roll call runs on a wall-clock timer).
    pub async fn end_game(&mut self) -> Result {
        if !self.view.is_local_host() {
            return Err(GameError::NotHost.into());
        }

        let mut updated = self.effective_lobby()?;

        let allowed = LobbyStatus::parse(&updated.status)
            .map(|s| machine::can_transition(s, LobbyStatus::Finished))
            .unwrap_or(false);
        if !allowed {
            return Err(GameError::WrongPhase.into());
        }

        updated.status = LobbyStatus::Finished.as_str().to_string();
        updated.finished_at = Some(chrono::Utc::now().timestamp());
        self.write_lobby(updated).await?;

        return Ok(());
    }

    /// Host-only: rematch reset out of the finished state.
    pub async fn start_rematch(&mut self) -> Result {
        if !self.view.is_local_host() {
            return Err(GameError::NotHost.into());
        }

        let lobby = self.effective_lobby()?;

        // Rematch is the only exit from the finished state; anywhere else
        // this reset would regress the status machine.
        if LobbyStatus::parse(&lobby.status) != Some(LobbyStatus::Finished) {
            return Err(GameError::WrongPhase.into());
        }

        let mut players = self.view.players();

        // Round-based games: credit the win before the reset wipes scores.
        // Win counters survive rematches.
        if let GameplayMode::Rounds { .. } = self.mode {
            let winner = self
                .standings()
                .and_then(|s| s.into_iter().next())
                .filter(|s| !s.busted);
            if let Some(winner) = winner {
                if let Some(row) = players.iter_mut().find(|p| p.player_id == winner.player_id) {
                    row.wins += 1;
                }
            }
        }

        let (reset_lobby, reset_players) = machine::reset_for_rematch(
            &lobby,
            &players,
            &mut self.sampler,
            &mut rand::thread_rng(),
        )?;

        self.coordinator = RoundCoordinator::new();
        self.write_lobby(reset_lobby).await?;
        for player in reset_players {
            self.store.update_player(&player).await?;
        }

        return Ok(());
    }

    pub async fn leave(self) -> Result {
        if self.view.is_local_host() {
            return self.store.delete_lobby(&self.lobby_id).await;
        }
        return self.store.delete_player(&self.lobby_id, &self.player_id).await;
    }

    fn sync_countdown(&mut self) {
        match self.status() {
            Some(LobbyStatus::Countdown) => {
                if self.countdown.is_none() {
                    self.countdown = Some(Countdown::new());
                }
            }
            _ => self.countdown = None,
        }
    }

    /// Re-evaluates the shared decision function against the current view.
    /// Everyone computes it; only the host acts.
    async fn evaluate(&mut self) -> Result {
        if !self.view.is_local_host() {
            return Ok(());
        }

        let Ok(lobby) = self.effective_lobby() else {
            return Ok(());
        };
        let players = self.view.players();

        let signals = Signals {
            countdown_expired: self.countdown.map(|c| c.expired()).unwrap_or(false),
            game_over: self.single_round_over(&lobby, &players)?,
        };

        match machine::next_transition(&lobby, &players, signals) {
            Some(Transition::StartCountdown) => {
                let mut updated = lobby;
                updated.status = LobbyStatus::Countdown.as_str().to_string();
                self.write_lobby_transition(updated).await;
                self.sync_countdown();
            }
            Some(Transition::CancelCountdown) => {
                let mut updated = lobby;
                updated.status = LobbyStatus::Waiting.as_str().to_string();
                self.write_lobby_transition(updated).await;
                self.sync_countdown();
            }
            Some(Transition::BeginPlaying) => {
                let updated = self.playing_lobby(lobby, &players)?;
                self.write_lobby_transition(updated).await;
                self.sync_countdown();
            }
            Some(Transition::Finish) => {
                let mut updated = lobby;
                updated.status = LobbyStatus::Finished.as_str().to_string();
                updated.finished_at = Some(chrono::Utc::now().timestamp());
                self.write_lobby_transition(updated).await;
            }
            None => {
                self.evaluate_rounds().await;
            }
        }

        return Ok(());
    }

    /// Round-based advancement, layered on top of the state machine.
    async fn evaluate_rounds(&mut self) {
        if self.status() != Some(LobbyStatus::Playing) {
            return;
        }
        let GameplayMode::Rounds { .. } = self.mode else {
            return;
        };
        let Ok(lobby) = self.effective_lobby() else {
            return;
        };
        let Ok(state) = RoundState::from_value(&lobby.session_state) else {
            return;
        };

        let sampler = &mut self.sampler;
        let advance = self.coordinator.advance(&state, || {
            return sampler
                .draw(&mut rand::thread_rng())
                .unwrap_or_else(|| state.current_team.clone());
        });

        match advance {
            Some(Advance::NextRound(next)) => {
                let mut updated = lobby;
                updated.session_state = match next.to_value() {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to serialize round state");
                        return;
                    }
                };
                self.write_lobby_transition(updated).await;
            }
            Some(Advance::Finish) => {
                let mut updated = lobby;
                updated.status = LobbyStatus::Finished.as_str().to_string();
                updated.finished_at = Some(chrono::Utc::now().timestamp());
                self.write_lobby_transition(updated).await;
            }
            None => {}
        }
    }

    fn single_round_over(&self, lobby: &Lobby, players: &[Player]) -> Result<bool> {
        if self.mode != GameplayMode::SingleRound {
            return Ok(false);
        }
        if LobbyStatus::parse(&lobby.status) != Some(LobbyStatus::Playing) {
            return Ok(false);
        }

        let finals = FinalScores::from_value(&lobby.session_state)?;
        let connected = players
            .iter()
            .filter(|p| p.is_connected)
            .map(|p| p.player_id.as_str());

        return Ok(finals.all_submitted(connected));
    }

    fn playing_lobby(&mut self, lobby: Lobby, players: &[Player]) -> Result<Lobby> {
        let config = GameConfig::from_value(&lobby.game_config)?;

        let mut updated = lobby;
        updated.status = LobbyStatus::Playing.as_str().to_string();
        updated.started_at = Some(chrono::Utc::now().timestamp());

        updated.session_state = match self.mode {
            GameplayMode::SingleRound => FinalScores::default().to_value()?,
            GameplayMode::RollCall => RollCallState::default().to_value()?,
            GameplayMode::Rounds {
                total_rounds,
                target_cap,
            } => {
                let team = match config.mode {
                    // A rematch reset has already drawn the next team into
                    // the config and marked it used; only the very first
                    // game draws here.
                    GameMode::Random => match config.team {
                        Some(team) => team,
                        None => self
                            .sampler
                            .draw(&mut rand::thread_rng())
                            .unwrap_or_default(),
                    },
                    GameMode::Manual => config.team.unwrap_or_default(),
                };

                let ids = players.iter().map(|p| p.player_id.clone());
                RoundState::new(total_rounds, target_cap, &team, ids).to_value()?
            }
        };

        return Ok(updated);
    }

    /// Critical lobby write: optimistic pending tier, error propagated.
    async fn write_lobby(&mut self, lobby: Lobby) -> Result {
        self.view.begin_lobby_write(lobby.clone());
        match self.store.update_lobby(&lobby).await {
            Ok(()) => {
                self.view.complete_write();
                return Ok(());
            }
            Err(err) => {
                self.view.fail_write();
                return Err(err);
            }
        }
    }

    /// Transition write: fire-and-forget. A failure is surfaced in the log
    /// and local optimistic state reverts; the authoritative state only
    /// changes once the change feed confirms it.
    async fn write_lobby_transition(&mut self, lobby: Lobby) {
        let status = lobby.status.clone();

        if let Err(err) = self.write_lobby(lobby).await {
            tracing::warn!(error = %err, status, "transition write failed");
        }
    }
}
