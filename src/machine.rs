use crate::{
    models::{
        GameConfig, GameMode, Lobby, Player, LOBBY_STATUS_COUNTDOWN, LOBBY_STATUS_FINISHED,
        LOBBY_STATUS_PLAYING, LOBBY_STATUS_WAITING,
    },
    prelude::*,
    roster,
};

use std::collections::HashSet;

use rand::seq::SliceRandom;

pub const COUNTDOWN_TICKS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyStatus {
    Waiting,
    Countdown,
    Playing,
    Finished,
}

impl LobbyStatus {
    pub fn as_str(&self) -> &'static str {
        return match self {
            LobbyStatus::Waiting => LOBBY_STATUS_WAITING,
            LobbyStatus::Countdown => LOBBY_STATUS_COUNTDOWN,
            LobbyStatus::Playing => LOBBY_STATUS_PLAYING,
            LobbyStatus::Finished => LOBBY_STATUS_FINISHED,
        };
    }

    pub fn parse(s: &str) -> Option<Self> {
        return match s {
            LOBBY_STATUS_WAITING => Some(LobbyStatus::Waiting),
            LOBBY_STATUS_COUNTDOWN => Some(LobbyStatus::Countdown),
            LOBBY_STATUS_PLAYING => Some(LobbyStatus::Playing),
            LOBBY_STATUS_FINISHED => Some(LobbyStatus::Finished),
            _ => None,
        };
    }
}

/// Status only advances along waiting → countdown → playing → finished, with
/// the single permitted regression countdown → waiting (un-ready during the
/// countdown). The finished state is exited only through a rematch reset.
pub fn can_transition(from: LobbyStatus, to: LobbyStatus) -> bool {
    use LobbyStatus::*;

    return matches!(
        (from, to),
        (Waiting, Countdown)
            | (Countdown, Waiting)
            | (Countdown, Playing)
            | (Playing, Finished)
            | (Finished, Waiting)
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    StartCountdown,
    CancelCountdown,
    BeginPlaying,
    Finish,
}

/// Signals the pure decision function cannot derive from rows alone: the
/// host's local countdown expiry, and game-over as computed by whichever
/// game mode is running.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signals {
    pub countdown_expired: bool,
    pub game_over: bool,
}

/// Pure function of visible state, computed identically by every replica.
/// Only the host acts on the result; everyone else treats it as
/// informational.
pub fn next_transition(lobby: &Lobby, players: &[Player], signals: Signals) -> Option<Transition> {
    let status = LobbyStatus::parse(&lobby.status)?;

    return match status {
        LobbyStatus::Waiting => {
            if roster::all_ready(players) {
                Some(Transition::StartCountdown)
            } else {
                None
            }
        }
        LobbyStatus::Countdown => {
            if !roster::all_ready(players) {
                Some(Transition::CancelCountdown)
            } else if signals.countdown_expired {
                Some(Transition::BeginPlaying)
            } else {
                None
            }
        }
        LobbyStatus::Playing => {
            if signals.game_over {
                Some(Transition::Finish)
            } else {
                None
            }
        }
        LobbyStatus::Finished => None,
    };
}

/// Local countdown. Every client runs its own from the same `countdown`
/// status signal; only the host's expiry is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
}

impl Countdown {
    pub fn new() -> Self {
        return Self {
            remaining: COUNTDOWN_TICKS,
        };
    }

    pub fn tick(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        return self.remaining;
    }

    pub fn remaining(&self) -> u32 {
        return self.remaining;
    }

    pub fn expired(&self) -> bool {
        return self.remaining == 0;
    }
}

impl Default for Countdown {
    fn default() -> Self {
        return Self::new();
    }
}

/// Sampling without replacement with wraparound: "play again" draws from the
/// teams not yet used this match, and reshuffles once the pool is exhausted.
#[derive(Debug, Clone, Default)]
pub struct TeamSampler {
    pool: Vec<String>,
    used: HashSet<String>,
}

impl TeamSampler {
    pub fn new(pool: Vec<String>) -> Self {
        return Self {
            pool,
            used: HashSet::new(),
        };
    }

    pub fn draw(&mut self, rng: &mut impl rand::Rng) -> Option<String> {
        if self.pool.is_empty() {
            return None;
        }

        let mut complement: Vec<&String> =
            self.pool.iter().filter(|t| !self.used.contains(*t)).collect();

        if complement.is_empty() {
            self.used.clear();
            complement = self.pool.iter().collect();
        }

        let picked = (*complement.choose(rng)?).clone();
        self.used.insert(picked.clone());
        return Some(picked);
    }

    pub fn used(&self) -> &HashSet<String> {
        return &self.used;
    }
}

/// Host-issued rematch reset: configuration rewritten, status back to
/// waiting, transient player fields cleared. Win counters survive the reset.
/// Random-mode sessions advance the excluded-set sampler for the next team.
pub fn reset_for_rematch(
    lobby: &Lobby,
    players: &[Player],
    sampler: &mut TeamSampler,
    rng: &mut impl rand::Rng,
) -> Result<(Lobby, Vec<Player>)> {
    let mut config = GameConfig::from_value(&lobby.game_config)?;

    if config.mode == GameMode::Random {
        config.team = sampler.draw(rng);
    }

    let mut reset_lobby = lobby.clone();
    reset_lobby.status = LOBBY_STATUS_WAITING.to_string();
    reset_lobby.game_config = config.to_value()?;
    reset_lobby.session_state = serde_json::Value::Null;
    reset_lobby.started_at = None;
    reset_lobby.finished_at = None;

    let reset_players = players
        .iter()
        .map(|p| {
            let mut reset = p.clone();
            reset.score = 0;
            // The host stays ready, exactly as at creation.
            reset.is_ready = p.is_host;
            return reset;
        })
        .collect();

    return Ok((reset_lobby, reset_players));
}
