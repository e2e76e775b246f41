use crate::prelude::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pick {
    pub player_name: String,
    pub year: i32,
    pub value: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PlayerRound {
    pub has_picked_this_round: bool,
    pub is_busted: bool,
    pub is_finished: bool,
    pub total: u32,
    pub picks: Vec<Pick>,
}

/// The `session_state` blob for round-based games. Written wholesale by every
/// client, so it stays a flat JSON structure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoundState {
    pub round: u32,
    pub total_rounds: u32,
    pub current_team: String,
    pub target_cap: u32,
    pub players: BTreeMap<String, PlayerRound>,
}

impl RoundState {
    pub fn new<I, S>(total_rounds: u32, target_cap: u32, team: &str, player_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let players = player_ids
            .into_iter()
            .map(|id| (id.into(), PlayerRound::default()))
            .collect();

        return Self {
            round: 1,
            total_rounds,
            current_team: team.to_string(),
            target_cap,
            players,
        };
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        return Ok(serde_json::to_value(self)?);
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        return Ok(serde_json::from_value(value.clone())?);
    }

    /// A round is complete once every player has either picked or is out.
    pub fn round_complete(&self) -> bool {
        return !self.players.is_empty()
            && self
                .players
                .values()
                .all(|p| p.has_picked_this_round || p.is_finished);
    }

    pub fn all_busted(&self) -> bool {
        return !self.players.is_empty() && self.players.values().all(|p| p.is_busted);
    }
}

/// Folds one pick into the blob. Pure: reads the latest known state, mutates
/// only the submitting player's sub-entry, returns the merged whole. A pick
/// for a player who already picked this round (or is out) returns the state
/// unchanged, which is what makes duplicate submissions harmless.
pub fn apply_pick(state: &RoundState, player_id: &str, pick: Pick) -> RoundState {
    let mut next = state.clone();

    let Some(entry) = next.players.get_mut(player_id) else {
        tracing::warn!(player_id, "pick from a player not in the session state");
        return next;
    };

    if entry.has_picked_this_round || entry.is_finished {
        return next;
    }

    // The value comes from an external collaborator; saturate rather than
    // trust it to stay in range.
    entry.total = entry.total.saturating_add(pick.value);
    entry.picks.push(pick);
    entry.has_picked_this_round = true;

    if entry.total > next.target_cap {
        entry.is_busted = true;
        entry.is_finished = true;
    }

    return next;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    NextRound(RoundState),
    Finish,
}

/// Host-side round advancement. Every client re-evaluates completion on every
/// change notification, and the host's own write echoes back to itself, so
/// the coordinator remembers the highest round it has already advanced and
/// silently drops the duplicate.
#[derive(Debug, Clone, Default)]
pub struct RoundCoordinator {
    advanced_through: u32,
}

impl RoundCoordinator {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn advance(
        &mut self,
        state: &RoundState,
        next_team: impl FnOnce() -> String,
    ) -> Option<Advance> {
        if !state.round_complete() {
            return None;
        }

        if self.advanced_through >= state.round {
            // Duplicate notification echo; harmless noise, not an error.
            tracing::debug!(round = state.round, "round already advanced, skipping");
            return None;
        }
        self.advanced_through = state.round;

        if state.round + 1 > state.total_rounds || state.all_busted() {
            return Some(Advance::Finish);
        }

        let mut next = state.clone();
        next.round += 1;
        next.current_team = next_team();
        for entry in next.players.values_mut() {
            // Finished players stay flagged so later rounds auto-skip them.
            if !entry.is_finished {
                entry.has_picked_this_round = false;
            }
        }

        return Some(Advance::NextRound(next));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub player_id: String,
    pub total: u32,
    pub busted: bool,
}

/// Final standings: non-busted players before busted ones, higher total
/// first. Equal totals are broken by roster join order, earliest first; the
/// rule is deliberate, not an artifact of sort instability.
pub fn rankings(state: &RoundState, roster_order: &[String]) -> Vec<Standing> {
    let position = |id: &str| {
        return roster_order
            .iter()
            .position(|r| r == id)
            .unwrap_or(roster_order.len());
    };

    let mut standings: Vec<Standing> = state
        .players
        .iter()
        .map(|(id, p)| Standing {
            player_id: id.clone(),
            total: p.total,
            busted: p.is_busted,
        })
        .collect();

    standings.sort_by(|a, b| {
        (a.busted, std::cmp::Reverse(a.total), position(&a.player_id)).cmp(&(
            b.busted,
            std::cmp::Reverse(b.total),
            position(&b.player_id),
        ))
    });

    return standings;
}

/// `session_state` for single-round games: finished once every connected
/// player has submitted a final score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FinalScores {
    pub finals: BTreeMap<String, i32>,
}

impl FinalScores {
    pub fn to_value(&self) -> Result<serde_json::Value> {
        return Ok(serde_json::to_value(self)?);
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        return Ok(serde_json::from_value(value.clone())?);
    }

    pub fn submit(&mut self, player_id: &str, score: i32) {
        self.finals.entry(player_id.to_string()).or_insert(score);
    }

    pub fn all_submitted<'a>(&self, connected_ids: impl IntoIterator<Item = &'a str>) -> bool {
        let mut any = false;
        for id in connected_ids {
            any = true;
            if !self.finals.contains_key(id) {
                return false;
            }
        }
        return any;
    }
}
