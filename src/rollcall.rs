use crate::prelude::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NameGroup {
    pub canonical: String,
    pub members: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MergeSuggestion {
    /// Stable key: the same pair of names always yields the same key, so a
    /// decision made once sticks across re-grouping.
    pub key: String,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupingResult {
    pub groups: Vec<NameGroup>,
    pub suggestions: Vec<MergeSuggestion>,
}

/// The fuzzy name-deduplication collaborator. The matching itself lives
/// elsewhere; this engine only consumes its output and persists the
/// confirm/dismiss decisions.
pub trait NameGrouper: Send + Sync {
    fn group(&self, submissions: &[String]) -> GroupingResult;
}

/// Roll-call session state: the raw submissions plus the decisions taken on
/// merge suggestions, stored in the lobby's `session_state` blob.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RollCallState {
    pub submissions: Vec<String>,
    /// Suggestion key -> confirmed (true) or dismissed (false).
    pub decisions: BTreeMap<String, bool>,
}

impl RollCallState {
    pub fn to_value(&self) -> Result<serde_json::Value> {
        return Ok(serde_json::to_value(self)?);
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        return Ok(serde_json::from_value(value.clone())?);
    }

    pub fn submit(&mut self, raw_name: &str) {
        let trimmed = raw_name.trim();
        if !trimmed.is_empty() {
            self.submissions.push(trimmed.to_string());
        }
    }

    /// First decision wins; a re-send of the same confirm/dismiss is dropped.
    pub fn record_decision(&mut self, suggestion_key: &str, confirmed: bool) {
        self.decisions
            .entry(suggestion_key.to_string())
            .or_insert(confirmed);
    }

    /// Suggestions not yet decided, in the collaborator's order.
    pub fn pending<'a>(&self, all: &'a [MergeSuggestion]) -> Vec<&'a MergeSuggestion> {
        return all
            .iter()
            .filter(|s| !self.decisions.contains_key(&s.key))
            .collect();
    }

    pub fn confirmed_keys(&self) -> Vec<&str> {
        return self
            .decisions
            .iter()
            .filter(|(_, confirmed)| **confirmed)
            .map(|(key, _)| key.as_str())
            .collect();
    }
}
