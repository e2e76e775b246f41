use crate::prelude::*;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Random,
    Manual,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub sport: String,
    pub mode: GameMode,

    pub team: Option<String>,
    pub season: Option<i32>,
    pub division: Option<String>,

    pub timer_secs: u32,
    pub year_min: i32,
    pub year_max: i32,

    pub win_target: Option<u32>,
    pub selection_scope: Option<String>,
}

impl GameConfig {
    pub fn to_value(&self) -> Result<serde_json::Value> {
        return Ok(serde_json::to_value(self)?);
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        return Ok(serde_json::from_value(value.clone())?);
    }
}
