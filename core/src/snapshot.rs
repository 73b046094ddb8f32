//! Serializable views of match state for the render side and tooling.

use crate::{
    types::{ActionPoints, Round},
    unit::UnitSnapshot,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub name:                  String,
    pub current_action_points: ActionPoints,
    pub max_action_points:     ActionPoints,
    pub army_size:             u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub round:                Round,
    pub current_player_index: usize,
    pub players:              Vec<PlayerSnapshot>,
}

impl MatchSnapshot {
    /// None when the index does not point at a seat, e.g. a hand-built
    /// snapshot received over IPC.
    pub fn current_player(&self) -> Option<&PlayerSnapshot> {
        self.players.get(self.current_player_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "match")]
    pub match_state:     MatchSnapshot,
    pub units:           Vec<UnitSnapshot>,
    /// Simulation steps run by the scheduler so far.
    pub ticks:           u64,
    pub live_updatables: usize,
}
