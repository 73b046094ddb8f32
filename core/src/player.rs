use crate::{
    error::{CoreError, CoreResult},
    types::ActionPoints,
};
use serde::{Deserialize, Serialize};

/// A participant in the turn order. Invariant: `0 <= current <= max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    name:                  String,
    current_action_points: ActionPoints,
    max_action_points:     ActionPoints,
}

impl Player {
    /// A player starts with a full action-point pool.
    pub fn new(name: impl Into<String>, max_action_points: ActionPoints) -> CoreResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::invalid_argument("player name must not be empty"));
        }
        if max_action_points == 0 {
            return Err(CoreError::invalid_argument(format!(
                "player '{name}' needs max_action_points > 0"
            )));
        }
        Ok(Self {
            name,
            current_action_points: max_action_points,
            max_action_points,
        })
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn current_action_points(&self) -> ActionPoints { self.current_action_points }
    pub fn max_action_points(&self) -> ActionPoints { self.max_action_points }

    /// Deduct `amount`, returning what is left. Fails without touching the
    /// pool when `amount` exceeds the current points.
    pub(crate) fn spend(&mut self, amount: ActionPoints) -> CoreResult<ActionPoints> {
        let remaining = self
            .current_action_points
            .checked_sub(amount)
            .ok_or_else(|| {
                CoreError::invalid_state(format!(
                    "player '{}' cannot spend {amount} action points, only {} left",
                    self.name, self.current_action_points
                ))
            })?;
        self.current_action_points = remaining;
        Ok(remaining)
    }

    pub(crate) fn reset_action_points(&mut self) {
        self.current_action_points = self.max_action_points;
    }
}
