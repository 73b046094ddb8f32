//! Game events delivered through the event bus.
//!
//! Events are immutable value payloads. Variants are only ever appended.

use crate::{
    effect::{EffectId, EffectKind},
    types::{ActionPoints, Round},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    // ── Turn/round boundaries ──────────────────────
    EndTurn {
        player: String,
        round:  Round,
    },
    /// `round` is the round that just ended.
    EndRound {
        round: Round,
    },

    // ── Action economy ─────────────────────────────
    ActionPointsSpent {
        player:    String,
        amount:    ActionPoints,
        remaining: ActionPoints,
    },

    // ── Effects ────────────────────────────────────
    EffectApplied {
        effect: EffectId,
        unit:   String,
        kind:   EffectKind,
    },
    EffectExpired {
        effect: EffectId,
        unit:   String,
        kind:   EffectKind,
    },
}

/// Dispatch key for subscriptions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EndTurn,
    EndRound,
    ActionPointsSpent,
    EffectApplied,
    EffectExpired,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::EndTurn { .. }           => EventKind::EndTurn,
            Self::EndRound { .. }          => EventKind::EndRound,
            Self::ActionPointsSpent { .. } => EventKind::ActionPointsSpent,
            Self::EffectApplied { .. }     => EventKind::EffectApplied,
            Self::EffectExpired { .. }     => EventKind::EffectExpired,
        }
    }
}
