use crate::types::{ActionPoints, Round};
use serde::{Deserialize, Serialize};

/// Commands issued from the input-handling context.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum MatchCommand {
    // ── Turn flow ─────────────────────────────────
    SpendActionPoints { amount: ActionPoints },
    FinishTurn,

    // ── Effects ───────────────────────────────────
    ApplyMoveBuff {
        unit:   String,
        amount: i32,
        rounds: Round,
    },
    ApplyStun {
        unit:   String,
        rounds: Round,
    },
    ShowStatus {
        unit: String,
        text: String,
    },
}
