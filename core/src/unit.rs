//! Unit definitions and live units, the targets of timed effects.
//!
//! A live unit is shared between the match, effects and the render side,
//! so its mutable state sits behind a mutex.

use crate::{
    effect::EffectId,
    error::{CoreError, CoreResult},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Static description of a unit type. Stat tables live outside the core;
/// only the stats effects touch are carried here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitDefinition {
    pub name:           String,
    pub movement_range: u32,
}

impl UnitDefinition {
    pub fn new(name: impl Into<String>, movement_range: u32) -> CoreResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::invalid_argument("unit definition name must not be empty"));
        }
        Ok(Self { name, movement_range })
    }
}

#[derive(Debug)]
struct UnitState {
    movement_range: i64,
    stun_count:     u32,
    active_effects: Vec<EffectId>,
}

/// A unit on the battlefield.
#[derive(Debug)]
pub struct Unit {
    name:       String,
    definition: Arc<UnitDefinition>,
    state:      Mutex<UnitState>,
}

/// Serializable view of a unit for the render side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub name:           String,
    pub definition:     String,
    pub movement_range: u32,
    pub stunned:        bool,
    pub active_effects: Vec<EffectId>,
}

impl Unit {
    pub fn spawn(name: impl Into<String>, definition: Arc<UnitDefinition>) -> Arc<Self> {
        let state = UnitState {
            movement_range: i64::from(definition.movement_range),
            stun_count:     0,
            active_effects: Vec::new(),
        };
        Arc::new(Self {
            name: name.into(),
            definition,
            state: Mutex::new(state),
        })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn definition(&self) -> &Arc<UnitDefinition> { &self.definition }

    /// Current movement range, never below zero even under stacked debuffs.
    pub fn movement_range(&self) -> u32 {
        let range = self.lock().movement_range;
        u32::try_from(range.max(0)).unwrap_or(u32::MAX)
    }

    pub fn is_stunned(&self) -> bool {
        self.lock().stun_count > 0
    }

    pub fn active_effects(&self) -> Vec<EffectId> {
        self.lock().active_effects.clone()
    }

    pub fn snapshot(&self) -> UnitSnapshot {
        let state = self.lock();
        UnitSnapshot {
            name:           self.name.clone(),
            definition:     self.definition.name.clone(),
            movement_range: u32::try_from(state.movement_range.max(0)).unwrap_or(u32::MAX),
            stunned:        state.stun_count > 0,
            active_effects: state.active_effects.clone(),
        }
    }

    // ── Effect hooks ───────────────────────────────

    pub(crate) fn adjust_movement(&self, delta: i32) {
        self.lock().movement_range += i64::from(delta);
    }

    pub(crate) fn add_stun(&self) {
        self.lock().stun_count += 1;
    }

    pub(crate) fn release_stun(&self) {
        let mut state = self.lock();
        state.stun_count = state.stun_count.saturating_sub(1);
    }

    pub(crate) fn attach_effect(&self, id: EffectId) {
        self.lock().active_effects.push(id);
    }

    pub(crate) fn detach_effect(&self, id: EffectId) {
        self.lock().active_effects.retain(|e| *e != id);
    }

    fn lock(&self) -> MutexGuard<'_, UnitState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
