use crate::{
    error::{CoreError, CoreResult},
    unit::UnitDefinition,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Enlisted unit definitions for one player.
/// Each definition appears at most once, always with a count > 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Army {
    entries: Vec<(Arc<UnitDefinition>, u32)>,
}

impl Army {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enlist(&mut self, definition: Arc<UnitDefinition>, count: u32) -> CoreResult<()> {
        if count == 0 {
            return Err(CoreError::invalid_argument(format!(
                "cannot enlist zero '{}' units",
                definition.name
            )));
        }
        if self.entries.iter().any(|(d, _)| d.name == definition.name) {
            return Err(CoreError::invalid_argument(format!(
                "unit definition '{}' is already enlisted",
                definition.name
            )));
        }
        self.entries.push((definition, count));
        Ok(())
    }

    /// Builder-style `enlist`.
    pub fn with(mut self, definition: Arc<UnitDefinition>, count: u32) -> CoreResult<Self> {
        self.enlist(definition, count)?;
        Ok(self)
    }

    pub fn count_of(&self, definition_name: &str) -> u32 {
        self.entries
            .iter()
            .find(|(d, _)| d.name == definition_name)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total_units(&self) -> u32 {
        self.entries.iter().map(|(_, n)| *n).sum()
    }

    pub fn entries(&self) -> &[(Arc<UnitDefinition>, u32)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
