use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the scheduler does when an updatable returns an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Stop the scheduler thread and surface the fault from `stop()`.
    #[default]
    Abort,
    /// Log the fault, drop the faulty updatable and keep ticking.
    Isolate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Target simulation rate.
    pub ticks_per_second: u32,
    /// Upper bound on simulation steps per outer iteration.
    pub max_skipped_steps: u32,
    #[serde(default)]
    pub fault_policy: FaultPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ticks_per_second:  50,
            max_skipped_steps: 20,
            fault_policy:      FaultPolicy::Abort,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.ticks_per_second == 0 {
            return Err(CoreError::invalid_argument("ticks_per_second must be > 0"));
        }
        if self.max_skipped_steps == 0 {
            return Err(CoreError::invalid_argument("max_skipped_steps must be > 0"));
        }
        Ok(())
    }

    /// Wall-clock length of one simulation step.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.ticks_per_second.max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RulesConfig {
    /// Action points given to players created through the session.
    pub default_max_action_points: u32,
    /// How long floating status messages stay on screen.
    pub status_message_seconds: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            default_max_action_points: 4,
            status_message_seconds:    1.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

impl GameConfig {
    /// Load from the data/ directory.
    /// In tests, use GameConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/game.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: GameConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.scheduler.validate()?;
        if config.rules.default_max_action_points == 0 {
            anyhow::bail!("{path}: rules.default_max_action_points must be > 0");
        }
        if !(config.rules.status_message_seconds > 0.0) {
            anyhow::bail!("{path}: rules.status_message_seconds must be > 0");
        }
        log::info!(
            "Loaded config from {path}: {} ticks/s, max {} catch-up steps",
            config.scheduler.ticks_per_second,
            config.scheduler.max_skipped_steps
        );
        Ok(config)
    }

    pub fn default_test() -> Self {
        Self::default()
    }
}
