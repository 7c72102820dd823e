//! Engine runtime options.

use serde::{Deserialize, Serialize};

/// Where order timestamps come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// `chrono::Utc::now()`.
    Wall,
    /// Time only moves through `set_time`/`advance_time`. For deterministic runs.
    Manual,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub clock: ClockMode,
    /// Maximum number of events to retain in the in-memory journal.
    pub max_events: usize,
    /// How often matching re-selects a maker that changed between lookup and lock.
    pub max_reselect_attempts: usize,
    /// Upper bound on fills produced by one `match_until_idle` call.
    pub max_fills_per_sweep: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clock: ClockMode::Wall,
            max_events: 100_000,
            max_reselect_attempts: 16,
            max_fills_per_sweep: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn deterministic() -> Self {
        Self {
            clock: ClockMode::Manual,
            ..Self::default()
        }
    }
}
