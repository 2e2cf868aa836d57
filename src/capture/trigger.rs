//! Chunk-level trigger gate.
//!
//! Decides whether a captured chunk is retained. The decision looks at the
//! current chunk only: there is no memory across chunks, no hysteresis and
//! no pre-trigger capture.

use serde::{Deserialize, Serialize};

use crate::scope::ScopeError;

/// Trigger thresholds offered to the user, roughly 0.05%, 0.1%, 0.2% and
/// 0.5% of full scale.
pub const TRIGGER_LEVELS: &[u32] = &[16, 32, 64, 160];

/// Minimum threshold-crossing counts offered to the user.
pub const OVER_COUNTS: &[u32] = &[1, 2, 5, 10, 20, 50];

/// Acquisition mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Every chunk is kept
    #[default]
    Continuous,
    /// Only chunks with enough samples beyond the level are kept
    Triggered,
}

impl std::fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Triggered => write!(f, "triggered"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    pub mode: TriggerMode,
    /// Absolute amplitude threshold
    pub level: u32,
    /// A chunk needs strictly more than this many samples beyond `level`
    pub over_count: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Continuous,
            level: TRIGGER_LEVELS[0],
            over_count: OVER_COUNTS[0],
        }
    }
}

impl TriggerConfig {
    pub fn set_level(&mut self, level: u32) -> Result<(), ScopeError> {
        if !TRIGGER_LEVELS.contains(&level) {
            return Err(ScopeError::UnsupportedTriggerSetting {
                setting: "level",
                value: level,
                allowed: TRIGGER_LEVELS,
            });
        }
        self.level = level;
        Ok(())
    }

    pub fn set_over_count(&mut self, over_count: u32) -> Result<(), ScopeError> {
        if !OVER_COUNTS.contains(&over_count) {
            return Err(ScopeError::UnsupportedTriggerSetting {
                setting: "over count",
                value: over_count,
                allowed: OVER_COUNTS,
            });
        }
        self.over_count = over_count;
        Ok(())
    }

    /// Steps the level to the next preset, wrapping around.
    pub fn cycle_level(&mut self) {
        self.level = next_preset(TRIGGER_LEVELS, self.level);
    }

    /// Steps the over-count to the next preset, wrapping around.
    pub fn cycle_over_count(&mut self) {
        self.over_count = next_preset(OVER_COUNTS, self.over_count);
    }
}

fn next_preset(presets: &[u32], current: u32) -> u32 {
    let index = presets.iter().position(|&p| p == current).map_or(0, |i| i + 1);
    presets[index % presets.len()]
}

/// Returns whether `chunk` should be kept under `config`.
pub fn keep(chunk: &[i16], config: &TriggerConfig) -> bool {
    match config.mode {
        TriggerMode::Continuous => true,
        TriggerMode::Triggered => {
            let level = config.level as i32;
            let over = chunk
                .iter()
                .filter(|&&s| (s as i32).abs() > level)
                .count();
            over > config.over_count as usize
        }
    }
}
