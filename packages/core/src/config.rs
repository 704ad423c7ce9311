//! Configuration for the reorder subsystem
use serde::{Deserialize, Serialize};
use std::env;

/// Default gap between the highest live key and the first temp key
pub const DEFAULT_TEMP_MARGIN: i64 = 1000;

/// Legacy heuristic defaults; far above any realistic list length
pub const DEFAULT_LARGE_CONSTANT: i64 = 1_000_000_000;
pub const DEFAULT_JITTER_WINDOW: i64 = 100_000;
pub const DEFAULT_RANDOM_SPREAD: i64 = 10_000;

/// How phase 1 picks the base of its temporary keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum TempKeyStrategy {
    /// `max(live keys in scope) + margin`. Costs one read, never collides with a live key.
    AboveMax { margin: i64 },

    /// `large_constant + (now_millis mod jitter_window) + random(0..random_spread)`.
    /// No read, but collision-free only with overwhelming probability.
    Jittered {
        large_constant: i64,
        jitter_window: i64,
        random_spread: i64,
    },
}

impl TempKeyStrategy {
    pub fn above_max() -> Self {
        TempKeyStrategy::AboveMax {
            margin: DEFAULT_TEMP_MARGIN,
        }
    }

    pub fn jittered() -> Self {
        TempKeyStrategy::Jittered {
            large_constant: DEFAULT_LARGE_CONSTANT,
            jitter_window: DEFAULT_JITTER_WINDOW,
            random_spread: DEFAULT_RANDOM_SPREAD,
        }
    }
}

impl Default for TempKeyStrategy {
    fn default() -> Self {
        Self::above_max()
    }
}

/// Configuration for `ReorderExecutor` and `ReorderCoordinator`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderConfig {
    /// Temp key placement for phase 1
    pub temp_keys: TempKeyStrategy,

    /// Abort a run before phase 1 if the scope's generation moved since the
    /// coordinator last read it
    pub check_generation: bool,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            temp_keys: TempKeyStrategy::default(),
            check_generation: true,
        }
    }
}

impl ReorderConfig {
    /// Build from environment variables, falling back to defaults
    ///
    /// - `LISTSHARE_TEMP_STRATEGY`: `above-max` (default) or `jittered`
    /// - `LISTSHARE_TEMP_MARGIN`: margin for `above-max`
    /// - `LISTSHARE_CHECK_GENERATION`: `true`/`false`
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(strategy) = env::var("LISTSHARE_TEMP_STRATEGY") {
            config.temp_keys = match strategy.as_str() {
                "above-max" => TempKeyStrategy::above_max(),
                "jittered" => TempKeyStrategy::jittered(),
                other => return Err(format!("unknown LISTSHARE_TEMP_STRATEGY '{}'", other)),
            };
        }

        if let Ok(margin) = env::var("LISTSHARE_TEMP_MARGIN") {
            let margin: i64 = margin
                .parse()
                .map_err(|e| format!("invalid LISTSHARE_TEMP_MARGIN '{}': {}", margin, e))?;
            if let TempKeyStrategy::AboveMax { margin: current } = &mut config.temp_keys {
                *current = margin;
            }
        }

        if let Ok(check) = env::var("LISTSHARE_CHECK_GENERATION") {
            config.check_generation = check
                .parse()
                .map_err(|e| format!("invalid LISTSHARE_CHECK_GENERATION '{}': {}", check, e))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.temp_keys {
            TempKeyStrategy::AboveMax { margin } => {
                if margin < 1 {
                    return Err("temp key margin must be at least 1".to_string());
                }
            }
            TempKeyStrategy::Jittered {
                large_constant,
                jitter_window,
                random_spread,
            } => {
                if large_constant <= 0 {
                    return Err("large_constant must be greater than 0".to_string());
                }
                if jitter_window <= 0 || random_spread <= 0 {
                    return Err("jitter_window and random_spread must be greater than 0".to_string());
                }
                if large_constant
                    .checked_add(jitter_window)
                    .and_then(|v| v.checked_add(random_spread))
                    .is_none()
                {
                    return Err("jittered temp key range overflows i64".to_string());
                }
            }
        }

        Ok(())
    }
}
