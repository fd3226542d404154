//! Artificial latency applied before a fixture is replayed.
//!
//! A route's `delay` may be written in YAML as a bare number of
//! milliseconds, a preset name, or an explicit range:
//!
//! ```yaml
//! delay: 250
//! delay: slow
//! delay:
//!   min_ms: 100
//!   max_ms: 400
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configured delay for a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelaySpec {
    /// Fixed delay in milliseconds
    Millis(u64),
    /// Named latency profile
    Preset(DelayPreset),
    /// Fixed or random range
    Config(DelayConfig),
}

/// Named latency profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayPreset {
    /// 50-250 ms
    Fast,
    /// 1-3 s
    Slow,
}

impl DelayPreset {
    fn range(self) -> DelayConfig {
        match self {
            DelayPreset::Fast => DelayConfig {
                fixed_ms: 0,
                min_ms: 50,
                max_ms: 250,
            },
            DelayPreset::Slow => DelayConfig {
                fixed_ms: 0,
                min_ms: 1000,
                max_ms: 3000,
            },
        }
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> u64 {
        if self.fixed_ms > 0 {
            return self.fixed_ms;
        }
        if self.max_ms > self.min_ms {
            let mut rng = rand::thread_rng();
            return rng.gen_range(self.min_ms..=self.max_ms);
        }
        self.min_ms
    }
}

impl DelaySpec {
    pub fn calculate(&self) -> u64 {
        match self {
            DelaySpec::Millis(ms) => *ms,
            DelaySpec::Preset(preset) => preset.range().calculate(),
            DelaySpec::Config(config) => config.calculate(),
        }
    }
}

/// Milliseconds to wait before replaying a fixture. Zero when no delay is configured.
pub fn delay_time_in_ms(spec: Option<&DelaySpec>) -> u64 {
    spec.map(DelaySpec::calculate).unwrap_or(0)
}
