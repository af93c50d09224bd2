// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Engine configuration (update loop timing, output format, startup sounds).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A tone started when the engine comes up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Tone frequency in Hz.
    pub frequency: f32,
    /// Level in dB relative to full scale.
    #[serde(default = "default_gain_db")]
    pub gain_db: f32,
    /// Play length; `None` plays until stopped.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Play as a standalone voice instead of inside the main mix block.
    #[serde(default)]
    pub voice: bool,
}

fn default_gain_db() -> f32 {
    -12.0
}

impl SourceConfig {
    pub fn tone(frequency: f32) -> Self {
        Self {
            frequency,
            gain_db: default_gain_db(),
            duration_ms: None,
            voice: false,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Length of one update period of the audio loop.
    #[serde(default = "default_update_period_ms")]
    pub update_period_ms: u64,
    /// Longest single block inside an interruptible wait; bounds shutdown
    /// latency.
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// How long the binary runs before shutting the engine down.
    #[serde(default = "default_run_duration_ms")]
    pub run_duration_ms: u64,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

const MAX_UPDATE_PERIOD_MS: u64 = 10_000;

fn default_update_period_ms() -> u64 {
    20
}

fn default_poll_interval_us() -> u64 {
    1_000
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_run_duration_ms() -> u64 {
    4_500
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::tone(440.0),
        SourceConfig {
            frequency: 660.0,
            gain_db: -18.0,
            duration_ms: Some(1_500),
            voice: true,
        },
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_period_ms: default_update_period_ms(),
            poll_interval_us: default_poll_interval_us(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            run_duration_ms: default_run_duration_ms(),
            sources: default_sources(),
        }
    }
}

impl EngineConfig {
    /// Load config from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Update period, clamped to 1 ms..=10 s.
    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms.clamp(1, MAX_UPDATE_PERIOD_MS))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_millis(self.run_duration_ms)
    }

    /// Frames rendered per update period.
    pub fn frames_per_update(&self) -> usize {
        let period_ms = self.update_period().as_millis() as u64;
        let frames = u64::from(self.sample_rate).saturating_mul(period_ms) / 1_000;
        usize::try_from(frames.max(1)).unwrap_or(usize::MAX)
    }
}
