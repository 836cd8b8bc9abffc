// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequencer configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default look-ahead budget in seconds
pub const DEFAULT_LOOKAHEAD_SECONDS: f64 = 120.0;

/// Default frame time (60 fps)
pub const DEFAULT_FRAME_TIME: f64 = 1.0 / 60.0;

/// Tunables of the sequencer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// How far past the playhead a layer may schedule before traversal pauses
    pub lookahead_seconds: f64,
    /// Nominal duration of one host frame
    pub frame_time: f64,
    /// Frames before a cue's start at which controllers get `will_play`
    pub will_play_lead_frames: u32,
    /// Seed for random strategies; entropy when absent
    pub seed: Option<u64>,
}

impl SequencerConfig {
    /// Time before a cue's start at which `will_play` fires
    pub fn will_play_lead(&self) -> f64 {
        self.frame_time * f64::from(self.will_play_lead_frames)
    }

    /// Set the look-ahead budget
    pub fn with_lookahead(mut self, seconds: f64) -> Self {
        self.lookahead_seconds = seconds;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            lookahead_seconds: DEFAULT_LOOKAHEAD_SECONDS,
            frame_time: DEFAULT_FRAME_TIME,
            will_play_lead_frames: 3,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SequencerConfig::default();
        assert_eq!(config.lookahead_seconds, 120.0);
        assert!((config.will_play_lead() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = SequencerConfig::from_ron("(lookahead_seconds: 30.0, seed: Some(7))").unwrap();
        assert_eq!(config.lookahead_seconds, 30.0);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.will_play_lead_frames, 3);
    }
}
