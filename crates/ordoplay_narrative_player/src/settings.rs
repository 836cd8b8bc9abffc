// SPDX-License-Identifier: MIT OR Apache-2.0
//! Player settings.
//!
//! Stored as RON next to a narrative space. Missing fields take their
//! defaults so older files keep loading.

use ordoplay_narrative_sequencer::SequencerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// How the headless player drives a sequencer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Format version
    pub version: u32,
    /// Sequencer tunables
    pub sequencer: SequencerConfig,
    /// Ticks per second of narrative time
    pub tick_rate: f64,
    /// Stop after this much narrative time
    pub max_seconds: f64,
    /// Session file for save and resume
    pub save_path: Option<PathBuf>,
    /// Save when a variable changes and on exit
    pub autosave: bool,
    /// Sleep between ticks so the playhead follows wall time
    pub realtime: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            sequencer: SequencerConfig::default(),
            tick_rate: 60.0,
            max_seconds: 3600.0,
            save_path: None,
            autosave: false,
            realtime: false,
        }
    }
}

impl PlayerSettings {
    /// Seconds advanced per tick
    pub fn tick_delta(&self) -> f64 {
        if self.tick_rate > 0.0 {
            1.0 / self.tick_rate
        } else {
            self.sequencer.frame_time
        }
    }

    /// Tick bound for a run of `seconds`
    pub fn max_ticks(&self, seconds: f64) -> usize {
        let ticks = (seconds / self.tick_delta()).ceil();
        if ticks.is_finite() && ticks > 0.0 {
            ticks as usize
        } else {
            0
        }
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: PlayerSettings = ron::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Settings version {} is newer than supported version {}",
                    settings.version, SETTINGS_FORMAT_VERSION
                ),
            ));
        }

        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(self, config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = PlayerSettings::default();
        assert_eq!(settings.version, SETTINGS_FORMAT_VERSION);
        assert!(!settings.autosave);
        assert!((settings.tick_delta() - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_ticks() {
        let settings = PlayerSettings {
            tick_rate: 10.0,
            ..PlayerSettings::default()
        };
        assert_eq!(settings.max_ticks(2.0), 20);
        assert_eq!(settings.max_ticks(0.0), 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.ron");
        let settings = PlayerSettings {
            tick_rate: 30.0,
            save_path: Some(PathBuf::from("session.ron")),
            autosave: true,
            sequencer: SequencerConfig::default().with_seed(3),
            ..PlayerSettings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(PlayerSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: PlayerSettings = ron::from_str("(tick_rate: 24.0)").unwrap();
        assert_eq!(settings.tick_rate, 24.0);
        assert_eq!(settings.sequencer, SequencerConfig::default());
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.ron");
        std::fs::write(&path, format!("(version: {})", SETTINGS_FORMAT_VERSION + 1)).unwrap();
        let err = PlayerSettings::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
