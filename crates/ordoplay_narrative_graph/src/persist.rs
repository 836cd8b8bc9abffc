// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed save state.
//!
//! A [`SaveState`] is an ordered bag of per-entity blobs keyed by stable ID.
//! Each blob is a RON record, and the bag itself is written as RON, so a
//! save file stays readable and diffable.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current save-state format version
pub const SAVE_FORMAT_VERSION: u32 = 1;

/// Key to serialized-record bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    /// Format version
    pub version: u32,
    entries: IndexMap<String, String>,
}

impl SaveState {
    /// Create an empty save state
    pub fn new() -> Self {
        Self {
            version: SAVE_FORMAT_VERSION,
            entries: IndexMap::new(),
        }
    }

    /// Serialize a record under `key`, replacing any previous record
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<(), PersistError> {
        let blob = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())?;
        self.entries.insert(key.into(), blob);
        Ok(())
    }

    /// Deserialize the record under `key`, if present
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistError> {
        let Some(blob) = self.entries.get(key) else {
            return Ok(None);
        };
        ron::from_str(blob)
            .map(Some)
            .map_err(|source| PersistError::Record {
                key: key.to_string(),
                source,
            })
    }

    /// Deserialize the record under `key`, failing if absent
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, PersistError> {
        self.get(key)?
            .ok_or_else(|| PersistError::MissingRecord(key.to_string()))
    }

    /// Whether a record exists
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a record
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    /// All keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, PersistError> {
        let state: Self = ron::from_str(s)?;
        if state.version > SAVE_FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }

    /// Write to a file
    pub fn write(&self, path: &Path) -> Result<(), PersistError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    /// Read from a file
    pub fn read(path: &Path) -> Result<Self, PersistError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }
}

impl Default for SaveState {
    fn default() -> Self {
        Self::new()
    }
}

/// An entity that persists into a [`SaveState`]
pub trait Saveable {
    /// Write this entity's records
    fn save(&self, state: &mut SaveState) -> Result<(), PersistError>;

    /// Restore this entity from its records
    fn load(&mut self, state: &SaveState) -> Result<(), PersistError>;
}

/// Error when saving or loading state
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Parse error for a whole document
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Parse error for one record
    #[error("Invalid record '{key}': {source}")]
    Record {
        /// Record key
        key: String,
        /// Underlying error
        source: ron::error::SpannedError,
    },

    /// Required record missing
    #[error("Missing record '{0}'")]
    MissingRecord(String),

    /// Records are inconsistent
    #[error("Invalid save state: {0}")]
    Invalid(String),

    /// Written by a newer format
    #[error("Unsupported save format version {0}")]
    UnsupportedVersion(u32),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        time: f64,
        label: String,
        done: bool,
    }

    #[test]
    fn test_records_round_trip() {
        let mut state = SaveState::new();
        let record = Record {
            time: 12.25,
            label: "intro".into(),
            done: true,
        };
        state.put("entity/1", &record).unwrap();

        let ron = state.to_ron().unwrap();
        let loaded = SaveState::from_ron(&ron).unwrap();
        assert_eq!(loaded.get::<Record>("entity/1").unwrap(), Some(record));
        assert_eq!(loaded.get::<Record>("entity/2").unwrap(), None);
        assert!(matches!(
            loaded.require::<Record>("entity/2"),
            Err(PersistError::MissingRecord(_))
        ));
    }

    #[test]
    fn test_bad_record_reports_key() {
        let mut state = SaveState::new();
        state.put("entity/1", &42_u32).unwrap();
        match state.get::<Record>("entity/1") {
            Err(PersistError::Record { key, .. }) => assert_eq!(key, "entity/1"),
            other => panic!("expected record error, got {other:?}"),
        }
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ron");
        let mut state = SaveState::new();
        state.put("a", &"value").unwrap();
        state.write(&path).unwrap();

        let loaded = SaveState::read(&path).unwrap();
        assert_eq!(loaded.get::<String>("a").unwrap().as_deref(), Some("value"));
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["a"]);
    }
}
