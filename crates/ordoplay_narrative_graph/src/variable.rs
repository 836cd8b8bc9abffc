// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed variables and the per-entity variable store.
//!
//! A store may hold several variables under the same name (one per node
//! instance, for example). Lookups return every variable of the requested
//! type for a name, and persistence keys on the stable [`VariableId`].

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableId(pub Uuid);

impl VariableId {
    /// Create a new random variable ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VariableId {
    fn default() -> Self {
        Self::new()
    }
}

/// The type tag of a variable value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    /// Boolean
    Bool,
    /// Signed integer
    Int,
    /// Floating point
    Float,
    /// String
    String,
    /// UTC date-time
    DateTime,
}

impl VariableKind {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::DateTime => "DateTime",
        }
    }
}

/// Value stored in a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Date-time value
    DateTime(DateTime<Utc>),
}

impl VariableValue {
    /// Get the type tag of this value
    pub fn kind(&self) -> VariableKind {
        match self {
            Self::Bool(_) => VariableKind::Bool,
            Self::Int(_) => VariableKind::Int,
            Self::Float(_) => VariableKind::Float,
            Self::String(_) => VariableKind::String,
            Self::DateTime(_) => VariableKind::DateTime,
        }
    }

    /// Parse `text` as a value of the given kind
    pub fn parse(kind: VariableKind, text: &str) -> Result<Self, VariableError> {
        let text = text.trim();
        let invalid = || VariableError::Parse {
            kind,
            text: text.to_string(),
        };
        Ok(match kind {
            VariableKind::Bool => Self::Bool(text.parse().map_err(|_| invalid())?),
            VariableKind::Int => Self::Int(text.parse().map_err(|_| invalid())?),
            VariableKind::Float => Self::Float(text.parse().map_err(|_| invalid())?),
            VariableKind::String => Self::String(text.to_string()),
            VariableKind::DateTime => Self::DateTime(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|_| invalid())?
                    .with_timezone(&Utc),
            ),
        })
    }

    /// Get as bool if this is a bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as integer if this is an int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as float. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as string slice if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for VariableValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for VariableValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for VariableValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for VariableValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for VariableValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

/// Rust types that can be read out of a [`VariableValue`]
pub trait FromVariable: Sized {
    /// The variable kind this type reads
    const KIND: VariableKind;

    /// Extract the typed value, or `None` on a type mismatch
    fn from_variable(value: &VariableValue) -> Option<Self>;
}

impl FromVariable for bool {
    const KIND: VariableKind = VariableKind::Bool;

    fn from_variable(value: &VariableValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromVariable for i64 {
    const KIND: VariableKind = VariableKind::Int;

    fn from_variable(value: &VariableValue) -> Option<Self> {
        value.as_int()
    }
}

impl FromVariable for f64 {
    const KIND: VariableKind = VariableKind::Float;

    fn from_variable(value: &VariableValue) -> Option<Self> {
        match value {
            VariableValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromVariable for String {
    const KIND: VariableKind = VariableKind::String;

    fn from_variable(value: &VariableValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromVariable for DateTime<Utc> {
    const KIND: VariableKind = VariableKind::DateTime;

    fn from_variable(value: &VariableValue) -> Option<Self> {
        match value {
            VariableValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

/// A named, typed variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Stable variable ID (persistence key)
    pub id: VariableId,
    /// Variable name (not unique)
    pub name: String,
    /// Current value
    pub value: VariableValue,
}

impl Variable {
    /// Create a new variable
    pub fn new(name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        Self {
            id: VariableId::new(),
            name: name.into(),
            value: value.into(),
        }
    }

    /// Get the variable kind
    pub fn kind(&self) -> VariableKind {
        self.value.kind()
    }
}

/// Notification raised when a variable value changes
#[derive(Debug, Clone, PartialEq)]
pub struct VariableChange {
    /// Changed variable
    pub id: VariableId,
    /// Variable name
    pub name: String,
    /// Value before the change
    pub previous: VariableValue,
    /// Value after the change
    pub current: VariableValue,
}

/// Persisted values of a variable store, keyed by variable ID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStoreState {
    /// Values by stable ID
    pub values: IndexMap<VariableId, VariableValue>,
}

/// Key to typed-value mapping with change notification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableStore {
    variables: Vec<Variable>,
    #[serde(skip)]
    pending_changes: Vec<VariableChange>,
}

impl VariableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable and return its ID
    pub fn add_variable(&mut self, variable: Variable) -> VariableId {
        let id = variable.id;
        self.variables.push(variable);
        id
    }

    /// Remove a variable by ID
    pub fn remove_variable(&mut self, id: VariableId) -> Option<Variable> {
        let index = self.variables.iter().position(|v| v.id == id)?;
        Some(self.variables.remove(index))
    }

    /// Get a variable by ID
    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.variables.iter().find(|v| v.id == id)
    }

    /// Get all variables
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Get every variable with this name and kind
    pub fn variables_of<'a>(
        &'a self,
        name: &'a str,
        kind: VariableKind,
    ) -> impl Iterator<Item = &'a Variable> + 'a {
        self.variables
            .iter()
            .filter(move |v| v.name == name && v.kind() == kind)
    }

    /// Get the values of every variable with this name and type `T`
    pub fn get_variables<T: FromVariable>(&self, name: &str) -> Vec<T> {
        self.variables_of(name, T::KIND)
            .filter_map(|v| T::from_variable(&v.value))
            .collect()
    }

    /// Get the first value with this name and type `T`
    pub fn get_first_or_default<T: FromVariable>(&self, name: &str) -> Option<T> {
        self.variables_of(name, T::KIND)
            .find_map(|v| T::from_variable(&v.value))
    }

    /// Set a variable's value. The value must keep the variable's type.
    pub fn set_value(
        &mut self,
        id: VariableId,
        value: impl Into<VariableValue>,
    ) -> Result<(), VariableError> {
        let value = value.into();
        let variable = self
            .variables
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(VariableError::NotFound(id))?;

        if variable.kind() != value.kind() {
            return Err(VariableError::TypeMismatch {
                name: variable.name.clone(),
                expected: variable.kind(),
                found: value.kind(),
            });
        }

        if variable.value != value {
            let previous = std::mem::replace(&mut variable.value, value.clone());
            self.pending_changes.push(VariableChange {
                id,
                name: variable.name.clone(),
                previous,
                current: value,
            });
        }
        Ok(())
    }

    /// Set a variable's value by parsing text according to its current type
    pub fn set_from_str(&mut self, id: VariableId, text: &str) -> Result<(), VariableError> {
        let kind = self
            .variable(id)
            .map(Variable::kind)
            .ok_or(VariableError::NotFound(id))?;
        let value = VariableValue::parse(kind, text)?;
        self.set_value(id, value)
    }

    /// Set every variable with this name to a value of matching type.
    /// Returns how many variables were updated.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<VariableValue>) -> usize {
        let value = value.into();
        let ids: Vec<VariableId> = self
            .variables_of(name, value.kind())
            .map(|v| v.id)
            .collect();
        for id in &ids {
            // Kind already matched above
            let _ = self.set_value(*id, value.clone());
        }
        ids.len()
    }

    /// Whether changes are waiting to be drained
    pub fn has_pending_changes(&self) -> bool {
        !self.pending_changes.is_empty()
    }

    /// Drain pending change notifications
    pub fn take_changes(&mut self) -> Vec<VariableChange> {
        std::mem::take(&mut self.pending_changes)
    }

    /// Capture the current values by stable ID
    pub fn save(&self) -> VariableStoreState {
        VariableStoreState {
            values: self
                .variables
                .iter()
                .map(|v| (v.id, v.value.clone()))
                .collect(),
        }
    }

    /// Restore values by stable ID. Unknown IDs and type changes are skipped.
    pub fn load(&mut self, state: &VariableStoreState) {
        for (id, value) in &state.values {
            match self.variables.iter_mut().find(|v| v.id == *id) {
                Some(variable) if variable.kind() == value.kind() => {
                    variable.value = value.clone();
                }
                Some(variable) => {
                    tracing::warn!(
                        variable = %variable.name,
                        expected = variable.kind().name(),
                        found = value.kind().name(),
                        "Saved variable changed type, keeping authored value"
                    );
                }
                None => {
                    tracing::debug!(id = %id.0, "Saved variable no longer exists");
                }
            }
        }
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the store holds no variables
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Error when reading or writing variables
#[derive(Debug, thiserror::Error)]
pub enum VariableError {
    /// Variable not found
    #[error("Variable not found: {0:?}")]
    NotFound(VariableId),

    /// Value type does not match the variable type
    #[error("Variable '{name}' is {expected:?}, got {found:?}")]
    TypeMismatch {
        /// Variable name
        name: String,
        /// Variable's type
        expected: VariableKind,
        /// Offered value's type
        found: VariableKind,
    },

    /// Text could not be parsed as the variable type
    #[error("Cannot parse '{text}' as {kind:?}")]
    Parse {
        /// Target type
        kind: VariableKind,
        /// Offending text
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_returns_all_matches_of_type() {
        let mut store = VariableStore::new();
        store.add_variable(Variable::new("score", 3_i64));
        store.add_variable(Variable::new("score", 7_i64));
        store.add_variable(Variable::new("score", "high"));

        assert_eq!(store.get_variables::<i64>("score"), vec![3, 7]);
        assert_eq!(store.get_variables::<String>("score"), vec!["high".to_string()]);
        assert_eq!(store.get_first_or_default::<i64>("score"), Some(3));
        assert_eq!(store.get_first_or_default::<bool>("score"), None);
    }

    #[test]
    fn test_set_value_notifies_and_checks_type() {
        let mut store = VariableStore::new();
        let id = store.add_variable(Variable::new("visited", false));

        store.set_value(id, true).unwrap();
        // Setting the same value again is not a change
        store.set_value(id, true).unwrap();
        assert!(matches!(
            store.set_value(id, 1_i64),
            Err(VariableError::TypeMismatch { .. })
        ));

        let changes = store.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous, VariableValue::Bool(false));
        assert_eq!(changes[0].current, VariableValue::Bool(true));
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn test_set_from_str_parses_current_type() {
        let mut store = VariableStore::new();
        let count = store.add_variable(Variable::new("count", 0_i64));
        let when = store.add_variable(Variable::new(
            "when",
            DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ));

        store.set_from_str(count, " 42 ").unwrap();
        store.set_from_str(when, "2024-05-01T12:00:00Z").unwrap();
        assert!(store.set_from_str(count, "many").is_err());

        assert_eq!(store.get_first_or_default::<i64>("count"), Some(42));
        assert_eq!(
            store.get_first_or_default::<DateTime<Utc>>("when").map(|d| d.to_rfc3339()),
            Some("2024-05-01T12:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_save_load_by_id_not_position() {
        let mut store = VariableStore::new();
        let a = store.add_variable(Variable::new("a", 1_i64));
        let b = store.add_variable(Variable::new("b", "x"));
        store.set_value(a, 10_i64).unwrap();
        store.set_value(b, "y").unwrap();
        let state = store.save();

        // Same variables, different order, authored values
        let mut reordered = VariableStore::new();
        reordered.add_variable(Variable {
            id: b,
            name: "b".into(),
            value: "x".into(),
        });
        reordered.add_variable(Variable {
            id: a,
            name: "a".into(),
            value: 1_i64.into(),
        });
        reordered.load(&state);

        assert_eq!(reordered.get_first_or_default::<i64>("a"), Some(10));
        assert_eq!(reordered.get_first_or_default::<String>("b"), Some("y".into()));
    }

    #[test]
    fn test_set_by_name_updates_every_instance() {
        let mut store = VariableStore::new();
        store.add_variable(Variable::new("seen", false));
        store.add_variable(Variable::new("seen", false));
        store.add_variable(Variable::new("seen", 0_i64));

        assert_eq!(store.set_by_name("seen", true), 2);
        assert_eq!(store.get_variables::<bool>("seen"), vec![true, true]);
        assert_eq!(store.take_changes().len(), 2);
    }
}
