// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer definitions: the authored sub-timelines a layer node can start.

use crate::constraint::Constraint;
use crate::node::NarrativeObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a layer definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerDefinitionId(pub Uuid);

impl LayerDefinitionId {
    /// Create a new random layer definition ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerDefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Duration relationship of a layer to its siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LayerType {
    /// Independent duration
    #[default]
    Default,
    /// Dictates the duration of its siblings
    Master,
    /// Truncated to the master's end
    Slave,
}

impl LayerType {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Master => "Master",
            Self::Slave => "Slave",
        }
    }
}

/// External event a layer waits for before it begins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTrigger {
    /// Event name raised through the sequencer
    pub event: String,
}

/// An authored sub-timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDefinition {
    /// Stable ID
    pub id: LayerDefinitionId,
    /// Display name
    pub name: String,
    /// Master / slave role
    #[serde(default)]
    pub layer_type: LayerType,
    /// Start offset from the parent layer's end time, in seconds
    #[serde(default)]
    pub start_offset: f64,
    /// First node processed on the layer
    pub root: Option<NarrativeObjectId>,
    /// Optional trigger to wait for
    #[serde(default)]
    pub trigger: Option<LayerTrigger>,
    /// Constraints this definition must satisfy to be selected
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl LayerDefinition {
    /// Create a layer definition rooted at `root`
    pub fn new(name: impl Into<String>, layer_type: LayerType, root: NarrativeObjectId) -> Self {
        Self {
            id: LayerDefinitionId::new(),
            name: name.into(),
            layer_type,
            start_offset: 0.0,
            root: Some(root),
            trigger: None,
            constraints: Vec::new(),
        }
    }

    /// Set the start offset
    pub fn with_start_offset(mut self, offset: f64) -> Self {
        self.start_offset = offset;
        self
    }

    /// Wait for an event before starting
    pub fn with_trigger(mut self, event: impl Into<String>) -> Self {
        self.trigger = Some(LayerTrigger {
            event: event.into(),
        });
        self
    }

    /// Add a constraint
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}
