// SPDX-License-Identifier: MIT OR Apache-2.0
//! Narrative object definitions.
//!
//! A narrative object is one of four closed variants. Every variant owns an
//! output selection deciding which node follows it, a list of constraints
//! that let it veto its own selection, and a local variable store.

use crate::constraint::Constraint;
use crate::decision::{DecisionPoint, StrategyRef};
use crate::layer_definition::LayerDefinitionId;
use crate::variable::{Variable, VariableStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a narrative object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NarrativeObjectId(pub Uuid);

impl NarrativeObjectId {
    /// Create a new random narrative object ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NarrativeObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NarrativeObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of media an atomic node refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MediaKind {
    /// Video clip
    #[default]
    Video,
    /// Audio clip
    Audio,
    /// Still image
    Image,
    /// Interface overlay
    Interface,
    /// Anything else
    Other,
}

/// Reference to an external media source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    /// Media kind
    pub kind: MediaKind,
    /// Source location (path, URL or asset key)
    pub uri: String,
}

impl MediaReference {
    /// Create a media reference
    pub fn new(kind: MediaKind, uri: impl Into<String>) -> Self {
        Self {
            kind,
            uri: uri.into(),
        }
    }

    /// Create a video reference
    pub fn video(uri: impl Into<String>) -> Self {
        Self::new(MediaKind::Video, uri)
    }

    /// Create an audio reference
    pub fn audio(uri: impl Into<String>) -> Self {
        Self::new(MediaKind::Audio, uri)
    }
}

/// Media cue data of an atomic node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicMedia {
    /// Media source; required before scheduling
    pub media: Option<MediaReference>,
    /// Offset into the source media, in seconds
    #[serde(default)]
    pub in_time: f64,
    /// Duration in seconds; must be > 0 before scheduling
    pub duration: f64,
    /// Take the duration from a media probe instead of `duration`
    #[serde(default)]
    pub use_media_duration: bool,
}

/// Child selection of a group node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSelection {
    /// Picks children, one strategy invocation per loop iteration
    pub selection: DecisionPoint<NarrativeObjectId>,
    /// Decides when the selection loop ends
    pub termination: StrategyRef,
}

/// Concurrent layer selection of a layer node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSelection {
    /// Picks the layer definitions to run side by side
    pub selection: DecisionPoint<LayerDefinitionId>,
}

/// Variant data of a narrative object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NarrativeObjectKind {
    /// Leaf media cue
    Atomic(AtomicMedia),
    /// Repeated or exclusive child selection
    Group(GroupSelection),
    /// Concurrent sub-timelines
    Layer(LayerSelection),
    /// Reference to a nested sub-graph
    Graph {
        /// Root node of the sub-graph
        root: Option<NarrativeObjectId>,
    },
}

impl NarrativeObjectKind {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Atomic(_) => "Atomic",
            Self::Group(_) => "Group",
            Self::Layer(_) => "Layer",
            Self::Graph { .. } => "Graph",
        }
    }
}

/// A node of the authored story graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeObject {
    /// Stable ID
    pub id: NarrativeObjectId,
    /// Display name
    pub name: String,
    /// Variant data
    pub kind: NarrativeObjectKind,
    /// Selects the node processed after this one
    pub output_selection: DecisionPoint<NarrativeObjectId>,
    /// Constraints this node must satisfy to be selected anywhere
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Node-local variables
    #[serde(default)]
    pub variables: VariableStore,
}

impl NarrativeObject {
    /// Create a node of the given kind with a "First" output selection
    pub fn new(name: impl Into<String>, kind: NarrativeObjectKind) -> Self {
        let name = name.into();
        Self {
            id: NarrativeObjectId::new(),
            output_selection: DecisionPoint::new(format!("{name} output"), StrategyRef::first()),
            name,
            kind,
            constraints: Vec::new(),
            variables: VariableStore::new(),
        }
    }

    /// Create an atomic media node
    pub fn atomic(name: impl Into<String>, media: MediaReference, duration: f64) -> Self {
        Self::new(
            name,
            NarrativeObjectKind::Atomic(AtomicMedia {
                media: Some(media),
                in_time: 0.0,
                duration,
                use_media_duration: false,
            }),
        )
    }

    /// Create a group node
    pub fn group(name: impl Into<String>, selection: StrategyRef, termination: StrategyRef) -> Self {
        let name = name.into();
        let group = GroupSelection {
            selection: DecisionPoint::new(format!("{name} group"), selection),
            termination,
        };
        Self::new(name, NarrativeObjectKind::Group(group))
    }

    /// Create a layer node
    pub fn layer(name: impl Into<String>, selection: StrategyRef) -> Self {
        let name = name.into();
        let layer = LayerSelection {
            selection: DecisionPoint::new(format!("{name} layers"), selection),
        };
        Self::new(name, NarrativeObjectKind::Layer(layer))
    }

    /// Create a graph node referencing a sub-graph root
    pub fn graph(name: impl Into<String>, root: Option<NarrativeObjectId>) -> Self {
        Self::new(name, NarrativeObjectKind::Graph { root })
    }

    /// Set the output selection strategy
    pub fn with_output_strategy(mut self, strategy: StrategyRef) -> Self {
        self.output_selection.strategy = strategy;
        self
    }

    /// Add a self-veto constraint
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Add a local variable
    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.add_variable(variable);
        self
    }

    /// Set the media in-time of an atomic node
    pub fn with_in_time(mut self, in_time: f64) -> Self {
        if let NarrativeObjectKind::Atomic(atomic) = &mut self.kind {
            atomic.in_time = in_time;
        }
        self
    }

    /// Get atomic media data, if this is an atomic node
    pub fn atomic_media(&self) -> Option<&AtomicMedia> {
        match &self.kind {
            NarrativeObjectKind::Atomic(atomic) => Some(atomic),
            _ => None,
        }
    }

    /// Get group selection data, if this is a group node
    pub fn group_selection(&self) -> Option<&GroupSelection> {
        match &self.kind {
            NarrativeObjectKind::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Get mutable group selection data
    pub fn group_selection_mut(&mut self) -> Option<&mut GroupSelection> {
        match &mut self.kind {
            NarrativeObjectKind::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Get layer selection data, if this is a layer node
    pub fn layer_selection(&self) -> Option<&LayerSelection> {
        match &self.kind {
            NarrativeObjectKind::Layer(layer) => Some(layer),
            _ => None,
        }
    }

    /// Get mutable layer selection data
    pub fn layer_selection_mut(&mut self) -> Option<&mut LayerSelection> {
        match &mut self.kind {
            NarrativeObjectKind::Layer(layer) => Some(layer),
            _ => None,
        }
    }
}
