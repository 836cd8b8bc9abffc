// SPDX-License-Identifier: MIT OR Apache-2.0
//! The narrative space: arena of narrative objects and layer definitions.
//!
//! Nodes reference each other only by ID. Decision points hold candidate IDs,
//! graph nodes hold a root ID and layer definitions hold a root ID, so the
//! space owns everything and edges never own their targets.

use crate::decision::SelectionRecord;
use crate::layer_definition::{LayerDefinition, LayerDefinitionId, LayerType};
use crate::node::{NarrativeObject, NarrativeObjectId, NarrativeObjectKind};
use crate::persist::{PersistError, SaveState, Saveable};
use crate::variable::{VariableChange, VariableStore};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Save-state key of the global variable store
pub const GLOBAL_VARIABLES_KEY: &str = "variables/global";

/// Authored story graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeSpace {
    /// Space name
    pub name: String,
    /// Node traversal starts from
    root: Option<NarrativeObjectId>,
    /// Narrative objects
    nodes: IndexMap<NarrativeObjectId, NarrativeObject>,
    /// Layer definitions
    #[serde(default)]
    layer_definitions: IndexMap<LayerDefinitionId, LayerDefinition>,
    /// Global variables
    #[serde(default)]
    globals: VariableStore,
}

impl NarrativeSpace {
    /// Create an empty space
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: None,
            nodes: IndexMap::new(),
            layer_definitions: IndexMap::new(),
            globals: VariableStore::new(),
        }
    }

    /// Add a node. The first node added becomes the root.
    pub fn add_node(&mut self, node: NarrativeObject) -> NarrativeObjectId {
        let id = node.id;
        self.nodes.insert(id, node);
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    /// Remove a node and every candidate reference to it
    pub fn remove_node(&mut self, id: NarrativeObjectId) -> Option<NarrativeObject> {
        let removed = self.nodes.shift_remove(&id)?;
        for node in self.nodes.values_mut() {
            node.output_selection.remove_candidate(id);
            match &mut node.kind {
                NarrativeObjectKind::Group(group) => {
                    group.selection.remove_candidate(id);
                }
                NarrativeObjectKind::Graph { root } if *root == Some(id) => {
                    *root = None;
                }
                _ => {}
            }
        }
        for definition in self.layer_definitions.values_mut() {
            if definition.root == Some(id) {
                definition.root = None;
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }
        Some(removed)
    }

    /// Get a node by ID
    pub fn node(&self, id: NarrativeObjectId) -> Option<&NarrativeObject> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, id: NarrativeObjectId) -> Option<&mut NarrativeObject> {
        self.nodes.get_mut(&id)
    }

    /// Get a node by ID or fail
    pub fn try_node(&self, id: NarrativeObjectId) -> Result<&NarrativeObject, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &NarrativeObject> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find a node by name
    pub fn find_by_name(&self, name: &str) -> Option<&NarrativeObject> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// Root node of the space
    pub fn root(&self) -> Option<NarrativeObjectId> {
        self.root
    }

    /// Set the root node
    pub fn set_root(&mut self, id: NarrativeObjectId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound(id));
        }
        self.root = Some(id);
        Ok(())
    }

    /// Add `to` as an output candidate of `from`
    pub fn connect(&mut self, from: NarrativeObjectId, to: NarrativeObjectId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&to) {
            return Err(GraphError::NodeNotFound(to));
        }
        let node = self.nodes.get_mut(&from).ok_or(GraphError::NodeNotFound(from))?;
        if !node.output_selection.add_candidate(to) {
            return Err(GraphError::AlreadyConnected { from, to });
        }
        Ok(())
    }

    /// Remove `to` from the output candidates of `from`
    pub fn disconnect(&mut self, from: NarrativeObjectId, to: NarrativeObjectId) -> bool {
        self.nodes
            .get_mut(&from)
            .is_some_and(|node| node.output_selection.remove_candidate(to))
    }

    /// Add a child candidate to a group node
    pub fn add_group_child(
        &mut self,
        group: NarrativeObjectId,
        child: NarrativeObjectId,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&child) {
            return Err(GraphError::NodeNotFound(child));
        }
        let node = self.nodes.get_mut(&group).ok_or(GraphError::NodeNotFound(group))?;
        let name = node.name.clone();
        let selection = node
            .group_selection_mut()
            .ok_or(GraphError::WrongKind { node: group, name, expected: "Group" })?;
        if !selection.selection.add_candidate(child) {
            return Err(GraphError::AlreadyConnected { from: group, to: child });
        }
        Ok(())
    }

    /// Register a layer definition and add it as a candidate of a layer node
    pub fn add_layer_definition(
        &mut self,
        layer_node: NarrativeObjectId,
        definition: LayerDefinition,
    ) -> Result<LayerDefinitionId, GraphError> {
        if let Some(root) = definition.root {
            if !self.nodes.contains_key(&root) {
                return Err(GraphError::NodeNotFound(root));
            }
        }
        let node = self
            .nodes
            .get_mut(&layer_node)
            .ok_or(GraphError::NodeNotFound(layer_node))?;
        let name = node.name.clone();
        let selection = node.layer_selection_mut().ok_or(GraphError::WrongKind {
            node: layer_node,
            name,
            expected: "Layer",
        })?;
        let id = definition.id;
        selection.selection.add_candidate(id);
        self.layer_definitions.insert(id, definition);
        Ok(id)
    }

    /// Get a layer definition by ID
    pub fn layer_definition(&self, id: LayerDefinitionId) -> Option<&LayerDefinition> {
        self.layer_definitions.get(&id)
    }

    /// Get a mutable layer definition by ID
    pub fn layer_definition_mut(&mut self, id: LayerDefinitionId) -> Option<&mut LayerDefinition> {
        self.layer_definitions.get_mut(&id)
    }

    /// Get all layer definitions
    pub fn layer_definitions(&self) -> impl Iterator<Item = &LayerDefinition> {
        self.layer_definitions.values()
    }

    /// Global variables
    pub fn globals(&self) -> &VariableStore {
        &self.globals
    }

    /// Mutable global variables
    pub fn globals_mut(&mut self) -> &mut VariableStore {
        &mut self.globals
    }

    /// Drain variable change notifications from every store.
    /// Global changes carry `None` as their owner.
    pub fn take_variable_changes(&mut self) -> Vec<(Option<NarrativeObjectId>, VariableChange)> {
        let mut changes: Vec<_> = self
            .globals
            .take_changes()
            .into_iter()
            .map(|change| (None, change))
            .collect();
        for node in self.nodes.values_mut() {
            let id = node.id;
            changes.extend(node.variables.take_changes().into_iter().map(|c| (Some(id), c)));
        }
        changes
    }

    /// Report authoring mistakes that would fail or stall playback
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        match self.root {
            None => issues.push(ValidationIssue::MissingNarrativeRoot),
            Some(root) if !self.nodes.contains_key(&root) => {
                issues.push(ValidationIssue::DanglingReference { from: None, to: root });
            }
            Some(_) => {}
        }

        for node in self.nodes.values() {
            let at = Some(node.id);
            for candidate in node.output_selection.candidates() {
                if !self.nodes.contains_key(candidate) {
                    issues.push(ValidationIssue::DanglingReference { from: at, to: *candidate });
                }
            }

            match &node.kind {
                NarrativeObjectKind::Atomic(atomic) => {
                    if atomic.media.is_none() {
                        issues.push(ValidationIssue::MissingMedia { node: node.id, name: node.name.clone() });
                    }
                    if !atomic.use_media_duration && atomic.duration <= 0.0 {
                        issues.push(ValidationIssue::InvalidDuration {
                            node: node.id,
                            name: node.name.clone(),
                            duration: atomic.duration,
                        });
                    }
                }
                NarrativeObjectKind::Group(group) => {
                    for candidate in group.selection.candidates() {
                        if !self.nodes.contains_key(candidate) {
                            issues.push(ValidationIssue::DanglingReference { from: at, to: *candidate });
                        }
                    }
                }
                NarrativeObjectKind::Layer(layer) => {
                    let mut masters = 0;
                    for definition_id in layer.selection.candidates() {
                        match self.layer_definitions.get(definition_id) {
                            Some(definition) => {
                                if definition.layer_type == LayerType::Master {
                                    masters += 1;
                                }
                                if definition.root.is_none() {
                                    issues.push(ValidationIssue::MissingLayerRoot {
                                        definition: *definition_id,
                                        name: definition.name.clone(),
                                    });
                                }
                            }
                            None => issues.push(ValidationIssue::DanglingLayerDefinition {
                                node: node.id,
                                definition: *definition_id,
                            }),
                        }
                    }
                    if masters > 1 {
                        issues.push(ValidationIssue::MultipleMasterLayers { node: node.id, name: node.name.clone() });
                    }
                }
                NarrativeObjectKind::Graph { root } => match root {
                    None => issues.push(ValidationIssue::MissingGraphRoot { node: node.id, name: node.name.clone() }),
                    Some(root) if !self.nodes.contains_key(root) => {
                        issues.push(ValidationIssue::DanglingReference { from: at, to: *root });
                    }
                    Some(_) => {}
                },
            }
        }

        issues
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }

    /// Load a space from a RON file
    pub fn load_file(path: &Path) -> Result<Self, PersistError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_ron(&contents)?)
    }

    /// Write the space to a RON file
    pub fn save_file(&self, path: &Path) -> Result<(), PersistError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}

impl Default for NarrativeSpace {
    fn default() -> Self {
        Self::new("Untitled Narrative")
    }
}

fn node_variables_key(id: NarrativeObjectId) -> String {
    format!("variables/{id}")
}

fn node_decisions_key(id: NarrativeObjectId) -> String {
    format!("decisions/{id}")
}

/// Selection records of one node's decision points
#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeDecisions {
    #[serde(default)]
    output: SelectionRecord<NarrativeObjectId>,
    #[serde(default)]
    group: SelectionRecord<NarrativeObjectId>,
    #[serde(default)]
    layer: SelectionRecord<LayerDefinitionId>,
}

impl NodeDecisions {
    fn of(node: &NarrativeObject) -> Self {
        Self {
            output: node.output_selection.selections().clone(),
            group: node
                .group_selection()
                .map(|g| g.selection.selections().clone())
                .unwrap_or_default(),
            layer: node
                .layer_selection()
                .map(|l| l.selection.selections().clone())
                .unwrap_or_default(),
        }
    }

    fn is_empty(&self) -> bool {
        self.output.is_empty() && self.group.is_empty() && self.layer.is_empty()
    }

    fn apply(self, node: &mut NarrativeObject) {
        node.output_selection.restore_selections(self.output);
        if let Some(group) = node.group_selection_mut() {
            group.selection.restore_selections(self.group);
        }
        if let Some(layer) = node.layer_selection_mut() {
            layer.selection.restore_selections(self.layer);
        }
    }
}

impl Saveable for NarrativeSpace {
    fn save(&self, state: &mut SaveState) -> Result<(), PersistError> {
        state.put(GLOBAL_VARIABLES_KEY, &self.globals.save())?;
        for node in self.nodes.values() {
            if !node.variables.is_empty() {
                state.put(&node_variables_key(node.id), &node.variables.save())?;
            }
            let decisions = NodeDecisions::of(node);
            if !decisions.is_empty() {
                state.put(&node_decisions_key(node.id), &decisions)?;
            }
        }
        Ok(())
    }

    fn load(&mut self, state: &SaveState) -> Result<(), PersistError> {
        if let Some(globals) = state.get(GLOBAL_VARIABLES_KEY)? {
            self.globals.load(&globals);
        }
        for node in self.nodes.values_mut() {
            if let Some(values) = state.get(&node_variables_key(node.id))? {
                node.variables.load(&values);
            }
            // A node without a record had selected nothing when saved
            let decisions: NodeDecisions = state.get(&node_decisions_key(node.id))?.unwrap_or_default();
            decisions.apply(node);
        }
        Ok(())
    }
}

/// Authoring problem found by [`NarrativeSpace::validate`]
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// The space has no root
    MissingNarrativeRoot,
    /// A reference points to a node that does not exist
    DanglingReference {
        /// Referencing node, `None` for the space root
        from: Option<NarrativeObjectId>,
        /// Missing node
        to: NarrativeObjectId,
    },
    /// A layer node references a missing definition
    DanglingLayerDefinition {
        /// Layer node
        node: NarrativeObjectId,
        /// Missing definition
        definition: LayerDefinitionId,
    },
    /// Atomic node without media
    MissingMedia {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
    },
    /// Atomic node with a non-positive duration
    InvalidDuration {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
        /// Authored duration
        duration: f64,
    },
    /// Graph node without a root
    MissingGraphRoot {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
    },
    /// Layer definition without a root
    MissingLayerRoot {
        /// Definition ID
        definition: LayerDefinitionId,
        /// Definition name
        name: String,
    },
    /// More than one master definition under one layer node
    MultipleMasterLayers {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
    },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingNarrativeRoot => write!(f, "narrative space has no root"),
            Self::DanglingReference { from: Some(from), to } => {
                write!(f, "node {from} references missing node {to}")
            }
            Self::DanglingReference { from: None, to } => write!(f, "root references missing node {to}"),
            Self::DanglingLayerDefinition { node, definition } => {
                write!(f, "layer node {node} references missing layer definition {:?}", definition.0)
            }
            Self::MissingMedia { name, .. } => write!(f, "atomic node '{name}' has no media"),
            Self::InvalidDuration { name, duration, .. } => {
                write!(f, "atomic node '{name}' has invalid duration {duration}")
            }
            Self::MissingGraphRoot { name, .. } => write!(f, "graph node '{name}' has no root"),
            Self::MissingLayerRoot { name, .. } => write!(f, "layer definition '{name}' has no root"),
            Self::MultipleMasterLayers { name, .. } => {
                write!(f, "layer node '{name}' has more than one master layer")
            }
        }
    }
}

/// Error when editing the narrative space
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Narrative object not found: {0}")]
    NodeNotFound(NarrativeObjectId),

    /// Node is not of the expected kind
    #[error("Narrative object '{name}' ({node}) is not a {expected} node")]
    WrongKind {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
        /// Expected kind name
        expected: &'static str,
    },

    /// Edge already exists
    #[error("{from} is already connected to {to}")]
    AlreadyConnected {
        /// Source node
        from: NarrativeObjectId,
        /// Target node
        to: NarrativeObjectId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::StrategyRef;
    use crate::node::MediaReference;
    use crate::variable::Variable;

    #[test]
    fn test_connect_validates_nodes() {
        let mut space = NarrativeSpace::new("test");
        let a = space.add_node(NarrativeObject::atomic("a", MediaReference::video("a"), 1.0));
        let b = space.add_node(NarrativeObject::atomic("b", MediaReference::video("b"), 1.0));

        assert_eq!(space.root(), Some(a));
        space.connect(a, b).unwrap();
        assert!(matches!(space.connect(a, b), Err(GraphError::AlreadyConnected { .. })));
        assert!(matches!(
            space.connect(a, NarrativeObjectId::new()),
            Err(GraphError::NodeNotFound(_))
        ));
        assert!(matches!(space.add_group_child(a, b), Err(GraphError::WrongKind { .. })));
    }

    #[test]
    fn test_remove_node_clears_references() {
        let mut space = NarrativeSpace::new("test");
        let a = space.add_node(NarrativeObject::atomic("a", MediaReference::video("a"), 1.0));
        let b = space.add_node(NarrativeObject::atomic("b", MediaReference::video("b"), 1.0));
        space.connect(a, b).unwrap();

        space.remove_node(b);
        assert!(space.node(a).unwrap().output_selection.candidates().is_empty());
        space.remove_node(a);
        assert_eq!(space.root(), None);
    }

    #[test]
    fn test_validate_reports_authoring_errors() {
        let mut space = NarrativeSpace::new("test");
        let layers = space.add_node(NarrativeObject::layer("layers", StrategyRef::all()));
        let zero = space.add_node(NarrativeObject::atomic("zero", MediaReference::video("z"), 0.0));
        space.add_node(NarrativeObject::graph("empty graph", None));
        space
            .add_layer_definition(layers, LayerDefinition::new("m1", LayerType::Master, zero))
            .unwrap();
        space
            .add_layer_definition(layers, LayerDefinition::new("m2", LayerType::Master, zero))
            .unwrap();

        let issues = space.validate();
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::MultipleMasterLayers { .. })));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::InvalidDuration { .. })));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::MissingGraphRoot { .. })));
    }

    #[test]
    fn test_ron_round_trip() {
        let mut space = NarrativeSpace::new("Round Trip");
        let a = space.add_node(NarrativeObject::atomic("a", MediaReference::video("a.mp4"), 4.0));
        let b = space.add_node(NarrativeObject::atomic("b", MediaReference::audio("b.ogg"), 2.5));
        space.connect(a, b).unwrap();
        space.globals_mut().add_variable(Variable::new("visits", 0_i64));

        let ron = space.to_ron().unwrap();
        let loaded = NarrativeSpace::from_ron(&ron).unwrap();
        assert_eq!(loaded.name, "Round Trip");
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.node(a).unwrap().output_selection.candidates(), &[b]);
        assert_eq!(loaded.globals().get_first_or_default::<i64>("visits"), Some(0));
    }

    #[test]
    fn test_variable_state_saves_per_store() {
        let mut space = NarrativeSpace::new("test");
        let a = space.add_node(
            NarrativeObject::atomic("a", MediaReference::video("a"), 1.0)
                .with_variable(Variable::new("seen", false)),
        );
        let global = space.globals_mut().add_variable(Variable::new("score", 0_i64));
        space.globals_mut().set_value(global, 12_i64).unwrap();
        space.node_mut(a).unwrap().variables.set_by_name("seen", true);
        assert_eq!(space.take_variable_changes().len(), 2);

        let mut state = SaveState::new();
        space.save(&mut state).unwrap();

        let mut fresh = space.clone();
        fresh.globals_mut().set_value(global, 0_i64).unwrap();
        fresh.node_mut(a).unwrap().variables.set_by_name("seen", false);
        fresh.load(&state).unwrap();

        assert_eq!(fresh.globals().get_first_or_default::<i64>("score"), Some(12));
        assert_eq!(fresh.node(a).unwrap().variables.get_first_or_default::<bool>("seen"), Some(true));
    }

    #[test]
    fn test_decision_records_save_per_node() {
        let mut space = NarrativeSpace::new("test");
        let hub = space.add_node(NarrativeObject::atomic("hub", MediaReference::video("hub"), 1.0));
        let a = space.add_node(NarrativeObject::atomic("a", MediaReference::video("a"), 1.0));
        let b = space.add_node(NarrativeObject::atomic("b", MediaReference::video("b"), 1.0));
        space.connect(hub, a).unwrap();
        space.connect(hub, b).unwrap();
        let pristine = space.clone();

        space.node_mut(hub).unwrap().output_selection.record_selection(a);
        space.node_mut(hub).unwrap().output_selection.record_selection(a);
        let mut state = SaveState::new();
        space.save(&mut state).unwrap();
        assert!(state.contains(&node_decisions_key(hub)));
        assert!(!state.contains(&node_decisions_key(a)));

        let mut restored = pristine;
        restored.node_mut(b).unwrap().output_selection.record_selection(hub);
        restored.load(&state).unwrap();

        let hub_decision = &restored.node(hub).unwrap().output_selection;
        assert_eq!(hub_decision.times_selected(a), 2);
        assert_eq!(hub_decision.times_selected(b), 0);
        // Selections made after the save are dropped
        assert_eq!(restored.node(b).unwrap().output_selection.selection_count(), 0);
    }
}
