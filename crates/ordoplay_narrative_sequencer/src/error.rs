// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequencer errors.
//!
//! Every variant here is fatal for the traversal branch that raised it.
//! Soft conditions (no selection, missing constraint variable, failed media
//! probe) are logged where they happen and never become errors.

use crate::layer::LayerId;
use ordoplay_narrative_graph::{
    GraphError, LayerDefinitionId, NarrativeObjectId, PersistError,
};

/// Fatal error raised while processing the narrative graph
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// Atomic node without a media source
    #[error("Atomic node '{name}' ({node}) has no media source")]
    InvalidMedia {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
    },

    /// Atomic node with zero, negative or undefined duration
    #[error("Atomic node '{name}' ({node}) has invalid duration {duration}")]
    InvalidDuration {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
        /// Offending duration
        duration: f64,
    },

    /// Graph node without a sub-graph root
    #[error("Graph node '{name}' ({node}) has no root")]
    MissingRoot {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
    },

    /// Layer definition without a root
    #[error("Layer definition '{name}' ({definition:?}) has no root")]
    MissingLayerRoot {
        /// Definition ID
        definition: LayerDefinitionId,
        /// Definition name
        name: String,
    },

    /// More than one master layer selected by one layer node
    #[error("Layer node '{name}' ({node}) selected more than one master layer")]
    MultipleMasterLayers {
        /// Node ID
        node: NarrativeObjectId,
        /// Node name
        name: String,
    },

    /// Strategy name not present in the registry
    #[error("Unknown strategy '{strategy}' on decision point '{decision}'")]
    UnknownStrategy {
        /// Decision point name
        decision: String,
        /// Strategy name
        strategy: String,
    },

    /// The narrative space has no usable root
    #[error("Narrative space has no valid root")]
    InvalidNarrativeRoot,

    /// Narrative object not found
    #[error("Narrative object not found: {0}")]
    NodeNotFound(NarrativeObjectId),

    /// Layer definition not found
    #[error("Layer definition not found: {0:?}")]
    LayerDefinitionNotFound(LayerDefinitionId),

    /// Sequencer layer not found
    #[error("Sequencer layer not found: {0}")]
    LayerNotFound(LayerId),

    /// Narrative graph error
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Persistence error
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Result type for sequencer operations
pub type Result<T> = std::result::Result<T, SequencerError>;
