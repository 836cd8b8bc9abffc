// SPDX-License-Identifier: MIT OR Apache-2.0
//! Narrative graph model for `OrdoPlay` interactive stories.
//!
//! This crate provides the authoring-time data the sequencer walks:
//! - Narrative objects (atomic, group, layer and graph nodes)
//! - Decision points with pluggable strategy references
//! - Typed variable stores with change notification
//! - Constraints and the candidate solver
//! - Save-state persistence
//!
//! ## Architecture
//!
//! Everything lives in a [`NarrativeSpace`] arena and refers to other
//! entities by ID. Evaluation (constraints, solving) is pure; running
//! strategies and scheduling media belongs to the sequencer crate.

pub mod constraint;
pub mod decision;
pub mod layer_definition;
pub mod node;
pub mod persist;
pub mod solver;
pub mod space;
pub mod variable;

pub use constraint::{
    Constraint, ConstraintKind, EqualityOperator, EvaluationContext, OrderingOperator,
    SequenceHistory, SequenceOperator, StringOperator, VariableRef, VariableScope,
};
pub use decision::{
    CandidateChange, DecisionPoint, DecisionRef, DecisionState, SelectionRecord, StrategyRef,
    RECENT_SELECTIONS,
};
pub use layer_definition::{LayerDefinition, LayerDefinitionId, LayerTrigger, LayerType};
pub use node::{
    AtomicMedia, GroupSelection, LayerSelection, MediaKind, MediaReference, NarrativeObject,
    NarrativeObjectId, NarrativeObjectKind,
};
pub use persist::{PersistError, SaveState, Saveable};
pub use solver::{Candidate, Solver};
pub use space::{GraphError, NarrativeSpace, ValidationIssue};
pub use variable::{
    FromVariable, Variable, VariableChange, VariableError, VariableId, VariableKind,
    VariableStore, VariableStoreState, VariableValue,
};
