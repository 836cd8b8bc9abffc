// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime sequencer for `OrdoPlay` narratives.
//!
//! This crate walks a [`NarrativeSpace`](ordoplay_narrative_graph::NarrativeSpace)
//! and turns it into timed media cues:
//! - Cooperative traversal driven by host ticks
//! - Pluggable selection and termination strategies
//! - Concurrent layers with master/slave duration rules
//! - Look-ahead bounded scheduling and media controller lifecycle
//! - Save and resume mid-traversal
//!
//! ## Architecture
//!
//! Traversal is a tree of local futures owned by the [`Sequencer`]. Each
//! tick polls it once; anything waiting on the playhead yields. Playback
//! state (layers, cues, playhead) lives in a [`Timeline`] shared with the
//! traversal tasks.

pub mod config;
pub mod cue;
pub mod error;
pub mod event;
pub mod layer;
pub mod media;
mod process;
pub mod sequencer;
pub mod snapshot;
pub mod strategy;
pub mod task;
pub mod timeline;

pub use config::SequencerConfig;
pub use cue::{CueId, CueSnapshot, ScheduledCue};
pub use error::SequencerError;
pub use event::{SequencerEvent, TraversalFailure};
pub use layer::{LayerId, SequencerLayer};
pub use media::{CueContext, MediaController, MediaControllerFactory, MediaProbe, NullMediaFactory};
pub use sequencer::{PlaybackState, Sequencer};
pub use snapshot::{LayerFrames, LayerSnapshot, SequencerSnapshot, SEQUENCER_KEY};
pub use strategy::{
    CandidateEntry, SelectionContext, SelectionStrategy, StrategyRegistry, TerminationStrategy,
};
pub use timeline::{ProcessingFrame, ProcessingPhase, Timeline};
