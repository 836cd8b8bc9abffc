// SPDX-License-Identifier: MIT OR Apache-2.0
//! Events raised to the host, and recorded traversal failures.

use crate::cue::CueId;
use crate::error::SequencerError;
use crate::layer::LayerId;
use ordoplay_narrative_graph::NarrativeObjectId;

/// Something the host may want to react to, drained with
/// [`Sequencer::take_events`](crate::Sequencer::take_events)
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    /// Cue dequeued and its controllers created
    CuePreloaded {
        /// Layer
        layer: LayerId,
        /// Cue
        cue: CueId,
        /// Atomic node
        node: NarrativeObjectId,
    },
    /// Cue is a few frames from its start
    CueWillPlay {
        /// Layer
        layer: LayerId,
        /// Cue
        cue: CueId,
        /// Atomic node
        node: NarrativeObjectId,
    },
    /// Cue started playing
    CueStarted {
        /// Layer
        layer: LayerId,
        /// Cue
        cue: CueId,
        /// Atomic node
        node: NarrativeObjectId,
        /// Playhead at start
        playhead: f64,
    },
    /// Cue stopped
    CueFinished {
        /// Layer
        layer: LayerId,
        /// Cue
        cue: CueId,
        /// Atomic node
        node: NarrativeObjectId,
        /// Playhead at stop
        playhead: f64,
    },
    /// Layer force-stopped
    LayerTerminated {
        /// Layer
        layer: LayerId,
    },
    /// A traversal branch ended with an error
    TraversalFailed {
        /// Layer whose branch failed
        layer: LayerId,
        /// Error message
        message: String,
    },
    /// Everything has been processed and played
    PlaybackComplete {
        /// Final playhead
        playhead: f64,
    },
}

/// A traversal branch that ended with a fatal error
#[derive(Debug)]
pub struct TraversalFailure {
    /// Layer whose branch failed
    pub layer: LayerId,
    /// Node being processed when the error surfaced
    pub node: Option<NarrativeObjectId>,
    /// The error
    pub error: SequencerError,
}
