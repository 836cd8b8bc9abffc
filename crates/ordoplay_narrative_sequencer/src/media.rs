// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media controller contract.
//!
//! The sequencer never decodes or renders media. It drives controllers
//! supplied by the host through a fixed lifecycle per cue:
//! `preload` when the cue is dequeued, `will_play` a few frames before its
//! start, `play` at its start, then `stop` and `shutdown` when it finishes.

use crate::cue::CueId;
use crate::layer::LayerId;
use ordoplay_narrative_graph::{MediaReference, NarrativeObjectId};

/// What a controller knows about the cue it serves
#[derive(Debug, Clone, PartialEq)]
pub struct CueContext {
    /// Cue ID
    pub cue: CueId,
    /// Layer the cue plays on
    pub layer: LayerId,
    /// Atomic node the cue represents
    pub node: NarrativeObjectId,
    /// Media source
    pub media: MediaReference,
    /// Offset into the source media at cue start
    pub in_time: f64,
    /// Timeline start
    pub start_time: f64,
    /// Timeline finish
    pub finish_time: f64,
    /// Playhead when the call is made
    pub playhead: f64,
}

impl CueContext {
    /// Cue duration on the timeline
    pub fn duration(&self) -> f64 {
        self.finish_time - self.start_time
    }

    /// Offset into the source media matching the current playhead.
    /// Used to seek when a cue starts late, e.g. after a restore.
    pub fn seek_offset(&self) -> f64 {
        self.in_time + (self.playhead - self.start_time).max(0.0)
    }
}

/// Presentation-side handle for one piece of media
pub trait MediaController {
    /// Prepare the media before playback
    fn preload(&mut self, cue: &CueContext);

    /// Playback is a few frames away
    fn will_play(&mut self) {}

    /// Start playback
    fn play(&mut self, cue: &CueContext);

    /// Pause playback
    fn pause(&mut self) {}

    /// Resume paused playback
    fn unpause(&mut self) {}

    /// Stop playback
    fn stop(&mut self, cue: &CueContext);

    /// Release resources, then call `on_complete`
    fn shutdown(&mut self, on_complete: Box<dyn FnOnce()>) {
        on_complete();
    }

    /// Name of the media this controller presents
    fn media_name(&self) -> String;
}

/// Creates the controllers of a cue at preload time
pub trait MediaControllerFactory {
    /// Create zero or more controllers for a cue
    fn create(&mut self, cue: &CueContext) -> Vec<Box<dyn MediaController>>;
}

impl<F> MediaControllerFactory for F
where
    F: FnMut(&CueContext) -> Vec<Box<dyn MediaController>>,
{
    fn create(&mut self, cue: &CueContext) -> Vec<Box<dyn MediaController>> {
        self(cue)
    }
}

/// Factory that creates no controllers (headless scheduling)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMediaFactory;

impl MediaControllerFactory for NullMediaFactory {
    fn create(&mut self, _cue: &CueContext) -> Vec<Box<dyn MediaController>> {
        Vec::new()
    }
}

/// Reads media durations for atomic nodes that take them from their source
pub trait MediaProbe {
    /// Duration in seconds, or `None` if the source cannot be probed
    fn duration(&self, media: &MediaReference) -> Option<f64>;
}

impl<F> MediaProbe for F
where
    F: Fn(&MediaReference) -> Option<f64>,
{
    fn duration(&self, media: &MediaReference) -> Option<f64> {
        self(media)
    }
}
