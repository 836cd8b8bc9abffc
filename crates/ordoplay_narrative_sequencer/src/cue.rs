// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scheduled media cues.

use crate::layer::LayerId;
use crate::media::{CueContext, MediaController, MediaControllerFactory};
use ordoplay_narrative_graph::{MediaReference, NarrativeObjectId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a scheduled cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CueId(pub Uuid);

impl CueId {
    /// Create a new random cue ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CueId {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted form of a cue, without live controllers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueSnapshot {
    /// Cue ID
    pub id: CueId,
    /// Atomic node
    pub node: NarrativeObjectId,
    /// Media source
    pub media: MediaReference,
    /// Offset into the media
    pub in_time: f64,
    /// Timeline start
    pub start_time: f64,
    /// Timeline finish
    pub finish_time: f64,
}

/// One atomic node placed on a layer's timeline
pub struct ScheduledCue {
    /// Cue ID
    pub id: CueId,
    /// Atomic node the cue represents
    pub node: NarrativeObjectId,
    /// Owning layer
    pub layer: LayerId,
    /// Media source
    pub media: MediaReference,
    /// Offset into the media
    pub in_time: f64,
    /// Timeline start
    pub start_time: f64,
    /// Timeline finish
    pub finish_time: f64,
    will_play_sent: bool,
    controllers: Vec<Box<dyn MediaController>>,
}

impl std::fmt::Debug for ScheduledCue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledCue")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("media", &self.media.uri)
            .field("start_time", &self.start_time)
            .field("finish_time", &self.finish_time)
            .field("controllers", &self.controllers.len())
            .finish()
    }
}

impl ScheduledCue {
    /// Create a cue spanning `[start_time, start_time + duration)`
    pub fn new(
        node: NarrativeObjectId,
        layer: LayerId,
        media: MediaReference,
        in_time: f64,
        start_time: f64,
        duration: f64,
    ) -> Self {
        Self {
            id: CueId::new(),
            node,
            layer,
            media,
            in_time,
            start_time,
            finish_time: start_time + duration,
            will_play_sent: false,
            controllers: Vec::new(),
        }
    }

    /// Rebuild a cue from its snapshot
    pub fn from_snapshot(snapshot: CueSnapshot, layer: LayerId) -> Self {
        Self {
            id: snapshot.id,
            node: snapshot.node,
            layer,
            media: snapshot.media,
            in_time: snapshot.in_time,
            start_time: snapshot.start_time,
            finish_time: snapshot.finish_time,
            will_play_sent: false,
            controllers: Vec::new(),
        }
    }

    /// Persisted form of this cue
    pub fn snapshot(&self) -> CueSnapshot {
        CueSnapshot {
            id: self.id,
            node: self.node,
            media: self.media.clone(),
            in_time: self.in_time,
            start_time: self.start_time,
            finish_time: self.finish_time,
        }
    }

    /// Duration on the timeline
    pub fn duration(&self) -> f64 {
        self.finish_time - self.start_time
    }

    /// Controller view of this cue at `playhead`
    pub fn context(&self, playhead: f64) -> CueContext {
        CueContext {
            cue: self.id,
            layer: self.layer,
            node: self.node,
            media: self.media.clone(),
            in_time: self.in_time,
            start_time: self.start_time,
            finish_time: self.finish_time,
            playhead,
        }
    }

    /// Whether `will_play` has been sent
    pub fn will_play_sent(&self) -> bool {
        self.will_play_sent
    }

    /// Clamp the finish time. Returns false if nothing of the cue remains.
    pub fn truncate(&mut self, end: f64) -> bool {
        if self.start_time >= end {
            return false;
        }
        self.finish_time = self.finish_time.min(end);
        true
    }

    pub(crate) fn preload(&mut self, factory: &mut dyn MediaControllerFactory, playhead: f64) {
        let ctx = self.context(playhead);
        self.controllers = factory.create(&ctx);
        for controller in &mut self.controllers {
            controller.preload(&ctx);
        }
    }

    pub(crate) fn will_play(&mut self) {
        self.will_play_sent = true;
        for controller in &mut self.controllers {
            controller.will_play();
        }
    }

    pub(crate) fn play(&mut self, playhead: f64) {
        let ctx = self.context(playhead);
        for controller in &mut self.controllers {
            controller.play(&ctx);
        }
    }

    pub(crate) fn pause(&mut self) {
        for controller in &mut self.controllers {
            controller.pause();
        }
    }

    pub(crate) fn unpause(&mut self) {
        for controller in &mut self.controllers {
            controller.unpause();
        }
    }

    /// Stop and shut down every controller, then release them
    pub(crate) fn stop(&mut self, playhead: f64) {
        let ctx = self.context(playhead);
        for mut controller in self.controllers.drain(..) {
            controller.stop(&ctx);
            let name = controller.media_name();
            controller.shutdown(Box::new(move || {
                tracing::trace!(media = %name, "Media controller shut down");
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        let layer = LayerId::new();
        let node = NarrativeObjectId::new();
        let mut cue = ScheduledCue::new(node, layer, MediaReference::video("a"), 0.0, 10.0, 10.0);

        assert!(cue.truncate(15.0));
        assert_eq!(cue.finish_time, 15.0);
        assert!(cue.truncate(30.0));
        assert_eq!(cue.finish_time, 15.0);
        assert!(!cue.truncate(10.0));
    }

    #[test]
    fn test_seek_offset_after_late_start() {
        let cue = ScheduledCue::new(
            NarrativeObjectId::new(),
            LayerId::new(),
            MediaReference::video("a"),
            2.0,
            10.0,
            5.0,
        );
        assert_eq!(cue.context(9.0).seek_offset(), 2.0);
        assert_eq!(cue.context(12.5).seek_offset(), 4.5);
    }
}
