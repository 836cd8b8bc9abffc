// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequencer layers: one timeline lane with a cue queue.

use crate::cue::{CueSnapshot, ScheduledCue};
use crate::event::SequencerEvent;
use crate::media::MediaControllerFactory;
use crate::snapshot::LayerSnapshot;
use ordoplay_narrative_graph::{LayerDefinitionId, LayerType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Unique identifier for a sequencer layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub Uuid);

impl LayerId {
    /// Create a new random layer ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A runtime timeline lane.
///
/// Cues are queued in schedule order and move through
/// queued, preloading, playing and played as the playhead advances.
/// The raw end time is the finish of the last scheduled cue (or the start
/// offset for a fresh child layer); the effective end time, which also
/// accounts for child layers, lives on [`Timeline`](crate::Timeline).
#[derive(Debug)]
pub struct SequencerLayer {
    /// Layer ID
    pub id: LayerId,
    /// Master / slave role
    pub layer_type: LayerType,
    /// Definition this layer was started from; `None` for the base layer
    pub definition: Option<LayerDefinitionId>,
    pub(crate) parent: Option<LayerId>,
    pub(crate) children: Vec<LayerId>,
    /// Master sibling started by the same layer node
    pub(crate) master: Option<LayerId>,
    end_time: f64,
    queue: VecDeque<ScheduledCue>,
    preloading: Option<ScheduledCue>,
    playing: Option<ScheduledCue>,
    played: Vec<ScheduledCue>,
    traversal_complete: bool,
    terminated: bool,
}

impl SequencerLayer {
    /// Create an empty layer whose timeline starts at `start_time`
    pub fn new(
        layer_type: LayerType,
        definition: Option<LayerDefinitionId>,
        parent: Option<LayerId>,
        start_time: f64,
    ) -> Self {
        Self {
            id: LayerId::new(),
            layer_type,
            definition,
            parent,
            children: Vec::new(),
            master: None,
            end_time: start_time,
            queue: VecDeque::new(),
            preloading: None,
            playing: None,
            played: Vec::new(),
            traversal_complete: false,
            terminated: false,
        }
    }

    /// Parent layer
    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    /// Child layers in creation order
    pub fn children(&self) -> &[LayerId] {
        &self.children
    }

    /// Master sibling this layer is truncated to
    pub fn master(&self) -> Option<LayerId> {
        self.master
    }

    /// Raw end time, ignoring child layers
    pub fn raw_end_time(&self) -> f64 {
        self.end_time
    }

    pub(crate) fn set_end_time(&mut self, time: f64) {
        self.end_time = time;
    }

    /// Whether traversal on this layer has finished
    pub fn is_traversal_complete(&self) -> bool {
        self.traversal_complete
    }

    pub(crate) fn set_traversal_complete(&mut self, complete: bool) {
        self.traversal_complete = complete;
    }

    /// Whether the layer has been force-stopped
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Cues waiting to be preloaded, in order
    pub fn queued(&self) -> impl Iterator<Item = &ScheduledCue> {
        self.queue.iter()
    }

    /// Cue being preloaded
    pub fn preloading(&self) -> Option<&ScheduledCue> {
        self.preloading.as_ref()
    }

    /// Cue being played
    pub fn playing(&self) -> Option<&ScheduledCue> {
        self.playing.as_ref()
    }

    /// Cues that have finished
    pub fn played(&self) -> &[ScheduledCue] {
        &self.played
    }

    /// Every cue on the layer, played first, in timeline order
    pub fn cues(&self) -> impl Iterator<Item = &ScheduledCue> {
        self.played
            .iter()
            .chain(self.playing.iter())
            .chain(self.preloading.iter())
            .chain(self.queue.iter())
    }

    /// Append a cue and move the raw end time to its finish
    pub(crate) fn enqueue(&mut self, cue: ScheduledCue) {
        self.end_time = cue.finish_time;
        self.queue.push_back(cue);
    }

    /// Persisted form of this layer. In-flight cues go back to the front of
    /// the queue, playing first, so they are preloaded again after a restore.
    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            id: self.id,
            layer_type: self.layer_type,
            definition: self.definition,
            parent: self.parent,
            children: self.children.clone(),
            master: self.master,
            end_time: self.end_time,
            queued: self
                .playing
                .iter()
                .chain(self.preloading.iter())
                .chain(self.queue.iter())
                .map(ScheduledCue::snapshot)
                .collect(),
            played: self.played.iter().map(ScheduledCue::snapshot).collect(),
            traversal_complete: self.traversal_complete,
            terminated: self.terminated,
        }
    }

    /// Rebuild an unlinked layer shell from its snapshot.
    /// Parent and children are restored in a second pass.
    pub(crate) fn shell_from_snapshot(snapshot: &LayerSnapshot) -> Self {
        let id = snapshot.id;
        let restore = |cue: &CueSnapshot| ScheduledCue::from_snapshot(cue.clone(), id);
        Self {
            id,
            layer_type: snapshot.layer_type,
            definition: snapshot.definition,
            parent: None,
            children: Vec::new(),
            master: None,
            end_time: snapshot.end_time,
            queue: snapshot.queued.iter().map(restore).collect(),
            preloading: None,
            playing: None,
            played: snapshot.played.iter().map(restore).collect(),
            traversal_complete: snapshot.traversal_complete,
            terminated: snapshot.terminated,
        }
    }

    /// Advance the cue lifecycle to `playhead`
    pub(crate) fn update(
        &mut self,
        playhead: f64,
        factory: &mut dyn MediaControllerFactory,
        will_play_lead: f64,
        events: &mut Vec<SequencerEvent>,
    ) {
        if self.terminated {
            return;
        }

        if self
            .playing
            .as_ref()
            .is_some_and(|cue| playhead >= cue.finish_time)
        {
            self.finish_playing(playhead, events);
        }

        if self.preloading.is_none() {
            if let Some(mut cue) = self.queue.pop_front() {
                cue.preload(factory, playhead);
                tracing::debug!(layer = %self.id, node = %cue.node, start = cue.start_time, "Preloading cue");
                events.push(SequencerEvent::CuePreloaded {
                    layer: self.id,
                    cue: cue.id,
                    node: cue.node,
                });
                self.preloading = Some(cue);
            }
        }

        let (send_will_play, start) = match &self.preloading {
            Some(cue) => (
                !cue.will_play_sent() && playhead >= cue.start_time - will_play_lead,
                playhead >= cue.start_time,
            ),
            None => (false, false),
        };

        if send_will_play {
            if let Some(cue) = self.preloading.as_mut() {
                cue.will_play();
                tracing::debug!(layer = %self.id, node = %cue.node, playhead, "Cue will play");
                events.push(SequencerEvent::CueWillPlay {
                    layer: self.id,
                    cue: cue.id,
                    node: cue.node,
                });
            }
        }

        if start {
            if self.playing.is_some() {
                self.finish_playing(playhead, events);
            }
            if let Some(mut cue) = self.preloading.take() {
                cue.play(playhead);
                tracing::debug!(layer = %self.id, node = %cue.node, playhead, "Cue started");
                events.push(SequencerEvent::CueStarted {
                    layer: self.id,
                    cue: cue.id,
                    node: cue.node,
                    playhead,
                });
                self.playing = Some(cue);
            }
        }
    }

    fn finish_playing(&mut self, playhead: f64, events: &mut Vec<SequencerEvent>) {
        if let Some(mut cue) = self.playing.take() {
            cue.stop(playhead);
            tracing::debug!(layer = %self.id, node = %cue.node, playhead, "Cue finished");
            events.push(SequencerEvent::CueFinished {
                layer: self.id,
                cue: cue.id,
                node: cue.node,
                playhead,
            });
            self.played.push(cue);
        }
    }

    /// Force-stop any playing cue and shut down preloaded controllers
    pub(crate) fn terminate(&mut self, playhead: f64, events: &mut Vec<SequencerEvent>) {
        if self.terminated {
            return;
        }
        self.finish_playing(playhead, events);
        if let Some(mut cue) = self.preloading.take() {
            cue.stop(playhead);
            self.queue.push_front(cue);
        }
        self.terminated = true;
        tracing::info!(layer = %self.id, playhead, "Layer terminated");
        events.push(SequencerEvent::LayerTerminated { layer: self.id });
    }

    pub(crate) fn pause(&mut self) {
        if let Some(cue) = self.playing.as_mut() {
            cue.pause();
        }
    }

    pub(crate) fn unpause(&mut self) {
        if let Some(cue) = self.playing.as_mut() {
            cue.unpause();
        }
    }

    /// Clamp every pending cue to `end`; cues starting at or after it are dropped
    pub(crate) fn truncate(&mut self, end: f64) {
        self.queue.retain_mut(|cue| cue.truncate(end));
        if self.preloading.as_mut().is_some_and(|cue| !cue.truncate(end)) {
            if let Some(mut cue) = self.preloading.take() {
                cue.stop(end);
            }
        }
        if let Some(cue) = self.playing.as_mut() {
            cue.finish_time = cue.finish_time.min(end);
        }
        self.end_time = self.end_time.min(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NullMediaFactory;
    use ordoplay_narrative_graph::{MediaReference, NarrativeObjectId};

    fn layer_with_cues(spans: &[(f64, f64)]) -> SequencerLayer {
        let mut layer = SequencerLayer::new(LayerType::Default, None, None, 0.0);
        for (start, duration) in spans {
            let cue = ScheduledCue::new(
                NarrativeObjectId::new(),
                layer.id,
                MediaReference::video("clip"),
                0.0,
                *start,
                *duration,
            );
            layer.enqueue(cue);
        }
        layer
    }

    #[test]
    fn test_cue_lifecycle() {
        let mut layer = layer_with_cues(&[(0.0, 2.0), (2.0, 1.0)]);
        let mut factory = NullMediaFactory;
        let mut events = Vec::new();

        layer.update(0.0, &mut factory, 0.05, &mut events);
        assert!(layer.playing().is_some());
        assert_eq!(layer.queued().count(), 1);

        layer.update(1.0, &mut factory, 0.05, &mut events);
        assert!(layer.preloading().is_some());

        layer.update(2.0, &mut factory, 0.05, &mut events);
        assert_eq!(layer.played().len(), 1);
        assert_eq!(layer.playing().map(|c| c.start_time), Some(2.0));

        let started = events
            .iter()
            .filter(|e| matches!(e, SequencerEvent::CueStarted { .. }))
            .count();
        assert_eq!(started, 2);
    }

    #[test]
    fn test_truncate_drops_and_clamps() {
        let mut layer = layer_with_cues(&[(0.0, 5.0), (5.0, 5.0), (10.0, 5.0)]);
        layer.truncate(7.0);

        let spans: Vec<(f64, f64)> = layer.cues().map(|c| (c.start_time, c.finish_time)).collect();
        assert_eq!(spans, vec![(0.0, 5.0), (5.0, 7.0)]);
        assert_eq!(layer.raw_end_time(), 7.0);
    }

    #[test]
    fn test_terminate_stops_playing_cue() {
        let mut layer = layer_with_cues(&[(0.0, 10.0)]);
        let mut factory = NullMediaFactory;
        let mut events = Vec::new();
        layer.update(0.0, &mut factory, 0.05, &mut events);

        layer.terminate(3.0, &mut events);
        assert!(layer.is_terminated());
        assert!(layer.playing().is_none());
        assert!(matches!(events.last(), Some(SequencerEvent::LayerTerminated { .. })));
    }
}
