// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared runtime state: the layer tree, playhead, sequencing history and
//! the per-layer processing stacks.

use crate::cue::{CueId, ScheduledCue};
use crate::error::{Result, SequencerError};
use crate::event::{SequencerEvent, TraversalFailure};
use crate::layer::{LayerId, SequencerLayer};
use crate::media::MediaControllerFactory;
use indexmap::{IndexMap, IndexSet};
use ordoplay_narrative_graph::{
    LayerDefinitionId, LayerType, MediaReference, NarrativeObjectId, SelectionRecord,
    SequenceHistory,
};
use serde::{Deserialize, Serialize};

/// Where processing of a node stopped, used to resume after a restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessingPhase {
    /// Node body not yet run
    Body,
    /// Graph node waiting for its sub-graph
    AwaitingSubgraph,
    /// Group node inside its selection loop
    GroupSelection {
        /// Selections of the group so far
        selections: SelectionRecord<NarrativeObjectId>,
        /// Picks of the current iteration not yet processed
        pending: Vec<NarrativeObjectId>,
    },
    /// Layer node waiting for its child layers
    AwaitingLayers {
        /// The child layers it started
        layers: Vec<LayerId>,
    },
    /// Body finished; choosing the next node
    OutputSelection,
}

/// One entry of a layer's processing stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingFrame {
    /// Node being processed
    pub node: NarrativeObjectId,
    /// How far processing got
    pub phase: ProcessingPhase,
}

/// Layer tree and everything traversal shares with playback
#[derive(Debug)]
pub struct Timeline {
    pub(crate) playhead: f64,
    pub(crate) base: LayerId,
    pub(crate) layers: IndexMap<LayerId, SequencerLayer>,
    pub(crate) sequenced: IndexSet<NarrativeObjectId>,
    pub(crate) frames: IndexMap<LayerId, Vec<ProcessingFrame>>,
    pub(crate) triggers: IndexMap<String, f64>,
    pub(crate) events: Vec<SequencerEvent>,
    pub(crate) failures: Vec<TraversalFailure>,
}

impl Timeline {
    /// Create a timeline with an empty base layer
    pub fn new() -> Self {
        let base = SequencerLayer::new(LayerType::Default, None, None, 0.0);
        let base_id = base.id;
        let mut layers = IndexMap::new();
        layers.insert(base_id, base);
        Self {
            playhead: 0.0,
            base: base_id,
            layers,
            sequenced: IndexSet::new(),
            frames: IndexMap::new(),
            triggers: IndexMap::new(),
            events: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Current playhead in seconds
    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    /// The root layer
    pub fn base_layer(&self) -> LayerId {
        self.base
    }

    /// Get a layer
    pub fn layer(&self, id: LayerId) -> Option<&SequencerLayer> {
        self.layers.get(&id)
    }

    /// Get a layer or fail
    pub fn try_layer(&self, id: LayerId) -> Result<&SequencerLayer> {
        self.layers.get(&id).ok_or(SequencerError::LayerNotFound(id))
    }

    fn try_layer_mut(&mut self, id: LayerId) -> Result<&mut SequencerLayer> {
        self.layers.get_mut(&id).ok_or(SequencerError::LayerNotFound(id))
    }

    /// All layers in creation order
    pub fn layers(&self) -> impl Iterator<Item = &SequencerLayer> {
        self.layers.values()
    }

    /// Layer count
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Effective end time of a layer.
    ///
    /// With a master child, the longest master's end wins if it is later
    /// than the raw end; otherwise the longest child's end wins if later.
    pub fn end_time(&self, id: LayerId) -> f64 {
        let Some(layer) = self.layers.get(&id) else {
            return 0.0;
        };
        let raw = layer.raw_end_time();
        if layer.children.is_empty() {
            return raw;
        }

        let longest = |master_only: bool| {
            layer
                .children
                .iter()
                .filter_map(|child| self.layers.get(child))
                .filter(|child| !master_only || child.layer_type == LayerType::Master)
                .map(|child| self.end_time(child.id))
                .reduce(f64::max)
        };

        match longest(true).or_else(|| longest(false)) {
            Some(end) if end > raw => end,
            _ => raw,
        }
    }

    /// Whether the layer is within the look-ahead budget of the playhead
    pub fn can_sequence(&self, id: LayerId, lookahead: f64) -> bool {
        self.playhead + lookahead > self.end_time(id)
    }

    /// Place a cue at the layer's current end time
    pub fn schedule_cue(
        &mut self,
        layer: LayerId,
        node: NarrativeObjectId,
        media: MediaReference,
        in_time: f64,
        duration: f64,
    ) -> Result<CueId> {
        let start = self.end_time(layer);
        let target = self.try_layer_mut(layer)?;
        let cue = ScheduledCue::new(node, layer, media, in_time, start, duration);
        let id = cue.id;
        tracing::debug!(
            layer = %layer,
            node = %node,
            start,
            finish = cue.finish_time,
            "Scheduled cue"
        );
        target.enqueue(cue);
        Ok(id)
    }

    /// Start one child layer per definition, side by side, at the parent's
    /// end time plus each definition's offset. Non-master layers remember
    /// the master of their cohort.
    pub fn start_layers(
        &mut self,
        parent: LayerId,
        definitions: &[(LayerDefinitionId, LayerType, f64)],
    ) -> Result<Vec<LayerId>> {
        self.try_layer(parent)?;
        let start = self.end_time(parent);

        let cohort: Vec<SequencerLayer> = definitions
            .iter()
            .map(|(definition, layer_type, offset)| {
                SequencerLayer::new(*layer_type, Some(*definition), Some(parent), start + offset)
            })
            .collect();
        let master = cohort
            .iter()
            .find(|layer| layer.layer_type == LayerType::Master)
            .map(|layer| layer.id);

        let mut ids = Vec::with_capacity(cohort.len());
        for mut layer in cohort {
            if Some(layer.id) != master {
                layer.master = master;
            }
            ids.push(layer.id);
            self.layers.insert(layer.id, layer);
        }
        self.try_layer_mut(parent)?.children.extend(ids.iter().copied());
        Ok(ids)
    }

    /// The layer and all its descendants, depth first
    pub fn subtree(&self, id: LayerId) -> Vec<LayerId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(layer) = self.layers.get(&current) {
                out.push(current);
                stack.extend(layer.children.iter().rev().copied());
            }
        }
        out
    }

    /// Whether a non-master layer has reached the end of its finished master,
    /// directly or through an ancestor. Such layers stop scheduling.
    pub fn reached_master_end(&self, id: LayerId) -> bool {
        let end = self.end_time(id);
        let mut current = self.layers.get(&id);
        while let Some(layer) = current {
            let master_done = layer
                .master
                .and_then(|master| self.layers.get(&master))
                .filter(|master| master.is_traversal_complete());
            if let Some(master) = master_done {
                if end >= self.end_time(master.id) {
                    return true;
                }
            }
            current = layer.parent.and_then(|parent| self.layers.get(&parent));
        }
        false
    }

    /// Truncate every layer of a cohort (and their descendants) to the end of
    /// the cohort's master. No-op without a master.
    pub fn trim_to_master(&mut self, cohort: &[LayerId]) {
        let Some(master) = cohort.iter().copied().find(|id| {
            self.layers
                .get(id)
                .is_some_and(|layer| layer.layer_type == LayerType::Master)
        }) else {
            return;
        };
        let master_end = self.end_time(master);
        let targets: Vec<LayerId> = cohort
            .iter()
            .flat_map(|id| self.subtree(*id))
            .filter(|id| *id != master)
            .collect();
        for id in targets {
            if let Some(layer) = self.layers.get_mut(&id) {
                layer.truncate(master_end);
            }
        }
        tracing::debug!(master = %master, end = master_end, "Trimmed layers to master");
    }

    /// Record that a node has been sequenced
    pub fn mark_sequenced(&mut self, node: NarrativeObjectId) {
        self.sequenced.insert(node);
    }

    /// Nodes sequenced so far, in first-sequenced order
    pub fn sequenced(&self) -> impl Iterator<Item = NarrativeObjectId> + '_ {
        self.sequenced.iter().copied()
    }

    /// Push a frame for `node` on a layer's stack. Returns its depth.
    pub(crate) fn push_frame(&mut self, layer: LayerId, node: NarrativeObjectId) -> usize {
        let stack = self.frames.entry(layer).or_default();
        stack.push(ProcessingFrame {
            node,
            phase: ProcessingPhase::Body,
        });
        stack.len() - 1
    }

    pub(crate) fn set_phase(&mut self, layer: LayerId, depth: usize, phase: ProcessingPhase) {
        if let Some(frame) = self.frames.get_mut(&layer).and_then(|s| s.get_mut(depth)) {
            frame.phase = phase;
        }
    }

    /// Pop the frame at `depth` and everything above it
    pub(crate) fn pop_frames(&mut self, layer: LayerId, depth: usize) {
        if let Some(stack) = self.frames.get_mut(&layer) {
            stack.truncate(depth);
        }
    }

    /// Processing stack of a layer, outermost first
    pub fn frames(&self, layer: LayerId) -> &[ProcessingFrame] {
        self.frames.get(&layer).map(Vec::as_slice).unwrap_or_default()
    }

    /// Innermost node being processed, per layer
    pub fn currently_processing(&self) -> IndexMap<LayerId, NarrativeObjectId> {
        self.frames
            .iter()
            .filter_map(|(layer, stack)| stack.last().map(|frame| (*layer, frame.node)))
            .collect()
    }

    /// Traversal on a layer is over; its stack is dropped
    pub(crate) fn complete_layer(&mut self, layer: LayerId) {
        self.frames.shift_remove(&layer);
        if let Some(target) = self.layers.get_mut(&layer) {
            target.set_traversal_complete(true);
        }
    }

    /// Record an event occurrence at `time`
    pub fn fire_trigger(&mut self, event: impl Into<String>, time: f64) {
        let event = event.into();
        tracing::info!(event = %event, time, "Layer trigger fired");
        self.triggers.insert(event, time);
    }

    /// When an event fired, if it has
    pub fn trigger_time(&self, event: &str) -> Option<f64> {
        self.triggers.get(event).copied()
    }

    /// Move a layer's cursor to `time`
    pub(crate) fn set_layer_start(&mut self, layer: LayerId, time: f64) -> Result<()> {
        self.try_layer_mut(layer)?.set_end_time(time);
        Ok(())
    }

    /// Whether every layer's end time has been reached
    pub fn all_layers_ended(&self) -> bool {
        self.layers
            .keys()
            .all(|id| self.playhead >= self.end_time(*id))
    }

    /// Advance every layer's cue lifecycle to the playhead
    pub(crate) fn update_layers(&mut self, factory: &mut dyn MediaControllerFactory, will_play_lead: f64) {
        for layer in self.layers.values_mut() {
            layer.update(self.playhead, factory, will_play_lead, &mut self.events);
        }
    }

    /// Force-stop every layer
    pub(crate) fn terminate_all(&mut self) {
        for layer in self.layers.values_mut() {
            layer.terminate(self.playhead, &mut self.events);
        }
    }

    pub(crate) fn pause_all(&mut self) {
        self.layers.values_mut().for_each(SequencerLayer::pause);
    }

    pub(crate) fn unpause_all(&mut self) {
        self.layers.values_mut().for_each(SequencerLayer::unpause);
    }

    /// Record a fatal error for a traversal branch
    pub(crate) fn record_failure(&mut self, layer: LayerId, error: SequencerError) {
        let node = self
            .frames
            .get(&layer)
            .and_then(|stack| stack.last())
            .map(|frame| frame.node);
        tracing::error!(layer = %layer, node = ?node, error = %error, "Traversal branch failed");
        self.events.push(SequencerEvent::TraversalFailed {
            layer,
            message: error.to_string(),
        });
        self.failures.push(TraversalFailure { layer, node, error });
    }

    /// Fatal errors recorded so far
    pub fn failures(&self) -> &[TraversalFailure] {
        &self.failures
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceHistory for Timeline {
    fn has_been_sequenced(&self, node: NarrativeObjectId) -> bool {
        self.sequenced.contains(&node)
    }
}
