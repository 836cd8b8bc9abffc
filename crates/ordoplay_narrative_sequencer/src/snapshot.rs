// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted sequencer state and its two-phase restore.
//!
//! Layers reference each other by ID. Restoring first rebuilds every layer
//! without links, then resolves parent, children and master references,
//! failing on any dangling ID.

use crate::cue::CueSnapshot;
use crate::layer::{LayerId, SequencerLayer};
use crate::sequencer::PlaybackState;
use crate::timeline::{ProcessingFrame, Timeline};
use indexmap::IndexMap;
use ordoplay_narrative_graph::{LayerDefinitionId, LayerType, NarrativeObjectId, PersistError};
use serde::{Deserialize, Serialize};

/// Save-state key of the sequencer record
pub const SEQUENCER_KEY: &str = "sequencer";

/// Persisted form of one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    /// Layer ID
    pub id: LayerId,
    /// Master / slave role
    pub layer_type: LayerType,
    /// Definition the layer was started from
    pub definition: Option<LayerDefinitionId>,
    /// Parent layer
    pub parent: Option<LayerId>,
    /// Child layers
    pub children: Vec<LayerId>,
    /// Master sibling
    #[serde(default)]
    pub master: Option<LayerId>,
    /// Raw end time
    pub end_time: f64,
    /// Cues still to play, in-flight ones first
    pub queued: Vec<CueSnapshot>,
    /// Cues already played
    #[serde(default)]
    pub played: Vec<CueSnapshot>,
    /// Whether traversal finished on this layer
    pub traversal_complete: bool,
    /// Whether the layer was force-stopped
    #[serde(default)]
    pub terminated: bool,
}

/// Processing stack of one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerFrames {
    /// Layer
    pub layer: LayerId,
    /// Frames, outermost first
    pub frames: Vec<ProcessingFrame>,
}

/// Everything needed to resume a sequencer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerSnapshot {
    /// Playback state at save time
    pub state: PlaybackState,
    /// Whether traversal had finished
    pub processing_complete: bool,
    /// Playhead at save time
    pub playhead: f64,
    /// Root layer
    pub base_layer: LayerId,
    /// Every layer
    pub layers: Vec<LayerSnapshot>,
    /// Nodes sequenced so far
    pub sequenced: Vec<NarrativeObjectId>,
    /// Processing stacks of unfinished layers
    pub processing: Vec<LayerFrames>,
    /// Fired layer triggers and their times
    #[serde(default)]
    pub triggers: IndexMap<String, f64>,
}

impl Timeline {
    /// Capture the timeline
    pub fn snapshot(&self, state: PlaybackState, processing_complete: bool) -> SequencerSnapshot {
        SequencerSnapshot {
            state,
            processing_complete,
            playhead: self.playhead,
            base_layer: self.base,
            layers: self.layers.values().map(SequencerLayer::snapshot).collect(),
            sequenced: self.sequenced.iter().copied().collect(),
            processing: self
                .frames
                .iter()
                .filter(|(_, frames)| !frames.is_empty())
                .map(|(layer, frames)| LayerFrames {
                    layer: *layer,
                    frames: frames.clone(),
                })
                .collect(),
            triggers: self.triggers.clone(),
        }
    }

    /// Rebuild a timeline from a snapshot
    pub fn restore(snapshot: &SequencerSnapshot) -> Result<Self, PersistError> {
        let mut layers = IndexMap::new();
        for layer in &snapshot.layers {
            if layers
                .insert(layer.id, SequencerLayer::shell_from_snapshot(layer))
                .is_some()
            {
                return Err(PersistError::Invalid(format!("duplicate layer {}", layer.id)));
            }
        }
        if !layers.contains_key(&snapshot.base_layer) {
            return Err(PersistError::Invalid(format!(
                "base layer {} is missing",
                snapshot.base_layer
            )));
        }

        for layer in &snapshot.layers {
            let resolve = |id: LayerId| {
                if layers.contains_key(&id) {
                    Ok(id)
                } else {
                    Err(PersistError::Invalid(format!(
                        "layer {} references unknown layer {id}",
                        layer.id
                    )))
                }
            };
            let parent = layer.parent.map(resolve).transpose()?;
            let master = layer.master.map(resolve).transpose()?;
            let children = layer
                .children
                .iter()
                .map(|id| resolve(*id))
                .collect::<Result<Vec<_>, _>>()?;

            if let Some(target) = layers.get_mut(&layer.id) {
                target.parent = parent;
                target.master = master;
                target.children = children;
            }
        }

        let mut frames = IndexMap::new();
        for entry in &snapshot.processing {
            if !layers.contains_key(&entry.layer) {
                return Err(PersistError::Invalid(format!(
                    "processing stack for unknown layer {}",
                    entry.layer
                )));
            }
            frames.insert(entry.layer, entry.frames.clone());
        }

        Ok(Self {
            playhead: snapshot.playhead,
            base: snapshot.base_layer,
            layers,
            sequenced: snapshot.sequenced.iter().copied().collect(),
            frames,
            triggers: snapshot.triggers.clone(),
            events: Vec::new(),
            failures: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordoplay_narrative_graph::MediaReference;

    fn nested_timeline() -> (Timeline, Vec<LayerId>) {
        let mut timeline = Timeline::new();
        let base = timeline.base_layer();
        timeline
            .schedule_cue(base, NarrativeObjectId::new(), MediaReference::video("intro"), 0.0, 5.0)
            .unwrap();
        let children = timeline
            .start_layers(
                base,
                &[
                    (LayerDefinitionId::new(), LayerType::Master, 0.0),
                    (LayerDefinitionId::new(), LayerType::Slave, 1.0),
                ],
            )
            .unwrap();
        timeline
            .schedule_cue(children[0], NarrativeObjectId::new(), MediaReference::video("scene"), 0.0, 8.0)
            .unwrap();
        (timeline, children)
    }

    #[test]
    fn test_restore_relinks_layers() {
        let (timeline, children) = nested_timeline();
        let snapshot = timeline.snapshot(PlaybackState::Playing, false);
        let restored = Timeline::restore(&snapshot).unwrap();

        let base = restored.base_layer();
        assert_eq!(restored.layer(base).unwrap().children(), children.as_slice());
        assert_eq!(restored.layer(children[1]).unwrap().parent(), Some(base));
        assert_eq!(restored.layer(children[1]).unwrap().master(), Some(children[0]));
        assert_eq!(restored.end_time(base), timeline.end_time(base));
    }

    #[test]
    fn test_restore_rejects_dangling_reference() {
        let (timeline, _) = nested_timeline();
        let mut snapshot = timeline.snapshot(PlaybackState::Playing, false);
        snapshot.layers[1].parent = Some(LayerId::new());

        assert!(matches!(Timeline::restore(&snapshot), Err(PersistError::Invalid(_))));
    }

    #[test]
    fn test_snapshot_ron_round_trip() {
        let (timeline, _) = nested_timeline();
        let snapshot = timeline.snapshot(PlaybackState::Paused, false);
        let text = ron::to_string(&snapshot).unwrap();
        let parsed: SequencerSnapshot = ron::from_str(&text).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
