// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared helpers for sequencer scenario tests.

#![allow(dead_code)]

use ordoplay_narrative_graph::NarrativeObjectId;
use ordoplay_narrative_sequencer::{
    CueContext, LayerId, MediaController, MediaControllerFactory, Sequencer, SequencerConfig,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Calls seen by recording controllers, in order
pub type Log = Rc<RefCell<Vec<String>>>;

/// Controller that writes every lifecycle call to a shared log
pub struct RecordingController {
    name: String,
    log: Log,
}

impl RecordingController {
    fn record(&self, call: &str) {
        self.log.borrow_mut().push(format!("{call} {}", self.name));
    }
}

impl MediaController for RecordingController {
    fn preload(&mut self, _cue: &CueContext) {
        self.record("preload");
    }

    fn will_play(&mut self) {
        self.record("will_play");
    }

    fn play(&mut self, cue: &CueContext) {
        self.log
            .borrow_mut()
            .push(format!("play {} @{}", self.name, cue.seek_offset()));
    }

    fn pause(&mut self) {
        self.record("pause");
    }

    fn unpause(&mut self) {
        self.record("unpause");
    }

    fn stop(&mut self, _cue: &CueContext) {
        self.record("stop");
    }

    fn shutdown(&mut self, on_complete: Box<dyn FnOnce()>) {
        self.record("shutdown");
        on_complete();
    }

    fn media_name(&self) -> String {
        self.name.clone()
    }
}

/// Factory creating one recording controller per cue
pub fn recording_factory(log: Log) -> impl MediaControllerFactory {
    move |cue: &CueContext| -> Vec<Box<dyn MediaController>> {
        vec![Box::new(RecordingController {
            name: cue.media.uri.clone(),
            log: log.clone(),
        })]
    }
}

/// Deterministic configuration
pub fn config() -> SequencerConfig {
    SequencerConfig::default().with_seed(7)
}

/// `(node, start, finish)` of every cue on a layer, in timeline order
pub fn spans(sequencer: &Sequencer, layer: LayerId) -> Vec<(NarrativeObjectId, f64, f64)> {
    sequencer
        .timeline()
        .layer(layer)
        .map(|l| {
            l.cues()
                .map(|c| (c.node, c.start_time, c.finish_time))
                .collect()
        })
        .unwrap_or_default()
}

/// Every cue on every layer, ordered by start time
pub fn all_spans(sequencer: &Sequencer) -> Vec<(NarrativeObjectId, f64, f64)> {
    let timeline = sequencer.timeline();
    let mut out: Vec<(NarrativeObjectId, f64, f64)> = timeline
        .layers()
        .flat_map(|l| l.cues().map(|c| (c.node, c.start_time, c.finish_time)))
        .collect();
    out.sort_by(|a, b| {
        a.1.total_cmp(&b.1)
            .then(a.2.total_cmp(&b.2))
            .then(a.0 .0.cmp(&b.0 .0))
    });
    out
}

/// Child layers of the base layer
pub fn base_children(sequencer: &Sequencer) -> Vec<LayerId> {
    let timeline = sequencer.timeline();
    timeline
        .layer(timeline.base_layer())
        .map(|l| l.children().to_vec())
        .unwrap_or_default()
}
