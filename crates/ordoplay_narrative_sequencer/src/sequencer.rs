// SPDX-License-Identifier: MIT OR Apache-2.0
//! The sequencer: drives traversal and playback from host ticks.

use crate::config::SequencerConfig;
use crate::error::{Result, SequencerError};
use crate::event::{SequencerEvent, TraversalFailure};
use crate::layer::LayerId;
use crate::media::{MediaControllerFactory, MediaProbe, NullMediaFactory};
use crate::process::{resume, run_root, Runtime};
use crate::snapshot::{SequencerSnapshot, SEQUENCER_KEY};
use crate::strategy::StrategyRegistry;
use crate::task::poll_once;
use crate::timeline::Timeline;
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use ordoplay_narrative_graph::{NarrativeObjectId, NarrativeSpace, PersistError, SaveState, Saveable};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Not started
    #[default]
    Stopped,
    /// Advancing
    Playing,
    /// Held; the playhead does not move
    Paused,
    /// Everything played
    Finished,
}

/// Runtime engine for one narrative space.
///
/// Each [`tick`](Self::tick) polls traversal once, advances every layer's
/// cue lifecycle to the playhead, then moves the playhead on.
/// Traversal schedules cues ahead of the playhead, up to the configured
/// look-ahead, and is suspended until playback catches up.
pub struct Sequencer {
    runtime: Runtime,
    factory: Box<dyn MediaControllerFactory>,
    traversal: Option<LocalBoxFuture<'static, ()>>,
    processing_complete: bool,
    state: PlaybackState,
}

impl Sequencer {
    /// Create a sequencer for a narrative space
    pub fn new(space: NarrativeSpace, config: SequencerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            runtime: Runtime {
                space: Rc::new(RefCell::new(space)),
                timeline: Rc::new(RefCell::new(Timeline::new())),
                strategies: Rc::new(StrategyRegistry::with_builtins()),
                config: Rc::new(config),
                rng: Rc::new(RefCell::new(rng)),
                probe: None,
            },
            factory: Box::new(NullMediaFactory),
            traversal: None,
            processing_complete: false,
            state: PlaybackState::Stopped,
        }
    }

    /// Use a media controller factory
    pub fn with_media_factory(mut self, factory: impl MediaControllerFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// Use a strategy registry instead of the built-ins
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.runtime.strategies = Rc::new(strategies);
        self
    }

    /// Use a probe for atomic nodes that take their duration from the media
    pub fn with_media_probe(mut self, probe: impl MediaProbe + 'static) -> Self {
        self.runtime.probe = Some(Rc::new(probe));
        self
    }

    /// Configuration
    pub fn config(&self) -> &SequencerConfig {
        &self.runtime.config
    }

    /// Strategy registry
    pub fn strategies(&self) -> &StrategyRegistry {
        &self.runtime.strategies
    }

    /// The narrative space
    pub fn space(&self) -> Ref<'_, NarrativeSpace> {
        self.runtime.space.borrow()
    }

    /// The narrative space, mutably (e.g. to set variables between ticks)
    pub fn space_mut(&self) -> RefMut<'_, NarrativeSpace> {
        self.runtime.space.borrow_mut()
    }

    /// The layer tree
    pub fn timeline(&self) -> Ref<'_, Timeline> {
        self.runtime.timeline.borrow()
    }

    /// Playback state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Current playhead in seconds
    pub fn playhead(&self) -> f64 {
        self.runtime.timeline.borrow().playhead()
    }

    /// Whether traversal has finished
    pub fn is_processing_complete(&self) -> bool {
        self.processing_complete
    }

    /// Whether playback has completed
    pub fn is_finished(&self) -> bool {
        self.state == PlaybackState::Finished
    }

    /// Begin traversal at the narrative root
    pub fn start(&mut self) -> Result<()> {
        let root = {
            let space = self.runtime.space.borrow();
            space
                .root()
                .filter(|root| space.node(*root).is_some())
                .ok_or(SequencerError::InvalidNarrativeRoot)?
        };
        for (decision, strategy) in self.runtime.strategies.unresolved(&self.runtime.space.borrow()) {
            tracing::warn!(decision = %decision, strategy = %strategy, "Unknown strategy");
        }
        tracing::info!(root = %root, "Starting narrative");
        self.traversal = Some(run_root(self.runtime.clone(), root));
        self.processing_complete = false;
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Advance by `delta` seconds of host time
    pub fn tick(&mut self, delta: f64) {
        if self.state != PlaybackState::Playing {
            return;
        }

        if let Some(traversal) = self.traversal.as_mut() {
            if poll_once(traversal) {
                self.traversal = None;
                self.processing_complete = true;
            }
        }

        let lead = self.runtime.config.will_play_lead();
        let mut timeline = self.runtime.timeline.borrow_mut();
        if self.processing_complete && timeline.all_layers_ended() {
            timeline.terminate_all();
            let playhead = timeline.playhead();
            timeline.events.push(SequencerEvent::PlaybackComplete { playhead });
            self.state = PlaybackState::Finished;
            tracing::info!(playhead, "Playback complete");
            return;
        }

        timeline.update_layers(self.factory.as_mut(), lead);
        timeline.playhead += delta;
    }

    /// Tick until playback completes or `max_ticks` have run.
    /// Returns the number of ticks run.
    pub fn run_until_finished(&mut self, delta: f64, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && self.state == PlaybackState::Playing {
            self.tick(delta);
            ticks += 1;
        }
        ticks
    }

    /// Hold playback and pause playing media
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.runtime.timeline.borrow_mut().pause_all();
            self.state = PlaybackState::Paused;
        }
    }

    /// Resume held playback
    pub fn unpause(&mut self) {
        if self.state == PlaybackState::Paused {
            self.runtime.timeline.borrow_mut().unpause_all();
            self.state = PlaybackState::Playing;
        }
    }

    /// Fire a layer trigger at the current playhead
    pub fn trigger(&mut self, event: impl Into<String>) {
        let mut timeline = self.runtime.timeline.borrow_mut();
        let now = timeline.playhead();
        timeline.fire_trigger(event, now);
    }

    /// Fire a layer trigger with an explicit time, e.g. when the host
    /// noticed the event late
    pub fn trigger_at(&mut self, event: impl Into<String>, time: f64) {
        self.runtime.timeline.borrow_mut().fire_trigger(event, time);
    }

    /// Drain pending events
    pub fn take_events(&mut self) -> Vec<SequencerEvent> {
        std::mem::take(&mut self.runtime.timeline.borrow_mut().events)
    }

    /// Traversal branches that failed
    pub fn failures(&self) -> Ref<'_, [TraversalFailure]> {
        Ref::map(self.runtime.timeline.borrow(), Timeline::failures)
    }

    /// Innermost node being processed, per layer
    pub fn currently_processing(&self) -> IndexMap<LayerId, NarrativeObjectId> {
        self.runtime.timeline.borrow().currently_processing()
    }
}

impl Saveable for Sequencer {
    fn save(&self, state: &mut SaveState) -> std::result::Result<(), PersistError> {
        self.runtime.space.borrow().save(state)?;
        let snapshot = self
            .runtime
            .timeline
            .borrow()
            .snapshot(self.state, self.processing_complete);
        state.put(SEQUENCER_KEY, &snapshot)?;
        tracing::info!(playhead = snapshot.playhead, layers = snapshot.layers.len(), "Saved sequencer");
        Ok(())
    }

    fn load(&mut self, state: &SaveState) -> std::result::Result<(), PersistError> {
        let snapshot: SequencerSnapshot = state.require(SEQUENCER_KEY)?;
        let restored = Timeline::restore(&snapshot)?;
        self.runtime.space.borrow_mut().load(state)?;

        self.traversal = None;
        {
            let mut timeline = self.runtime.timeline.borrow_mut();
            timeline.terminate_all();
            *timeline = restored;
        }
        self.processing_complete = snapshot.processing_complete;
        self.state = snapshot.state;
        if !self.processing_complete && self.state != PlaybackState::Stopped {
            self.traversal = Some(resume(self.runtime.clone()));
        }
        tracing::info!(playhead = snapshot.playhead, layers = snapshot.layers.len(), "Loaded sequencer");
        Ok(())
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("state", &self.state)
            .field("processing_complete", &self.processing_complete)
            .field("playhead", &self.playhead())
            .finish_non_exhaustive()
    }
}
