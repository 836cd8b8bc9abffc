// SPDX-License-Identifier: MIT OR Apache-2.0
//! Save and resume scenarios.

mod common;

use common::{all_spans, config, recording_factory, Log};
use ordoplay_narrative_graph::{
    LayerDefinition, LayerType, MediaReference, NarrativeObject, NarrativeSpace, PersistError,
    SaveState, Saveable, StrategyRef, Variable,
};
use ordoplay_narrative_sequencer::{
    PlaybackState, ProcessingPhase, Sequencer, SequencerEvent, SEQUENCER_KEY,
};

/// intro, then a master/slave layer pair, then an outro
fn layered_space() -> NarrativeSpace {
    let mut space = NarrativeSpace::new("layered");
    let intro = space.add_node(NarrativeObject::atomic("intro", MediaReference::video("intro.mp4"), 4.0));
    let scene = space.add_node(NarrativeObject::layer("scene", StrategyRef::all()));
    let first = space.add_node(NarrativeObject::atomic("first", MediaReference::video("m1.mp4"), 3.0));
    let second = space.add_node(NarrativeObject::atomic("second", MediaReference::video("m2.mp4"), 3.0));
    let music = space.add_node(NarrativeObject::atomic("music", MediaReference::audio("music.ogg"), 2.0));
    let outro = space.add_node(NarrativeObject::atomic("outro", MediaReference::video("outro.mp4"), 2.0));

    space.connect(intro, scene).unwrap();
    space.connect(first, second).unwrap();
    space.connect(music, music).unwrap();
    space.connect(scene, outro).unwrap();
    space
        .add_layer_definition(scene, LayerDefinition::new("dialogue", LayerType::Master, first))
        .unwrap();
    space
        .add_layer_definition(scene, LayerDefinition::new("music", LayerType::Slave, music))
        .unwrap();
    space.globals_mut().add_variable(Variable::new("visits", 0_i64));
    space
}

#[test]
fn test_resume_matches_uninterrupted_run() {
    let space = layered_space();
    let mut reference = Sequencer::new(space.clone(), config());
    reference.start().unwrap();
    reference.run_until_finished(1.0, 100);
    assert!(reference.is_finished());

    let mut original = Sequencer::new(space.clone(), config());
    original.start().unwrap();
    for _ in 0..5 {
        original.tick(1.0);
    }
    assert_eq!(original.playhead(), 5.0);
    assert!(!original.is_processing_complete());

    let mut state = SaveState::new();
    original.save(&mut state).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.ron");
    state.write(&path).unwrap();

    let log = Log::default();
    let mut resumed = Sequencer::new(space, config()).with_media_factory(recording_factory(log.clone()));
    resumed.load(&SaveState::read(&path).unwrap()).unwrap();
    assert_eq!(resumed.playhead(), 5.0);
    assert_eq!(resumed.state(), PlaybackState::Playing);

    resumed.run_until_finished(1.0, 100);
    assert!(resumed.is_finished());
    assert!(resumed.failures().is_empty());
    assert_eq!(all_spans(&resumed), all_spans(&reference));

    // The cue that was playing at save time restarts from the saved playhead
    assert!(log.borrow().iter().any(|l| l == "play m1.mp4 @1"));
    assert_eq!(
        resumed.take_events().last(),
        Some(&SequencerEvent::PlaybackComplete { playhead: 12.0 })
    );
}

#[test]
fn test_resume_keeps_output_selections() {
    let mut space = NarrativeSpace::new("hub");
    let hub = space.add_node(
        NarrativeObject::atomic("hub", MediaReference::video("hub.mp4"), 1.0)
            .with_output_strategy(StrategyRef::new("SelectUnique")),
    );
    let a = space.add_node(NarrativeObject::atomic("a", MediaReference::video("a.mp4"), 1.0));
    let b = space.add_node(NarrativeObject::atomic("b", MediaReference::video("b.mp4"), 1.0));
    space.connect(hub, a).unwrap();
    space.connect(hub, b).unwrap();
    space.connect(a, hub).unwrap();
    space.connect(b, hub).unwrap();
    let config = config().with_lookahead(1.5);

    let mut reference = Sequencer::new(space.clone(), config.clone());
    reference.start().unwrap();
    reference.run_until_finished(1.0, 100);
    assert!(reference.is_finished());
    let played: Vec<_> = all_spans(&reference).into_iter().map(|(node, _, _)| node).collect();
    assert_eq!(played, vec![hub, a, hub, b, hub]);

    let mut original = Sequencer::new(space.clone(), config.clone());
    original.start().unwrap();
    for _ in 0..3 {
        original.tick(1.0);
    }
    assert!(!original.is_processing_complete());
    assert_eq!(original.space().node(hub).unwrap().output_selection.selection_count(), 2);

    let mut state = SaveState::new();
    original.save(&mut state).unwrap();
    assert!(state.contains(&format!("decisions/{hub}")));

    let mut resumed = Sequencer::new(space, config);
    resumed.load(&state).unwrap();
    assert_eq!(resumed.space().node(hub).unwrap().output_selection.times_selected(a), 1);

    resumed.run_until_finished(1.0, 100);
    assert!(resumed.is_finished());
    assert!(resumed.failures().is_empty());
    assert_eq!(all_spans(&resumed), all_spans(&reference));
}

#[test]
fn test_save_records_processing_stacks() {
    let mut sequencer = Sequencer::new(layered_space(), config());
    sequencer.start().unwrap();
    for _ in 0..5 {
        sequencer.tick(1.0);
    }

    let base = sequencer.timeline().base_layer();
    let frames = sequencer.timeline().frames(base).to_vec();
    assert_eq!(frames.len(), 1);
    assert!(matches!(frames[0].phase, ProcessingPhase::AwaitingLayers { ref layers } if layers.len() == 2));

    let mut state = SaveState::new();
    sequencer.save(&mut state).unwrap();
    assert!(state.contains(SEQUENCER_KEY));
    assert!(state.contains("variables/global"));
}

#[test]
fn test_load_restores_variables() {
    let space = layered_space();
    let sequencer = Sequencer::new(space.clone(), config());
    sequencer
        .space_mut()
        .globals_mut()
        .set_by_name("visits", 3_i64);

    let mut state = SaveState::new();
    sequencer.save(&mut state).unwrap();

    let mut restored = Sequencer::new(space, config());
    restored.load(&state).unwrap();
    let visits = restored
        .space()
        .globals()
        .get_first_or_default::<i64>("visits");
    assert_eq!(visits, Some(3));
    assert_eq!(restored.state(), PlaybackState::Stopped);
}

#[test]
fn test_load_without_sequencer_record_fails() {
    let mut sequencer = Sequencer::new(layered_space(), config());
    let result = sequencer.load(&SaveState::new());
    assert!(matches!(result, Err(PersistError::MissingRecord(ref key)) if key == SEQUENCER_KEY));
}
