// SPDX-License-Identifier: MIT OR Apache-2.0
//! A headless playback session: sequencer, settings and the save file.

use crate::console::ConsoleMediaFactory;
use crate::settings::PlayerSettings;
use anyhow::{Context, Result};
use ordoplay_narrative_graph::{NarrativeSpace, SaveState, Saveable};
use ordoplay_narrative_sequencer::{PlaybackState, Sequencer, SequencerEvent};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outcome of [`PlaySession::run`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Ticks executed
    pub ticks: usize,
    /// Playhead when the run stopped
    pub playhead: f64,
    /// Whether playback finished
    pub finished: bool,
    /// Saves written during the run
    pub saves: usize,
}

/// Drives one sequencer with player settings
pub struct PlaySession {
    sequencer: Sequencer,
    settings: PlayerSettings,
    saves: usize,
}

impl PlaySession {
    /// Build a session for `space`, resuming from the save file when asked
    pub fn open(space: NarrativeSpace, settings: PlayerSettings, resume: bool) -> Result<Self> {
        let sequencer =
            Sequencer::new(space, settings.sequencer.clone()).with_media_factory(ConsoleMediaFactory);
        let mut session = Self {
            sequencer,
            settings,
            saves: 0,
        };

        if resume {
            let path = session
                .save_path()
                .context("--resume needs a save_path in the player settings")?
                .to_path_buf();
            if path.exists() {
                let state = SaveState::read(&path)
                    .with_context(|| format!("reading session {}", path.display()))?;
                session
                    .sequencer
                    .load(&state)
                    .with_context(|| format!("restoring session {}", path.display()))?;
                tracing::info!(
                    "Resumed {} at {:.2}s ({:?})",
                    path.display(),
                    session.sequencer.playhead(),
                    session.sequencer.state()
                );
            } else {
                tracing::warn!("No session at {}, starting fresh", path.display());
            }
        }

        if session.sequencer.state() == PlaybackState::Stopped {
            session.sequencer.start()?;
        }
        Ok(session)
    }

    /// The sequencer
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    fn save_path(&self) -> Option<&Path> {
        self.settings.save_path.as_deref()
    }

    /// Tick until playback finishes or `seconds` of narrative time pass
    pub fn run(&mut self, seconds: f64) -> Result<RunSummary> {
        let delta = self.settings.tick_delta();
        let max_ticks = self.settings.max_ticks(seconds);
        let mut ticks = 0;

        while ticks < max_ticks && !self.sequencer.is_finished() {
            self.sequencer.tick(delta);
            ticks += 1;
            self.report_events();

            if self.settings.autosave {
                let changed = !self.sequencer.space_mut().take_variable_changes().is_empty();
                if changed {
                    self.save()?;
                }
            }
            if self.settings.realtime {
                std::thread::sleep(Duration::from_secs_f64(delta));
            }
        }

        if self.settings.autosave {
            self.save()?;
        }

        Ok(RunSummary {
            ticks,
            playhead: self.sequencer.playhead(),
            finished: self.sequencer.is_finished(),
            saves: self.saves,
        })
    }

    /// Write the session to the save file, if one is configured
    pub fn save(&mut self) -> Result<Option<PathBuf>> {
        let Some(path) = self.save_path().map(Path::to_path_buf) else {
            return Ok(None);
        };
        let mut state = SaveState::new();
        self.sequencer.save(&mut state)?;
        state
            .write(&path)
            .with_context(|| format!("writing session {}", path.display()))?;
        self.saves += 1;
        tracing::debug!("Saved session to {}", path.display());
        Ok(Some(path))
    }

    fn report_events(&mut self) {
        for event in self.sequencer.take_events() {
            match event {
                SequencerEvent::LayerTerminated { layer } => {
                    tracing::debug!("Layer {layer} terminated");
                }
                SequencerEvent::PlaybackComplete { playhead } => {
                    tracing::info!("Playback complete at {playhead:.2}s");
                }
                other => tracing::trace!(?other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordoplay_narrative_graph::{MediaReference, NarrativeObject, Variable};
    use ordoplay_narrative_sequencer::SequencerConfig;

    fn two_shot_space() -> NarrativeSpace {
        let mut space = NarrativeSpace::new("two-shot");
        let a = space.add_node(NarrativeObject::atomic("a", MediaReference::video("a.mp4"), 2.0));
        let b = space.add_node(NarrativeObject::atomic("b", MediaReference::video("b.mp4"), 3.0));
        space.connect(a, b).unwrap();
        space.globals_mut().add_variable(Variable::new("seen", false));
        space
    }

    fn settings(save_path: Option<PathBuf>) -> PlayerSettings {
        PlayerSettings {
            tick_rate: 4.0,
            sequencer: SequencerConfig::default().with_seed(1),
            save_path,
            ..PlayerSettings::default()
        }
    }

    #[test]
    fn test_run_to_completion() {
        let mut session = PlaySession::open(two_shot_space(), settings(None), false).unwrap();
        let summary = session.run(60.0).unwrap();
        assert!(summary.finished);
        assert_eq!(summary.playhead, 5.0);
        assert_eq!(summary.saves, 0);
    }

    #[test]
    fn test_run_stops_at_time_bound() {
        let mut session = PlaySession::open(two_shot_space(), settings(None), false).unwrap();
        let summary = session.run(1.0).unwrap();
        assert!(!summary.finished);
        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.playhead, 1.0);
    }

    #[test]
    fn test_autosave_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ron");
        let space = two_shot_space();

        let mut first = settings(Some(path.clone()));
        first.autosave = true;
        let mut session = PlaySession::open(space.clone(), first.clone(), false).unwrap();
        let summary = session.run(3.0).unwrap();
        assert!(!summary.finished);
        assert_eq!(summary.saves, 1);
        assert!(path.exists());

        let mut resumed = PlaySession::open(space, first, true).unwrap();
        assert_eq!(resumed.sequencer().playhead(), 3.0);
        let summary = resumed.run(60.0).unwrap();
        assert!(summary.finished);
        assert_eq!(summary.playhead, 5.0);
    }

    #[test]
    fn test_resume_without_save_path_fails() {
        assert!(PlaySession::open(two_shot_space(), settings(None), true).is_err());
    }

    #[test]
    fn test_resume_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ron");
        let session = PlaySession::open(two_shot_space(), settings(Some(path)), true).unwrap();
        assert_eq!(session.sequencer().state(), PlaybackState::Playing);
        assert_eq!(session.sequencer().playhead(), 0.0);
    }
}
