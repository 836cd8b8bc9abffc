// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media controllers that report to the log instead of presenting media.

use ordoplay_narrative_sequencer::{CueContext, MediaController, MediaControllerFactory};

/// Logs every lifecycle call of one cue
pub struct ConsoleController {
    name: String,
    kind: String,
}

impl ConsoleController {
    /// Controller for the media of `cue`
    pub fn new(cue: &CueContext) -> Self {
        Self {
            name: cue.media.uri.clone(),
            kind: format!("{:?}", cue.media.kind),
        }
    }
}

impl MediaController for ConsoleController {
    fn preload(&mut self, cue: &CueContext) {
        tracing::debug!(
            "Preload {} {} [{:.2}, {:.2})",
            self.kind,
            self.name,
            cue.start_time,
            cue.finish_time
        );
    }

    fn will_play(&mut self) {
        tracing::trace!("Will play {}", self.name);
    }

    fn play(&mut self, cue: &CueContext) {
        tracing::info!(
            "Play {} {} at {:.2}s (seek {:.2}s, {:.2}s long)",
            self.kind,
            self.name,
            cue.playhead,
            cue.seek_offset(),
            cue.duration()
        );
    }

    fn pause(&mut self) {
        tracing::info!("Pause {}", self.name);
    }

    fn unpause(&mut self) {
        tracing::info!("Unpause {}", self.name);
    }

    fn stop(&mut self, cue: &CueContext) {
        tracing::info!("Stop {} at {:.2}s", self.name, cue.playhead);
    }

    fn media_name(&self) -> String {
        self.name.clone()
    }
}

/// One console controller per cue
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMediaFactory;

impl MediaControllerFactory for ConsoleMediaFactory {
    fn create(&mut self, cue: &CueContext) -> Vec<Box<dyn MediaController>> {
        vec![Box::new(ConsoleController::new(cue))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordoplay_narrative_graph::{MediaReference, NarrativeObjectId};
    use ordoplay_narrative_sequencer::{CueId, LayerId};

    #[test]
    fn test_factory_names_controller_after_media() {
        let cue = CueContext {
            cue: CueId::new(),
            layer: LayerId::new(),
            node: NarrativeObjectId::new(),
            media: MediaReference::audio("theme.ogg"),
            in_time: 0.0,
            start_time: 1.0,
            finish_time: 3.0,
            playhead: 1.0,
        };
        let controllers = ConsoleMediaFactory.create(&cue);
        assert_eq!(controllers.len(), 1);
        assert_eq!(controllers[0].media_name(), "theme.ogg");
    }
}
