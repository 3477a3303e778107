//! Narration-driven ducking of the music path.

use std::time::Duration;

use class_audio_types::StreamRole;

use crate::config::MixerConfig;
use crate::controller::StreamSignal;
use crate::graph::OutputGraph;
use crate::platform::GraphBackend;

/// Maps narration activity onto music-path gain targets.
///
/// Holds only configuration: the target follows from the latest narration signal.
#[derive(Clone, Debug)]
pub struct DuckingCoordinator {
    ducked: f32,
    full: f32,
    ramp: Duration,
}

impl DuckingCoordinator {
    pub fn new(config: &MixerConfig) -> Self {
        Self {
            ducked: config.ducked_volume,
            full: config.full_volume,
            ramp: config.duck_ramp(),
        }
    }

    pub fn target_for(&self, narrating: bool) -> f32 {
        if narrating { self.ducked } else { self.full }
    }

    /// React to a narration controller signal.
    pub fn on_narration_signal<G: GraphBackend>(
        &self,
        signal: &StreamSignal,
        graph: &mut OutputGraph<G>,
    ) {
        match signal {
            StreamSignal::Started => self.duck(graph),
            StreamSignal::Ended | StreamSignal::Failed { .. } | StreamSignal::Blocked { .. } => {
                self.restore(graph)
            }
            StreamSignal::Ready | StreamSignal::Paused => {}
        }
    }

    /// Lower music toward the ducked level.
    pub fn duck<G: GraphBackend>(&self, graph: &mut OutputGraph<G>) {
        self.ramp_to(graph, true);
    }

    /// Bring music back toward full level.
    pub fn restore<G: GraphBackend>(&self, graph: &mut OutputGraph<G>) {
        self.ramp_to(graph, false);
    }

    fn ramp_to<G: GraphBackend>(&self, graph: &mut OutputGraph<G>, narrating: bool) {
        let target = self.target_for(narrating);
        if graph.target_volume(StreamRole::Music) == target {
            return;
        }
        tracing::debug!(narrating, target, "ducking music");
        graph.schedule_ramp(StreamRole::Music, target, self.ramp);
    }
}

/// Remembers which narration clip already played in the current section.
///
/// A URL plays at most once per occurrence: the record is cleared whenever the
/// narration URL changes or goes away, so the same clip may play again in a later
/// section.
#[derive(Clone, Debug, Default)]
pub struct PlayedNarrationTracker {
    played: Option<String>,
}

impl PlayedNarrationTracker {
    /// Record that the narration URL changed or became absent.
    pub fn on_url_changed(&mut self) {
        self.played = None;
    }

    pub fn has_played(&self, url: &str) -> bool {
        self.played.as_deref() == Some(url)
    }

    /// Returns `true` and records `url` when it has not played in this section yet.
    pub fn claim(&mut self, url: &str) -> bool {
        if self.has_played(url) {
            return false;
        }
        self.played = Some(url.to_string());
        true
    }
}
