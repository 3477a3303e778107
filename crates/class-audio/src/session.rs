//! Playback session: the façade the application layer drives.
//!
//! A session owns the output graph and both stream controllers for its whole lifetime.
//! The application pushes configuration (`configure`), user gestures
//! (`manual_unlock`) and every event the platform reports (`handle_event`); it reads
//! state back through `snapshot`.

use std::time::Duration;

use class_audio_types::{GraphState, SessionSnapshot, StreamRole};

use crate::config::MixerConfig;
use crate::controller::{StreamController, StreamSignal};
use crate::ducking::{DuckingCoordinator, PlayedNarrationTracker};
use crate::error::{PlatformError, PlaybackFault};
use crate::graph::{DuckingState, OutputGraph};
use crate::platform::{AudioPlatform, MediaEvent, PlatformEvent, UserGesture};
use crate::supervisor::{RecoveryAction, ResilienceSupervisor, SupervisorState};

/// Desired playback state supplied by the application layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackParams {
    pub music_url: String,
    /// Narration clip for the current section, if any.
    pub narration_url: Option<String>,
    pub paused: bool,
}

impl PlaybackParams {
    pub fn new(music_url: impl Into<String>) -> Self {
        Self {
            music_url: music_url.into(),
            narration_url: None,
            paused: false,
        }
    }

    pub fn with_narration(mut self, url: impl Into<String>) -> Self {
        self.narration_url = Some(url.into());
        self
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }
}

/// Graph plus the two controllers bound into it; built and torn down together.
struct Engine<P: AudioPlatform> {
    graph: OutputGraph<P::Graph>,
    music: StreamController<P::Element>,
    narration: StreamController<P::Element>,
}

impl<P: AudioPlatform> Engine<P> {
    fn build(platform: &mut P, config: &MixerConfig) -> Result<Self, PlatformError> {
        let backend = platform.create_graph()?;
        let mut graph = OutputGraph::new(backend, config.volume_floor, config.full_volume);
        let music = match platform.create_element(graph.backend_mut(), StreamRole::Music) {
            Ok(el) => el,
            Err(e) => {
                graph.close();
                return Err(e);
            }
        };
        let narration = match platform.create_element(graph.backend_mut(), StreamRole::Narration)
        {
            Ok(el) => el,
            Err(e) => {
                graph.close();
                return Err(e);
            }
        };
        Ok(Self {
            graph,
            music: StreamController::new(StreamRole::Music, music),
            narration: StreamController::new(StreamRole::Narration, narration),
        })
    }

    fn controller_mut(&mut self, role: StreamRole) -> &mut StreamController<P::Element> {
        match role {
            StreamRole::Music => &mut self.music,
            StreamRole::Narration => &mut self.narration,
        }
    }

    /// Duck first, then start narration, so the music is already heading down when
    /// the first narration frame renders.
    fn start_narration(&mut self, ducking: &DuckingCoordinator) {
        if self.narration.current_url().is_none() || self.narration.has_ended() {
            return;
        }
        ducking.duck(&mut self.graph);
        self.narration.play();
    }

    fn resume_if_suspended(&mut self) {
        if self.graph.state() == GraphState::Suspended {
            self.graph.resume();
        }
    }

    /// Re-play every stream that should be playing but whose element sits paused.
    fn replay_stalled(&mut self, ducking: &DuckingCoordinator) {
        if self.music.is_active() && self.music.element_paused() {
            tracing::info!(role = %StreamRole::Music, "re-issuing play");
            self.music.play();
        }
        if self.narration.is_active() && self.narration.element_paused() {
            tracing::info!(role = %StreamRole::Narration, "re-issuing play");
            self.start_narration(ducking);
        }
    }

    fn teardown(&mut self) {
        self.music.unload();
        self.narration.unload();
        self.graph.close();
    }
}

pub struct PlaybackSession<P: AudioPlatform> {
    platform: P,
    config: MixerConfig,
    engine: Option<Engine<P>>,
    params: Option<PlaybackParams>,
    paused: bool,
    tracker: PlayedNarrationTracker,
    ducking: DuckingCoordinator,
    supervisor: ResilienceSupervisor,
    on_ended: Option<Box<dyn FnMut() + Send>>,
    fault: Option<PlaybackFault>,
}

impl<P: AudioPlatform> PlaybackSession<P> {
    /// Create the session and try to construct its output graph.
    ///
    /// A construction failure is recorded as a fault; `manual_unlock` retries it.
    pub fn mount(platform: P, config: MixerConfig) -> Self {
        let config = config.sanitized();
        let mut session = Self {
            platform,
            ducking: DuckingCoordinator::new(&config),
            supervisor: ResilienceSupervisor::new(&config),
            config,
            engine: None,
            params: None,
            paused: true,
            tracker: PlayedNarrationTracker::default(),
            on_ended: None,
            fault: None,
        };
        session.construct();
        session
    }

    fn construct(&mut self) -> bool {
        match Engine::build(&mut self.platform, &self.config) {
            Ok(engine) => {
                let state = engine.graph.state();
                tracing::info!(?state, "output graph constructed");
                self.supervisor.on_graph_constructed(state);
                self.engine = Some(engine);
                if matches!(self.fault, Some(PlaybackFault::ContextConstructionFailure { .. })) {
                    self.fault = None;
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "output graph construction failed");
                self.supervisor.on_construction_failed();
                self.set_fault(PlaybackFault::ContextConstructionFailure {
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// Register the callback invoked when the current music track completes.
    pub fn on_ended(&mut self, callback: impl FnMut() + Send + 'static) {
        if self.on_ended.is_some() {
            tracing::warn!("replacing music end callback");
        }
        self.on_ended = Some(Box::new(callback));
    }

    /// Apply the application's desired state.
    ///
    /// Unchanged URLs are no-ops. Any play this triggers is issued before returning,
    /// inside the caller's event.
    pub fn configure(&mut self, params: PlaybackParams) {
        let was_paused = self.paused;
        self.paused = params.paused;
        self.supervisor.set_tick_active(!params.paused);

        let Some(engine) = self.engine.as_mut() else {
            tracing::debug!("no output graph; configuration kept for unlock");
            self.params = Some(params);
            return;
        };

        let music_changed = engine.music.load(&params.music_url);
        let narration_changed = match params.narration_url.as_deref() {
            Some(url) => engine.narration.load(url),
            None => engine.narration.unload(),
        };
        if narration_changed {
            self.tracker.on_url_changed();
            self.ducking.restore(&mut engine.graph);
        }

        if self.paused {
            if !was_paused {
                tracing::info!("pausing playback");
                engine.music.pause();
                engine.narration.pause();
            }
        } else {
            if was_paused {
                tracing::info!("resuming playback");
            }
            let narration_due = params
                .narration_url
                .as_deref()
                .is_some_and(|url| !self.tracker.has_played(url));
            let resume_narration = was_paused && engine.narration.is_active();
            if music_changed || was_paused || narration_due {
                engine.resume_if_suspended();
            }
            if music_changed || was_paused {
                engine.music.play();
            }
            if resume_narration {
                engine.start_narration(&self.ducking);
            }
            if let Some(url) = params.narration_url.as_deref() {
                if self.tracker.claim(url) {
                    tracing::info!(url = %url, "starting narration");
                    engine.start_narration(&self.ducking);
                } else {
                    tracing::debug!(url = %url, "narration already played in this section");
                }
            }
        }
        self.params = Some(params);
    }

    /// Feed one platform event into the session.
    pub fn handle_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::Media { role, event } => self.on_media_event(role, event),
            PlatformEvent::Graph(event) => {
                let action = self.supervisor.on_graph_event(&event, self.paused);
                self.apply(action);
            }
            PlatformEvent::Lifecycle(signal) => {
                let action = self.supervisor.on_signal(signal, self.graph_state());
                self.apply(action);
            }
        }
    }

    fn on_media_event(&mut self, role: StreamRole, event: MediaEvent) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let Some(signal) = engine.controller_mut(role).handle_event(event) else {
            return;
        };
        if role == StreamRole::Narration {
            self.ducking.on_narration_signal(&signal, &mut engine.graph);
        }
        match signal {
            StreamSignal::Started => {
                if matches!(self.fault, Some(PlaybackFault::PlaybackBlocked { role: r }) if r == role)
                {
                    self.fault = None;
                }
            }
            StreamSignal::Ended if role == StreamRole::Music => match self.on_ended.as_mut() {
                Some(callback) => callback(),
                None => tracing::debug!("music ended with no callback registered"),
            },
            StreamSignal::Failed { code, message } => {
                self.set_fault(PlaybackFault::LoadFailure {
                    role,
                    code,
                    reason: message,
                });
            }
            StreamSignal::Blocked { .. } => {
                self.set_fault(PlaybackFault::PlaybackBlocked { role });
            }
            StreamSignal::Ready | StreamSignal::Paused | StreamSignal::Ended => {}
        }
    }

    fn apply(&mut self, action: RecoveryAction) {
        match action {
            RecoveryAction::None => {}
            RecoveryAction::Resume => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.graph.resume();
                }
            }
            RecoveryAction::Reconcile => {
                if matches!(self.fault, Some(PlaybackFault::ContextSuspended { .. })) {
                    self.fault = None;
                }
                if self.paused {
                    return;
                }
                if let Some(engine) = self.engine.as_mut() {
                    engine.replay_stalled(&self.ducking);
                }
            }
            RecoveryAction::ReportSuspended { attempts } => {
                self.set_fault(PlaybackFault::ContextSuspended { attempts });
            }
        }
    }

    /// Retry audio start-up from inside a user-input handler.
    ///
    /// Rebuilds the output graph if it never came up, then resumes it and re-plays
    /// whatever should be playing. Every play call happens before this returns.
    pub fn manual_unlock(&mut self, _gesture: UserGesture) {
        tracing::info!("manual unlock");
        if self.engine.is_none() {
            if !self.construct() {
                return;
            }
            if let Some(params) = self.params.take() {
                // Replay the stored configuration against the fresh graph.
                self.paused = true;
                self.configure(params);
            }
        }
        if self
            .fault
            .as_ref()
            .is_some_and(|f| f.kind().needs_gesture())
        {
            self.fault = None;
        }
        let paused = self.paused;
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.resume_if_suspended();
        if !paused {
            engine.replay_stalled(&self.ducking);
        }
    }

    /// Suspend the output graph, as a host does when the app is sent to the background.
    ///
    /// Streams keep their state; the next visibility, focus or health trigger resumes
    /// the graph.
    pub fn suspend(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            tracing::info!("suspending output graph");
            engine.graph.suspend();
        }
    }

    fn set_fault(&mut self, fault: PlaybackFault) {
        tracing::warn!(error = %fault, "playback fault");
        self.fault = Some(fault);
    }

    pub fn fault(&self) -> Option<&PlaybackFault> {
        self.fault.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Interval at which the owner should deliver `HealthTick`; `None` while paused.
    pub fn health_tick_interval(&self) -> Option<Duration> {
        self.supervisor
            .tick_active()
            .then(|| self.config.health_tick())
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    pub fn graph_state(&self) -> GraphState {
        self.engine
            .as_ref()
            .map(|e| e.graph.state())
            .unwrap_or_default()
    }

    pub fn ducking_state(&self) -> Option<DuckingState> {
        self.engine
            .as_ref()
            .map(|e| e.graph.ducking_state(StreamRole::Music))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snap = SessionSnapshot {
            current_volume: self.config.full_volume,
            error: self.fault.as_ref().map(|f| f.to_string()),
            fault: self.fault.as_ref().map(|f| f.to_session_fault()),
            graph_state: self.graph_state(),
            music_url: self.params.as_ref().map(|p| p.music_url.clone()),
            narration_url: self.params.as_ref().and_then(|p| p.narration_url.clone()),
            paused: self.paused,
            ..Default::default()
        };
        if let Some(engine) = self.engine.as_ref() {
            snap.music_ready = engine.music.is_ready();
            snap.narration_ready = engine.narration.is_ready();
            snap.is_playing = engine.music.is_playing();
            snap.current_volume = engine.graph.current_volume(StreamRole::Music);
        }
        snap
    }

    /// Stop both streams and close the output graph.
    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.teardown();
        }
    }
}

impl<P: AudioPlatform> Drop for PlaybackSession<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use class_audio_types::FaultKind;

    use super::*;
    use crate::platform::{GraphEvent, LifecycleSignal, MediaErrorCode};
    use crate::testing::{FakePlatform, pump};

    fn mounted() -> (FakePlatform, PlaybackSession<FakePlatform>) {
        let platform = FakePlatform::new();
        let session = PlaybackSession::mount(platform.clone(), MixerConfig::default());
        (platform, session)
    }

    fn volume(session: &PlaybackSession<FakePlatform>) -> f32 {
        session.snapshot().current_volume
    }

    #[test]
    fn music_becomes_ready_and_plays() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        let snap = s.snapshot();
        assert!(snap.music_ready);
        assert!(snap.is_playing);
        assert_eq!(snap.music_url.as_deref(), Some("A"));
    }

    #[test]
    fn elements_are_created_once_across_many_tracks() {
        let (p, mut s) = mounted();
        for url in ["A", "B", "C", "A"] {
            s.configure(PlaybackParams::new(url).with_narration(format!("n-{url}")));
            pump(&mut s, &p);
        }
        assert_eq!(p.graphs_created(), 1);
        assert_eq!(p.elements_created(StreamRole::Music), 1);
        assert_eq!(p.elements_created(StreamRole::Narration), 1);
    }

    #[test]
    fn unchanged_music_url_is_idempotent() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        p.advance(12.0);
        p.clear_timeline();

        s.configure(PlaybackParams::new("A"));
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);

        assert!(p.timeline().is_empty());
        assert_eq!(p.element(StreamRole::Music).position, 12.0);
        assert_eq!(p.element(StreamRole::Music).plays, 1);
    }

    #[test]
    fn narration_ducks_then_restores_after_end() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        assert_eq!(volume(&s), 1.0);

        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        p.advance(0.3);
        assert!((volume(&s) - 0.35).abs() < 1e-6);

        // Still ducked until the clip actually ends.
        p.advance(5.0);
        assert!((volume(&s) - 0.35).abs() < 1e-6);

        p.finish(StreamRole::Narration);
        pump(&mut s, &p);
        p.advance(0.3);
        assert!((volume(&s) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn duck_is_scheduled_before_narration_starts() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        p.clear_timeline();

        s.configure(PlaybackParams::new("A").with_narration("N1"));
        let duck = p.position_of("ramp:music:0.35").unwrap();
        let play = p.position_of("narration:play").unwrap();
        assert!(duck < play);
    }

    #[test]
    fn restore_only_follows_ended() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        p.clear_timeline();

        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::HealthTick));
        s.handle_event(PlatformEvent::Media {
            role: StreamRole::Narration,
            event: MediaEvent::CanPlayThrough,
        });
        assert_eq!(p.position_of("ramp:music:1.00"), None);

        p.finish(StreamRole::Narration);
        pump(&mut s, &p);
        assert!(p.position_of("ramp:music:1.00").is_some());
    }

    #[test]
    fn narration_is_not_replayed_within_a_section() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        p.finish(StreamRole::Narration);
        pump(&mut s, &p);

        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        assert_eq!(p.element(StreamRole::Narration).plays, 1);

        // New section with another clip, then back to the first one.
        s.configure(PlaybackParams::new("A").with_narration("N2"));
        pump(&mut s, &p);
        p.finish(StreamRole::Narration);
        pump(&mut s, &p);
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        assert_eq!(p.element(StreamRole::Narration).plays, 3);
        assert_eq!(p.element(StreamRole::Narration).src.as_deref(), Some("N1"));
    }

    #[test]
    fn narration_replays_after_absent_section() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        p.finish(StreamRole::Narration);
        pump(&mut s, &p);

        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        assert_eq!(p.element(StreamRole::Narration).plays, 2);
    }

    #[test]
    fn removing_narration_restores_music() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        s.configure(PlaybackParams::new("A"));
        p.advance(0.3);
        assert!((volume(&s) - 1.0).abs() < 1e-6);
        assert!(p.element(StreamRole::Narration).paused);
    }

    #[test]
    fn pause_and_resume_keep_positions() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        p.advance(2.0);

        s.configure(PlaybackParams::new("A").with_narration("N1").paused(true));
        pump(&mut s, &p);
        assert!(p.element(StreamRole::Music).paused);
        assert!(p.element(StreamRole::Narration).paused);
        assert!(!s.snapshot().is_playing);
        assert_eq!(s.health_tick_interval(), None);
        p.advance(10.0);

        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        let music = p.element(StreamRole::Music);
        let narration = p.element(StreamRole::Narration);
        assert!(!music.paused && !narration.paused);
        assert_eq!(music.position, 2.0);
        assert_eq!(narration.position, 2.0);
        assert!(s.snapshot().is_playing);
        assert_eq!(s.health_tick_interval(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn narration_arriving_while_paused_plays_on_resume() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1").paused(true));
        pump(&mut s, &p);
        assert_eq!(p.element(StreamRole::Narration).plays, 0);
        assert_eq!(p.element(StreamRole::Music).plays, 0);

        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        assert_eq!(p.element(StreamRole::Narration).plays, 1);
        assert_eq!(p.element(StreamRole::Music).plays, 1);
    }

    #[test]
    fn finished_narration_is_not_resumed_after_pause() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        p.finish(StreamRole::Narration);
        pump(&mut s, &p);

        s.configure(PlaybackParams::new("A").with_narration("N1").paused(true));
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        assert_eq!(p.element(StreamRole::Narration).plays, 1);
        assert_eq!(p.element(StreamRole::Music).plays, 2);
    }

    #[test]
    fn music_end_invokes_callback() {
        let (p, mut s) = mounted();
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        s.on_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        p.finish(StreamRole::Music);
        pump(&mut s, &p);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert!(!s.snapshot().is_playing);

        s.configure(PlaybackParams::new("B"));
        pump(&mut s, &p);
        assert!(s.snapshot().is_playing);
    }

    #[test]
    fn ended_music_is_not_replayed_on_resume() {
        let (p, mut s) = mounted();
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        s.on_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        p.finish(StreamRole::Music);
        pump(&mut s, &p);

        s.configure(PlaybackParams::new("A").paused(true));
        pump(&mut s, &p);
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);

        assert_eq!(p.element(StreamRole::Music).plays, 1);
        assert!(!s.snapshot().is_playing);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn suspension_recovers_on_visibility() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        p.advance(1.0);

        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::Hidden));
        p.suspend_silently();
        pump(&mut s, &p);
        assert_eq!(s.supervisor_state(), SupervisorState::Suspended);
        p.clear_timeline();

        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::VisibilityRestored));
        pump(&mut s, &p);

        assert_eq!(p.graph_state(), GraphState::Running);
        assert_eq!(s.supervisor_state(), SupervisorState::Healthy);
        assert_eq!(p.timeline()[0], "graph:resume");
        assert!(p.position_of("music:play").is_some());
        assert!(p.position_of("narration:play").is_some());
        assert!(p.position_of("narration:load:N1").is_none());
        let narration = p.element(StreamRole::Narration);
        assert!(!narration.paused);
        assert_eq!(narration.position, 1.0);
    }

    #[test]
    fn explicit_suspend_recovers_on_visibility() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        p.advance(2.0);

        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::Hidden));
        s.suspend();
        pump(&mut s, &p);
        assert_eq!(s.graph_state(), GraphState::Suspended);
        assert_eq!(s.supervisor_state(), SupervisorState::Suspended);
        p.clear_timeline();

        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::VisibilityRestored));
        pump(&mut s, &p);
        assert_eq!(s.graph_state(), GraphState::Running);
        assert_eq!(s.supervisor_state(), SupervisorState::Healthy);
        assert_eq!(p.timeline(), vec!["graph:resume"]);
        assert_eq!(p.element(StreamRole::Music).position, 2.0);
        assert_eq!(p.element(StreamRole::Music).plays, 1);
    }

    #[test]
    fn recovery_does_not_replay_finished_narration() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        p.finish(StreamRole::Narration);
        pump(&mut s, &p);

        p.suspend_silently();
        pump(&mut s, &p);
        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::WindowFocus));
        pump(&mut s, &p);

        assert_eq!(p.element(StreamRole::Narration).plays, 1);
        assert_eq!(p.element(StreamRole::Music).plays, 2);
    }

    #[test]
    fn health_tick_recovers_only_when_unpaused() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").paused(true));
        p.suspend_silently();
        pump(&mut s, &p);
        p.clear_timeline();

        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::HealthTick));
        assert!(p.timeline().is_empty());

        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        p.suspend_silently();
        pump(&mut s, &p);
        p.clear_timeline();
        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::HealthTick));
        pump(&mut s, &p);
        assert_eq!(p.timeline(), vec!["graph:resume", "music:play"]);
    }

    #[test]
    fn repeated_resume_failures_surface_a_fault() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        p.set_resume_allowed(false);
        p.suspend_silently();
        pump(&mut s, &p);

        for _ in 0..2 {
            s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::HealthTick));
            pump(&mut s, &p);
        }
        assert!(s.fault().is_none());
        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::WindowFocus));
        pump(&mut s, &p);
        let fault = s.snapshot().fault.unwrap();
        assert_eq!(fault.kind, FaultKind::ContextSuspended);

        p.set_resume_allowed(true);
        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::WindowFocus));
        pump(&mut s, &p);
        assert!(s.fault().is_none());
        assert!(!p.element(StreamRole::Music).paused);
    }

    #[test]
    fn blocked_play_is_recovered_by_unlock() {
        let (p, mut s) = mounted();
        p.set_play_allowed(false);
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);

        let snap = s.snapshot();
        assert_eq!(snap.fault.unwrap().kind, FaultKind::PlaybackBlocked);
        assert!(!snap.is_playing);
        // Blocked narration must not leave the music ducked.
        assert_eq!(s.ducking_state().unwrap().target_volume, 1.0);

        // Lifecycle triggers do not retry a gesture-gated play.
        p.clear_timeline();
        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::WindowFocus));
        assert!(p.timeline().is_empty());

        p.set_play_allowed(true);
        s.manual_unlock(UserGesture::from_input_handler());
        assert!(p.position_of("music:play").is_some());
        assert!(p.position_of("narration:play").is_some());
        pump(&mut s, &p);
        assert!(s.fault().is_none());
        assert!(s.snapshot().is_playing);
        assert_eq!(s.ducking_state().unwrap().target_volume, 0.35);
    }

    #[test]
    fn construction_failure_is_recovered_by_unlock() {
        let platform = FakePlatform::new();
        platform.set_fail_construction(true);
        let mut s = PlaybackSession::mount(platform.clone(), MixerConfig::default());
        assert_eq!(s.supervisor_state(), SupervisorState::Unconstructed);
        assert_eq!(
            s.snapshot().fault.unwrap().kind,
            FaultKind::ContextConstructionFailure
        );

        s.configure(PlaybackParams::new("A").with_narration("N1"));
        s.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::VisibilityRestored));
        assert_eq!(platform.graphs_created(), 0);

        s.manual_unlock(UserGesture::from_input_handler());
        assert_eq!(platform.graphs_created(), 0);
        assert!(s.fault().is_some());

        platform.set_fail_construction(false);
        s.manual_unlock(UserGesture::from_input_handler());
        pump(&mut s, &platform);
        assert_eq!(platform.graphs_created(), 1);
        assert!(s.fault().is_none());
        assert_eq!(platform.element(StreamRole::Music).plays, 1);
        assert_eq!(platform.element(StreamRole::Narration).plays, 1);
        assert!(s.snapshot().is_playing);
    }

    #[test]
    fn suspended_graph_is_resumed_on_first_play() {
        let platform = FakePlatform::new();
        platform.set_initial_state(GraphState::Suspended);
        let mut s = PlaybackSession::mount(platform.clone(), MixerConfig::default());
        s.configure(PlaybackParams::new("A"));
        let resume = platform.position_of("graph:resume").unwrap();
        assert!(resume < platform.position_of("music:play").unwrap());
        pump(&mut s, &platform);
        assert_eq!(s.graph_state(), GraphState::Running);
    }

    #[test]
    fn load_failure_is_reported_per_role() {
        let (p, mut s) = mounted();
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        s.handle_event(PlatformEvent::Media {
            role: StreamRole::Narration,
            event: MediaEvent::Error {
                code: MediaErrorCode::Network,
                message: "404".to_string(),
            },
        });
        let snap = s.snapshot();
        assert_eq!(snap.fault.as_ref().unwrap().role, Some(StreamRole::Narration));
        assert!(snap.error.unwrap().contains("404"));
        assert!(!snap.narration_ready);
        assert_eq!(s.ducking_state().unwrap().target_volume, 1.0);
    }

    #[test]
    fn graph_is_closed_exactly_once() {
        let (p, s) = mounted();
        s.unmount();
        assert_eq!(p.graph_closes(), 1);

        let (p, s) = mounted();
        drop(s);
        assert_eq!(p.graph_closes(), 1);
    }

    #[test]
    fn closed_state_event_is_ignored() {
        let (p, mut s) = mounted();
        p.push_event(PlatformEvent::Graph(GraphEvent::StateChanged(GraphState::Closed)));
        pump(&mut s, &p);
        s.configure(PlaybackParams::new("A"));
        pump(&mut s, &p);
        assert_eq!(s.graph_state(), GraphState::Running);
    }

    #[test]
    fn snapshot_tracks_buffering() {
        let (p, mut s) = mounted();
        p.set_auto_ready(false);
        s.configure(PlaybackParams::new("A").with_narration("N1"));
        pump(&mut s, &p);
        let snap = s.snapshot();
        assert!(!snap.music_ready && !snap.narration_ready);
        assert_eq!(snap.narration_url.as_deref(), Some("N1"));

        p.push_event(PlatformEvent::Media {
            role: StreamRole::Music,
            event: MediaEvent::CanPlayThrough,
        });
        pump(&mut s, &p);
        assert!(s.snapshot().music_ready);
    }
}
