//! Stream controllers: one persistent media element per audio role.
//!
//! The element and its binding to the graph are created once, when the controller is
//! built. Changing tracks only rewrites the element's source, because rebinding would
//! cut the element off from its volume path.

use class_audio_types::StreamRole;

use crate::platform::{MediaElement, MediaErrorCode, MediaEvent};

/// Buffering state of the current source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    NotLoaded,
    Loading,
    Ready,
    Error,
}

/// Controller-level outcome of a media event, consumed by the session.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamSignal {
    Ready,
    Started,
    Paused,
    Ended,
    Failed { code: MediaErrorCode, message: String },
    Blocked { message: String },
}

pub struct StreamController<E: MediaElement> {
    role: StreamRole,
    element: E,
    current_url: Option<String>,
    ready: ReadyState,
    /// The controller believes this stream should be audible whenever the session is
    /// not paused: play was requested and the track has not ended or been replaced.
    active: bool,
    /// Last playing/paused signal reported by the element.
    reported_playing: bool,
    /// The current source played to its end; only a new `load` plays again.
    ended: bool,
}

impl<E: MediaElement> StreamController<E> {
    pub(crate) fn new(role: StreamRole, element: E) -> Self {
        Self {
            role,
            element,
            current_url: None,
            ready: ReadyState::NotLoaded,
            active: false,
            reported_playing: false,
            ended: false,
        }
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready
    }

    pub fn is_ready(&self) -> bool {
        self.ready == ReadyState::Ready
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Whether the element last reported that it is playing.
    pub fn is_playing(&self) -> bool {
        self.reported_playing
    }

    /// Whether the element is actually paused right now.
    pub fn element_paused(&self) -> bool {
        self.element.is_paused()
    }

    /// Switch to `url`. Returns `false` when `url` is already loaded.
    ///
    /// The previous track is stopped and rewound before the new source is set.
    pub fn load(&mut self, url: &str) -> bool {
        if self.current_url.as_deref() == Some(url) {
            tracing::debug!(role = %self.role, url = %url, "load skipped; url unchanged");
            return false;
        }
        self.element.reset();
        self.element.set_source(url);
        tracing::info!(role = %self.role, url = %url, "source loaded");
        self.current_url = Some(url.to_string());
        self.ready = ReadyState::Loading;
        self.active = false;
        self.reported_playing = false;
        self.ended = false;
        true
    }

    /// Stop and forget the current source. Returns `false` when nothing was loaded.
    pub fn unload(&mut self) -> bool {
        if self.current_url.is_none() {
            return false;
        }
        self.element.reset();
        tracing::info!(role = %self.role, "source cleared");
        self.current_url = None;
        self.ready = ReadyState::NotLoaded;
        self.active = false;
        self.reported_playing = false;
        self.ended = false;
        true
    }

    /// Request playback. Skipped, not queued, when no source is loaded or the source
    /// already played to its end.
    pub fn play(&mut self) -> bool {
        if self.current_url.is_none() {
            tracing::debug!(role = %self.role, "play skipped; no source loaded");
            return false;
        }
        if self.ended {
            tracing::debug!(role = %self.role, "play skipped; source already ended");
            return false;
        }
        self.active = true;
        self.element.play();
        true
    }

    pub fn pause(&mut self) {
        if self.current_url.is_none() {
            return;
        }
        self.element.pause();
    }

    /// Apply an element event and translate it into a controller signal.
    ///
    /// Events arriving while nothing is loaded are dropped.
    pub fn handle_event(&mut self, event: MediaEvent) -> Option<StreamSignal> {
        if self.current_url.is_none() {
            tracing::debug!(role = %self.role, ?event, "event ignored; no source loaded");
            return None;
        }
        let signal = match event {
            MediaEvent::CanPlayThrough => {
                self.ready = ReadyState::Ready;
                StreamSignal::Ready
            }
            MediaEvent::Playing => {
                self.reported_playing = true;
                StreamSignal::Started
            }
            MediaEvent::Paused => {
                self.reported_playing = false;
                StreamSignal::Paused
            }
            MediaEvent::Ended => {
                self.reported_playing = false;
                self.active = false;
                self.ended = true;
                tracing::info!(role = %self.role, url = ?self.current_url, "stream ended");
                StreamSignal::Ended
            }
            MediaEvent::Error { code, message } => {
                self.ready = ReadyState::Error;
                self.reported_playing = false;
                self.active = false;
                tracing::warn!(role = %self.role, %code, error = %message, "stream failed");
                StreamSignal::Failed { code, message }
            }
            MediaEvent::PlayRejected { message } => {
                self.reported_playing = false;
                tracing::warn!(role = %self.role, error = %message, "play rejected");
                StreamSignal::Blocked { message }
            }
        };
        Some(signal)
    }
}
