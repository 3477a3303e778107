//! Platform seam: the traits a rendering backend implements and the events it
//! delivers back to a [`PlaybackSession`](crate::session::PlaybackSession).
//!
//! Commands are fire-and-forget. Every outcome that takes time (playback starting,
//! a resume being granted or refused, buffering completing) arrives later as a
//! [`PlatformEvent`] that the owner feeds into `PlaybackSession::handle_event`.

use std::fmt;

use class_audio_types::{GraphState, StreamRole};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::ramp::GainRamp;

/// Factory for the graph and its two persistent media elements.
pub trait AudioPlatform {
    type Graph: GraphBackend;
    type Element: MediaElement;

    /// Construct the rendering context with one volume path per [`StreamRole`].
    fn create_graph(&mut self) -> Result<Self::Graph, PlatformError>;

    /// Create the element for `role` and bind it into `graph`'s volume path for that role.
    ///
    /// Called once per role for the lifetime of a graph.
    fn create_element(
        &mut self,
        graph: &mut Self::Graph,
        role: StreamRole,
    ) -> Result<Self::Element, PlatformError>;
}

/// Platform rendering context owning the two volume paths.
pub trait GraphBackend {
    fn state(&self) -> GraphState;
    /// Request a transition to `Running`; outcome arrives as a [`GraphEvent`].
    fn resume(&mut self);
    fn suspend(&mut self);
    /// Release every resource held by the context.
    fn close(&mut self);
    /// Render clock in seconds.
    fn current_time(&self) -> f64;
    /// Replace whatever ramp is in flight on `path` with `ramp`.
    fn apply_ramp(&mut self, path: StreamRole, ramp: GainRamp);
    /// Gain of `path` at the current render time.
    fn gain(&self, path: StreamRole) -> f32;
}

/// A decodable media element bound once to a volume path.
pub trait MediaElement {
    /// Point the element at `url` and begin buffering.
    fn set_source(&mut self, url: &str);
    /// Stop playback and rewind to the start.
    fn reset(&mut self);
    /// Request playback; outcome arrives as `Playing` or `PlayRejected`.
    fn play(&mut self);
    fn pause(&mut self);
    /// Whether the element is actually paused, regardless of what was requested.
    fn is_paused(&self) -> bool;
}

/// Reason code attached to a media load failure.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SourceNotSupported,
}

impl fmt::Display for MediaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaErrorCode::Aborted => "aborted",
            MediaErrorCode::Network => "network",
            MediaErrorCode::Decode => "decode",
            MediaErrorCode::SourceNotSupported => "source not supported",
        };
        f.write_str(label)
    }
}

/// Signals emitted by a media element.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    /// Enough data is buffered to play through without stalling.
    CanPlayThrough,
    /// Playback started; fires as playback begins.
    Playing,
    Paused,
    /// End of stream reached.
    Ended,
    Error { code: MediaErrorCode, message: String },
    /// The platform declined `play()`, typically outside a user gesture.
    PlayRejected { message: String },
}

/// Signals emitted by the rendering context.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    StateChanged(GraphState),
    ResumeRejected { message: String },
}

/// Host lifecycle signals relevant to audio recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleSignal {
    Hidden,
    VisibilityRestored,
    WindowFocus,
    HealthTick,
}

/// Anything the platform reports back to the session.
#[derive(Clone, Debug, PartialEq)]
pub enum PlatformEvent {
    Media { role: StreamRole, event: MediaEvent },
    Graph(GraphEvent),
    Lifecycle(LifecycleSignal),
}

/// Proof that the caller is running inside a direct user-input handler.
///
/// Only the UI layer should mint one, from the handler of a tap, click or key press.
/// It is consumed by [`PlaybackSession::manual_unlock`](crate::session::PlaybackSession::manual_unlock),
/// so each gesture unlocks at most once.
#[derive(Debug)]
pub struct UserGesture {
    _private: (),
}

impl UserGesture {
    pub fn from_input_handler() -> Self {
        Self { _private: () }
    }
}
