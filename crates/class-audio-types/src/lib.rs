use std::fmt;

use serde::{Deserialize, Serialize};

/// Audio role of a stream inside a playback session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreamRole {
    /// Continuous background music.
    Music,
    /// Intermittent voiceover clips.
    Narration,
}

impl StreamRole {
    /// Both roles, music first.
    pub const ALL: [StreamRole; 2] = [StreamRole::Music, StreamRole::Narration];

    /// Stable index used for per-role arrays.
    pub fn index(self) -> usize {
        match self {
            StreamRole::Music => 0,
            StreamRole::Narration => 1,
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRole::Music => f.write_str("music"),
            StreamRole::Narration => f.write_str("narration"),
        }
    }
}

/// Lifecycle state of the audio output graph.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GraphState {
    /// Rendering is halted; the render clock does not advance.
    #[default]
    Suspended,
    /// Rendering to the output device.
    Running,
    /// Resources released; terminal.
    Closed,
}

/// Category of the last fault reported by a session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A stream failed to load or decode.
    LoadFailure,
    /// The platform declined to start playback outside a user gesture.
    PlaybackBlocked,
    /// The output graph could not be created.
    ContextConstructionFailure,
    /// The output graph stayed suspended across several resume attempts.
    ContextSuspended,
}

impl FaultKind {
    /// Whether a user gesture (manual unlock) is the expected way out.
    pub fn needs_gesture(self) -> bool {
        matches!(
            self,
            FaultKind::PlaybackBlocked
                | FaultKind::ContextConstructionFailure
                | FaultKind::ContextSuspended
        )
    }
}

/// Last fault recorded by a session, tagged with the stream it concerns.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionFault {
    /// Stream the fault concerns; `None` for graph-level faults.
    pub role: Option<StreamRole>,
    pub kind: FaultKind,
    /// Human-readable message suitable for display.
    pub message: String,
}

/// Observable session state consumed by the UI layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    /// Music stream has buffered enough to play through.
    pub music_ready: bool,
    /// Narration stream has buffered enough to play through.
    pub narration_ready: bool,
    /// Music is audibly progressing.
    pub is_playing: bool,
    /// Current gain of the music path (1.0 = full, lower while ducked).
    pub current_volume: f32,
    /// Message of the last fault, if any.
    pub error: Option<String>,
    /// Structured form of `error`.
    pub fault: Option<SessionFault>,
    pub graph_state: GraphState,
    pub music_url: Option<String>,
    pub narration_url: Option<String>,
    pub paused: bool,
}
