//! Two-stream audio engine: background music ducked under narration.
//!
//! [`PlaybackSession`] is the entry point. It drives any [`AudioPlatform`]; the
//! [`backend`] module provides one on cpal.

pub mod backend;
pub mod config;
pub mod controller;
pub mod ducking;
pub mod error;
pub mod graph;
pub mod platform;
pub mod ramp;
pub mod session;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use class_audio_types::{
    FaultKind, GraphState, SessionFault, SessionSnapshot, StreamRole,
};
pub use config::{MixerConfig, PlaybackConfig};
pub use error::{PlatformError, PlaybackFault};
pub use platform::{
    AudioPlatform, GraphBackend, GraphEvent, LifecycleSignal, MediaElement, MediaErrorCode,
    MediaEvent, PlatformEvent, UserGesture,
};
pub use session::{PlaybackParams, PlaybackSession};
