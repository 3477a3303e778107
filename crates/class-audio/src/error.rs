//! Fault taxonomy for playback sessions.
//!
//! Faults never cross component boundaries as errors; the session keeps the last one
//! and exposes it through its snapshot.

use class_audio_types::{FaultKind, SessionFault, StreamRole};
use thiserror::Error;

use crate::platform::MediaErrorCode;

/// Failure reported by a platform while constructing graph resources.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// No usable output device or rendering context.
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
    /// The platform refused to create the resource.
    #[error("audio output refused: {0}")]
    Refused(String),
}

/// Last-fault value held by a playback session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlaybackFault {
    #[error("could not load {role} ({code}): {reason}")]
    LoadFailure {
        role: StreamRole,
        code: MediaErrorCode,
        reason: String,
    },
    #[error("{role} playback was blocked by the platform; tap to start audio")]
    PlaybackBlocked { role: StreamRole },
    #[error("audio output could not be started ({reason}); tap to retry")]
    ContextConstructionFailure { reason: String },
    #[error("audio output is suspended after {attempts} resume attempts; tap to resume")]
    ContextSuspended { attempts: u32 },
}

impl PlaybackFault {
    pub fn kind(&self) -> FaultKind {
        match self {
            PlaybackFault::LoadFailure { .. } => FaultKind::LoadFailure,
            PlaybackFault::PlaybackBlocked { .. } => FaultKind::PlaybackBlocked,
            PlaybackFault::ContextConstructionFailure { .. } => {
                FaultKind::ContextConstructionFailure
            }
            PlaybackFault::ContextSuspended { .. } => FaultKind::ContextSuspended,
        }
    }

    pub fn role(&self) -> Option<StreamRole> {
        match self {
            PlaybackFault::LoadFailure { role, .. } | PlaybackFault::PlaybackBlocked { role } => {
                Some(*role)
            }
            _ => None,
        }
    }

    pub fn to_session_fault(&self) -> SessionFault {
        SessionFault {
            role: self.role(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
