//! Output graph: the session-owned rendering context and its two volume paths.

use std::time::Duration;

use class_audio_types::{GraphState, StreamRole};

use crate::platform::GraphBackend;
use crate::ramp::GainRamp;

/// Gain state of one volume path as seen by the mixer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DuckingState {
    pub current_volume: f32,
    pub target_volume: f32,
    /// Render-clock time at which `target_volume` is reached.
    pub ramp_deadline: f64,
}

/// Wrapper enforcing the graph invariants on top of a platform backend.
///
/// Closed at most once; ramps never target zero; one ramp per path at a time.
pub struct OutputGraph<G: GraphBackend> {
    backend: G,
    floor: f32,
    ramps: [GainRamp; 2],
    closed: bool,
}

impl<G: GraphBackend> OutputGraph<G> {
    pub(crate) fn new(backend: G, floor: f32, initial_volume: f32) -> Self {
        let mut graph = Self {
            backend,
            floor,
            ramps: [GainRamp::hold(initial_volume.max(floor)); 2],
            closed: false,
        };
        for role in StreamRole::ALL {
            let ramp = graph.ramps[role.index()];
            graph.backend.apply_ramp(role, ramp);
        }
        graph
    }

    pub fn state(&self) -> GraphState {
        if self.closed {
            GraphState::Closed
        } else {
            self.backend.state()
        }
    }

    /// Ask the platform to start rendering. Silently ignored once closed.
    pub fn resume(&mut self) {
        if self.closed {
            tracing::debug!("resume ignored on closed graph");
            return;
        }
        self.backend.resume();
    }

    /// Stop rendering without releasing anything; `resume` starts it again.
    pub fn suspend(&mut self) {
        if self.closed {
            tracing::debug!("suspend ignored on closed graph");
            return;
        }
        self.backend.suspend();
    }

    /// Cancel any ramp on `path` and approach `target` exponentially over `duration`.
    ///
    /// The ramp starts from the path's current gain so an interrupted ramp continues
    /// smoothly from wherever it got to.
    pub fn schedule_ramp(&mut self, path: StreamRole, target: f32, duration: Duration) -> GainRamp {
        let now = self.backend.current_time();
        let from = self.backend.gain(path);
        let ramp = GainRamp::exponential(from, target, now, duration.as_secs_f64(), self.floor);
        self.ramps[path.index()] = ramp;
        if !self.closed {
            self.backend.apply_ramp(path, ramp);
        }
        tracing::debug!(
            path = %path,
            from = ramp.from,
            to = ramp.to,
            deadline = ramp.end,
            "volume ramp scheduled"
        );
        ramp
    }

    /// Target of the most recent ramp on `path`.
    pub fn target_volume(&self, path: StreamRole) -> f32 {
        self.ramps[path.index()].to
    }

    pub fn current_volume(&self, path: StreamRole) -> f32 {
        self.backend.gain(path)
    }

    pub fn ducking_state(&self, path: StreamRole) -> DuckingState {
        let ramp = self.ramps[path.index()];
        DuckingState {
            current_volume: self.current_volume(path),
            target_volume: ramp.to,
            ramp_deadline: ramp.end,
        }
    }

    /// Release the platform context. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.backend.close();
        tracing::info!("output graph closed");
        true
    }

    pub(crate) fn backend_mut(&mut self) -> &mut G {
        &mut self.backend
    }
}
