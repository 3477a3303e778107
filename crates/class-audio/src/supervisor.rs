//! Recovery from platform-induced suspension of the output graph.
//!
//! Three independent triggers feed one recovery routine: visibility restored, window
//! focus, and a fixed health tick that only runs while playback is unpaused. A trigger
//! that finds the graph suspended asks for a resume; once the graph reports running
//! again, streams the platform silently paused are re-played.
//!
//! Failed resumes are not retried immediately. The next trigger retries, which keeps
//! the supervisor from hammering a platform that wants a user gesture.

use class_audio_types::GraphState;

use crate::config::MixerConfig;
use crate::platform::{GraphEvent, LifecycleSignal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// Graph running.
    Healthy,
    /// Graph suspended; resumed on the next trigger.
    Suspended,
    /// Graph could not be constructed; only a manual unlock helps.
    Unconstructed,
}

/// What the session should do after the supervisor saw an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    None,
    /// Ask the graph to resume.
    Resume,
    /// Re-play every stream that should be playing but whose element is paused.
    Reconcile,
    /// Surface the suspension as a fault.
    ReportSuspended { attempts: u32 },
}

#[derive(Debug)]
pub struct ResilienceSupervisor {
    state: SupervisorState,
    failed_resumes: u32,
    report_after: u32,
    tick_active: bool,
    hidden: bool,
}

impl ResilienceSupervisor {
    pub fn new(config: &MixerConfig) -> Self {
        Self {
            state: SupervisorState::Unconstructed,
            failed_resumes: 0,
            report_after: config.suspended_fault_after.max(1),
            tick_active: false,
            hidden: false,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn failed_resumes(&self) -> u32 {
        self.failed_resumes
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn tick_active(&self) -> bool {
        self.tick_active
    }

    /// The health tick only runs while playback is not paused.
    pub fn set_tick_active(&mut self, active: bool) {
        if self.tick_active != active {
            tracing::debug!(active, "health tick toggled");
        }
        self.tick_active = active;
    }

    pub fn on_graph_constructed(&mut self, graph: GraphState) {
        self.failed_resumes = 0;
        self.state = match graph {
            GraphState::Running => SupervisorState::Healthy,
            _ => SupervisorState::Suspended,
        };
    }

    pub fn on_construction_failed(&mut self) {
        self.state = SupervisorState::Unconstructed;
    }

    /// A lifecycle signal arrived; `graph` is the state the graph reports right now.
    pub fn on_signal(&mut self, signal: LifecycleSignal, graph: GraphState) -> RecoveryAction {
        match signal {
            LifecycleSignal::Hidden => {
                self.hidden = true;
                tracing::debug!("page hidden");
                RecoveryAction::None
            }
            LifecycleSignal::VisibilityRestored => {
                self.hidden = false;
                self.trigger(signal, graph)
            }
            LifecycleSignal::WindowFocus => self.trigger(signal, graph),
            LifecycleSignal::HealthTick => {
                if !self.tick_active {
                    tracing::debug!("health tick ignored while paused");
                    return RecoveryAction::None;
                }
                self.trigger(signal, graph)
            }
        }
    }

    fn trigger(&mut self, signal: LifecycleSignal, graph: GraphState) -> RecoveryAction {
        if self.state == SupervisorState::Unconstructed {
            tracing::debug!(?signal, "no output graph; waiting for a user gesture");
            return RecoveryAction::None;
        }
        match graph {
            GraphState::Suspended => {
                self.state = SupervisorState::Suspended;
                tracing::info!(?signal, attempt = self.failed_resumes + 1, "resuming suspended graph");
                RecoveryAction::Resume
            }
            GraphState::Running if self.state == SupervisorState::Suspended => {
                // Resumed without us hearing about it.
                self.mark_healthy();
                RecoveryAction::Reconcile
            }
            GraphState::Running | GraphState::Closed => RecoveryAction::None,
        }
    }

    /// A graph event arrived. `paused` is the session's paused flag.
    pub fn on_graph_event(&mut self, event: &GraphEvent, paused: bool) -> RecoveryAction {
        match event {
            GraphEvent::StateChanged(GraphState::Running) => {
                let was = self.state;
                self.mark_healthy();
                if was == SupervisorState::Suspended {
                    tracing::info!("output graph running again");
                    RecoveryAction::Reconcile
                } else {
                    RecoveryAction::None
                }
            }
            GraphEvent::StateChanged(GraphState::Suspended) => {
                if self.state != SupervisorState::Unconstructed {
                    tracing::info!("output graph suspended");
                    self.state = SupervisorState::Suspended;
                }
                RecoveryAction::None
            }
            GraphEvent::StateChanged(GraphState::Closed) => RecoveryAction::None,
            GraphEvent::ResumeRejected { message } => {
                self.failed_resumes = self.failed_resumes.saturating_add(1);
                tracing::warn!(
                    attempts = self.failed_resumes,
                    error = %message,
                    "graph resume rejected"
                );
                if !paused && self.failed_resumes >= self.report_after {
                    RecoveryAction::ReportSuspended {
                        attempts: self.failed_resumes,
                    }
                } else {
                    RecoveryAction::None
                }
            }
        }
    }

    fn mark_healthy(&mut self) {
        self.state = SupervisorState::Healthy;
        self.failed_resumes = 0;
    }
}
