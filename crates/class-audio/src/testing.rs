//! In-memory platform used by the engine tests.
//!
//! Every command lands on a shared timeline; asynchronous outcomes are queued as
//! events and delivered when a test pumps them into the session.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use class_audio_types::{GraphState, StreamRole};

use crate::error::PlatformError;
use crate::platform::{
    AudioPlatform, GraphBackend, GraphEvent, MediaElement, MediaEvent, PlatformEvent,
};
use crate::ramp::GainRamp;
use crate::session::PlaybackSession;

#[derive(Clone, Debug, Default)]
pub(crate) struct FakeElementState {
    pub(crate) src: Option<String>,
    pub(crate) paused: bool,
    pub(crate) position: f64,
    pub(crate) plays: usize,
}

struct World {
    clock: f64,
    graph_state: GraphState,
    initial_state: GraphState,
    graphs_created: usize,
    graph_closes: usize,
    fail_construction: bool,
    resume_allowed: bool,
    play_allowed: bool,
    auto_ready: bool,
    elements_created: [usize; 2],
    elements: [FakeElementState; 2],
    ramps: [GainRamp; 2],
    timeline: Vec<String>,
    events: VecDeque<PlatformEvent>,
}

#[derive(Clone)]
pub(crate) struct FakePlatform {
    world: Rc<RefCell<World>>,
}

pub(crate) struct FakeGraph {
    world: Rc<RefCell<World>>,
}

pub(crate) struct FakeElement {
    role: StreamRole,
    world: Rc<RefCell<World>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        let paused = FakeElementState {
            paused: true,
            ..Default::default()
        };
        Self {
            world: Rc::new(RefCell::new(World {
                clock: 0.0,
                graph_state: GraphState::Suspended,
                initial_state: GraphState::Running,
                graphs_created: 0,
                graph_closes: 0,
                fail_construction: false,
                resume_allowed: true,
                play_allowed: true,
                auto_ready: true,
                elements_created: [0; 2],
                elements: [paused.clone(), paused],
                ramps: [GainRamp::hold(1.0); 2],
                timeline: Vec::new(),
                events: VecDeque::new(),
            })),
        }
    }

    /// Advance the render clock; unpaused elements progress with it.
    pub(crate) fn advance(&self, seconds: f64) {
        let mut w = self.world.borrow_mut();
        w.clock += seconds;
        for el in w.elements.iter_mut() {
            if !el.paused {
                el.position += seconds;
            }
        }
    }

    pub(crate) fn set_initial_state(&self, state: GraphState) {
        self.world.borrow_mut().initial_state = state;
    }

    pub(crate) fn set_fail_construction(&self, fail: bool) {
        self.world.borrow_mut().fail_construction = fail;
    }

    pub(crate) fn set_resume_allowed(&self, allowed: bool) {
        self.world.borrow_mut().resume_allowed = allowed;
    }

    pub(crate) fn set_play_allowed(&self, allowed: bool) {
        self.world.borrow_mut().play_allowed = allowed;
    }

    pub(crate) fn set_auto_ready(&self, ready: bool) {
        self.world.borrow_mut().auto_ready = ready;
    }

    /// The platform suspends rendering on its own and pauses every element without
    /// telling anyone, as mobile platforms do when a page is hidden.
    pub(crate) fn suspend_silently(&self) {
        let mut w = self.world.borrow_mut();
        w.graph_state = GraphState::Suspended;
        for el in w.elements.iter_mut() {
            el.paused = true;
        }
        w.events
            .push_back(PlatformEvent::Graph(GraphEvent::StateChanged(GraphState::Suspended)));
    }

    /// The element reaches its end of stream.
    pub(crate) fn finish(&self, role: StreamRole) {
        let mut w = self.world.borrow_mut();
        w.elements[role.index()].paused = true;
        w.events.push_back(PlatformEvent::Media {
            role,
            event: MediaEvent::Ended,
        });
    }

    pub(crate) fn push_event(&self, event: PlatformEvent) {
        self.world.borrow_mut().events.push_back(event);
    }

    pub(crate) fn drain_events(&self) -> Vec<PlatformEvent> {
        self.world.borrow_mut().events.drain(..).collect()
    }

    pub(crate) fn element(&self, role: StreamRole) -> FakeElementState {
        self.world.borrow().elements[role.index()].clone()
    }

    pub(crate) fn elements_created(&self, role: StreamRole) -> usize {
        self.world.borrow().elements_created[role.index()]
    }

    pub(crate) fn graphs_created(&self) -> usize {
        self.world.borrow().graphs_created
    }

    pub(crate) fn graph_closes(&self) -> usize {
        self.world.borrow().graph_closes
    }

    pub(crate) fn graph_state(&self) -> GraphState {
        self.world.borrow().graph_state
    }

    pub(crate) fn timeline(&self) -> Vec<String> {
        self.world.borrow().timeline.clone()
    }

    pub(crate) fn clear_timeline(&self) {
        self.world.borrow_mut().timeline.clear();
    }

    /// Position of `entry` on the timeline.
    pub(crate) fn position_of(&self, entry: &str) -> Option<usize> {
        self.world.borrow().timeline.iter().position(|e| e == entry)
    }
}

/// Deliver queued platform events until none remain.
pub(crate) fn pump(session: &mut PlaybackSession<FakePlatform>, platform: &FakePlatform) {
    loop {
        let events = platform.drain_events();
        if events.is_empty() {
            break;
        }
        for event in events {
            session.handle_event(event);
        }
    }
}

impl AudioPlatform for FakePlatform {
    type Graph = FakeGraph;
    type Element = FakeElement;

    fn create_graph(&mut self) -> Result<FakeGraph, PlatformError> {
        let mut w = self.world.borrow_mut();
        if w.fail_construction {
            w.timeline.push("graph:create-failed".to_string());
            return Err(PlatformError::Unavailable("sandboxed".to_string()));
        }
        w.graphs_created += 1;
        w.graph_state = w.initial_state;
        w.timeline.push("graph:create".to_string());
        Ok(FakeGraph {
            world: self.world.clone(),
        })
    }

    fn create_element(
        &mut self,
        _graph: &mut FakeGraph,
        role: StreamRole,
    ) -> Result<FakeElement, PlatformError> {
        let mut w = self.world.borrow_mut();
        w.elements_created[role.index()] += 1;
        w.timeline.push(format!("{role}:create"));
        Ok(FakeElement {
            role,
            world: self.world.clone(),
        })
    }
}

impl GraphBackend for FakeGraph {
    fn state(&self) -> GraphState {
        self.world.borrow().graph_state
    }

    fn resume(&mut self) {
        let mut w = self.world.borrow_mut();
        w.timeline.push("graph:resume".to_string());
        if w.resume_allowed {
            w.graph_state = GraphState::Running;
            w.events
                .push_back(PlatformEvent::Graph(GraphEvent::StateChanged(GraphState::Running)));
        } else {
            w.events.push_back(PlatformEvent::Graph(GraphEvent::ResumeRejected {
                message: "not allowed".to_string(),
            }));
        }
    }

    fn suspend(&mut self) {
        let mut w = self.world.borrow_mut();
        w.timeline.push("graph:suspend".to_string());
        w.graph_state = GraphState::Suspended;
        w.events
            .push_back(PlatformEvent::Graph(GraphEvent::StateChanged(GraphState::Suspended)));
    }

    fn close(&mut self) {
        let mut w = self.world.borrow_mut();
        w.graph_closes += 1;
        w.graph_state = GraphState::Closed;
        w.timeline.push("graph:close".to_string());
    }

    fn current_time(&self) -> f64 {
        self.world.borrow().clock
    }

    fn apply_ramp(&mut self, path: StreamRole, ramp: GainRamp) {
        let mut w = self.world.borrow_mut();
        w.ramps[path.index()] = ramp;
        w.timeline.push(format!("ramp:{path}:{:.2}", ramp.to));
    }

    fn gain(&self, path: StreamRole) -> f32 {
        let w = self.world.borrow();
        w.ramps[path.index()].value_at(w.clock)
    }
}

impl MediaElement for FakeElement {
    fn set_source(&mut self, url: &str) {
        let mut w = self.world.borrow_mut();
        let role = self.role;
        let el = &mut w.elements[role.index()];
        el.src = Some(url.to_string());
        el.paused = true;
        el.position = 0.0;
        w.timeline.push(format!("{role}:load:{url}"));
        if w.auto_ready {
            w.events.push_back(PlatformEvent::Media {
                role,
                event: MediaEvent::CanPlayThrough,
            });
        }
    }

    fn reset(&mut self) {
        let mut w = self.world.borrow_mut();
        let role = self.role;
        let el = &mut w.elements[role.index()];
        el.paused = true;
        el.position = 0.0;
        w.timeline.push(format!("{role}:reset"));
    }

    fn play(&mut self) {
        let mut w = self.world.borrow_mut();
        let role = self.role;
        w.timeline.push(format!("{role}:play"));
        if w.play_allowed {
            let el = &mut w.elements[role.index()];
            el.paused = false;
            el.plays += 1;
            w.events.push_back(PlatformEvent::Media {
                role,
                event: MediaEvent::Playing,
            });
        } else {
            w.events.push_back(PlatformEvent::Media {
                role,
                event: MediaEvent::PlayRejected {
                    message: "gesture required".to_string(),
                },
            });
        }
    }

    fn pause(&mut self) {
        let mut w = self.world.borrow_mut();
        let role = self.role;
        w.elements[role.index()].paused = true;
        w.timeline.push(format!("{role}:pause"));
        w.events.push_back(PlatformEvent::Media {
            role,
            event: MediaEvent::Paused,
        });
    }

    fn is_paused(&self) -> bool {
        self.world.borrow().elements[self.role.index()].paused
    }
}
