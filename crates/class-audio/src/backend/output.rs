//! The cpal output stream behind a [`CpalGraph`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use class_audio_types::{GraphState, StreamRole};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::Sender;

use super::device;
use super::mixer::Mixer;
use crate::platform::{GraphBackend, GraphEvent, PlatformEvent};
use crate::ramp::GainRamp;

/// Graph state shared with the stream's error callback.
struct StreamStatus {
    state: Mutex<GraphState>,
    /// The stream reported an error and must be rebuilt before it can run again.
    broken: AtomicBool,
}

impl StreamStatus {
    fn get(&self) -> GraphState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `next`; returns `true` if it differs from the previous state.
    fn set(&self, next: GraphState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *state != next;
        *state = next;
        changed
    }
}

/// A running (or suspended) output stream mixing the music and narration voices.
pub struct CpalGraph {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    refill_max_frames: usize,
    stream: Option<cpal::Stream>,
    mixer: Arc<Mixer>,
    status: Arc<StreamStatus>,
    bound: [bool; 2],
}

impl CpalGraph {
    pub(crate) fn open(
        device: cpal::Device,
        target_rate: Option<u32>,
        refill_max_frames: usize,
        events: Sender<PlatformEvent>,
    ) -> Result<Self> {
        let supported = device::pick_output_config(&device, target_rate)?;
        let sample_format = supported.sample_format();
        let mut config = supported.config();
        config.buffer_size = device::pick_buffer_size(&supported);
        let mixer = Arc::new(Mixer::new(config.sample_rate, events));

        let mut graph = Self {
            device,
            config,
            sample_format,
            refill_max_frames,
            stream: None,
            mixer,
            status: Arc::new(StreamStatus {
                state: Mutex::new(GraphState::Suspended),
                broken: AtomicBool::new(false),
            }),
            bound: [false; 2],
        };
        graph.start()?;
        tracing::info!(
            rate = graph.config.sample_rate,
            channels = graph.config.channels,
            format = ?graph.sample_format,
            "output stream started"
        );
        Ok(graph)
    }

    pub(crate) fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Mark `role` as bound; each volume path takes exactly one element.
    pub(crate) fn bind(&mut self, role: StreamRole) -> bool {
        !std::mem::replace(&mut self.bound[role.index()], true)
    }

    /// Build the stream if missing or broken, then play it.
    fn start(&mut self) -> Result<()> {
        if self.stream.is_none() || self.status.broken.load(Ordering::Acquire) {
            self.stream = None;
            self.stream = Some(self.build_stream()?);
            self.status.broken.store(false, Ordering::Release);
        }
        if let Some(stream) = &self.stream {
            stream.play().map_err(|e| anyhow!("start stream: {e}"))?;
        }
        self.status.set(GraphState::Running);
        Ok(())
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        match self.sample_format {
            cpal::SampleFormat::F32 => self.build_typed::<f32>(),
            cpal::SampleFormat::I16 => self.build_typed::<i16>(),
            cpal::SampleFormat::I32 => self.build_typed::<i32>(),
            cpal::SampleFormat::U16 => self.build_typed::<u16>(),
            other => Err(anyhow!("unsupported sample format {other:?}")),
        }
    }

    fn build_typed<T>(&self) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = usize::from(self.config.channels);
        let refill = self.refill_max_frames;
        let mixer = self.mixer.clone();
        let mut scratch: Vec<f32> = Vec::new();

        let err_mixer = self.mixer.clone();
        let err_status = self.status.clone();
        let on_error = move |err: cpal::StreamError| {
            tracing::warn!(error = %err, "output stream error");
            err_status.broken.store(true, Ordering::Release);
            if err_status.set(GraphState::Suspended) {
                err_mixer.post(PlatformEvent::Graph(GraphEvent::StateChanged(
                    GraphState::Suspended,
                )));
            }
        };

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [T], _| {
                scratch.resize(data.len(), 0.0);
                mixer.render(&mut scratch, channels, refill);
                for (out, sample) in data.iter_mut().zip(&scratch) {
                    *out = <T as cpal::Sample>::from_sample::<f32>(*sample);
                }
            },
            on_error,
            None,
        )?;
        Ok(stream)
    }

    fn post_state(&self, state: GraphState) {
        self.mixer
            .post(PlatformEvent::Graph(GraphEvent::StateChanged(state)));
    }
}

impl GraphBackend for CpalGraph {
    fn state(&self) -> GraphState {
        self.status.get()
    }

    fn resume(&mut self) {
        match self.status.get() {
            GraphState::Running => tracing::debug!("resume: stream already running"),
            GraphState::Closed => tracing::debug!("resume: graph closed"),
            GraphState::Suspended => match self.start() {
                Ok(()) => {
                    tracing::info!("output stream resumed");
                    self.post_state(GraphState::Running);
                }
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "output stream resume failed");
                    self.mixer.post(PlatformEvent::Graph(GraphEvent::ResumeRejected {
                        message: format!("{e:#}"),
                    }));
                }
            },
        }
    }

    fn suspend(&mut self) {
        if self.status.get() != GraphState::Running {
            return;
        }
        if let Some(Err(e)) = self.stream.as_ref().map(StreamTrait::pause) {
            tracing::warn!(error = %e, "pausing stream failed; dropping it");
            self.stream = None;
        }
        self.status.set(GraphState::Suspended);
        self.post_state(GraphState::Suspended);
    }

    fn close(&mut self) {
        self.stream = None;
        for role in StreamRole::ALL {
            self.mixer.voice(role).reset();
        }
        if self.status.set(GraphState::Closed) {
            self.post_state(GraphState::Closed);
        }
    }

    fn current_time(&self) -> f64 {
        self.mixer.current_time()
    }

    fn apply_ramp(&mut self, path: StreamRole, ramp: GainRamp) {
        self.mixer.set_ramp(path, ramp);
    }

    fn gain(&self, path: StreamRole) -> f32 {
        self.mixer.gain(path)
    }
}
