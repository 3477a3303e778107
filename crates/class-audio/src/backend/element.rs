//! Media elements of the cpal backend.
//!
//! An element is a handle onto one mixer voice. Setting a source spawns a loader that
//! opens, decodes and resamples it, installs the result on the voice and reports
//! `CanPlayThrough` once enough audio is buffered.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use class_audio_types::StreamRole;

use super::decode::{classify, start_decode};
use super::http_stream::open_source;
use super::mixer::Mixer;
use super::queue::SampleQueue;
use super::resample::{ResampleConfig, to_device_rate};
use crate::config::PlaybackConfig;
use crate::platform::{MediaElement, MediaErrorCode, MediaEvent};

pub struct CpalElement {
    role: StreamRole,
    mixer: Arc<Mixer>,
    playback: PlaybackConfig,
    loader_cancel: Option<Arc<AtomicBool>>,
}

impl CpalElement {
    pub(crate) fn new(role: StreamRole, mixer: Arc<Mixer>, playback: PlaybackConfig) -> Self {
        Self {
            role,
            mixer,
            playback,
            loader_cancel: None,
        }
    }

    fn cancel_loader(&mut self) {
        if let Some(cancel) = self.loader_cancel.take() {
            cancel.store(true, Ordering::Relaxed);
        }
    }
}

impl MediaElement for CpalElement {
    fn set_source(&mut self, url: &str) {
        self.cancel_loader();
        let generation = self.mixer.voice(self.role).reset();
        let cancel = Arc::new(AtomicBool::new(false));
        self.loader_cancel = Some(cancel.clone());

        let job = LoadJob {
            role: self.role,
            generation,
            url: url.to_string(),
            playback: self.playback.clone(),
            mixer: self.mixer.clone(),
            cancel,
        };
        let spawned = thread::Builder::new()
            .name(format!("{}-load", self.role))
            .spawn(move || job.run());
        if let Err(e) = spawned {
            self.mixer.post_media(
                self.role,
                MediaEvent::Error {
                    code: MediaErrorCode::Aborted,
                    message: format!("spawn loader: {e}"),
                },
            );
        }
    }

    fn reset(&mut self) {
        self.cancel_loader();
        self.mixer.voice(self.role).reset();
    }

    fn play(&mut self) {
        self.mixer.voice(self.role).set_playing(true);
        self.mixer.post_media(self.role, MediaEvent::Playing);
    }

    fn pause(&mut self) {
        let voice = self.mixer.voice(self.role);
        if voice.is_playing() {
            voice.set_playing(false);
            self.mixer.post_media(self.role, MediaEvent::Paused);
        }
    }

    fn is_paused(&self) -> bool {
        !self.mixer.voice(self.role).is_playing()
    }
}

impl Drop for CpalElement {
    fn drop(&mut self) {
        self.cancel_loader();
    }
}

/// Background load of one source for one voice generation.
struct LoadJob {
    role: StreamRole,
    generation: u64,
    url: String,
    playback: PlaybackConfig,
    mixer: Arc<Mixer>,
    cancel: Arc<AtomicBool>,
}

impl LoadJob {
    fn run(self) {
        match self.open() {
            Ok(queue) => self.await_ready(queue),
            Err(e) => {
                if self.is_stale() {
                    return;
                }
                tracing::warn!(role = %self.role, url = %self.url, error = %format!("{e:#}"), "load failed");
                self.mixer.post_media(
                    self.role,
                    MediaEvent::Error {
                        code: classify(&e),
                        message: format!("{e:#}"),
                    },
                );
            }
        }
    }

    fn is_stale(&self) -> bool {
        self.cancel.load(Ordering::Relaxed) || !self.mixer.voice(self.role).is_current(self.generation)
    }

    fn open(&self) -> Result<Arc<SampleQueue>> {
        let (source, hint) = open_source(&self.url, self.cancel.clone())?;
        let decoded = start_decode(
            source,
            hint,
            self.playback.buffer_seconds,
            self.cancel.clone(),
        )?;
        tracing::info!(
            role = %self.role,
            url = %self.url,
            codec = decoded.codec.unwrap_or("unknown"),
            rate = decoded.spec.rate,
            channels = decoded.spec.channels.count(),
            duration_ms = decoded.duration_ms,
            "decoding"
        );
        let cfg = ResampleConfig {
            chunk_frames: self.playback.chunk_frames,
            buffer_seconds: self.playback.buffer_seconds,
        };
        to_device_rate(
            decoded.queue.clone(),
            decoded.spec.rate,
            self.mixer.sample_rate(),
            cfg,
        )
        .inspect_err(|_| decoded.queue.close())
    }

    fn await_ready(&self, queue: Arc<SampleQueue>) {
        if !self.mixer.voice(self.role).install(self.generation, queue.clone()) {
            return;
        }
        let ready_frames =
            (self.mixer.sample_rate() as f32 * self.playback.ready_seconds.max(0.0)).ceil() as usize;
        while !queue.wait_for_frames(ready_frames.max(1), Duration::from_millis(50)) {
            if self.is_stale() {
                return;
            }
        }
        if self.is_stale() {
            return;
        }
        match queue.failure() {
            Some((code, message)) if queue.len_frames() == 0 => {
                self.mixer
                    .post_media(self.role, MediaEvent::Error { code, message });
            }
            _ => {
                tracing::debug!(role = %self.role, url = %self.url, "buffered enough to play through");
                self.mixer.post_media(self.role, MediaEvent::CanPlayThrough);
            }
        }
    }
}
