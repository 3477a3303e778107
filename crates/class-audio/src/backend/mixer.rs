//! Two-voice mixer rendered from the output stream callback.
//!
//! Each voice plays one [`SampleQueue`] through its volume path. Gains follow the
//! path's [`GainRamp`] evaluated per frame against a render clock that counts
//! rendered frames, so the clock stops whenever the stream is not running.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use class_audio_types::StreamRole;
use crossbeam_channel::Sender;

use super::queue::{PopStrategy, SampleQueue};
use crate::platform::{MediaEvent, PlatformEvent};
use crate::ramp::GainRamp;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Playback state of one role, shared between its element and the callback.
pub(crate) struct Voice {
    role: StreamRole,
    /// Bumped on every source change; loaders and cursors compare against it.
    generation: AtomicU64,
    /// Generation whose end of stream was already reported.
    finished: AtomicU64,
    playing: AtomicBool,
    source: Mutex<Option<Arc<SampleQueue>>>,
}

impl Voice {
    fn new(role: StreamRole) -> Self {
        Self {
            role,
            generation: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            source: Mutex::new(None),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Stop, drop the current source and start a new generation.
    pub(crate) fn reset(&self) -> u64 {
        let mut source = lock(&self.source);
        self.playing.store(false, Ordering::Release);
        if let Some(old) = source.take() {
            old.close();
        }
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Attach a decoded source if `generation` is still current.
    pub(crate) fn install(&self, generation: u64, queue: Arc<SampleQueue>) -> bool {
        let mut source = lock(&self.source);
        if !self.is_current(generation) {
            queue.close();
            return false;
        }
        *source = Some(queue);
        true
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn current_source(&self) -> Option<Arc<SampleQueue>> {
        lock(&self.source).clone()
    }
}

/// Local read position into a voice's queue.
///
/// Lives in the mixer rather than the stream callback, so a rebuilt stream picks up
/// mid-block where the broken one stopped.
#[derive(Default)]
struct Cursor {
    generation: u64,
    buf: Vec<f32>,
    pos: usize,
}

impl Cursor {
    fn sync(&mut self, generation: u64) {
        if self.generation != generation {
            self.generation = generation;
            self.buf.clear();
            self.pos = 0;
        }
    }
}

pub(crate) struct Mixer {
    sample_rate: AtomicU32,
    frames_rendered: AtomicU64,
    voices: [Voice; 2],
    ramps: Mutex<[GainRamp; 2]>,
    cursors: Mutex<[Cursor; 2]>,
    events: Sender<PlatformEvent>,
}

impl Mixer {
    pub(crate) fn new(sample_rate: u32, events: Sender<PlatformEvent>) -> Self {
        Self {
            sample_rate: AtomicU32::new(sample_rate.max(1)),
            frames_rendered: AtomicU64::new(0),
            voices: [Voice::new(StreamRole::Music), Voice::new(StreamRole::Narration)],
            ramps: Mutex::new([GainRamp::hold(1.0); 2]),
            cursors: Mutex::new(Default::default()),
            events,
        }
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub(crate) fn voice(&self, role: StreamRole) -> &Voice {
        &self.voices[role.index()]
    }

    /// Render clock in seconds.
    pub(crate) fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / f64::from(self.sample_rate())
    }

    pub(crate) fn set_ramp(&self, path: StreamRole, ramp: GainRamp) {
        lock(&self.ramps)[path.index()] = ramp;
    }

    pub(crate) fn gain(&self, path: StreamRole) -> f32 {
        let ramp = lock(&self.ramps)[path.index()];
        ramp.value_at(self.current_time())
    }

    /// Send an event to the session owner. A gone receiver means nobody is listening.
    pub(crate) fn post(&self, event: PlatformEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("platform event dropped; receiver closed");
        }
    }

    pub(crate) fn post_media(&self, role: StreamRole, event: MediaEvent) {
        self.post(PlatformEvent::Media { role, event });
    }

    /// Mix both voices into `out` (interleaved, `channels_out` wide) and advance the clock.
    pub(crate) fn render(
        &self,
        out: &mut [f32],
        channels_out: usize,
        refill_max_frames: usize,
    ) {
        out.fill(0.0);
        let channels_out = channels_out.max(1);
        let frames = out.len() / channels_out;
        let start = self.frames_rendered.load(Ordering::Acquire);
        let rate = f64::from(self.sample_rate());
        let ramps = *lock(&self.ramps);
        let mut cursors = lock(&self.cursors);

        for role in StreamRole::ALL {
            let voice = self.voice(role);
            let cursor = &mut cursors[role.index()];
            let generation = voice.generation();
            cursor.sync(generation);
            if !voice.is_playing() {
                continue;
            }
            let Some(queue) = voice.current_source() else {
                continue;
            };
            let ramp = ramps[role.index()];
            let src_channels = queue.channels();

            for frame in 0..frames {
                if cursor.pos >= cursor.buf.len() {
                    match queue.pop(PopStrategy::NonBlocking {
                        max_frames: refill_max_frames.max(1),
                    }) {
                        Some(block) => {
                            cursor.buf = block;
                            cursor.pos = 0;
                        }
                        None => {
                            if queue.is_exhausted() {
                                self.finish(voice, generation, &queue);
                            }
                            break;
                        }
                    }
                }
                let t = (start + frame as u64) as f64 / rate;
                let gain = ramp.value_at(t);
                let src = &cursor.buf[cursor.pos..cursor.pos + src_channels];
                let dst = &mut out[frame * channels_out..(frame + 1) * channels_out];
                for (ch, sample) in dst.iter_mut().enumerate() {
                    *sample += gain * map_channel(src, channels_out, ch);
                }
                cursor.pos += src_channels;
            }
        }

        self.frames_rendered
            .fetch_add(frames as u64, Ordering::AcqRel);
    }

    /// The voice drained its source: report `Ended`, or the failure that cut it short.
    ///
    /// Reported once per generation, even if the voice is told to play again after.
    fn finish(&self, voice: &Voice, generation: u64, queue: &SampleQueue) {
        if !voice.is_current(generation)
            || voice
                .playing
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            || voice.finished.swap(generation, Ordering::AcqRel) == generation
        {
            return;
        }
        let event = match queue.failure() {
            Some((code, message)) => MediaEvent::Error { code, message },
            None => MediaEvent::Ended,
        };
        self.post_media(voice.role, event);
    }
}

/// Sample for output channel `dst_ch` from one interleaved source frame.
///
/// Mono is duplicated, stereo to mono is averaged, other layouts clamp to the last
/// available channel.
fn map_channel(src: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (src.len(), dst_channels) {
        (0, _) => 0.0,
        (2, 1) => 0.5 * (src[0] + src[1]),
        (n, _) => src[dst_ch.min(n - 1)],
    }
}
