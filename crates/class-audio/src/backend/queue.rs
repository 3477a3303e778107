//! Bounded queues of interleaved `f32` samples between backend stages.
//!
//! decode thread → queue → resampler thread → queue → mixer callback.
//!
//! A queue is closed by its producer on end of stream, by a failing producer with the
//! reason attached, or by its consumer to tell upstream stages to stop early.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::platform::MediaErrorCode;

/// Thread-safe bounded FIFO of interleaved samples.
///
/// The `done` flag and failure live under the same mutex as the samples, so a consumer
/// never observes "closed" before the last pushed frame.
pub(crate) struct SampleQueue {
    channels: usize,
    max_samples: usize,
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

struct QueueInner {
    samples: VecDeque<f32>,
    done: bool,
    failure: Option<(MediaErrorCode, String)>,
}

pub(crate) enum PopStrategy {
    /// Block until exactly `frames` are available; `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until any frame is available, then take up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Take up to `max_frames` without waiting; `None` if currently empty.
    NonBlocking { max_frames: usize },
}

/// Capacity in samples for `seconds` of audio, falling back to two seconds.
pub(crate) fn capacity_for(rate_hz: u32, channels: usize, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.max(1).saturating_mul(channels.max(1))
}

impl SampleQueue {
    pub(crate) fn new(channels: usize, max_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            max_samples: max_samples.max(channels),
            inner: Mutex::new(QueueInner {
                samples: VecDeque::new(),
                done: false,
                failure: None,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    pub(crate) fn max_frames(&self) -> usize {
        self.max_samples / self.channels
    }

    pub(crate) fn len_frames(&self) -> usize {
        self.lock().samples.len() / self.channels
    }

    /// Closed and fully drained.
    pub(crate) fn is_exhausted(&self) -> bool {
        let g = self.lock();
        g.done && g.samples.is_empty()
    }

    pub(crate) fn failure(&self) -> Option<(MediaErrorCode, String)> {
        self.lock().failure.clone()
    }

    /// Mark end of stream and wake every waiter. Idempotent.
    pub(crate) fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Close with a failure reason; buffered samples stay available.
    pub(crate) fn fail(&self, code: MediaErrorCode, message: impl Into<String>) {
        let mut g = self.lock();
        g.done = true;
        if g.failure.is_none() {
            g.failure = Some((code, message.into()));
        }
        drop(g);
        self.cv.notify_all();
    }

    /// Push samples, blocking while full. Returns `false` if the queue closed first;
    /// remaining samples are dropped.
    pub(crate) fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.samples.len() >= self.max_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
            if g.done {
                return false;
            }
            let room = self.max_samples - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    pub(crate) fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_samples = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.samples.len() < want && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
                }
                if g.samples.len() < want {
                    return None;
                }
                want
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.samples.is_empty() && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
                }
                whole_frames(g.samples.len(), self.channels, max_frames)
            }
            PopStrategy::NonBlocking { max_frames } => {
                whole_frames(g.samples.len(), self.channels, max_frames)
            }
        };
        if take_samples == 0 {
            return None;
        }
        let out: Vec<f32> = g.samples.drain(..take_samples).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Wait until at least `frames` are buffered or the producer is done.
    ///
    /// Returns `false` on timeout.
    pub(crate) fn wait_for_frames(&self, frames: usize, timeout: Duration) -> bool {
        let want = frames.min(self.max_frames()) * self.channels;
        let g = self.lock();
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |g| g.samples.len() < want && !g.done)
            .unwrap_or_else(PoisonError::into_inner);
        g.samples.len() >= want || g.done
    }
}

fn whole_frames(available_samples: usize, channels: usize, max_frames: usize) -> usize {
    (available_samples / channels).min(max_frames) * channels
}
