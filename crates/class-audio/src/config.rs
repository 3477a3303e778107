use std::time::Duration;

use serde::Deserialize;

/// Mixing and recovery parameters for a playback session.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixerConfig {
    /// Music gain while narration plays.
    pub ducked_volume: f32,
    /// Music gain when no narration plays.
    pub full_volume: f32,
    /// Length of a duck or restore ramp in milliseconds.
    pub duck_ramp_ms: u64,
    /// Lowest gain ever scheduled; ramps never target exactly zero.
    pub volume_floor: f32,
    /// Interval of the health tick while playback is not paused.
    pub health_tick_ms: u64,
    /// Consecutive failed resumes before the suspension is reported as a fault.
    pub suspended_fault_after: u32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            ducked_volume: 0.35,
            full_volume: 1.0,
            duck_ramp_ms: 300,
            volume_floor: 0.0001,
            health_tick_ms: 5_000,
            suspended_fault_after: 3,
        }
    }
}

impl MixerConfig {
    /// Clamp out-of-range values to something playable.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.volume_floor.is_finite() || self.volume_floor <= 0.0 {
            self.volume_floor = defaults.volume_floor;
        }
        if !self.full_volume.is_finite() {
            self.full_volume = defaults.full_volume;
        }
        self.full_volume = self.full_volume.clamp(self.volume_floor, 1.0);
        if !self.ducked_volume.is_finite() {
            self.ducked_volume = defaults.ducked_volume;
        }
        self.ducked_volume = self.ducked_volume.clamp(self.volume_floor, self.full_volume);
        if self.duck_ramp_ms == 0 || self.duck_ramp_ms >= 1_000 {
            self.duck_ramp_ms = defaults.duck_ramp_ms;
        }
        if self.health_tick_ms == 0 {
            self.health_tick_ms = defaults.health_tick_ms;
        }
        self.suspended_fault_after = self.suspended_fault_after.max(1);
        self
    }

    pub fn duck_ramp(&self) -> Duration {
        Duration::from_millis(self.duck_ramp_ms)
    }

    pub fn health_tick(&self) -> Duration {
        Duration::from_millis(self.health_tick_ms)
    }
}

/// Tuning for the decode/resample/output stages of the device backend.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per voice on one output callback refill.
    pub refill_max_frames: usize,
    /// Target buffer duration for queue sizing.
    pub buffer_seconds: f32,
    /// Buffered audio required before a stream reports it can play through.
    pub ready_seconds: f32,
}

impl Default for PlaybackConfig {
    /// Defaults tuned for low-risk playback across common devices.
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
            ready_seconds: 0.5,
        }
    }
}
