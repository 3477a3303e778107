//! Exponential gain ramps evaluated against a render clock.

/// A scheduled gain change on one volume path.
///
/// Both endpoints are strictly positive so the exponential curve is defined; callers
/// floor them before constructing a ramp. A ramp whose window has passed simply holds
/// its target, so a settled path is represented as a finished ramp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainRamp {
    pub from: f32,
    pub to: f32,
    /// Render-clock time (seconds) at which the ramp starts.
    pub start: f64,
    /// Render-clock time (seconds) at which `to` is reached.
    pub end: f64,
}

impl GainRamp {
    /// A settled path holding `value`.
    pub fn hold(value: f32) -> Self {
        Self {
            from: value,
            to: value,
            start: 0.0,
            end: 0.0,
        }
    }

    /// Exponential approach from `from` to `to` over `[start, start + duration]`,
    /// with both endpoints floored at `floor`.
    pub fn exponential(from: f32, to: f32, start: f64, duration: f64, floor: f32) -> Self {
        Self {
            from: from.max(floor),
            to: to.max(floor),
            start,
            end: start + duration.max(0.0),
        }
    }

    /// Gain at render-clock time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        if t <= self.start {
            return self.from;
        }
        if t >= self.end || self.end <= self.start {
            return self.to;
        }
        let progress = (t - self.start) / (self.end - self.start);
        let ratio = f64::from(self.to) / f64::from(self.from);
        (f64::from(self.from) * ratio.powf(progress)) as f32
    }

    pub fn is_settled(&self, t: f64) -> bool {
        t >= self.end
    }
}
