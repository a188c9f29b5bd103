//! Per-sample audio quality filters.
//!
//! Three stages run in order on every frame before it is re-emitted:
//!
//! 1. Noise gate - samples below a small absolute threshold are zeroed.
//! 2. Soft limiter - samples above the ceiling are compressed into the
//!    headroom between the ceiling and `i16::MAX` with a tanh knee.
//! 3. Single-pole smoother - low-pass filter whose carried last sample
//!    seeds the next frame, keeping adjacent frames continuous.
//!
//! The gate and limiter are stateless; only the smoother carries state.

/// Tunable parameters for the filter chain.
#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    /// Absolute value below which samples are zeroed.
    pub noise_gate_threshold: f32,

    /// Absolute value above which the soft limiter engages.
    pub limiter_ceiling: f32,

    /// Smoothing coefficient; the weight given to the raw sample.
    /// Must be in `(0.0, 1.0]`. Higher values smooth less.
    pub smoothing_alpha: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            noise_gate_threshold: 50.0,
            limiter_ceiling: 30000.0,
            smoothing_alpha: 0.95,
        }
    }
}

/// Carried smoother state for one direction of one session.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterState {
    /// Last smoothed sample of the previous frame.
    pub last_sample: f32,
}

/// Zero samples whose absolute value is below `threshold`.
#[inline]
pub fn noise_gate(sample: f32, threshold: f32) -> f32 {
    if sample.abs() < threshold { 0.0 } else { sample }
}

/// Compress samples above `ceiling` into the headroom below `i16::MAX`.
///
/// In-range samples pass through untouched. Out-of-range samples map onto
/// `ceiling + headroom * tanh(excess / headroom)`, which is continuous at
/// the ceiling and never exceeds the ceiling by more than the headroom.
#[inline]
pub fn soft_limit(sample: f32, ceiling: f32) -> f32 {
    let magnitude = sample.abs();
    if magnitude <= ceiling {
        return sample;
    }
    let headroom = i16::MAX as f32 - ceiling;
    let limited = ceiling + headroom * ((magnitude - ceiling) / headroom).tanh();
    limited.copysign(sample)
}

/// Run the single-pole low-pass smoother over `frame` in place.
///
/// `smoothed[i] = alpha * raw[i] + (1 - alpha) * smoothed[i - 1]`, seeded
/// with the carried last sample from the previous frame. The state is
/// updated to the final smoothed sample so the next frame continues from
/// where this one ended.
pub fn smooth_frame(frame: &mut [f32], alpha: f32, state: &mut FilterState) {
    let mut previous = state.last_sample;
    for sample in frame.iter_mut() {
        let smoothed = alpha * *sample + (1.0 - alpha) * previous;
        *sample = smoothed;
        previous = smoothed;
    }
    state.last_sample = previous;
}
