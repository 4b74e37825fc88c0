//! Shared DSP math helpers

/// Floor used when converting silence to dB
pub const MIN_LINEAR: f32 = 1e-10;

/// Convert decibels to linear amplitude
/// Formula: amplitude = 10^(dB/20)
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, flooring silence at -200dB
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.abs().max(MIN_LINEAR).log10()
}

/// Convert a time constant in milliseconds to a single-pole smoothing coefficient
///
/// `coeff = exp(-1 / (tau * sample_rate))`. A zero time gives `0.0`, i.e. an
/// instant response.
#[inline]
pub fn time_constant_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    if time_ms <= 0.0 || sample_rate <= 0.0 {
        return 0.0;
    }
    let tau = time_ms / 1000.0;
    (-1.0 / (tau * sample_rate)).exp()
}

/// One step of a single-pole smoother towards `target`
#[inline]
pub fn smooth(current: f32, target: f32, coeff: f32) -> f32 {
    coeff * current + (1.0 - coeff) * target
}

/// `value`, or `fallback` when it is NaN or infinite
#[inline]
pub(crate) fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Replace NaN/Inf with silence
#[inline]
pub fn sanitize(sample: f32) -> f32 {
    if sample.is_finite() {
        sample
    } else {
        0.0
    }
}
