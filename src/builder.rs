//! Compiles a [`PulseWaveformSpec`] into the ordered per-channel segment list
//! the instrument's seg-arb engine consumes.

use log::debug;

use crate::error::PulseError;
use crate::segment::{
    total_duration, validate_sequence, Segment, MIN_OFF_TIME, MIN_SEGMENT_TIME,
};
use crate::waveform::{PulseWaveformSpec, VoltageSweep, MAX_SWEEP_POINTS, MAX_TOTAL_POINTS};

/// Instrument minimum period on the low (<= 10 V) source ranges.
pub const LOW_RANGE_MIN_PERIOD: f64 = 120e-9;
/// Instrument minimum period on the high (> 10 V) source ranges.
pub const HIGH_RANGE_MIN_PERIOD: f64 = 280e-9;

/// Minimum period the instrument accepts at the given peak drive voltage.
fn range_minimum_period(max_abs_voltage: f64) -> f64 {
    if max_abs_voltage <= 10.0 {
        LOW_RANGE_MIN_PERIOD
    } else {
        HIGH_RANGE_MIN_PERIOD
    }
}

/// Raise the requested period to the smallest value the timing rules allow.
///
/// The three lower bounds: the segments themselves must fit; the source must
/// rest at base level for at least [`MIN_OFF_TIME`] per period (transitions
/// count half toward on-time); and the instrument imposes a range-dependent
/// floor.
fn adjusted_period(spec: &PulseWaveformSpec, amplitude: f64) -> Result<f64, PulseError> {
    let segment_sum = spec.delay + spec.rise + spec.width + spec.fall;
    let off_time_floor = spec.delay + spec.width + 0.5 * (spec.rise + spec.fall) + MIN_OFF_TIME;
    let range_floor = range_minimum_period(amplitude.abs().max(spec.base_voltage.abs()));
    let period = spec
        .period
        .max(segment_sum)
        .max(off_time_floor)
        .max(range_floor);
    // Off-time check after adjustment; transitions count half toward on-time.
    let off_time = period - spec.delay - spec.width - 0.5 * (spec.rise + spec.fall);
    if off_time < MIN_OFF_TIME {
        return Err(PulseError::InvalidTiming(format!(
            "off-time {off_time} s is below the {MIN_OFF_TIME} s minimum even after raising the period"
        )));
    }
    Ok(period)
}

/// Segments for one pulse cycle at the given amplitude. When `close_to_zero`
/// is set the cycle ends with a relay-safe return to exactly 0 V.
fn build_cycle(
    spec: &PulseWaveformSpec,
    amplitude: f64,
    close_to_zero: bool,
) -> Result<Vec<Segment>, PulseError> {
    let period = adjusted_period(spec, amplitude)?;
    let mut segments = Vec::with_capacity(6);

    segments.push(Segment::flat(spec.base_voltage, spec.delay.max(MIN_SEGMENT_TIME)).with_trigger());

    let rise = Segment::ramp(spec.base_voltage, amplitude, spec.rise);
    let top = Segment::flat(amplitude, spec.width);
    if spec.acquire {
        // Full windows here; the extractor takes its 40-80 % sub-window later.
        segments.push(rise.with_full_window());
        segments.push(top.with_full_window());
    } else {
        segments.push(rise);
        segments.push(top);
    }
    segments.push(Segment::ramp(amplitude, spec.base_voltage, spec.fall));

    let remainder = period - (spec.delay + spec.rise + spec.width + spec.fall);
    segments.push(Segment::flat(spec.base_voltage, remainder.max(MIN_SEGMENT_TIME)));

    if close_to_zero {
        segments.push(Segment::ramp(spec.base_voltage, 0.0, MIN_SEGMENT_TIME));
    }
    Ok(segments)
}

/// Compile a single-amplitude pulse waveform into its segment sequence.
///
/// Emits, in order: pre-delay at base, rise, flat top, fall, remainder of the
/// period at base (clamped to the minimum segment time), and a final return
/// to exactly 0 V so the relays close on a safe level.
pub fn build_pulse_segments(spec: &PulseWaveformSpec) -> Result<Vec<Segment>, PulseError> {
    spec.validate()?;
    let segments = build_cycle(spec, spec.amplitude_voltage, true)?;
    validate_sequence(&segments)?;
    debug!(
        "compiled {} segments, cycle duration {:.3e} s",
        segments.len(),
        total_duration(&segments)
    );
    Ok(segments)
}

/// Number of amplitude points a sweep expands to.
///
/// `ceil(|stop - start| / step) + 1` for a non-zero step; a zero step is only
/// valid when start and stop coincide (a single point).
pub fn sweep_point_count(sweep: &VoltageSweep) -> Result<usize, PulseError> {
    if sweep.step == 0.0 {
        if sweep.stop == sweep.start {
            return Ok(1);
        }
        return Err(PulseError::InvalidTiming(
            "sweep step of zero with distinct endpoints".to_owned(),
        ));
    }
    let span = (sweep.stop - sweep.start).abs();
    Ok((span / sweep.step.abs()).ceil() as usize + 1)
}

/// Compile a pulse waveform, expanding any attached amplitude sweep into one
/// cycle per sweep point. Intermediate cycles stay at base level so only the
/// final cycle carries the return-to-zero closing segment.
pub fn build_sweep_segments(spec: &PulseWaveformSpec) -> Result<Vec<Segment>, PulseError> {
    let Some(sweep) = spec.sweep else {
        return build_pulse_segments(spec);
    };
    spec.validate()?;
    let points = sweep_point_count(&sweep)?;
    if points > MAX_SWEEP_POINTS {
        return Err(PulseError::InsufficientCapacity(format!(
            "{points} sweep points exceed the {MAX_SWEEP_POINTS} ceiling"
        )));
    }
    // One compiled cycle is at most six segments.
    let per_waveform = 6;
    if per_waveform * points > MAX_TOTAL_POINTS {
        return Err(PulseError::InsufficientCapacity(format!(
            "{} total waveform points exceed the {} ceiling",
            per_waveform * points,
            MAX_TOTAL_POINTS
        )));
    }

    let direction = if sweep.stop >= sweep.start { 1.0 } else { -1.0 };
    let mut segments = Vec::new();
    for idx in 0..points {
        let amplitude = sweep.start + direction * sweep.step.abs() * idx as f64;
        let last = idx + 1 == points;
        segments.extend(build_cycle(spec, amplitude, last)?);
    }
    validate_sequence(&segments)?;
    debug!(
        "compiled sweep of {points} amplitudes into {} segments",
        segments.len()
    );
    Ok(segments)
}
