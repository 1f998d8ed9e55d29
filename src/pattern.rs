//! Compiles a binary bit pattern into an equivalent seg-arb segment sequence.

use log::debug;

use crate::error::PulseError;
use crate::segment::{
    total_duration, validate_sequence, Segment, MAX_SEGMENTS, MIN_SEGMENT_TIME, VOLTAGE_EPSILON,
};
use crate::waveform::BinaryPattern;

/// A compiled pattern must hold at least this many segments.
pub const MIN_PATTERN_SEGMENTS: usize = 3;

/// Compile `pattern` into an ordered segment list.
///
/// A `1` bit drives a rise to `v_high`, a flat top of `width`, a fall back to
/// `v_low` and a flat `spacing` gap; a `0` bit only contributes the gap, plus
/// a level transition when the previous bit left the line high. Transitions
/// spanning less than [`VOLTAGE_EPSILON`] are suppressed since the hardware
/// rejects zero-span ramps.
pub fn build_binary_segments(pattern: &BinaryPattern) -> Result<Vec<Segment>, PulseError> {
    pattern.validate()?;
    let timing = pattern.timing;
    let levels = pattern.levels;

    let mut segments: Vec<Segment> = Vec::new();
    let mut previous_voltage = 0.0;

    if timing.delay > MIN_SEGMENT_TIME {
        segments.push(Segment::flat(0.0, timing.delay).with_trigger());
    }

    for bit in pattern.bits.chars() {
        if bit == '1' {
            if (previous_voltage - levels.v_high).abs() > VOLTAGE_EPSILON {
                segments.push(Segment::ramp(previous_voltage, levels.v_high, timing.rise));
            }
            segments.push(Segment::flat(levels.v_high, timing.width));
            segments.push(Segment::ramp(levels.v_high, levels.v_low, timing.fall));
            segments.push(Segment::flat(levels.v_low, timing.spacing));
        } else {
            if (previous_voltage - levels.v_low).abs() > VOLTAGE_EPSILON {
                segments.push(Segment::ramp(previous_voltage, levels.v_low, timing.fall));
            }
            segments.push(Segment::flat(levels.v_low, timing.spacing));
        }
        previous_voltage = levels.v_low;
    }

    if previous_voltage.abs() > VOLTAGE_EPSILON {
        segments.push(Segment::ramp(previous_voltage, 0.0, MIN_SEGMENT_TIME));
    }

    if !segments.iter().any(|s| s.trigger_out) {
        if let Some(first) = segments.first_mut() {
            first.trigger_out = true;
        }
    }

    if segments.len() < MIN_PATTERN_SEGMENTS || segments.len() > MAX_SEGMENTS {
        return Err(PulseError::InsufficientCapacity(format!(
            "pattern compiled to {} segments, outside [{MIN_PATTERN_SEGMENTS}, {MAX_SEGMENTS}]",
            segments.len()
        )));
    }
    validate_sequence(&segments)?;
    debug!(
        "compiled {}-bit pattern into {} segments over {:.3e} s",
        pattern.bits.len(),
        segments.len(),
        total_duration(&segments)
    );
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::{PatternLevels, PatternTiming};

    fn pattern(bits: &str) -> BinaryPattern {
        BinaryPattern {
            bits: bits.to_owned(),
            declared_len: bits.len(),
            timing: PatternTiming {
                delay: 0.0,
                width: 500e-9,
                rise: 100e-9,
                fall: 100e-9,
                spacing: 500e-9,
            },
            levels: PatternLevels {
                v_low: 0.0,
                v_high: 1.0,
            },
            loop_count: 1,
        }
    }

    #[test]
    fn reference_pattern_is_deterministic() {
        // "10110100": each 1 from a low line costs rise+top+fall+spacing,
        // each 0 with the line already low costs spacing only.
        let segments = build_binary_segments(&pattern("10110100")).unwrap();
        assert_eq!(segments.len(), 20);
        let total = total_duration(&segments);
        assert!((total - 6.8e-6).abs() < 1e-12, "total was {total}");
        // No delay segment was emitted, so the trigger lands on segment 0.
        assert!(segments[0].trigger_out);
        validate_sequence(&segments).unwrap();
    }

    #[test]
    fn leading_delay_gets_the_trigger() {
        let mut with_delay = pattern("11");
        with_delay.timing.delay = 1e-6;
        let segments = build_binary_segments(&with_delay).unwrap();
        assert!(segments[0].trigger_out);
        assert!(segments[0].is_flat());
        assert_eq!(segments[0].duration, 1e-6);
    }

    #[test]
    fn nonzero_low_level_gets_a_closing_segment() {
        let mut raised = pattern("10");
        raised.levels.v_low = 0.2;
        let segments = build_binary_segments(&raised).unwrap();
        let last = segments.last().unwrap();
        assert_eq!(last.start_voltage, 0.2);
        assert_eq!(last.stop_voltage, 0.0);
        assert_eq!(last.duration, MIN_SEGMENT_TIME);
    }

    #[test]
    fn consecutive_ones_skip_redundant_rises() {
        // After a 1 the line falls back to v_low, so the next 1 rises again:
        // two full four-segment groups.
        let segments = build_binary_segments(&pattern("11")).unwrap();
        assert_eq!(segments.len(), 8);
    }

    #[test]
    fn too_short_pattern_is_rejected() {
        // A single 0 bit with no delay compiles to one spacing segment.
        assert!(matches!(
            build_binary_segments(&pattern("0")),
            Err(PulseError::InsufficientCapacity(_))
        ));
    }

    #[test]
    fn invalid_bits_are_rejected_before_compilation() {
        assert!(matches!(
            build_binary_segments(&pattern("10a1")),
            Err(PulseError::InvalidParameter(_))
        ));
    }
}
