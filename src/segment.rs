use crate::error::PulseError;

/// Shortest segment the pulse hardware will accept.
pub const MIN_SEGMENT_TIME: f64 = 20e-9;
/// Minimum off-time the source must spend at base level inside one period.
pub const MIN_OFF_TIME: f64 = 40e-9;
/// Hardware ceiling on segment count per channel sequence.
pub const MAX_SEGMENTS: usize = 2048;
/// Two voltages closer than this are treated as equal.
pub const VOLTAGE_EPSILON: f64 = 1e-6;

/// How a segment's measurement window is summarized by the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasureType {
    None,
    FullWindowAverage,
    SpotMean,
}

/// One linear ramp or flat span of a programmed seg-arb waveform.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub start_voltage: f64,
    pub stop_voltage: f64,
    pub duration: f64,
    pub source_relay_closed: bool,
    pub trigger_out: bool,
    pub measure_type: MeasureType,
    pub measure_window_start: f64,
    pub measure_window_stop: f64,
}

impl Segment {
    /// Flat span at a constant voltage, no measurement, relays closed.
    pub fn flat(voltage: f64, duration: f64) -> Self {
        Self::ramp(voltage, voltage, duration)
    }

    /// Linear ramp between two voltages, no measurement, relays closed.
    pub fn ramp(start_voltage: f64, stop_voltage: f64, duration: f64) -> Self {
        Self {
            start_voltage,
            stop_voltage,
            duration,
            source_relay_closed: true,
            trigger_out: false,
            measure_type: MeasureType::None,
            measure_window_start: 0.0,
            measure_window_stop: 0.0,
        }
    }

    pub fn with_trigger(mut self) -> Self {
        self.trigger_out = true;
        self
    }

    /// Request a full-duration averaged measurement over this segment.
    pub fn with_full_window(mut self) -> Self {
        self.measure_type = MeasureType::FullWindowAverage;
        self.measure_window_start = 0.0;
        self.measure_window_stop = self.duration;
        self
    }

    pub fn is_flat(&self) -> bool {
        (self.start_voltage - self.stop_voltage).abs() <= VOLTAGE_EPSILON
    }
}

/// Sum of all segment durations, i.e. the duration of one programmed cycle.
pub fn total_duration(segments: &[Segment]) -> f64 {
    segments.iter().map(|s| s.duration).sum()
}

/// Duration of the shortest segment in the sequence, if any.
pub fn shortest_duration(segments: &[Segment]) -> Option<f64> {
    segments
        .iter()
        .map(|s| s.duration)
        .min_by(|a, b| a.total_cmp(b))
}

/// Check the invariants every compiled sequence must satisfy before it is
/// handed to the instrument: per-segment minimum duration, voltage
/// continuity between adjacent segments, at least one trigger-out marker,
/// and the hardware segment-count ceiling.
pub fn validate_sequence(segments: &[Segment]) -> Result<(), PulseError> {
    if segments.len() > MAX_SEGMENTS {
        return Err(PulseError::InsufficientCapacity(format!(
            "{} segments exceed the {} segment ceiling",
            segments.len(),
            MAX_SEGMENTS
        )));
    }
    for (idx, segment) in segments.iter().enumerate() {
        if segment.duration < MIN_SEGMENT_TIME {
            return Err(PulseError::InvalidTiming(format!(
                "segment {idx} duration {} s is below the {} s minimum",
                segment.duration, MIN_SEGMENT_TIME
            )));
        }
    }
    for (idx, pair) in segments.windows(2).enumerate() {
        let gap = (pair[0].stop_voltage - pair[1].start_voltage).abs();
        if gap > VOLTAGE_EPSILON {
            return Err(PulseError::InvalidParameter(format!(
                "voltage discontinuity of {gap} V between segments {idx} and {}",
                idx + 1
            )));
        }
    }
    if !segments.is_empty() && !segments.iter().any(|s| s.trigger_out) {
        return Err(PulseError::InvalidParameter(
            "no segment carries a trigger-out marker".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_and_ramp_constructors() {
        let flat = Segment::flat(1.5, 1e-6);
        assert!(flat.is_flat());
        assert_eq!(flat.measure_type, MeasureType::None);
        let ramp = Segment::ramp(0.0, 2.0, 1e-7).with_full_window();
        assert!(!ramp.is_flat());
        assert_eq!(ramp.measure_type, MeasureType::FullWindowAverage);
        assert_eq!(ramp.measure_window_stop, 1e-7);
    }

    #[test]
    fn validation_rejects_discontinuity() {
        let segments = vec![
            Segment::flat(0.0, 1e-6).with_trigger(),
            Segment::flat(1.0, 1e-6),
        ];
        assert!(matches!(
            validate_sequence(&segments),
            Err(PulseError::InvalidParameter(_))
        ));
    }

    #[test]
    fn validation_rejects_short_segment() {
        let segments = vec![Segment::flat(0.0, 1e-9).with_trigger()];
        assert!(matches!(
            validate_sequence(&segments),
            Err(PulseError::InvalidTiming(_))
        ));
    }

    #[test]
    fn validation_requires_trigger() {
        let segments = vec![Segment::flat(0.0, 1e-6)];
        assert!(validate_sequence(&segments).is_err());
        let segments = vec![Segment::flat(0.0, 1e-6).with_trigger()];
        assert!(validate_sequence(&segments).is_ok());
    }

    #[test]
    fn duration_helpers() {
        let segments = vec![
            Segment::flat(0.0, 1e-6).with_trigger(),
            Segment::ramp(0.0, 1.0, 1e-7),
        ];
        assert!((total_duration(&segments) - 1.1e-6).abs() < 1e-15);
        assert_eq!(shortest_duration(&segments), Some(1e-7));
        assert_eq!(shortest_duration(&[]), None);
    }
}
