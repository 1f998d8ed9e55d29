//! Abstract instrument surface the core programs against, plus an in-memory
//! simulated implementation for tests and offline runs.

use std::collections::HashMap;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::capture::CaptureBuffer;
use crate::error::PulseError;
use crate::sampling::BASE_SAMPLE_RATE;
use crate::segment::{total_duration, Segment};

/// Pulse channel of the two-channel instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    One,
    Two,
}

/// Waveform engine the instrument arms with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    SegArb,
    FullArb,
}

/// Execution state reported by the instrument while a run is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Done,
    Error,
}

/// Vendor pulse/seg-arb API, abstracted so the core never touches concrete
/// driver calls. Implementation failures are wrapped into
/// [`PulseError::Instrument`] and propagated verbatim, never retried here.
pub trait Instrument {
    fn configure_ranges(
        &mut self,
        channel: Channel,
        voltage_range: f64,
        current_range: f64,
    ) -> Result<(), PulseError>;

    fn set_load(&mut self, channel: Channel, resistance_ohms: f64) -> Result<(), PulseError>;

    fn configure_sample_clock(&mut self, rate: f64) -> Result<(), PulseError>;

    fn program_segments(
        &mut self,
        channel: Channel,
        sequence_id: u32,
        segments: &[Segment],
    ) -> Result<(), PulseError>;

    fn program_waveform(
        &mut self,
        channel: Channel,
        sequence_id: u32,
        loop_count: u32,
    ) -> Result<(), PulseError>;

    fn arm_and_execute(&mut self, mode: ExecutionMode) -> Result<(), PulseError>;

    fn poll_execution_status(&mut self) -> Result<ExecutionStatus, PulseError>;

    fn fetch_captured(
        &mut self,
        channel: Channel,
        start_index: usize,
        stop_index: usize,
    ) -> Result<CaptureBuffer, PulseError>;
}

/// In-memory instrument that renders programmed segments into a synthetic
/// capture at the configured sample clock. Deterministic playback for tests
/// and the demo binary; optional noise rides on the rendered voltage.
pub struct SimulatedInstrument {
    sample_rate: f64,
    load_ohms: HashMap<Channel, f64>,
    programmed: HashMap<Channel, Vec<Segment>>,
    loop_counts: HashMap<Channel, u32>,
    captured: HashMap<Channel, CaptureBuffer>,
    polls_until_done: u32,
    polls_seen: u32,
    noise_amplitude: f64,
    rng: StdRng,
}

impl SimulatedInstrument {
    pub fn new() -> Self {
        Self {
            sample_rate: BASE_SAMPLE_RATE,
            load_ohms: HashMap::new(),
            programmed: HashMap::new(),
            loop_counts: HashMap::new(),
            captured: HashMap::new(),
            polls_until_done: 1,
            polls_seen: 0,
            noise_amplitude: 0.0,
            rng: StdRng::seed_from_u64(0x5051),
        }
    }

    /// Add uniform noise of the given amplitude to rendered voltages.
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    /// Report `Running` for this many polls before `Done`; lets tests drive
    /// the pipeline into its timeout path.
    pub fn with_polls_until_done(mut self, polls: u32) -> Self {
        self.polls_until_done = polls;
        self
    }

    fn load_for(&self, channel: Channel) -> f64 {
        self.load_ohms.get(&channel).copied().unwrap_or(1e6)
    }

    /// Piecewise-linear voltage of one programmed cycle at phase `t`.
    fn voltage_at(segments: &[Segment], t: f64) -> f64 {
        let mut elapsed = 0.0;
        for segment in segments {
            if t < elapsed + segment.duration {
                let frac = (t - elapsed) / segment.duration;
                return segment.start_voltage
                    + (segment.stop_voltage - segment.start_voltage) * frac;
            }
            elapsed += segment.duration;
        }
        segments.last().map(|s| s.stop_voltage).unwrap_or(0.0)
    }

    fn render(&mut self, channel: Channel) -> CaptureBuffer {
        let segments = self.programmed.get(&channel).cloned().unwrap_or_default();
        let loops = self.loop_counts.get(&channel).copied().unwrap_or(1).max(1);
        let cycle = total_duration(&segments);
        let total = cycle * f64::from(loops);
        let dt = 1.0 / self.sample_rate;
        let load = self.load_for(channel);
        let points = (total * self.sample_rate).floor() as usize;
        let mut buffer = CaptureBuffer::with_capacity(points);
        for k in 0..points {
            let t = k as f64 * dt;
            let phase = t % cycle;
            let mut v = Self::voltage_at(&segments, phase);
            if self.noise_amplitude > 0.0 {
                v += self.rng.gen_range(-self.noise_amplitude..=self.noise_amplitude);
            }
            buffer.push_sample(t, v, v / load);
        }
        buffer
    }
}

impl Default for SimulatedInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for SimulatedInstrument {
    fn configure_ranges(
        &mut self,
        channel: Channel,
        voltage_range: f64,
        current_range: f64,
    ) -> Result<(), PulseError> {
        debug!("{channel:?}: ranges {voltage_range} V / {current_range} A");
        Ok(())
    }

    fn set_load(&mut self, channel: Channel, resistance_ohms: f64) -> Result<(), PulseError> {
        if resistance_ohms <= 0.0 {
            return Err(PulseError::Instrument(format!(
                "load resistance {resistance_ohms} must be positive"
            )));
        }
        self.load_ohms.insert(channel, resistance_ohms);
        Ok(())
    }

    fn configure_sample_clock(&mut self, rate: f64) -> Result<(), PulseError> {
        if rate <= 0.0 {
            return Err(PulseError::Instrument(format!(
                "sample rate {rate} must be positive"
            )));
        }
        self.sample_rate = rate;
        Ok(())
    }

    fn program_segments(
        &mut self,
        channel: Channel,
        sequence_id: u32,
        segments: &[Segment],
    ) -> Result<(), PulseError> {
        if segments.is_empty() {
            return Err(PulseError::Instrument(
                "refusing to program an empty sequence".to_owned(),
            ));
        }
        debug!(
            "{channel:?}: programmed sequence {sequence_id} with {} segments",
            segments.len()
        );
        self.programmed.insert(channel, segments.to_vec());
        Ok(())
    }

    fn program_waveform(
        &mut self,
        channel: Channel,
        _sequence_id: u32,
        loop_count: u32,
    ) -> Result<(), PulseError> {
        self.loop_counts.insert(channel, loop_count);
        Ok(())
    }

    fn arm_and_execute(&mut self, mode: ExecutionMode) -> Result<(), PulseError> {
        if self.programmed.is_empty() {
            return Err(PulseError::Instrument(
                "arm requested with no programmed channel".to_owned(),
            ));
        }
        info!("executing in {mode:?} mode at {:.3e} Hz", self.sample_rate);
        self.polls_seen = 0;
        let channels: Vec<Channel> = self.programmed.keys().copied().collect();
        for channel in channels {
            let capture = self.render(channel);
            self.captured.insert(channel, capture);
        }
        Ok(())
    }

    fn poll_execution_status(&mut self) -> Result<ExecutionStatus, PulseError> {
        self.polls_seen += 1;
        if self.polls_seen >= self.polls_until_done {
            Ok(ExecutionStatus::Done)
        } else {
            Ok(ExecutionStatus::Running)
        }
    }

    fn fetch_captured(
        &mut self,
        channel: Channel,
        start_index: usize,
        stop_index: usize,
    ) -> Result<CaptureBuffer, PulseError> {
        let capture = self.captured.get(&channel).ok_or_else(|| {
            PulseError::Instrument(format!("{channel:?} has no captured waveform"))
        })?;
        let stop = stop_index.min(capture.len());
        let start = start_index.min(stop);
        CaptureBuffer::from_parts(
            capture.time[start..stop].to_vec(),
            capture.voltage[start..stop].to_vec(),
            capture.current[start..stop].to_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_pulse_segments;
    use crate::waveform::PulseWaveformSpec;

    fn programmed_instrument() -> SimulatedInstrument {
        let spec = PulseWaveformSpec::default();
        let segments = build_pulse_segments(&spec).unwrap();
        let mut sim = SimulatedInstrument::new();
        sim.set_load(Channel::One, 1e3).unwrap();
        sim.program_segments(Channel::One, 1, &segments).unwrap();
        sim.program_waveform(Channel::One, 1, 1).unwrap();
        sim
    }

    #[test]
    fn renders_the_programmed_flat_top() {
        let mut sim = programmed_instrument();
        sim.arm_and_execute(ExecutionMode::SegArb).unwrap();
        let capture = sim.fetch_captured(Channel::One, 0, usize::MAX).unwrap();
        assert!(!capture.is_empty());
        // Middle of the flat top: delay 1 us + rise 100 ns + half the width.
        let target = 1e-6 + 100e-9 + 250e-9;
        let idx = capture
            .time
            .iter()
            .position(|t| *t >= target)
            .expect("flat top inside capture");
        assert!((capture.voltage[idx] - 1.0).abs() < 1e-9);
        assert!((capture.current[idx] - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn poll_reports_done_after_the_configured_count() {
        let mut sim = programmed_instrument().with_polls_until_done(3);
        sim.arm_and_execute(ExecutionMode::SegArb).unwrap();
        assert_eq!(sim.poll_execution_status().unwrap(), ExecutionStatus::Running);
        assert_eq!(sim.poll_execution_status().unwrap(), ExecutionStatus::Running);
        assert_eq!(sim.poll_execution_status().unwrap(), ExecutionStatus::Done);
    }

    #[test]
    fn fetch_without_execution_is_an_instrument_error() {
        let mut sim = programmed_instrument();
        assert!(matches!(
            sim.fetch_captured(Channel::One, 0, 10),
            Err(PulseError::Instrument(_))
        ));
    }
}
