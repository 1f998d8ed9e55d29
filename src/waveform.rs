use serde::{Deserialize, Serialize};

use crate::error::PulseError;
use crate::segment::MIN_SEGMENT_TIME;

/// Hardware ceiling on sweep points per run.
pub const MAX_SWEEP_POINTS: usize = 65536;
/// Hardware ceiling on `points per waveform x sweep points`.
pub const MAX_TOTAL_POINTS: usize = 65536;

/// Amplitude sweep attached to a pulse recipe.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoltageSweep {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

/// High-level description of a single-pulse waveform, consumed once by the
/// segment builder. All times are seconds, all levels volts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PulseWaveformSpec {
    pub delay: f64,
    pub rise: f64,
    pub width: f64,
    pub fall: f64,
    pub period: f64,
    pub base_voltage: f64,
    pub amplitude_voltage: f64,
    pub repeat_count: u32,
    #[serde(default = "default_acquire")]
    pub acquire: bool,
    #[serde(default)]
    pub sweep: Option<VoltageSweep>,
}

fn default_acquire() -> bool {
    true
}

impl Default for PulseWaveformSpec {
    fn default() -> Self {
        Self {
            delay: 1e-6,
            rise: 100e-9,
            width: 500e-9,
            fall: 100e-9,
            period: 2e-6,
            base_voltage: 0.0,
            amplitude_voltage: 1.0,
            repeat_count: 1,
            acquire: true,
            sweep: None,
        }
    }
}

impl PulseWaveformSpec {
    pub fn validate(&self) -> Result<(), PulseError> {
        for (name, value) in [
            ("rise", self.rise),
            ("width", self.width),
            ("fall", self.fall),
        ] {
            if value < MIN_SEGMENT_TIME {
                return Err(PulseError::InvalidTiming(format!(
                    "{name} {value} s is below the {MIN_SEGMENT_TIME} s minimum"
                )));
            }
        }
        if self.delay < 0.0 || self.period < 0.0 {
            return Err(PulseError::InvalidTiming(
                "delay and period must be non-negative".to_owned(),
            ));
        }
        if self.repeat_count == 0 {
            return Err(PulseError::InvalidParameter(
                "repeat count must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Per-bit timing of a binary pattern waveform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternTiming {
    pub delay: f64,
    pub width: f64,
    pub rise: f64,
    pub fall: f64,
    pub spacing: f64,
}

/// Low/high drive levels of a binary pattern waveform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternLevels {
    pub v_low: f64,
    pub v_high: f64,
}

/// Bit sequence plus timing and levels, consumed once by the pattern
/// sequencer. `declared_len` must match the bit string; keeping both catches
/// truncated patterns arriving from callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryPattern {
    pub bits: String,
    pub declared_len: usize,
    pub timing: PatternTiming,
    pub levels: PatternLevels,
    pub loop_count: u32,
}

impl BinaryPattern {
    pub fn validate(&self) -> Result<(), PulseError> {
        if self.bits.len() != self.declared_len {
            return Err(PulseError::InvalidParameter(format!(
                "pattern length {} does not match declared size {}",
                self.bits.len(),
                self.declared_len
            )));
        }
        if let Some(bad) = self.bits.chars().find(|c| *c != '0' && *c != '1') {
            return Err(PulseError::InvalidParameter(format!(
                "pattern contains non-binary character {bad:?}"
            )));
        }
        for (name, value) in [
            ("width", self.timing.width),
            ("rise", self.timing.rise),
            ("fall", self.timing.fall),
            ("spacing", self.timing.spacing),
        ] {
            if value < MIN_SEGMENT_TIME {
                return Err(PulseError::InvalidParameter(format!(
                    "{name} {value} s is below the {MIN_SEGMENT_TIME} s minimum"
                )));
            }
        }
        if self.loop_count == 0 {
            return Err(PulseError::InvalidParameter(
                "loop count must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Number of driven (`1`) bits; each contributes one measurable pulse.
    pub fn ones(&self) -> usize {
        self.bits.chars().filter(|c| *c == '1').count()
    }
}
