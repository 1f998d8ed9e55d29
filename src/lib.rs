// src/lib.rs
// Segment compiler and capture-window extraction for a two-channel pulse
// source/measure instrument.
pub mod builder;
pub mod capture;
pub mod error;
pub mod extract;
pub mod instrument;
pub mod pattern;
pub mod pipeline;
pub mod resistance;
pub mod sampling;
pub mod segment;
pub mod waveform;
// Re-export the types thin callers need so they never reach into modules.
pub use builder::{build_pulse_segments, build_sweep_segments, sweep_point_count};
pub use capture::{CaptureBuffer, CaptureSession};
pub use error::PulseError;
pub use extract::{
    detect_pulse_windows, extract_pulse_averages, extract_window_average, uniform_fallback_windows,
    DetectionStrategy, ExtractionOutcome, MeasurementWindow, PulseTiming, WindowAverage,
};
pub use instrument::{
    Channel, ExecutionMode, ExecutionStatus, Instrument, SimulatedInstrument,
};
pub use pattern::build_binary_segments;
pub use pipeline::{
    DroppedProbe, MeasurementConfig, MeasurementOutcome, PollPolicy, ProbeResult,
    PulseMeasurement,
};
pub use resistance::{compute_resistance, compute_resistance_with_baseline};
pub use sampling::{select_rate, select_rate_with, select_rate_with_min_segment, SampleBudget};
pub use segment::{MeasureType, Segment};
pub use waveform::{
    BinaryPattern, PatternLevels, PatternTiming, PulseWaveformSpec, VoltageSweep,
};
