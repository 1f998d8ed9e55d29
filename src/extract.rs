//! Extracts per-pulse averaged measurements from a captured waveform.
//!
//! Two detection strategies exist. The threshold strategy finds each pulse by
//! scanning for the voltage crossing half the programmed amplitude and
//! averages a fixed 40-80 % sub-window of it, skipping the rise/settling
//! head and the pre-fall tail. When it finds fewer pulses than expected, the
//! uniform-spacing fallback assumes the pulses are evenly spread over the
//! capture and places windows from the programmed timing instead. Partial
//! threshold results are discarded wholesale on fallback; merging the two
//! strategies would silently change legacy outputs.

use log::warn;

use crate::capture::CaptureBuffer;
use crate::error::PulseError;

/// Fraction of a detected pulse where the measurement sub-window opens.
pub const WINDOW_START_FRACTION: f64 = 0.4;
/// Fraction of a detected pulse where the measurement sub-window closes.
pub const WINDOW_STOP_FRACTION: f64 = 0.8;
/// Edge detection threshold as a fraction of the programmed amplitude.
pub const DETECTION_THRESHOLD_FRACTION: f64 = 0.5;
/// Legacy "no data" value carried by empty-window errors.
pub const EMPTY_WINDOW_SENTINEL: f64 = -999.0;

/// Half-open time span to average over, in capture timestamps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementWindow {
    pub start_time: f64,
    pub end_time: f64,
}

/// Mean voltage, current and timestamp over one measurement window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WindowAverage {
    pub voltage: f64,
    pub current: f64,
    pub timestamp: f64,
}

/// Which strategy produced the extraction result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionStrategy {
    Threshold,
    UniformFallback,
}

/// Programmed per-pulse timing, used by the uniform-spacing fallback to
/// place windows when edge detection comes up short.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PulseTiming {
    pub delay: f64,
    pub rise: f64,
    pub width: f64,
}

/// A window that produced no usable average, with the reason it was skipped.
#[derive(Clone, Debug)]
pub struct DroppedWindow {
    pub index: usize,
    pub reason: String,
}

/// Result of extracting `expected` pulses from one capture. `averages` always
/// holds exactly `expected` entries; slots past the produced count are
/// zero-filled, and `dropped` records the windows that failed.
#[derive(Clone, Debug)]
pub struct ExtractionOutcome {
    pub averages: Vec<WindowAverage>,
    pub strategy: DetectionStrategy,
    pub dropped: Vec<DroppedWindow>,
}

/// Average voltage/current/time over every sample with
/// `start_time <= t <= end_time`. Pure: identical inputs always produce the
/// identical average.
pub fn extract_window_average(
    buffer: &CaptureBuffer,
    window: MeasurementWindow,
) -> Result<WindowAverage, PulseError> {
    let mut count = 0usize;
    let mut voltage_sum = 0.0;
    let mut current_sum = 0.0;
    let mut time_sum = 0.0;
    for idx in 0..buffer.len() {
        let t = buffer.time[idx];
        if t >= window.start_time && t <= window.end_time {
            voltage_sum += buffer.voltage[idx];
            current_sum += buffer.current[idx];
            time_sum += t;
            count += 1;
        }
    }
    if count == 0 {
        return Err(PulseError::EmptyWindow {
            start: window.start_time,
            stop: window.end_time,
        });
    }
    let n = count as f64;
    Ok(WindowAverage {
        voltage: voltage_sum / n,
        current: current_sum / n,
        timestamp: time_sum / n,
    })
}

/// Threshold strategy: locate up to `expected` pulses by scanning for
/// `|V| > 0.5 * |amplitude|` crossings and return the 40-80 % sub-window of
/// each. A pulse whose trailing edge never returns below the threshold is
/// not counted.
pub fn detect_pulse_windows(
    buffer: &CaptureBuffer,
    amplitude_voltage: f64,
    expected: usize,
) -> Vec<MeasurementWindow> {
    let threshold = DETECTION_THRESHOLD_FRACTION * amplitude_voltage.abs();
    let mut windows = Vec::with_capacity(expected);
    let mut idx = 0;
    let len = buffer.len();
    while windows.len() < expected && idx < len {
        while idx < len && buffer.voltage[idx].abs() <= threshold {
            idx += 1;
        }
        if idx >= len {
            break;
        }
        let pulse_start = idx;
        while idx < len && buffer.voltage[idx].abs() > threshold {
            idx += 1;
        }
        if idx >= len {
            break;
        }
        let start_time = buffer.time[pulse_start];
        let span = buffer.time[idx] - start_time;
        windows.push(MeasurementWindow {
            start_time: start_time + WINDOW_START_FRACTION * span,
            end_time: start_time + WINDOW_STOP_FRACTION * span,
        });
    }
    windows
}

/// Fallback strategy: assume `expected` pulses evenly spread across the
/// capture and place each window from the programmed timing,
/// `delay + rise + {0.4, 0.8} * width` past the assumed pulse start.
pub fn uniform_fallback_windows(
    buffer: &CaptureBuffer,
    timing: PulseTiming,
    expected: usize,
) -> Vec<MeasurementWindow> {
    let (Some(first), Some(last)) = (buffer.first_timestamp(), buffer.last_timestamp()) else {
        return Vec::new();
    };
    if expected == 0 {
        return Vec::new();
    }
    let estimated_period = (last - first) / expected as f64;
    (0..expected)
        .map(|pulse| {
            let pulse_start = first + pulse as f64 * estimated_period;
            let base = pulse_start + timing.delay + timing.rise;
            MeasurementWindow {
                start_time: base + WINDOW_START_FRACTION * timing.width,
                end_time: base + WINDOW_STOP_FRACTION * timing.width,
            }
        })
        .collect()
}

/// Extract one averaged measurement per expected pulse.
///
/// Tries the threshold strategy first. When it recovers fewer than
/// `expected` pulses the partial results are discarded and the
/// uniform-spacing fallback runs instead. Failure on one window does not
/// abort the rest: the slot stays zero-filled and the drop is recorded.
pub fn extract_pulse_averages(
    buffer: &CaptureBuffer,
    amplitude_voltage: f64,
    timing: PulseTiming,
    expected: usize,
) -> ExtractionOutcome {
    let mut averages = vec![WindowAverage::default(); expected];
    let mut dropped = Vec::new();

    if buffer.is_empty() {
        for index in 0..expected {
            dropped.push(DroppedWindow {
                index,
                reason: "capture buffer is empty".to_owned(),
            });
        }
        return ExtractionOutcome {
            averages,
            strategy: DetectionStrategy::Threshold,
            dropped,
        };
    }

    let detected = detect_pulse_windows(buffer, amplitude_voltage, expected);
    let (windows, strategy) = if detected.len() < expected {
        // Legacy behavior: partial threshold hits are not merged with the
        // fallback, they are thrown away entirely.
        warn!(
            "threshold detection recovered {} of {expected} pulses; \
             discarding partial results and assuming uniform spacing",
            detected.len()
        );
        (
            uniform_fallback_windows(buffer, timing, expected),
            DetectionStrategy::UniformFallback,
        )
    } else {
        (detected, DetectionStrategy::Threshold)
    };

    for (index, window) in windows.iter().enumerate() {
        match extract_window_average(buffer, *window) {
            Ok(average) => averages[index] = average,
            Err(err) => dropped.push(DroppedWindow {
                index,
                reason: err.to_string(),
            }),
        }
    }

    ExtractionOutcome {
        averages,
        strategy,
        dropped,
    }
}
