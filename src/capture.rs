use crate::error::PulseError;
use crate::sampling::SampleBudget;

/// Captured waveform as parallel time/voltage/current arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureBuffer {
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
}

impl CaptureBuffer {
    pub fn with_capacity(points: usize) -> Self {
        Self {
            time: Vec::with_capacity(points),
            voltage: Vec::with_capacity(points),
            current: Vec::with_capacity(points),
        }
    }

    /// Build a buffer from already-collected arrays, checking they are the
    /// same length.
    pub fn from_parts(
        time: Vec<f64>,
        voltage: Vec<f64>,
        current: Vec<f64>,
    ) -> Result<Self, PulseError> {
        if time.len() != voltage.len() || time.len() != current.len() {
            return Err(PulseError::InvalidParameter(format!(
                "capture arrays disagree on length: {} time, {} voltage, {} current",
                time.len(),
                voltage.len(),
                current.len()
            )));
        }
        Ok(Self {
            time,
            voltage,
            current,
        })
    }

    pub fn push_sample(&mut self, time: f64, voltage: f64, current: f64) {
        self.time.push(time);
        self.voltage.push(voltage);
        self.current.push(current);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.time.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.time.last().copied()
    }
}

/// Caller-owned scratch state for one measurement run.
///
/// One session owns one budget and one capture buffer, is filled exactly
/// once, and is dropped when extraction completes. Runs never share or reuse
/// a session, which is what makes concurrent runs safe.
#[derive(Debug)]
pub struct CaptureSession {
    budget: SampleBudget,
    buffer: CaptureBuffer,
    filled: bool,
}

impl CaptureSession {
    pub fn new(budget: SampleBudget) -> Self {
        let buffer = CaptureBuffer::with_capacity(budget.derived_point_count);
        Self {
            budget,
            buffer,
            filled: false,
        }
    }

    pub fn budget(&self) -> &SampleBudget {
        &self.budget
    }

    /// Install the fetched capture. A session accepts exactly one fill.
    pub fn fill(&mut self, buffer: CaptureBuffer) -> Result<(), PulseError> {
        if self.filled {
            return Err(PulseError::InvalidParameter(
                "capture session was already filled".to_owned(),
            ));
        }
        self.buffer = buffer;
        self.filled = true;
        Ok(())
    }

    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> CaptureBuffer {
        self.buffer
    }
}
