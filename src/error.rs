use thiserror::Error;

/// Failure taxonomy for the pulse pipeline.
///
/// Validation failures (`InvalidParameter`, `InvalidTiming`,
/// `InsufficientCapacity`, `InsufficientRate`) are raised before any
/// instrument interaction. Instrument and timeout failures abort the run and
/// are surfaced verbatim; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
    #[error("capacity exceeded: {0}")]
    InsufficientCapacity(String),
    #[error(
        "no feasible sample rate for duration {requested_duration} s within {max_points} points"
    )]
    InsufficientRate {
        requested_duration: f64,
        max_points: usize,
    },
    #[error("instrument error: {0}")]
    Instrument(String),
    #[error("execution polling exceeded {polls} polls")]
    Timeout { polls: usize },
    #[error("measurement window [{start} s, {stop} s] contains no samples")]
    EmptyWindow { start: f64, stop: f64 },
}

impl PulseError {
    /// Legacy sentinel reported for a window with no samples.
    ///
    /// Downstream consumers recognize `-999.0` as "no data"; we keep the
    /// value on the error rather than substituting it silently.
    pub fn sentinel(&self) -> Option<f64> {
        match self {
            PulseError::EmptyWindow { .. } => Some(crate::extract::EMPTY_WINDOW_SENTINEL),
            _ => None,
        }
    }
}
