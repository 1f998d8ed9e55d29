//! Chooses a capture sample rate and point budget under the hardware
//! point-count ceiling.

use log::debug;

use crate::error::PulseError;

/// Base sample clock of the capture hardware.
pub const BASE_SAMPLE_RATE: f64 = 200e6;
/// Largest divisor of the base clock the hardware supports.
pub const DEFAULT_MAX_DIVISOR: u32 = 1000;
/// The min-segment variant requires at least this many samples inside the
/// shortest compiled segment.
pub const MIN_SAMPLES_PER_SEGMENT: f64 = 2.0;

/// Chosen sample rate and the point counts derived from it. Produced once,
/// then used to size the capture buffer and program the instrument clock.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBudget {
    pub requested_duration: f64,
    pub max_points: usize,
    pub chosen_rate: f64,
    pub divisor: u32,
    pub allocated_points: usize,
    pub derived_point_count: usize,
}

/// Select the highest feasible sample rate for `total_duration` seconds of
/// capture within `max_points` samples, against the default 200 MHz clock.
pub fn select_rate(total_duration: f64, max_points: usize) -> Result<SampleBudget, PulseError> {
    select_rate_with(total_duration, max_points, BASE_SAMPLE_RATE, DEFAULT_MAX_DIVISOR)
}

/// Divisor search behind [`select_rate`].
///
/// Walks the divisor upward and returns on the first candidate whose point
/// count fits. This first-fit bias is preserved deliberately: downstream
/// comparisons depend on the exact legacy point counts, so do not replace it
/// with a best-fit search.
pub fn select_rate_with(
    total_duration: f64,
    max_points: usize,
    base_rate: f64,
    max_divisor: u32,
) -> Result<SampleBudget, PulseError> {
    if total_duration <= 0.0 {
        return Err(PulseError::InvalidParameter(format!(
            "capture duration {total_duration} s must be positive"
        )));
    }
    if max_points < 4 {
        return Err(PulseError::InvalidParameter(format!(
            "point budget {max_points} is too small to capture anything"
        )));
    }
    let rate_floor = base_rate / f64::from(max_divisor);
    for divisor in 1..=(2 * max_divisor) {
        let candidate_rate = base_rate / f64::from(divisor);
        let candidate_points = (total_duration * candidate_rate).ceil() as usize + 2;
        if candidate_points < max_points {
            if candidate_rate < rate_floor {
                break;
            }
            let derived_point_count = (total_duration * candidate_rate + 0.5).round() as usize;
            debug!(
                "sample budget: divisor {divisor}, rate {candidate_rate:.3e} Hz, \
                 {candidate_points} allocated / {derived_point_count} derived points"
            );
            return Ok(SampleBudget {
                requested_duration: total_duration,
                max_points,
                chosen_rate: candidate_rate,
                divisor,
                allocated_points: candidate_points,
                derived_point_count,
            });
        }
    }
    Err(PulseError::InsufficientRate {
        requested_duration: total_duration,
        max_points,
    })
}

/// Like [`select_rate`], but also guards very short segments: the chosen rate
/// must land at least [`MIN_SAMPLES_PER_SEGMENT`] samples inside the shortest
/// segment of the compiled sequence, otherwise the budget is rejected.
pub fn select_rate_with_min_segment(
    total_duration: f64,
    max_points: usize,
    min_segment_duration: f64,
) -> Result<SampleBudget, PulseError> {
    let budget = select_rate(total_duration, max_points)?;
    if budget.chosen_rate * min_segment_duration < MIN_SAMPLES_PER_SEGMENT {
        return Err(PulseError::InsufficientRate {
            requested_duration: total_duration,
            max_points,
        });
    }
    Ok(budget)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_capture_keeps_the_full_clock() {
        let budget = select_rate(1e-6, 10_000).unwrap();
        assert_eq!(budget.divisor, 1);
        assert_eq!(budget.chosen_rate, 200e6);
        // ceil(1e-6 * 200e6) + 2
        assert_eq!(budget.allocated_points, 202);
    }

    #[test]
    fn long_capture_divides_the_clock_first_fit() {
        // 1 ms at 200 MHz would need 200_002 points; divisor 2 fits.
        let budget = select_rate(1e-3, 150_000).unwrap();
        assert_eq!(budget.divisor, 2);
        assert_eq!(budget.chosen_rate, 100e6);
        assert_eq!(budget.allocated_points, 100_002);
    }

    #[test]
    fn infeasible_budget_reports_insufficient_rate() {
        assert!(matches!(
            select_rate(1.0, 1_000),
            Err(PulseError::InsufficientRate { .. })
        ));
    }

    #[test]
    fn min_segment_variant_rejects_starved_segments() {
        // Budget forces the rate below 1 MHz; a 20 ns segment would get far
        // fewer than two samples.
        assert!(matches!(
            select_rate_with_min_segment(5e-3, 5_000, 20e-9),
            Err(PulseError::InsufficientRate { .. })
        ));
        // At the full clock a 20 ns segment holds four samples.
        let budget = select_rate_with_min_segment(1e-6, 10_000, 20e-9).unwrap();
        assert_eq!(budget.divisor, 1);
    }

    #[test]
    fn degenerate_inputs_are_rejected_up_front() {
        assert!(select_rate(0.0, 10_000).is_err());
        assert!(select_rate(1e-6, 3).is_err());
    }
}
