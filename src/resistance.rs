//! Turns an averaged voltage/current pair into a clamped resistance value.

use crate::extract::WindowAverage;

/// Numerator of the resistance clamp; `1e4 / current_range` is the largest
/// resistance downstream consumers expect, and the value substituted when
/// the measured current is effectively zero. Part of the output contract.
pub const RESISTANCE_CLAMP_NUMERATOR: f64 = 1e4;
/// Currents smaller than this are treated as zero.
pub const CURRENT_EPSILON: f64 = 1e-12;

/// Resistance from an averaged voltage/current pair, optionally corrected by
/// an offset (baseline) current, clamped to `1e4 / current_range_limit`.
pub fn compute_resistance(
    voltage: f64,
    current: f64,
    offset_current: f64,
    current_range_limit: f64,
) -> f64 {
    let ceiling = RESISTANCE_CLAMP_NUMERATOR / current_range_limit;
    let net_current = current - offset_current;
    if net_current.abs() > CURRENT_EPSILON {
        (voltage / net_current).abs().min(ceiling)
    } else {
        ceiling
    }
}

/// Resistance of a windowed average against an optional baseline window.
pub fn compute_resistance_with_baseline(
    average: &WindowAverage,
    baseline: Option<&WindowAverage>,
    current_range_limit: f64,
) -> f64 {
    let offset_current = baseline.map(|b| b.current).unwrap_or(0.0);
    compute_resistance(
        average.voltage,
        average.current,
        offset_current,
        current_range_limit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_zero_current_returns_the_clamp() {
        assert_eq!(compute_resistance(0.5, 1e-15, 0.0, 0.01), 1_000_000.0);
    }

    #[test]
    fn ohmic_value_passes_through() {
        assert!((compute_resistance(0.5, 1e-3, 0.0, 0.01) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn large_ratio_is_clamped() {
        assert_eq!(compute_resistance(10.0, 2e-12, 0.0, 0.01), 1_000_000.0);
    }

    #[test]
    fn offset_current_is_subtracted_before_dividing() {
        let r = compute_resistance(1.0, 1.1e-3, 0.1e-3, 0.01);
        assert!((r - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn baseline_window_supplies_the_offset() {
        let average = WindowAverage {
            voltage: 1.0,
            current: 1.1e-3,
            timestamp: 0.0,
        };
        let baseline = WindowAverage {
            voltage: 0.0,
            current: 0.1e-3,
            timestamp: 0.0,
        };
        let r = compute_resistance_with_baseline(&average, Some(&baseline), 0.01);
        assert!((r - 1000.0).abs() < 1e-6);
    }
}
