//! Jackknife confidence intervals for percentiles
//!
//! Each bucket in turn has its count reduced by one (the bucket stays in
//! place, even if it drops to zero or below) and the percentile is
//! recomputed. The spread of those leave-one-out estimates around the full
//! estimate gives the standard error:
//!
//! ```text
//! std_err = sqrt((n - 1) * mean((jk_i - point)^2))     n = number of buckets
//! [lower, upper] = point -/+ sqrt(2) * erfinv(level) * std_err
//! ```
//!
//! `n` counts buckets, not observations. In the population distribution
//! every client contributes unit mass, so "one" is one client's worth.

use crate::error::{OpstatError, Result};
use crate::estimate::percentile::{percentile, validate_percentile};
use crate::estimate::round2;
use crate::histogram::Histogram;
use std::f64::consts::PI;

/// Two-sided confidence level used unless a statistic overrides it
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.90;

/// Winitzki's constant for the closed-form inverse error function
const WINITZKI_A: f64 = 0.147;

/// Percentile point estimate with its confidence interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileEstimate {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Jackknife CI at the default 90% level
///
/// Returns `Ok(None)` when the histogram has fewer than two buckets.
pub fn jackknife_percentile_ci(p: f64, histogram: &Histogram) -> Result<Option<PercentileEstimate>> {
    jackknife_percentile_ci_at(p, histogram, DEFAULT_CONFIDENCE_LEVEL)
}

/// Jackknife CI at an explicit two-sided confidence level in (0, 1)
pub fn jackknife_percentile_ci_at(
    p: f64,
    histogram: &Histogram,
    confidence_level: f64,
) -> Result<Option<PercentileEstimate>> {
    validate_percentile(p)?;
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(OpstatError::validation(format!(
            "confidence level must be in (0, 1), got {}",
            confidence_level
        )));
    }

    if histogram.len() < 2 {
        return Ok(None);
    }

    let Some(point) = percentile(p, histogram)? else {
        return Ok(None);
    };

    let n = histogram.len();
    let mut sum_sq = 0.0;
    for i in 0..n {
        let mut variant = histogram.clone();
        variant.values[i].value -= 1.0;
        if let Some(jk) = percentile(p, &variant)? {
            sum_sq += (jk - point).powi(2);
        }
    }

    let mean_sq_error = sum_sq / n as f64;
    let std_err = ((n - 1) as f64 * mean_sq_error).sqrt();
    let margin = z_score(confidence_level) * std_err;

    Ok(Some(PercentileEstimate {
        point: round2(point),
        lower: round2(point - margin),
        upper: round2(point + margin),
    }))
}

/// Two-sided z multiplier: `sqrt(2) * erfinv(level)`
///
/// For the default 0.90 level this is ~1.645.
pub fn z_score(confidence_level: f64) -> f64 {
    2f64.sqrt() * erfinv(confidence_level)
}

/// Inverse error function, Winitzki's closed-form approximation
///
/// Absolute error is bounded by about 1.5e-2 over (-1, 1) and is far smaller
/// near the confidence levels used here. Exact inversion is not worth the
/// cost for interval half-widths.
pub fn erfinv(x: f64) -> f64 {
    if x == 0.0 {
        return 0.0;
    }

    let ln_one_minus_x_sq = (1.0 - x * x).ln();
    let t = 2.0 / (PI * WINITZKI_A) + ln_one_minus_x_sq / 2.0;
    let inner = (t * t - ln_one_minus_x_sq / WINITZKI_A).sqrt() - t;

    inner.sqrt().copysign(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::HistogramEntry;

    fn hist(pairs: &[(f64, f64)]) -> Histogram {
        Histogram::from_entries(pairs.iter().map(|&(k, v)| HistogramEntry::new(k, v)))
    }

    #[test]
    fn test_erfinv_known_values() {
        assert_eq!(erfinv(0.0), 0.0);
        // erfinv(0.9) = 1.1630871...
        assert!((erfinv(0.9) - 1.163_087).abs() < 1.5e-2);
        assert!((erfinv(-0.9) + erfinv(0.9)).abs() < 1e-12);
        // erfinv(0.5) = 0.4769362...
        assert!((erfinv(0.5) - 0.476_936).abs() < 1.5e-2);
    }

    #[test]
    fn test_default_z_score_near_1_645() {
        let z = z_score(DEFAULT_CONFIDENCE_LEVEL);
        assert!((z - 1.644_854).abs() < 0.02, "z = {}", z);
    }

    #[test]
    fn test_fewer_than_two_buckets_is_none() {
        assert_eq!(jackknife_percentile_ci(50.0, &Histogram::new()).unwrap(), None);
        assert_eq!(
            jackknife_percentile_ci(50.0, &hist(&[(3.0, 10.0)])).unwrap(),
            None
        );
    }

    #[test]
    fn test_invalid_percentile_fails_even_when_undefined() {
        assert!(jackknife_percentile_ci(101.0, &Histogram::new())
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_invalid_confidence_level_fails() {
        let h = hist(&[(1.0, 5.0), (2.0, 5.0)]);
        assert!(jackknife_percentile_ci_at(50.0, &h, 1.0).is_err());
        assert!(jackknife_percentile_ci_at(50.0, &h, 0.0).is_err());
    }

    #[test]
    fn test_interval_contains_point() {
        let h = hist(&[(1.0, 3.0), (2.0, 1.0), (4.0, 2.0), (8.0, 4.0)]);
        for p in [5.0, 25.0, 50.0, 75.0, 95.0] {
            let est = jackknife_percentile_ci(p, &h).unwrap().unwrap();
            assert!(est.lower <= est.point && est.point <= est.upper, "{:?}", est);
        }
    }

    #[test]
    fn test_stable_percentile_has_zero_width() {
        // Removing one unit from any bucket never moves the median off key 1
        let h = hist(&[(1.0, 50.0), (2.0, 10.0), (3.0, 10.0)]);
        let est = jackknife_percentile_ci(50.0, &h).unwrap().unwrap();
        assert_eq!(est.point, 1.0);
        assert_eq!(est.lower, 1.0);
        assert_eq!(est.upper, 1.0);
    }

    #[test]
    fn test_unstable_percentile_has_positive_width() {
        // Two equal buckets: dropping one unit from the first moves the median to 2
        let h = hist(&[(1.0, 1.0), (2.0, 1.0)]);
        let est = jackknife_percentile_ci(50.0, &h).unwrap().unwrap();
        assert_eq!(est.point, 1.0);
        assert!(est.upper > est.point);
        assert!(est.lower < est.point);
    }

    #[test]
    fn test_wider_level_gives_wider_interval() {
        let h = hist(&[(1.0, 1.0), (2.0, 1.0), (3.0, 1.0)]);
        let narrow = jackknife_percentile_ci_at(50.0, &h, 0.80).unwrap().unwrap();
        let wide = jackknife_percentile_ci_at(50.0, &h, 0.99).unwrap().unwrap();
        assert!(wide.upper - wide.lower >= narrow.upper - narrow.lower);
    }

    #[test]
    fn test_bounds_rounded_to_two_decimals() {
        let h = hist(&[(1.0, 1.0), (2.0, 1.0), (3.0, 1.0)]);
        let est = jackknife_percentile_ci(50.0, &h).unwrap().unwrap();
        for v in [est.lower, est.point, est.upper] {
            assert_eq!(v, (v * 100.0).round() / 100.0);
        }
    }
}
