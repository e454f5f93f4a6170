// Percentile estimation with jackknife confidence intervals
//
// Works on the population distribution produced by normalizing each
// client's histogram and merging the results. Both functions are pure and
// operate on bucket keys only: no interpolation, no resampling randomness.
//
// Error policy:
// - percentile outside [0, 100]  -> OpstatError::Validation
// - empty distribution           -> Ok(None)
// - fewer than two buckets (CI)  -> Ok(None)

mod jackknife;
mod percentile;

pub use jackknife::{
    erfinv, jackknife_percentile_ci, jackknife_percentile_ci_at, z_score, PercentileEstimate,
    DEFAULT_CONFIDENCE_LEVEL,
};
pub use percentile::{percentile, validate_percentile};

/// Round to two decimal places the way the output columns are formatted
pub(crate) fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(-0.996), -1.0);
        assert_eq!(round2(42.0), 42.0);
    }
}
