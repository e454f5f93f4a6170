//! Point percentile from a bucketed distribution

use crate::error::{OpstatError, Result};
use crate::histogram::Histogram;

/// Reject percentiles outside [0, 100]
pub fn validate_percentile(p: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&p) {
        return Err(OpstatError::validation(format!(
            "percentile must be a value between 0 and 100, got {}",
            p
        )));
    }
    Ok(())
}

/// Key at which the cumulative mass first reaches `p` percent
///
/// The distribution is re-normalized by its total, so raw counts and
/// relative frequencies give the same answer. There is no interpolation
/// between buckets: the result is the bucket's own key, which undershoots
/// the true percentile by up to one bucket width. If floating-point
/// rounding keeps the cumulative mass just below the target, the last key
/// is returned.
///
/// Returns `Ok(None)` for an empty distribution.
///
/// # Example
/// ```
/// use opstat::estimate::percentile;
/// use opstat::histogram::{Histogram, HistogramEntry};
///
/// let h = Histogram::from_entries([HistogramEntry::new(1.0, 3.0), HistogramEntry::new(2.0, 1.0)]);
/// assert_eq!(percentile(50.0, &h).unwrap(), Some(1.0));
/// assert_eq!(percentile(90.0, &h).unwrap(), Some(2.0));
/// ```
pub fn percentile(p: f64, histogram: &Histogram) -> Result<Option<f64>> {
    validate_percentile(p)?;

    let total = histogram.total();
    let target = p / 100.0;
    let mut cumulative = 0.0;

    for entry in &histogram.values {
        cumulative += entry.value / total;
        if cumulative >= target {
            return Ok(Some(entry.key));
        }
    }

    Ok(histogram.values.last().map(|e| e.key))
}
