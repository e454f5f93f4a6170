//! Relative-frequency normalization
//!
//! Each entity's histograms are normalized to unit mass before they are
//! merged into the population distribution, so clients that report many
//! samples weigh as much as clients that report few.

use super::{merge, Histogram};

/// Sum histograms per key and scale to `weight` total mass
///
/// Each output value is `count(key) / count(all) * weight`. A zero total
/// yields zero for every key instead of an error.
pub fn normalized_sum(histograms: &[Histogram], weight: f64) -> Histogram {
    let mut summed = merge(histograms);
    let total = summed.total();

    for entry in &mut summed.values {
        entry.value = if total != 0.0 {
            entry.value / total * weight
        } else {
            0.0
        };
    }

    summed
}
