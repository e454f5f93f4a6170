#![no_main]

use libfuzzer_sys::fuzz_target;
use opstat::estimate::jackknife_percentile_ci;
use opstat::histogram::{Histogram, HistogramEntry};

fuzz_target!(|input: (f64, Vec<HistogramEntry>)| {
    let (p, entries) = input;
    let histogram = Histogram::from_entries(entries);

    if let Ok(Some(estimate)) = jackknife_percentile_ci(p, &histogram) {
        if estimate.point.is_finite() && estimate.lower.is_finite() && estimate.upper.is_finite() {
            assert!(estimate.lower <= estimate.point);
            assert!(estimate.point <= estimate.upper);
        }
    }
});
