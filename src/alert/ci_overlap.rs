// Cross-branch alerts: confidence intervals that do not overlap
//
// Each non-reference branch is compared with the reference branch on the
// same time key, dimension tuple, metric, statistic and parameter.
// Records without both bounds, or without a reference counterpart, are
// skipped.

use crate::alert::rule::CiOverlapRule;
use crate::records::{AlertRecord, StatisticRecord, TimeKey};
use std::collections::HashMap;

pub const BRANCH_DIFFERENCE: &str = "Significant difference between branches";

/// Closed intervals `[low, high]` overlap iff each starts before the other ends
pub fn intervals_overlap(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

type ComparisonKey<'a> = (TimeKey, &'a [String], &'a str, &'a str, Option<&'a str>);

fn comparison_key(record: &StatisticRecord) -> ComparisonKey<'_> {
    (
        record.time_key,
        record.dimensions.as_slice(),
        record.metric.as_str(),
        record.statistic.as_str(),
        record.parameter.as_deref(),
    )
}

/// Alerts for branches whose interval is disjoint from the reference branch's
pub fn evaluate_ci_overlap(
    alert_name: &str,
    rule: &CiOverlapRule,
    reference_branch: &str,
    current: &[&StatisticRecord],
) -> Vec<AlertRecord> {
    let reference: HashMap<ComparisonKey<'_>, &StatisticRecord> = current
        .iter()
        .filter(|r| r.branch == reference_branch && rule.target.matches(r))
        .map(|r| (comparison_key(r), *r))
        .collect();

    current
        .iter()
        .filter(|r| r.branch != reference_branch && rule.target.matches(r))
        .filter_map(|record| {
            let counterpart = reference.get(&comparison_key(record))?;
            let ours = record.interval()?;
            let theirs = counterpart.interval()?;

            (!intervals_overlap(ours, theirs))
                .then(|| AlertRecord::for_record(alert_name, record, BRANCH_DIFFERENCE))
        })
        .collect()
}
