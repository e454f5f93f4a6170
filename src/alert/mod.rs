// Alerting over computed statistics
//
// Three rule kinds are supported:
// - threshold: statistic (or its confidence bound) outside fixed bounds
// - ci_overlap: branch interval disjoint from the reference branch interval
// - avg_diff: recent moving average far from the preceding window
//
// Rules are pure functions of the current statistic records plus, for
// avg_diff, previously computed history. Nothing here touches storage.

mod avg_diff;
mod ci_overlap;
mod engine;
mod rule;
mod threshold;

pub use avg_diff::{index_series, relative_change, window_averages, HISTORICAL_DIFFERENCE};
pub use ci_overlap::{intervals_overlap, BRANCH_DIFFERENCE};
pub use engine::AlertEngine;
pub use rule::{
    Alert, AlertRule, CiOverlapRule, HistoricalDeviationRule, RuleTarget, ThresholdRule,
};
pub use threshold::{VALUE_ABOVE_THRESHOLD, VALUE_BELOW_THRESHOLD};
