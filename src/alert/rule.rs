//! Alert rule configuration
//!
//! Rules live in the project TOML next to the metrics they watch:
//!
//! ```toml
//! [[alert]]
//! name = "startup_too_slow"
//! type = "threshold"
//! metrics = ["startup_ms"]
//! statistics = ["percentile"]
//! parameters = [50, 90]
//! max = [800, 2000]
//!
//! [[alert]]
//! name = "startup_branches_differ"
//! type = "ci_overlap"
//! metrics = ["startup_ms"]
//! reference_branch = "control"
//!
//! [[alert]]
//! name = "startup_drift"
//! type = "avg_diff"
//! metrics = ["startup_ms"]
//! window_size = 7
//! max_relative_change = 0.5
//! ```

use crate::records::StatisticRecord;
use serde::{Deserialize, Deserializer, Serialize};

/// A named alert rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    /// Unique name, reported on every alert record this rule emits
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub rule: AlertRule,
}

/// The kind of check an alert performs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertRule {
    /// Statistic outside fixed `min` / `max` bounds
    Threshold(ThresholdRule),

    /// Confidence interval of a branch disjoint from the reference branch's
    CiOverlap(CiOverlapRule),

    /// Recent moving average far from the preceding window's average
    #[serde(rename = "avg_diff")]
    HistoricalDeviation(HistoricalDeviationRule),
}

impl AlertRule {
    pub fn target(&self) -> &RuleTarget {
        match self {
            AlertRule::Threshold(rule) => &rule.target,
            AlertRule::CiOverlap(rule) => &rule.target,
            AlertRule::HistoricalDeviation(rule) => &rule.target,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AlertRule::Threshold(_) => "threshold",
            AlertRule::CiOverlap(_) => "ci_overlap",
            AlertRule::HistoricalDeviation(_) => "avg_diff",
        }
    }
}

/// Which statistic records a rule looks at
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleTarget {
    pub metrics: Vec<String>,

    /// Restrict to these statistic kinds; all kinds when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Vec<String>>,

    /// Restrict to these parameters; positions index `min` / `max`
    #[serde(
        default,
        deserialize_with = "deserialize_parameters",
        skip_serializing_if = "Option::is_none"
    )]
    pub parameters: Option<Vec<String>>,
}

impl RuleTarget {
    /// Position of the record's parameter if the record is targeted
    ///
    /// Without a parameter filter every record of a targeted metric and
    /// statistic matches at position 0.
    pub fn position(&self, record: &StatisticRecord) -> Option<usize> {
        if !self.metrics.iter().any(|m| *m == record.metric) {
            return None;
        }

        if let Some(statistics) = &self.statistics {
            if !statistics.iter().any(|s| *s == record.statistic) {
                return None;
            }
        }

        match &self.parameters {
            None => Some(0),
            Some(parameters) => {
                let parameter = record.parameter.as_deref()?;
                parameters.iter().position(|p| p == parameter)
            }
        }
    }

    pub fn matches(&self, record: &StatisticRecord) -> bool {
        self.position(record).is_some()
    }
}

/// Fixed bounds per parameter position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdRule {
    #[serde(flatten)]
    pub target: RuleTarget,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Vec<f64>>,
}

impl ThresholdRule {
    pub fn min_at(&self, position: usize) -> Option<f64> {
        self.min.as_ref()?.get(position).copied()
    }

    pub fn max_at(&self, position: usize) -> Option<f64> {
        self.max.as_ref()?.get(position).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CiOverlapRule {
    #[serde(flatten)]
    pub target: RuleTarget,

    /// Branch every other branch is compared against; falls back to the
    /// project's reference branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalDeviationRule {
    #[serde(flatten)]
    pub target: RuleTarget,

    /// Number of samples in each of the two compared windows
    pub window_size: usize,

    /// Alert when `|recent - prior| / recent` exceeds this
    pub max_relative_change: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParameterValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    fn into_label(self) -> String {
        match self {
            ParameterValue::Integer(i) => i.to_string(),
            ParameterValue::Float(f) => f.to_string(),
            ParameterValue::Text(s) => s,
        }
    }
}

/// Accept `parameters = [50, 90]` as well as `parameters = ["50", "90"]`
fn deserialize_parameters<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<ParameterValue>>::deserialize(deserializer)?;
    Ok(values.map(|values| values.into_iter().map(ParameterValue::into_label).collect()))
}
