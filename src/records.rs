//! Row types exchanged with the storage layer
//!
//! Observations come in, statistic and alert records go out. All of them are
//! flat value types that serialize to one row each.

use crate::histogram::Histogram;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Temporal identity of a batch: a submission date or a build ordinal
///
/// Dates order by calendar, builds numerically. Mixed series are not
/// expected, but dates sort before builds if they ever meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeKey {
    Date(NaiveDate),
    Build(u64),
}

impl TimeKey {
    /// Calendar date of this key, if one can be derived
    ///
    /// Build ordinals like `20240209123456` carry their build date in the
    /// leading eight digits.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            TimeKey::Date(date) => Some(*date),
            TimeKey::Build(build) => {
                let digits = build.to_string();
                let prefix = digits.get(..8)?;
                NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
            }
        }
    }

    /// Whole days elapsed since `start`, if this key has a date
    pub fn days_since(&self, start: NaiveDate) -> Option<i64> {
        self.date().map(|date| (date - start).num_days())
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeKey::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            TimeKey::Build(build) => write!(f, "{}", build),
        }
    }
}

/// Raw per-entity value of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    /// Scalar measurement; `None` when the client did not report one
    Scalar(Option<f64>),
    Histogram(Histogram),
}

/// One row per (entity, time key, branch, dimension tuple, metric)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricObservation {
    /// Client identifier
    pub entity: String,
    pub time_key: TimeKey,
    pub branch: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub metric: String,
    pub value: ObservationValue,
}

/// Estimated statistic for one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticRecord {
    pub time_key: TimeKey,
    pub branch: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub metric: String,
    pub statistic: String,
    pub point: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    /// Distinguishes instances of one statistic kind (e.g. which percentile)
    pub parameter: Option<String>,
}

/// Identity of a time series of statistic records (everything but the time key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub branch: String,
    pub dimensions: Vec<String>,
    pub metric: String,
    pub statistic: String,
    pub parameter: Option<String>,
}

impl StatisticRecord {
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            branch: self.branch.clone(),
            dimensions: self.dimensions.clone(),
            metric: self.metric.clone(),
            statistic: self.statistic.clone(),
            parameter: self.parameter.clone(),
        }
    }

    /// Lower bound if present, else the point estimate
    pub fn lower_or_point(&self) -> Option<f64> {
        self.lower.or(self.point)
    }

    /// Upper bound if present, else the point estimate
    pub fn upper_or_point(&self) -> Option<f64> {
        self.upper.or(self.point)
    }

    /// Confidence interval, when both bounds are known
    pub fn interval(&self) -> Option<(f64, f64)> {
        Some((self.lower?, self.upper?))
    }
}

/// Alert raised for one statistic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub time_key: TimeKey,
    /// Name of the alert rule that fired
    pub alert: String,
    pub metric: String,
    pub statistic: String,
    pub branch: String,
    pub dimensions: Vec<String>,
    pub parameter: Option<String>,
    pub message: String,
}

impl AlertRecord {
    pub fn for_record(alert: &str, record: &StatisticRecord, message: &str) -> Self {
        Self {
            time_key: record.time_key,
            alert: alert.to_string(),
            metric: record.metric.clone(),
            statistic: record.statistic.clone(),
            branch: record.branch.clone(),
            dimensions: record.dimensions.clone(),
            parameter: record.parameter.clone(),
            message: message.to_string(),
        }
    }
}
