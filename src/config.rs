//! Project configuration (TOML)
//!
//! A project file declares what to monitor and when to alert:
//!
//! ```toml
//! [project]
//! name = "Firefox Nightly"
//! start_date = "2024-02-01"
//! reference_branch = "control"
//!
//! [[dimension]]
//! name = "os"
//!
//! [[metric]]
//! name = "startup_ms"
//! type = "scalar"
//! statistics = [{ kind = "mean" }, { kind = "percentile", percentiles = [50, 90] }]
//!
//! [[alert]]
//! name = "startup_budget"
//! type = "threshold"
//! metrics = ["startup_ms"]
//! statistics = ["percentile"]
//! parameters = [50, 90]
//! max = [800, 2000]
//! ```

use crate::alert::{Alert, AlertRule};
use crate::error::{OpstatError, Result};
use crate::estimate::validate_percentile;
use crate::records::TimeKey;
use crate::statistic::{MetricType, Statistic};
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Upper bound on declared dimensions; every run computes `2^n` roll-ups
pub const MAX_DIMENSIONS: usize = 8;

/// Root of a project TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    pub project: ProjectSettings,

    #[serde(rename = "dimension", default)]
    pub dimensions: Vec<Dimension>,

    #[serde(rename = "metric", default)]
    pub metrics: Vec<MetricConfig>,

    #[serde(rename = "alert", default)]
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSettings {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// First day of monitoring; runs are refused without it
    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    /// Last day of monitoring; open-ended when unset
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    /// Temporarily disable the project without deleting it
    #[serde(default)]
    pub skip: bool,

    #[serde(default)]
    pub monitoring_period: MonitoringPeriod,

    /// Branch that `ci_overlap` alerts compare against by default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_branch: Option<String>,
}

/// What a time key counts: submission days or builds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringPeriod {
    #[default]
    Day,
    BuildId,
}

impl MonitoringPeriod {
    /// Parse a command-line time key: `YYYY-MM-DD` for days, a build ordinal otherwise
    pub fn parse_time_key(&self, raw: &str) -> Result<TimeKey> {
        match self {
            MonitoringPeriod::Day => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(TimeKey::Date)
                .map_err(|e| OpstatError::validation(format!("invalid date '{}': {}", raw, e))),
            MonitoringPeriod::BuildId => raw
                .parse::<u64>()
                .map(TimeKey::Build)
                .map_err(|e| OpstatError::validation(format!("invalid build id '{}': {}", raw, e))),
        }
    }
}

/// A dimension observations are sliced by
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dimension {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub metric_type: MetricType,

    #[serde(default)]
    pub statistics: Vec<Statistic>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProjectConfig {
    /// Load a project from a TOML file
    ///
    /// Parsing only; call [`ProjectConfig::validate`] before running.
    ///
    /// ```no_run
    /// use opstat::config::ProjectConfig;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = ProjectConfig::from_file("nightly.toml")?;
    /// config.validate()?;
    /// println!("{} metrics", config.metrics.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Invalid project {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    pub fn metric(&self, name: &str) -> Option<&MetricConfig> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Project name with everything but `[A-Za-z0-9_]` replaced by `_`,
    /// usable as a table or file name
    pub fn normalized_slug(&self) -> String {
        self.project
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    }

    /// Check the configuration is internally consistent
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(OpstatError::configuration(&self.project.name, message));

        if let (Some(start), Some(end)) = (self.project.start_date, self.project.end_date) {
            if start > end {
                return fail(format!("Start date {} is after end date {}", start, end));
            }
        }

        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if !seen.insert(metric.name.as_str()) {
                return fail(format!("Duplicate metric {}", metric.name));
            }
        }

        if self.dimensions.len() > MAX_DIMENSIONS {
            return fail(format!(
                "{} dimensions declared, at most {} are supported",
                self.dimensions.len(),
                MAX_DIMENSIONS
            ));
        }

        let mut seen = HashSet::new();
        for dimension in &self.dimensions {
            if !seen.insert(dimension.name.as_str()) {
                return fail(format!("Duplicate dimension {}", dimension.name));
            }
        }

        for metric in &self.metrics {
            self.validate_metric(metric).or_else(fail)?;
        }

        let mut seen = HashSet::new();
        for alert in &self.alerts {
            if !seen.insert(alert.name.as_str()) {
                return fail(format!("Duplicate alert {}", alert.name));
            }
            self.validate_alert(alert)
                .or_else(|message| fail(format!("Alert {}: {}", alert.name, message)))?;
        }

        Ok(())
    }

    fn validate_metric(&self, metric: &MetricConfig) -> std::result::Result<(), String> {
        for statistic in &metric.statistics {
            if !statistic.supports(metric.metric_type) {
                return Err(format!(
                    "Statistic {} not implemented for type {} ({})",
                    statistic.name(),
                    metric.metric_type,
                    metric.name
                ));
            }

            match statistic {
                Statistic::Percentile {
                    percentiles,
                    confidence_level,
                } => {
                    for &p in percentiles {
                        validate_percentile(p).map_err(|e| format!("{} ({})", e, metric.name))?;
                    }
                    if let Some(level) = confidence_level {
                        if level.is_nan() || *level <= 0.0 || *level >= 1.0 {
                            return Err(format!(
                                "Confidence level {} of {} must be in (0, 1)",
                                level, metric.name
                            ));
                        }
                    }
                }
                Statistic::Quantile {
                    number_of_quantiles,
                    quantile,
                } => {
                    if *number_of_quantiles == 0 || quantile > number_of_quantiles {
                        return Err(format!(
                            "Quantile {}/{} of {} is out of range",
                            quantile, number_of_quantiles, metric.name
                        ));
                    }
                }
                Statistic::TotalRatio { denominator_metric } => {
                    match self.metric(denominator_metric) {
                        Some(denominator) if denominator.metric_type == MetricType::Scalar => {}
                        Some(_) => {
                            return Err(format!(
                                "Denominator {} of {} must be a scalar metric",
                                denominator_metric, metric.name
                            ))
                        }
                        None => {
                            return Err(format!(
                                "Unknown denominator metric {} for {}",
                                denominator_metric, metric.name
                            ))
                        }
                    }
                }
                Statistic::Count | Statistic::Sum | Statistic::Mean => {}
            }
        }
        Ok(())
    }

    fn validate_alert(&self, alert: &Alert) -> std::result::Result<(), String> {
        let target = alert.rule.target();

        if target.metrics.is_empty() {
            return Err("no metrics".to_string());
        }
        for name in &target.metrics {
            if self.metric(name).is_none() {
                return Err(format!("unknown metric {}", name));
            }
        }
        if let Some(statistics) = &target.statistics {
            for name in statistics {
                if !Statistic::known_names().contains(&name.as_str()) {
                    return Err(format!("unknown statistic {}", name));
                }
            }
        }

        match &alert.rule {
            AlertRule::Threshold(rule) => {
                if rule.min.is_none() && rule.max.is_none() {
                    return Err("threshold needs min or max".to_string());
                }
                let expected = target.parameters.as_ref().map_or(1, Vec::len);
                for (side, bounds) in [("min", &rule.min), ("max", &rule.max)] {
                    if let Some(bounds) = bounds {
                        if bounds.len() != expected {
                            return Err(format!(
                                "{} has {} entries, expected {}",
                                side,
                                bounds.len(),
                                expected
                            ));
                        }
                    }
                }
            }
            AlertRule::CiOverlap(rule) => {
                if rule.reference_branch.is_none() && self.project.reference_branch.is_none() {
                    return Err("ci_overlap needs a reference branch".to_string());
                }
            }
            AlertRule::HistoricalDeviation(rule) => {
                if rule.window_size < 1 {
                    return Err("window_size must be at least 1".to_string());
                }
                if rule.max_relative_change.is_nan() || rule.max_relative_change < 0.0 {
                    return Err("max_relative_change must be non-negative".to_string());
                }
            }
        }

        Ok(())
    }
}
