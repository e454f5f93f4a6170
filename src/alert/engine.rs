//! Alert evaluation engine
//!
//! Runs every configured rule over the statistics of one time key:
//!
//! ```text
//! 1. Parse project TOML → Vec<Alert>
//! 2. Compute statistics for the time key → Vec<StatisticRecord>
//! 3. Evaluate alerts (current + history) → Vec<AlertRecord>
//! ```

use crate::alert::avg_diff::{evaluate_historical_deviation, index_series};
use crate::alert::ci_overlap::evaluate_ci_overlap;
use crate::alert::rule::{Alert, AlertRule};
use crate::alert::threshold::evaluate_threshold;
use crate::config::ProjectConfig;
use crate::records::{AlertRecord, StatisticRecord, TimeKey};
use chrono::NaiveDate;

/// Evaluates alert rules against statistic records
#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    alerts: Vec<Alert>,
    start_date: Option<NaiveDate>,
    reference_branch: Option<String>,
}

impl AlertEngine {
    pub fn new(alerts: Vec<Alert>) -> Self {
        Self {
            alerts,
            ..Self::default()
        }
    }

    /// Project start, used to decide when a historical series has warmed up
    pub fn with_start_date(mut self, start_date: Option<NaiveDate>) -> Self {
        self.start_date = start_date;
        self
    }

    /// Default reference branch for `ci_overlap` rules that do not name one
    pub fn with_reference_branch(mut self, branch: Option<String>) -> Self {
        self.reference_branch = branch;
        self
    }

    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(config.alerts.clone())
            .with_start_date(config.project.start_date)
            .with_reference_branch(config.project.reference_branch.clone())
    }

    /// Evaluate all rules for `time_key`
    ///
    /// Only `current` records with this time key are judged; `history` feeds
    /// the historical-deviation windows. Alerts come back in rule order, and
    /// within a rule sorted by branch, dimensions, metric, statistic and
    /// parameter.
    pub fn evaluate(
        &self,
        time_key: TimeKey,
        current: &[StatisticRecord],
        history: &[StatisticRecord],
    ) -> Vec<AlertRecord> {
        let current: Vec<&StatisticRecord> =
            current.iter().filter(|r| r.time_key == time_key).collect();
        let mut series = None;
        let mut fired = Vec::new();

        for alert in &self.alerts {
            let mut alerts = match &alert.rule {
                AlertRule::Threshold(rule) => evaluate_threshold(&alert.name, rule, &current),
                AlertRule::CiOverlap(rule) => {
                    let reference = rule
                        .reference_branch
                        .as_deref()
                        .or(self.reference_branch.as_deref());
                    match reference {
                        Some(reference) => {
                            evaluate_ci_overlap(&alert.name, rule, reference, &current)
                        }
                        None => {
                            tracing::warn!(
                                alert = %alert.name,
                                "ci_overlap alert has no reference branch, skipping"
                            );
                            Vec::new()
                        }
                    }
                }
                AlertRule::HistoricalDeviation(rule) => {
                    let series = series.get_or_insert_with(|| index_series(history, &current));
                    evaluate_historical_deviation(
                        &alert.name,
                        rule,
                        time_key,
                        self.start_date,
                        series,
                    )
                }
            };

            alerts.sort_by(|a, b| {
                (&a.branch, &a.dimensions, &a.metric, &a.statistic, &a.parameter).cmp(&(
                    &b.branch,
                    &b.dimensions,
                    &b.metric,
                    &b.statistic,
                    &b.parameter,
                ))
            });

            tracing::debug!(
                alert = %alert.name,
                kind = alert.rule.type_name(),
                fired = alerts.len(),
                "evaluated alert"
            );
            fired.extend(alerts);
        }

        if !fired.is_empty() {
            tracing::info!(%time_key, alerts = fired.len(), "alerts raised");
        }
        fired
    }
}
