//! Batch pipeline for one project
//!
//! A run turns the observations of one time key into statistic records and
//! alerts:
//!
//! ```text
//! 1. Check the project is runnable (start date set, not ended, not skipped)
//! 2. Bucket scalar metrics that need percentiles (edges memoized per metric)
//! 3. Group rows into partitions (branch × dimension roll-up)
//! 4. Compute every configured statistic per partition in parallel
//! 5. Evaluate alerts against the new statistics and history
//! ```
//!
//! A statistic (or a single percentile of it) that fails for one partition
//! is reported in [`RunOutput::failures`]; the rest of the batch still
//! completes.

use crate::alert::AlertEngine;
use crate::config::{MetricConfig, ProjectConfig};
use crate::error::{OpstatError, Result};
use crate::histogram::{BucketCache, Bucketizer};
use crate::records::{AlertRecord, MetricObservation, ObservationValue, StatisticRecord, TimeKey};
use crate::statistic::{ParameterFailure, Statistic, SummaryInput};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Dimension value standing for "every value" in a roll-up
pub const ALL_DIMENSION_VALUE: &str = "all";

/// A statistic that could not be computed for one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationFailure {
    pub time_key: TimeKey,
    pub branch: String,
    pub dimensions: Vec<String>,
    pub metric: String,
    pub statistic: String,
    /// Set when only one parameter of the statistic failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    pub error: String,
}

/// Everything one run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub time_key: TimeKey,
    pub statistics: Vec<StatisticRecord>,
    pub alerts: Vec<AlertRecord>,
    pub failures: Vec<ComputationFailure>,
}

/// A backfill date whose run failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillError {
    pub time_key: TimeKey,
    pub error: String,
}

/// Every run of a backfill, plus the dates that could not be run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackfillOutput {
    pub runs: Vec<RunOutput>,
    pub errors: Vec<BackfillError>,
}

impl RunOutput {
    pub fn empty(time_key: TimeKey) -> Self {
        Self {
            time_key,
            statistics: Vec::new(),
            alerts: Vec::new(),
            failures: Vec::new(),
        }
    }
}

type PartitionKey = (String, Vec<String>);
type Partitions<'a> = BTreeMap<PartitionKey, BTreeMap<&'a str, Vec<&'a MetricObservation>>>;

/// One statistic of one metric in one partition
struct Task<'a> {
    branch: &'a str,
    dimensions: &'a [String],
    metric: &'a MetricConfig,
    statistic: &'a Statistic,
    observations: &'a [&'a MetricObservation],
    denominator: &'a [&'a MetricObservation],
}

/// Runs a validated project configuration
#[derive(Debug, Clone)]
pub struct Monitor {
    config: ProjectConfig,
    engine: AlertEngine,
}

impl Monitor {
    /// Validate `config` and prepare its alert engine
    pub fn new(config: ProjectConfig) -> Result<Self> {
        config.validate()?;
        let engine = AlertEngine::from_config(&config);
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Refuse runs for projects without a start date or past their end date
    pub fn check_runnable(&self, time_key: TimeKey) -> Result<()> {
        let project = &self.config.project;
        if project.start_date.is_none() {
            return Err(OpstatError::NoStartDate {
                project: project.name.clone(),
            });
        }

        if let (Some(end), Some(date)) = (project.end_date, time_key.date()) {
            if date > end {
                return Err(OpstatError::Ended {
                    project: project.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Compute, then alert, for one time key
    pub fn run(
        &self,
        time_key: TimeKey,
        observations: &[MetricObservation],
        history: &[StatisticRecord],
    ) -> Result<RunOutput> {
        if self.config.project.skip {
            tracing::info!(project = %self.config.project.name, "project is skipped");
            return Ok(RunOutput::empty(time_key));
        }
        self.check_runnable(time_key)?;

        tracing::info!(project = %self.config.project.name, %time_key, "starting run");
        let (statistics, failures) = self.compute_statistics(time_key, observations);
        let alerts = self.engine.evaluate(time_key, &statistics, history);
        tracing::info!(
            %time_key,
            statistics = statistics.len(),
            alerts = alerts.len(),
            failures = failures.len(),
            "run finished"
        );

        Ok(RunOutput {
            time_key,
            statistics,
            alerts,
            failures,
        })
    }

    /// Run every time key in `[start, end]` that has observations, oldest first
    ///
    /// The range is clamped to the project's start and end dates. Each run
    /// sees the statistics of the runs before it as history. A date that
    /// fails is recorded in [`BackfillOutput::errors`] and the backfill
    /// moves on.
    pub fn backfill(
        &self,
        start: TimeKey,
        end: TimeKey,
        observations: &[MetricObservation],
        history: &[StatisticRecord],
    ) -> Result<BackfillOutput> {
        if start > end {
            return Err(OpstatError::validation(format!(
                "backfill start {} is after end {}",
                start, end
            )));
        }
        let project = &self.config.project;
        if project.skip {
            tracing::info!(project = %project.name, "project is skipped");
            return Ok(BackfillOutput::default());
        }
        let Some(start_date) = project.start_date else {
            return Err(OpstatError::NoStartDate {
                project: project.name.clone(),
            });
        };

        let within_project = |key: &TimeKey| match key.date() {
            Some(date) => {
                date >= start_date && !matches!(project.end_date, Some(last) if date > last)
            }
            None => true,
        };
        let time_keys: BTreeSet<TimeKey> = observations
            .iter()
            .map(|obs| obs.time_key)
            .filter(|key| (start..=end).contains(key) && within_project(key))
            .collect();
        tracing::info!(%start, %end, runs = time_keys.len(), "starting backfill");

        let mut history = history.to_vec();
        let mut output = BackfillOutput::default();
        for time_key in time_keys {
            match self.run(time_key, observations, &history) {
                Ok(run) => {
                    history.extend(run.statistics.iter().cloned());
                    output.runs.push(run);
                }
                Err(error) => {
                    tracing::warn!(%time_key, %error, "backfill run failed");
                    output.errors.push(BackfillError {
                        time_key,
                        error: error.to_string(),
                    });
                }
            }
        }

        Ok(output)
    }

    /// Statistic records for every partition of `time_key`, plus the failures
    pub fn compute_statistics(
        &self,
        time_key: TimeKey,
        observations: &[MetricObservation],
    ) -> (Vec<StatisticRecord>, Vec<ComputationFailure>) {
        let rows: Vec<&MetricObservation> = observations
            .iter()
            .filter(|obs| obs.time_key == time_key)
            .collect();

        let buckets = self.bucket_cache(&rows);
        let partitions = self.partition(&rows);
        tracing::debug!(
            %time_key,
            rows = rows.len(),
            partitions = partitions.len(),
            bucketed_metrics = buckets.len(),
            "partitioned observations"
        );

        let tasks = self.tasks(&partitions);
        let results: Vec<_> = tasks
            .par_iter()
            .map(|task| {
                let input = SummaryInput {
                    metric: &task.metric.name,
                    metric_type: task.metric.metric_type,
                    observations: task.observations,
                    denominator: task.denominator,
                    bucketizer: buckets.get(&task.metric.name),
                };
                (task, task.statistic.compute(&input))
            })
            .collect();

        let mut statistics = Vec::new();
        let mut failures = Vec::new();
        for (task, result) in results {
            let outcomes = match result {
                Ok(outcomes) => outcomes,
                Err(error) => vec![Err(ParameterFailure {
                    parameter: None,
                    error,
                })],
            };
            for outcome in outcomes {
                match outcome {
                    Ok(value) => statistics.push(StatisticRecord {
                        time_key,
                        branch: task.branch.to_string(),
                        dimensions: task.dimensions.to_vec(),
                        metric: task.metric.name.clone(),
                        statistic: value.statistic,
                        point: value.point,
                        lower: value.lower,
                        upper: value.upper,
                        parameter: value.parameter,
                    }),
                    Err(ParameterFailure { parameter, error }) => {
                        tracing::warn!(
                            %time_key,
                            branch = task.branch,
                            metric = %task.metric.name,
                            statistic = task.statistic.name(),
                            parameter = parameter.as_deref().unwrap_or(""),
                            %error,
                            "statistic failed"
                        );
                        failures.push(ComputationFailure {
                            time_key,
                            branch: task.branch.to_string(),
                            dimensions: task.dimensions.to_vec(),
                            metric: task.metric.name.clone(),
                            statistic: task.statistic.name().to_string(),
                            parameter,
                            error: error.to_string(),
                        });
                    }
                }
            }
        }

        (statistics, failures)
    }

    /// Bucket edges for scalar metrics with percentile statistics
    fn bucket_cache(&self, rows: &[&MetricObservation]) -> BucketCache {
        let mut cache = BucketCache::new();
        for metric in &self.config.metrics {
            if !metric
                .statistics
                .iter()
                .any(|s| s.needs_buckets(metric.metric_type))
            {
                continue;
            }
            cache.get_or_insert_with(&metric.name, || {
                Bucketizer::from_values(rows.iter().filter_map(|obs| match obs.value {
                    ObservationValue::Scalar(Some(v)) if obs.metric == metric.name => Some(v),
                    _ => None,
                }))
            });
        }
        cache
    }

    /// Group rows by branch and dimension roll-up, then by metric
    fn partition<'a>(&self, rows: &[&'a MetricObservation]) -> Partitions<'a> {
        let declared = self.config.dimensions.len();
        let mut partitions = Partitions::new();

        for &obs in rows {
            if self.config.metric(&obs.metric).is_none() {
                continue;
            }

            let tuples = if declared == 0 {
                vec![obs.dimensions.clone()]
            } else if obs.dimensions.len() == declared {
                rollups(&obs.dimensions)
            } else {
                tracing::debug!(
                    entity = %obs.entity,
                    metric = %obs.metric,
                    expected = declared,
                    found = obs.dimensions.len(),
                    "skipping row with wrong number of dimensions"
                );
                continue;
            };

            for dimensions in tuples {
                partitions
                    .entry((obs.branch.clone(), dimensions))
                    .or_default()
                    .entry(obs.metric.as_str())
                    .or_default()
                    .push(obs);
            }
        }

        partitions
    }

    fn tasks<'a>(&'a self, partitions: &'a Partitions<'a>) -> Vec<Task<'a>> {
        let mut tasks = Vec::new();
        for ((branch, dimensions), metrics) in partitions {
            for metric in &self.config.metrics {
                let Some(observations) = metrics.get(metric.name.as_str()) else {
                    continue;
                };
                for statistic in &metric.statistics {
                    let denominator = match statistic {
                        Statistic::TotalRatio { denominator_metric } => metrics
                            .get(denominator_metric.as_str())
                            .map_or(&[][..], Vec::as_slice),
                        _ => &[][..],
                    };
                    tasks.push(Task {
                        branch,
                        dimensions,
                        metric,
                        statistic,
                        observations,
                        denominator,
                    });
                }
            }
        }
        tasks
    }
}

/// Every subset of a dimension tuple, omitted entries replaced by `"all"`
///
/// The full tuple comes first and the all-`"all"` tuple last. Callers keep
/// the tuple within [`MAX_DIMENSIONS`](crate::config::MAX_DIMENSIONS).
pub fn rollups(dimensions: &[String]) -> Vec<Vec<String>> {
    let n = dimensions.len();
    let full = (1usize << n) - 1;

    (0..=full)
        .rev()
        .map(|mask| {
            dimensions
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    if mask & (1 << i) != 0 {
                        value.clone()
                    } else {
                        ALL_DIMENSION_VALUE.to_string()
                    }
                })
                .collect()
        })
        .collect()
}
