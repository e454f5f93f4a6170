//! Summary statistics over per-client metric values
//!
//! Every statistic turns the observations of one partition (time key,
//! branch, dimension tuple) into one or more [`StatisticValue`]s. Scalar
//! aggregates produce a bare point estimate; `percentile` produces a point
//! with a jackknife confidence interval per requested percentile.
//!
//! # Example TOML
//!
//! ```toml
//! [[metric]]
//! name = "startup_ms"
//! type = "scalar"
//! statistics = [
//!     { kind = "mean" },
//!     { kind = "percentile", percentiles = [50, 90, 99] },
//! ]
//! ```

use crate::error::{OpstatError, Result};
use crate::estimate::{jackknife_percentile_ci_at, DEFAULT_CONFIDENCE_LEVEL};
use crate::histogram::{merge, normalized_sum, Bucketizer, Histogram};
use crate::records::{MetricObservation, ObservationValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Shape of a metric's per-client values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Scalar,
    Histogram,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Scalar => write!(f, "scalar"),
            MetricType::Histogram => write!(f, "histogram"),
        }
    }
}

/// A configured statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statistic {
    /// Number of clients that reported a value
    Count,

    Sum,

    Mean,

    /// Nearest-rank quantile `quantile / number_of_quantiles` of the client values
    Quantile {
        #[serde(default = "default_number_of_quantiles")]
        number_of_quantiles: u32,
        #[serde(default = "default_quantile")]
        quantile: u32,
    },

    /// Percentiles with jackknife confidence intervals
    Percentile {
        #[serde(default = "default_percentiles")]
        percentiles: Vec<f64>,
        /// Two-sided level of the interval; 90% when unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence_level: Option<f64>,
    },

    /// `sum(metric) / sum(denominator_metric)` over the partition
    TotalRatio { denominator_metric: String },
}

fn default_number_of_quantiles() -> u32 {
    100
}

fn default_quantile() -> u32 {
    50
}

fn default_percentiles() -> Vec<f64> {
    vec![50.0, 90.0, 99.0]
}

/// One computed statistic, before it is keyed by partition
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticValue {
    pub statistic: String,
    pub point: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub parameter: Option<String>,
}

/// One parameter of a statistic that could not be computed
#[derive(Debug)]
pub struct ParameterFailure {
    pub parameter: Option<String>,
    pub error: OpstatError,
}

/// Outcome of one parameter of a statistic
pub type ParameterResult = std::result::Result<StatisticValue, ParameterFailure>;

impl StatisticValue {
    fn bare(statistic: &Statistic, point: Option<f64>, parameter: Option<String>) -> Self {
        Self {
            statistic: statistic.name().to_string(),
            point,
            lower: None,
            upper: None,
            parameter,
        }
    }
}

/// Observations of one partition, as seen by a statistic
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub metric: &'a str,
    pub metric_type: MetricType,
    /// Rows of the summarized metric
    pub observations: &'a [&'a MetricObservation],
    /// Rows of the denominator metric, for `total_ratio`
    pub denominator: &'a [&'a MetricObservation],
    /// Bucket edges for scalar percentiles
    pub bucketizer: Option<&'a Bucketizer>,
}

impl Statistic {
    /// Snake-case name used in statistic records and alert filters
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::Sum => "sum",
            Statistic::Mean => "mean",
            Statistic::Quantile { .. } => "quantile",
            Statistic::Percentile { .. } => "percentile",
            Statistic::TotalRatio { .. } => "total_ratio",
        }
    }

    /// All statistic names, for validating alert filters
    pub fn known_names() -> &'static [&'static str] {
        &["count", "sum", "mean", "quantile", "percentile", "total_ratio"]
    }

    pub fn supports(&self, metric_type: MetricType) -> bool {
        match self {
            Statistic::Percentile { .. } => true,
            _ => metric_type == MetricType::Scalar,
        }
    }

    /// Parameter values this statistic emits, in configuration order
    pub fn parameters(&self) -> Vec<Option<String>> {
        match self {
            Statistic::Quantile { quantile, .. } => vec![Some(quantile.to_string())],
            Statistic::Percentile { percentiles, .. } => {
                percentiles.iter().map(|p| Some(p.to_string())).collect()
            }
            Statistic::TotalRatio { denominator_metric } => vec![Some(denominator_metric.clone())],
            _ => vec![None],
        }
    }

    pub fn needs_buckets(&self, metric_type: MetricType) -> bool {
        matches!(self, Statistic::Percentile { .. }) && metric_type == MetricType::Scalar
    }

    /// Compute this statistic for one partition, one result per parameter
    ///
    /// Empty partitions and zero denominators yield `None` points rather
    /// than errors. A percentile outside [0, 100] fails only that
    /// percentile; an unsupported metric type fails the whole statistic.
    pub fn compute(&self, input: &SummaryInput<'_>) -> Result<Vec<ParameterResult>> {
        if !self.supports(input.metric_type) {
            return Err(OpstatError::StatisticNotImplemented {
                statistic: self.name().to_string(),
                metric: input.metric.to_string(),
                metric_type: input.metric_type.to_string(),
            });
        }

        let values = match self {
            Statistic::Count => {
                let count = scalar_values(input.observations).count();
                vec![StatisticValue::bare(self, Some(count as f64), None)]
            }
            Statistic::Sum => vec![StatisticValue::bare(
                self,
                sum(scalar_values(input.observations)),
                None,
            )],
            Statistic::Mean => {
                let values: Vec<f64> = scalar_values(input.observations).collect();
                let mean = sum(values.iter().copied()).map(|s| s / values.len() as f64);
                vec![StatisticValue::bare(self, mean, None)]
            }
            Statistic::Quantile {
                number_of_quantiles,
                quantile,
            } => {
                let mut values: Vec<f64> = scalar_values(input.observations).collect();
                values.sort_by(f64::total_cmp);
                let point = nearest_rank(&values, *quantile, *number_of_quantiles);
                vec![StatisticValue::bare(self, point, Some(quantile.to_string()))]
            }
            Statistic::TotalRatio { denominator_metric } => {
                let numerator = sum(scalar_values(input.observations));
                let denominator = sum(scalar_values(input.denominator));
                let ratio = match (numerator, denominator) {
                    (Some(n), Some(d)) if d != 0.0 => Some(n / d),
                    _ => None,
                };
                vec![StatisticValue::bare(self, ratio, Some(denominator_metric.clone()))]
            }
            Statistic::Percentile {
                percentiles,
                confidence_level,
            } => {
                let distribution = population_distribution(input);
                let level = confidence_level.unwrap_or(DEFAULT_CONFIDENCE_LEVEL);

                return Ok(percentiles
                    .iter()
                    .map(|&p| {
                        let parameter = Some(p.to_string());
                        match jackknife_percentile_ci_at(p, &distribution, level) {
                            Ok(estimate) => Ok(StatisticValue {
                                statistic: self.name().to_string(),
                                point: estimate.map(|e| e.point),
                                lower: estimate.map(|e| e.lower),
                                upper: estimate.map(|e| e.upper),
                                parameter,
                            }),
                            Err(error) => Err(ParameterFailure { parameter, error }),
                        }
                    })
                    .collect());
            }
        };

        Ok(values.into_iter().map(Ok).collect())
    }
}

/// Non-missing, finite scalar values
fn scalar_values<'a>(
    observations: &'a [&'a MetricObservation],
) -> impl Iterator<Item = f64> + 'a {
    observations.iter().filter_map(|obs| match obs.value {
        ObservationValue::Scalar(Some(v)) if v.is_finite() => Some(v),
        _ => None,
    })
}

/// Sum that is `None` for no values, like SQL `SUM`
fn sum(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Element at rank `round(quantile / n * (len - 1))` of sorted values
fn nearest_rank(sorted: &[f64], quantile: u32, number_of_quantiles: u32) -> Option<f64> {
    if sorted.is_empty() || number_of_quantiles == 0 {
        return None;
    }
    let fraction = (quantile.min(number_of_quantiles) as f64) / number_of_quantiles as f64;
    let rank = (fraction * (sorted.len() - 1) as f64).round() as usize;
    sorted.get(rank).copied()
}

/// Merge of every client's unit-mass distribution
///
/// Scalar values are first mapped to one-bucket histograms; missing values
/// land in bucket 0. Histogram rows that are not histograms (and vice versa)
/// are skipped.
fn population_distribution(input: &SummaryInput<'_>) -> Histogram {
    let mut per_entity: BTreeMap<&str, Vec<Histogram>> = BTreeMap::new();

    for obs in input.observations {
        let histogram = match (&obs.value, input.metric_type) {
            (ObservationValue::Histogram(h), MetricType::Histogram) => h.clone(),
            (ObservationValue::Scalar(v), MetricType::Scalar) => match input.bucketizer {
                Some(bucketizer) => bucketizer.histogram(*v),
                None => continue,
            },
            _ => continue,
        };
        per_entity
            .entry(obs.entity.as_str())
            .or_default()
            .push(histogram);
    }

    let distributions: Vec<Histogram> = per_entity
        .values()
        .map(|histograms| normalized_sum(histograms, 1.0))
        .collect();

    merge(&distributions)
}
