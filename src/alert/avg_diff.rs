// Historical-deviation alerts: compare two adjacent moving-average windows
//
// For a series ending at the current time key, the recent window holds the
// last `window_size` samples (current included) and the prior window the
// `window_size` samples before that. Missing points are ignored when
// averaging; a window with no points has no average.
//
// A series is only judged once it has warmed up: more than `window_size`
// days past the project start when both dates are known, otherwise more
// than `window_size` earlier samples.

use crate::alert::rule::HistoricalDeviationRule;
use crate::records::{AlertRecord, SeriesKey, StatisticRecord, TimeKey};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const HISTORICAL_DIFFERENCE: &str = "Significant difference to historical data";

/// Statistic records grouped per series, ordered by time key
pub type SeriesIndex<'a> = BTreeMap<SeriesKey, BTreeMap<TimeKey, &'a StatisticRecord>>;

/// Group history and current records into time series
///
/// When two records share a series and time key the later one wins, so
/// current records replace any stale history for the same key.
pub fn index_series<'a>(
    history: &'a [StatisticRecord],
    current: &[&'a StatisticRecord],
) -> SeriesIndex<'a> {
    let mut index = SeriesIndex::new();
    for record in history.iter().chain(current.iter().copied()) {
        index
            .entry(record.series_key())
            .or_default()
            .insert(record.time_key, record);
    }
    index
}

/// Averages of the recent and prior windows of `points`
pub fn window_averages(points: &[Option<f64>], window_size: usize) -> (Option<f64>, Option<f64>) {
    let end = points.len();
    let split = end.saturating_sub(window_size);
    let start = split.saturating_sub(window_size);
    (mean(&points[split..end]), mean(&points[start..split]))
}

/// `|recent - prior| / recent`; undefined when either side is missing or
/// the recent average is zero
pub fn relative_change(recent: Option<f64>, prior: Option<f64>) -> Option<f64> {
    let (recent, prior) = (recent?, prior?);
    if recent == 0.0 {
        return None;
    }
    Some((recent - prior).abs() / recent.abs())
}

fn mean(points: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = points.iter().flatten().copied().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

fn warmed_up(
    time_key: TimeKey,
    start_date: Option<NaiveDate>,
    prior_samples: usize,
    window_size: usize,
) -> bool {
    match start_date.and_then(|start| time_key.days_since(start)) {
        Some(days) => days > window_size as i64,
        None => prior_samples > window_size,
    }
}

/// Alerts for series at `time_key` whose moving average drifted
pub fn evaluate_historical_deviation(
    alert_name: &str,
    rule: &HistoricalDeviationRule,
    time_key: TimeKey,
    start_date: Option<NaiveDate>,
    series: &SeriesIndex<'_>,
) -> Vec<AlertRecord> {
    let mut alerts = Vec::new();

    for samples in series.values() {
        let Some(current) = samples.get(&time_key) else {
            continue;
        };
        if !rule.target.matches(current) {
            continue;
        }

        let points: Vec<Option<f64>> = samples.range(..=time_key).map(|(_, r)| r.point).collect();
        if !warmed_up(time_key, start_date, points.len() - 1, rule.window_size) {
            continue;
        }

        let (recent, prior) = window_averages(&points, rule.window_size);
        if let Some(change) = relative_change(recent, prior) {
            if change > rule.max_relative_change {
                tracing::debug!(
                    alert = alert_name,
                    metric = %current.metric,
                    branch = %current.branch,
                    change,
                    "moving average deviates from history"
                );
                alerts.push(AlertRecord::for_record(alert_name, current, HISTORICAL_DIFFERENCE));
            }
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::rule::RuleTarget;

    fn record(build: u64, point: Option<f64>) -> StatisticRecord {
        StatisticRecord {
            time_key: TimeKey::Build(build),
            branch: "release".to_string(),
            dimensions: vec![],
            metric: "crash_rate".to_string(),
            statistic: "mean".to_string(),
            point,
            lower: None,
            upper: None,
            parameter: None,
        }
    }

    fn rule(window_size: usize) -> HistoricalDeviationRule {
        HistoricalDeviationRule {
            target: RuleTarget {
                metrics: vec!["crash_rate".to_string()],
                statistics: None,
                parameters: None,
            },
            window_size,
            max_relative_change: 0.5,
        }
    }

    #[test]
    fn test_window_averages() {
        let points = [Some(1.0), Some(2.0), Some(3.0), Some(10.0), Some(20.0)];
        assert_eq!(window_averages(&points, 2), (Some(15.0), Some(2.5)));
    }

    #[test]
    fn test_window_averages_ignore_missing() {
        let points = [Some(4.0), None, None, Some(8.0)];
        assert_eq!(window_averages(&points, 2), (Some(8.0), Some(4.0)));
        assert_eq!(window_averages(&[None, None], 1), (None, None));
    }

    #[test]
    fn test_relative_change() {
        assert_eq!(relative_change(Some(10.0), Some(5.0)), Some(0.5));
        assert_eq!(relative_change(Some(0.0), Some(5.0)), None);
        assert_eq!(relative_change(Some(10.0), None), None);
    }

    #[test]
    fn test_current_replaces_history() {
        let history = vec![record(1, Some(1.0)), record(2, Some(1.0))];
        let fresh = record(2, Some(9.0));
        let index = index_series(&history, &[&fresh]);

        let samples = index.values().next().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[&TimeKey::Build(2)].point, Some(9.0));
    }

    #[test]
    fn test_jump_after_warm_up_alerts() {
        let history: Vec<_> = (1..=4).map(|b| record(b, Some(10.0))).collect();
        let current = record(5, Some(30.0));
        let index = index_series(&history, &[&current]);

        let alerts =
            evaluate_historical_deviation("drift", &rule(1), TimeKey::Build(5), None, &index);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, HISTORICAL_DIFFERENCE);
    }

    #[test]
    fn test_not_warmed_up_is_quiet() {
        let history = vec![record(1, Some(10.0)), record(2, Some(10.0))];
        let current = record(3, Some(30.0));
        let index = index_series(&history, &[&current]);

        let alerts =
            evaluate_historical_deviation("drift", &rule(2), TimeKey::Build(3), None, &index);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_warm_up_uses_start_date_when_known() {
        let history = vec![record(20240101000000, Some(10.0))];
        let current = record(20240105000000, Some(30.0));
        let index = index_series(&history, &[&current]);
        let key = TimeKey::Build(20240105000000);

        let late_start = NaiveDate::from_ymd_opt(2024, 1, 4);
        assert!(evaluate_historical_deviation("d", &rule(1), key, late_start, &index).is_empty());

        let early_start = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(evaluate_historical_deviation("d", &rule(1), key, early_start, &index).len(), 1);
    }
}
