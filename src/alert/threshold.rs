// Threshold alerts: compare a statistic against fixed bounds
//
// The check is conservative: a value is only "above" when its lower bound
// (if it has one) is above `max`, and only "below" when its upper bound is
// below `min`. Statistics without an interval fall back to the point.

use crate::alert::rule::ThresholdRule;
use crate::records::{AlertRecord, StatisticRecord};

pub const VALUE_ABOVE_THRESHOLD: &str = "Value above threshold";
pub const VALUE_BELOW_THRESHOLD: &str = "Value below threshold";

/// Alerts for current-run records outside the rule's bounds
pub fn evaluate_threshold(
    alert_name: &str,
    rule: &ThresholdRule,
    current: &[&StatisticRecord],
) -> Vec<AlertRecord> {
    current
        .iter()
        .filter_map(|record| {
            let position = rule.target.position(record)?;
            let message = violation(rule, position, record)?;
            Some(AlertRecord::for_record(alert_name, record, message))
        })
        .collect()
}

fn violation(rule: &ThresholdRule, position: usize, record: &StatisticRecord) -> Option<&'static str> {
    if let (Some(max), Some(value)) = (rule.max_at(position), record.lower_or_point()) {
        if value > max {
            return Some(VALUE_ABOVE_THRESHOLD);
        }
    }

    if let (Some(min), Some(value)) = (rule.min_at(position), record.upper_or_point()) {
        if value < min {
            return Some(VALUE_BELOW_THRESHOLD);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::rule::RuleTarget;
    use crate::records::TimeKey;

    fn record(parameter: Option<&str>, point: f64, bounds: Option<(f64, f64)>) -> StatisticRecord {
        StatisticRecord {
            time_key: TimeKey::Build(20240209000000),
            branch: "treatment".to_string(),
            dimensions: vec![],
            metric: "startup_ms".to_string(),
            statistic: "percentile".to_string(),
            point: Some(point),
            lower: bounds.map(|b| b.0),
            upper: bounds.map(|b| b.1),
            parameter: parameter.map(str::to_string),
        }
    }

    fn rule(parameters: Option<Vec<&str>>, min: Option<Vec<f64>>, max: Option<Vec<f64>>) -> ThresholdRule {
        ThresholdRule {
            target: RuleTarget {
                metrics: vec!["startup_ms".to_string()],
                statistics: None,
                parameters: parameters.map(|ps| ps.into_iter().map(str::to_string).collect()),
            },
            min,
            max,
        }
    }

    #[test]
    fn test_lower_bound_above_max_alerts() {
        let r = record(None, 12.0, Some((11.0, 13.0)));
        let alerts = evaluate_threshold("slow", &rule(None, None, Some(vec![10.0])), &[&r]);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, VALUE_ABOVE_THRESHOLD);
        assert_eq!(alerts[0].alert, "slow");
        assert_eq!(alerts[0].branch, "treatment");
    }

    #[test]
    fn test_interval_straddling_max_does_not_alert() {
        let r = record(None, 12.0, Some((9.0, 15.0)));
        assert!(evaluate_threshold("slow", &rule(None, None, Some(vec![10.0])), &[&r]).is_empty());
    }

    #[test]
    fn test_point_used_without_interval() {
        let r = record(None, 3.0, None);
        let alerts = evaluate_threshold("low", &rule(None, Some(vec![5.0]), None), &[&r]);
        assert_eq!(alerts[0].message, VALUE_BELOW_THRESHOLD);
    }

    #[test]
    fn test_bounds_indexed_by_parameter_position() {
        let p50 = record(Some("50"), 900.0, None);
        let p90 = record(Some("90"), 900.0, None);
        let p99 = record(Some("99"), 99_999.0, None);
        let r = rule(Some(vec!["50", "90"]), None, Some(vec![800.0, 2000.0]));

        let alerts = evaluate_threshold("slow", &r, &[&p50, &p90, &p99]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].parameter.as_deref(), Some("50"));
    }

    #[test]
    fn test_missing_point_never_alerts() {
        let mut r = record(None, 0.0, None);
        r.point = None;
        let bounds = rule(None, Some(vec![1.0]), Some(vec![-1.0]));
        assert!(evaluate_threshold("x", &bounds, &[&r]).is_empty());
    }
}
