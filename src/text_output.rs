//! Human-readable run report (`--format text`)

use crate::monitor::RunOutput;
use std::fmt::Write;

fn number(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

/// Render one run as a fixed-width table followed by alerts and failures
pub fn render_report(project: &str, run: &RunOutput) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== {} @ {} ===\n", project, run.time_key);

    if run.statistics.is_empty() {
        let _ = writeln!(out, "No statistics computed.");
    } else {
        let _ = writeln!(
            out,
            "{:<12} {:<20} {:<24} {:<12} {:>9} {:>12} {:>12} {:>12}",
            "branch", "dimensions", "metric", "statistic", "parameter", "point", "lower", "upper"
        );
        let _ = writeln!(out, "{}", "-".repeat(118));
        for record in &run.statistics {
            let _ = writeln!(
                out,
                "{:<12} {:<20} {:<24} {:<12} {:>9} {:>12} {:>12} {:>12}",
                record.branch,
                record.dimensions.join("|"),
                record.metric,
                record.statistic,
                record.parameter.as_deref().unwrap_or("-"),
                number(record.point),
                number(record.lower),
                number(record.upper),
            );
        }
    }

    let _ = writeln!(out, "\nAlerts: {}", run.alerts.len());
    for alert in &run.alerts {
        let parameter = alert
            .parameter
            .as_deref()
            .map(|p| format!(" [{}]", p))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  ⚠️  {}: {} {}{} ({}, {}): {}",
            alert.alert,
            alert.metric,
            alert.statistic,
            parameter,
            alert.branch,
            alert.dimensions.join("|"),
            alert.message
        );
    }

    if !run.failures.is_empty() {
        let _ = writeln!(out, "\nFailures: {}", run.failures.len());
        for failure in &run.failures {
            let parameter = failure
                .parameter
                .as_deref()
                .map(|p| format!(" [{}]", p))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {} {}{} ({}, {}): {}",
                failure.metric,
                failure.statistic,
                parameter,
                failure.branch,
                failure.dimensions.join("|"),
                failure.error
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ComputationFailure;
    use crate::records::{AlertRecord, StatisticRecord, TimeKey};

    #[test]
    fn test_empty_report() {
        let report = render_report("nightly", &RunOutput::empty(TimeKey::Build(7)));
        assert!(report.starts_with("=== nightly @ 7 ==="));
        assert!(report.contains("No statistics computed."));
        assert!(report.contains("Alerts: 0"));
        assert!(!report.contains("Failures"));
    }

    #[test]
    fn test_report_lists_records_alerts_and_failures() {
        let record = StatisticRecord {
            time_key: TimeKey::Build(7),
            branch: "control".to_string(),
            dimensions: vec!["all".to_string()],
            metric: "startup_ms".to_string(),
            statistic: "percentile".to_string(),
            point: Some(12.0),
            lower: Some(11.5),
            upper: None,
            parameter: Some("50".to_string()),
        };
        let run = RunOutput {
            time_key: TimeKey::Build(7),
            alerts: vec![AlertRecord::for_record("budget", &record, "Value above threshold")],
            failures: vec![ComputationFailure {
                time_key: TimeKey::Build(7),
                branch: "control".to_string(),
                dimensions: vec!["all".to_string()],
                metric: "gc_ms".to_string(),
                statistic: "percentile".to_string(),
                parameter: Some("150".to_string()),
                error: "Validation error: bad".to_string(),
            }],
            statistics: vec![record],
        };

        let report = render_report("nightly", &run);
        assert!(report.contains("12.00"));
        assert!(report.contains("11.50"));
        assert!(report.contains("budget: startup_ms percentile [50] (control, all): Value above threshold"));
        assert!(report.contains("Failures: 1"));
        assert!(report.contains("gc_ms percentile [150] (control, all): Validation error: bad"));
    }
}
