//! JSON output format for run results
//!
//! `--format json`: one pretty-printed document per run

use crate::monitor::{ComputationFailure, RunOutput};
use crate::records::{AlertRecord, StatisticRecord, TimeKey};
use serde::{Deserialize, Serialize};

/// Counts of what a run produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonSummary {
    pub statistics: usize,
    pub alerts: usize,
    pub failures: usize,
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    pub project: String,
    pub time_key: TimeKey,
    pub summary: JsonSummary,
    pub statistics: Vec<StatisticRecord>,
    pub alerts: Vec<AlertRecord>,
    pub failures: Vec<ComputationFailure>,
}

impl JsonOutput {
    pub fn new(project: &str, run: &RunOutput) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "opstat-json-v1".to_string(),
            project: project.to_string(),
            time_key: run.time_key,
            summary: JsonSummary {
                statistics: run.statistics.len(),
                alerts: run.alerts.len(),
                failures: run.failures.len(),
            },
            statistics: run.statistics.clone(),
            alerts: run.alerts.clone(),
            failures: run.failures.clone(),
        }
    }

    /// Serialize to pretty JSON string
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn run() -> RunOutput {
        let time_key = TimeKey::Date(NaiveDate::from_ymd_opt(2024, 2, 9).unwrap());
        let record = StatisticRecord {
            time_key,
            branch: "control".to_string(),
            dimensions: vec!["all".to_string()],
            metric: "startup_ms".to_string(),
            statistic: "percentile".to_string(),
            point: Some(12.0),
            lower: Some(11.0),
            upper: None,
            parameter: Some("50".to_string()),
        };
        let alert = AlertRecord::for_record("budget", &record, "Value above threshold");
        RunOutput {
            time_key,
            statistics: vec![record],
            alerts: vec![alert],
            failures: vec![],
        }
    }

    #[test]
    fn test_json_output_creation() {
        let output = JsonOutput::new("nightly", &run());
        assert_eq!(output.format, "opstat-json-v1");
        assert_eq!(
            output.summary,
            JsonSummary {
                statistics: 1,
                alerts: 1,
                failures: 0
            }
        );
    }

    #[test]
    fn test_json_serialization() {
        let json = JsonOutput::new("nightly", &run()).to_json().unwrap();

        assert!(json.contains("\"format\": \"opstat-json-v1\""));
        assert!(json.contains("\"date\": \"2024-02-09\""));
        assert!(json.contains("\"message\": \"Value above threshold\""));
        // Null bounds are kept as explicit nulls
        assert!(json.contains("\"upper\": null"));
    }

    #[test]
    fn test_json_round_trips_records() {
        let output = JsonOutput::new("nightly", &run());
        let parsed: JsonOutput = serde_json::from_str(&output.to_json().unwrap()).unwrap();
        assert_eq!(parsed, output);
    }
}
