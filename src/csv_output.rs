//! CSV output format for run results
//!
//! `--format csv`: a statistics table, a blank line, then an alerts table.
//! Dimension tuples are joined with `|`; missing numbers are empty fields.

use crate::monitor::RunOutput;
use crate::records::{AlertRecord, StatisticRecord};

const STATISTICS_HEADER: &str =
    "time_key,branch,dimensions,metric,statistic,parameter,point,lower,upper";
const ALERTS_HEADER: &str = "time_key,alert,branch,dimensions,metric,statistic,parameter,message";

/// CSV output formatter
#[derive(Debug, Default)]
pub struct CsvOutput {
    statistics: Vec<StatisticRecord>,
    alerts: Vec<AlertRecord>,
}

impl CsvOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the records of one run
    pub fn add_run(&mut self, run: &RunOutput) {
        self.statistics.extend(run.statistics.iter().cloned());
        self.alerts.extend(run.alerts.iter().cloned());
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn number(value: Option<f64>) -> String {
        value.map(|v| v.to_string()).unwrap_or_default()
    }

    fn format_statistic(record: &StatisticRecord) -> String {
        [
            Self::escape_field(&record.time_key.to_string()),
            Self::escape_field(&record.branch),
            Self::escape_field(&record.dimensions.join("|")),
            Self::escape_field(&record.metric),
            Self::escape_field(&record.statistic),
            Self::escape_field(record.parameter.as_deref().unwrap_or("")),
            Self::number(record.point),
            Self::number(record.lower),
            Self::number(record.upper),
        ]
        .join(",")
    }

    fn format_alert(alert: &AlertRecord) -> String {
        [
            Self::escape_field(&alert.time_key.to_string()),
            Self::escape_field(&alert.alert),
            Self::escape_field(&alert.branch),
            Self::escape_field(&alert.dimensions.join("|")),
            Self::escape_field(&alert.metric),
            Self::escape_field(&alert.statistic),
            Self::escape_field(alert.parameter.as_deref().unwrap_or("")),
            Self::escape_field(&alert.message),
        ]
        .join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        output.push_str(STATISTICS_HEADER);
        output.push('\n');
        for record in &self.statistics {
            output.push_str(&Self::format_statistic(record));
            output.push('\n');
        }

        output.push('\n');

        output.push_str(ALERTS_HEADER);
        output.push('\n');
        for alert in &self.alerts {
            output.push_str(&Self::format_alert(alert));
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::TimeKey;

    fn record() -> StatisticRecord {
        StatisticRecord {
            time_key: TimeKey::Build(20240209000000),
            branch: "control".to_string(),
            dimensions: vec!["Windows".to_string(), "all".to_string()],
            metric: "startup_ms".to_string(),
            statistic: "mean".to_string(),
            point: Some(12.5),
            lower: None,
            upper: None,
            parameter: None,
        }
    }

    #[test]
    fn test_csv_escape_field_simple() {
        assert_eq!(CsvOutput::escape_field("hello"), "hello");
    }

    #[test]
    fn test_csv_escape_field_with_comma() {
        assert_eq!(CsvOutput::escape_field("hello,world"), "\"hello,world\"");
    }

    #[test]
    fn test_csv_escape_field_with_quote() {
        assert_eq!(CsvOutput::escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_format_statistic() {
        assert_eq!(
            CsvOutput::format_statistic(&record()),
            "20240209000000,control,Windows|all,startup_ms,mean,,12.5,,"
        );
    }

    #[test]
    fn test_csv_sections() {
        let record = record();
        let alert = AlertRecord::for_record("budget, startup", &record, "Value above threshold");
        let mut output = CsvOutput::new();
        output.add_run(&RunOutput {
            time_key: record.time_key,
            statistics: vec![record.clone()],
            alerts: vec![alert],
            failures: vec![],
        });

        let csv = output.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], STATISTICS_HEADER);
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], ALERTS_HEADER);
        assert!(lines[4].starts_with("20240209000000,\"budget, startup\",control,"));
        assert!(lines[4].ends_with(",Value above threshold"));
    }

    #[test]
    fn test_csv_empty_run_has_headers() {
        let csv = CsvOutput::new().to_csv();
        assert_eq!(csv, format!("{}\n\n{}\n", STATISTICS_HEADER, ALERTS_HEADER));
    }
}
