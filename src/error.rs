//! Error types for statistic estimation, configuration and runs
//!
//! Soft-null conditions (division by zero, empty histograms, too few buckets
//! for the jackknife) are not errors: they surface as `None` statistics or as
//! the absence of an alert.

use thiserror::Error;

/// Errors raised by the engine
#[derive(Error, Debug)]
pub enum OpstatError {
    /// Caller supplied an out-of-domain parameter (e.g. percentile outside [0, 100])
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{project} -> {message}")]
    Configuration { project: String, message: String },

    #[error("{project} -> Project has no start date.")]
    NoStartDate { project: String },

    #[error("{project} -> Project has already ended.")]
    Ended { project: String },

    #[error("Statistic {statistic} not implemented for type {metric_type} ({metric})")]
    StatisticNotImplemented {
        statistic: String,
        metric: String,
        metric_type: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl OpstatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn configuration(project: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            project: project.into(),
            message: message.into(),
        }
    }

    /// True for errors that only invalidate a single statistic computation
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, OpstatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_project() {
        let err = OpstatError::NoStartDate {
            project: "desktop-dau".to_string(),
        };
        assert_eq!(err.to_string(), "desktop-dau -> Project has no start date.");

        let err = OpstatError::configuration("vpn", "unknown metric 'crashes'");
        assert_eq!(err.to_string(), "vpn -> unknown metric 'crashes'");
    }

    #[test]
    fn test_is_validation() {
        assert!(OpstatError::validation("percentile must be a value between 0 and 100").is_validation());
        assert!(!OpstatError::Ended {
            project: "x".to_string()
        }
        .is_validation());
    }
}
