use std::time::Duration;
use thiserror::Error;

use crate::retry::RetriesExhausted;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser teardown failed: {0}")]
    BrowserTerminateFailed(String),

    #[error("Lighthouse run failed: {0}")]
    ScoringFailed(String),

    #[error("Category '{category}' missing from report for {url}")]
    MissingCategory { url: String, category: String },

    #[error("Malformed Lighthouse report: {0}")]
    MalformedReport(String),

    #[error("Audit attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed after {retries} retries ({attempts} attempts)")]
    RetriesExhausted {
        retries: usize,
        attempts: usize,
        #[source]
        source: Box<AuditError>,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuditError {
    /// Errors raised by a single audit attempt. The retry executor retries all of them.
    pub fn is_attempt_failure(&self) -> bool {
        matches!(
            self,
            AuditError::BrowserLaunchFailed(_)
                | AuditError::BrowserTerminateFailed(_)
                | AuditError::ScoringFailed(_)
                | AuditError::MissingCategory { .. }
                | AuditError::MalformedReport(_)
                | AuditError::Timeout(_)
        )
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditError::BrowserLaunchFailed(_) => "browser_launch",
            AuditError::BrowserTerminateFailed(_) => "browser_terminate",
            AuditError::ScoringFailed(_) => "scoring",
            AuditError::MissingCategory { .. } => "missing_category",
            AuditError::MalformedReport(_) => "malformed_report",
            AuditError::Timeout(_) => "timeout",
            AuditError::RetriesExhausted { .. } => "retries_exhausted",
            AuditError::Persistence(_) => "persistence",
            AuditError::Usage(_) => "usage",
            AuditError::Configuration(_) => "configuration",
        }
    }
}

impl From<RetriesExhausted<AuditError>> for AuditError {
    fn from(err: RetriesExhausted<AuditError>) -> Self {
        AuditError::RetriesExhausted {
            retries: err.retries,
            attempts: err.attempts,
            source: Box::new(err.last_error),
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Persistence(err.to_string())
    }
}

impl From<reqwest::Error> for AuditError {
    fn from(err: reqwest::Error) -> Self {
        AuditError::Persistence(err.to_string())
    }
}
