//! Lighthouse scoring
//!
//! Runs the Lighthouse CLI against an already running browser and parses the JSON report it
//! writes to stdout. Only the fields the batch needs are deserialized; the rest of the report
//! is ignored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::{AuditError, Config};

/// The subset of a Lighthouse JSON report used to build score records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LighthouseResult {
    pub final_url: Option<String>,
    pub final_displayed_url: Option<String>,
    pub requested_url: Option<String>,
    pub categories: HashMap<String, LighthouseCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LighthouseCategory {
    /// Raw score in [0, 1]; Lighthouse reports null when the category could not be scored.
    pub score: Option<f64>,
}

impl LighthouseResult {
    /// URL of the page after redirects.
    ///
    /// Newer Lighthouse versions report `finalDisplayedUrl`, older ones only `finalUrl`.
    pub fn resolved_url(&self) -> Option<&str> {
        self.final_displayed_url
            .as_deref()
            .or(self.final_url.as_deref())
            .or(self.requested_url.as_deref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LighthouseEnvelope {
    runtime_error: Option<RuntimeError>,
    #[serde(flatten)]
    result: LighthouseResult,
}

#[derive(Debug, Deserialize)]
struct RuntimeError {
    code: Option<String>,
    message: Option<String>,
}

/// Parse a Lighthouse JSON report.
///
/// Reports carrying a `runtimeError` (page failed to load, protocol timeout, ...) are
/// rejected as failed runs even though Lighthouse exits successfully for them.
pub fn parse_lighthouse_output(output: &[u8]) -> Result<LighthouseResult, AuditError> {
    let envelope: LighthouseEnvelope = serde_json::from_slice(output)
        .map_err(|e| AuditError::MalformedReport(format!("invalid Lighthouse JSON: {e}")))?;

    if let Some(runtime_error) = envelope.runtime_error {
        return Err(AuditError::ScoringFailed(format!(
            "{}: {}",
            runtime_error.code.as_deref().unwrap_or("RUNTIME_ERROR"),
            runtime_error.message.as_deref().unwrap_or("no message")
        )));
    }

    Ok(envelope.result)
}

/// Produces a Lighthouse report for a URL using the browser listening on `port`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn audit(&self, url: &str, port: u16) -> Result<LighthouseResult, AuditError>;
}

/// Scores pages by spawning the `lighthouse` command-line tool
#[derive(Debug, Clone)]
pub struct LighthouseCli {
    program: String,
}

impl LighthouseCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.lighthouse_path.clone())
    }

    fn args(url: &str, port: u16) -> Vec<String> {
        vec![
            url.to_string(),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            format!("--port={port}"),
            "--quiet".to_string(),
            "--no-enable-error-reporting".to_string(),
        ]
    }
}

#[async_trait]
impl Scorer for LighthouseCli {
    async fn audit(&self, url: &str, port: u16) -> Result<LighthouseResult, AuditError> {
        debug!("Running {} for {} on port {}", self.program, url, port);

        let output = Command::new(&self.program)
            .args(Self::args(url, port))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AuditError::ScoringFailed(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::ScoringFailed(format!(
                "{} exited with {} for {}: {}",
                self.program,
                output.status,
                url,
                stderr.trim()
            )));
        }

        parse_lighthouse_output(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "lighthouseVersion": "10.4.0",
        "requestedUrl": "https://example.com",
        "finalUrl": "https://example.com/",
        "finalDisplayedUrl": "https://example.com/",
        "fetchTime": "2024-01-01T00:00:00.000Z",
        "categories": {
            "performance": { "id": "performance", "title": "Performance", "score": 0.99 },
            "accessibility": { "id": "accessibility", "title": "Accessibility", "score": 0.88 },
            "best-practices": { "id": "best-practices", "title": "Best Practices", "score": 1 },
            "seo": { "id": "seo", "title": "SEO", "score": 0.9 },
            "pwa": { "id": "pwa", "title": "PWA", "score": null }
        },
        "audits": { "first-contentful-paint": { "score": 1 } }
    }"#;

    #[test]
    fn test_parse_report() {
        let result = parse_lighthouse_output(REPORT.as_bytes()).unwrap();

        assert_eq!(result.resolved_url(), Some("https://example.com/"));
        assert_eq!(result.categories.len(), 5);
        assert_eq!(result.categories["best-practices"].score, Some(1.0));
        assert_eq!(result.categories["pwa"].score, None);
    }

    #[test]
    fn test_resolved_url_fallbacks() {
        let mut result = LighthouseResult {
            final_url: Some("https://a.example/".to_string()),
            requested_url: Some("https://a.example".to_string()),
            ..Default::default()
        };
        assert_eq!(result.resolved_url(), Some("https://a.example/"));

        result.final_url = None;
        assert_eq!(result.resolved_url(), Some("https://a.example"));

        result.final_displayed_url = Some("https://b.example/".to_string());
        assert_eq!(result.resolved_url(), Some("https://b.example/"));
    }

    #[test]
    fn test_runtime_error_is_scoring_failure() {
        let report = r#"{
            "requestedUrl": "https://nope.invalid",
            "finalUrl": "https://nope.invalid/",
            "runtimeError": { "code": "DNS_FAILURE", "message": "DNS servers could not resolve the provided domain." },
            "categories": { "performance": { "score": null } }
        }"#;

        match parse_lighthouse_output(report.as_bytes()) {
            Err(AuditError::ScoringFailed(msg)) => assert!(msg.starts_with("DNS_FAILURE")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_output_is_malformed() {
        assert!(matches!(
            parse_lighthouse_output(b"Lighthouse crashed"),
            Err(AuditError::MalformedReport(_))
        ));
        assert!(matches!(
            parse_lighthouse_output(b""),
            Err(AuditError::MalformedReport(_))
        ));
    }

    #[test]
    fn test_cli_args() {
        let args = LighthouseCli::args("https://example.com", 9222);
        assert_eq!(args[0], "https://example.com");
        assert!(args.contains(&"--output=json".to_string()));
        assert!(args.contains(&"--output-path=stdout".to_string()));
        assert!(args.contains(&"--port=9222".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_scoring_failure() {
        let scorer = LighthouseCli::new("/nonexistent/bin/lighthouse");
        let result = scorer.audit("https://example.com", 9222).await;
        assert!(matches!(result, Err(AuditError::ScoringFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_scoring_failure() {
        let scorer = LighthouseCli::new("false");
        let result = scorer.audit("https://example.com", 9222).await;
        assert!(matches!(result, Err(AuditError::ScoringFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_stdout_is_malformed() {
        let scorer = LighthouseCli::new("true");
        let result = scorer.audit("https://example.com", 9222).await;
        assert!(matches!(result, Err(AuditError::MalformedReport(_))));
    }
}
