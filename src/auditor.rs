//! Single-URL audits
//!
//! One attempt launches a fresh browser, runs Lighthouse against it under the attempt
//! timeout and always tears the browser down before returning. Attempts are wrapped in the
//! retry executor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::{
    retry, AuditError, BrowserLauncher, Config, Metrics, RetryPolicy, ScoreRecord, Scorer,
};

pub struct UrlAuditor {
    launcher: Arc<dyn BrowserLauncher>,
    scorer: Arc<dyn Scorer>,
    retry_policy: RetryPolicy,
    attempt_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl UrlAuditor {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        scorer: Arc<dyn Scorer>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            launcher,
            scorer,
            retry_policy: RetryPolicy::from_config(config),
            attempt_timeout: config.attempt_timeout,
            metrics,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Audit `url`, retrying failed attempts according to the retry policy.
    ///
    /// The record's elapsed time spans every attempt and retry wait, up to the end of the
    /// successful Lighthouse run.
    pub async fn audit_url(&self, url: &str) -> Result<ScoreRecord, AuditError> {
        let started = Instant::now();
        let attempts = AtomicUsize::new(0);

        let result = retry(&self.retry_policy, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.attempt(url, started)
        })
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        self.metrics.record_retries(attempts.saturating_sub(1));
        self.metrics.record_audit(result.is_ok());

        match result {
            Ok(record) => {
                info!(
                    "Audited {} in {:.1}s after {} attempt(s)",
                    url, record.elapsed_seconds, attempts
                );
                Ok(record)
            }
            Err(exhausted) => Err(exhausted.into()),
        }
    }

    /// One audit attempt against a fresh browser.
    ///
    /// The browser is terminated exactly once whatever the outcome. A teardown failure is
    /// logged and does not discard a record that was already computed.
    pub async fn audit_once(&self, url: &str) -> Result<ScoreRecord, AuditError> {
        self.attempt(url, Instant::now()).await
    }

    /// Run one attempt, stamping the record with the time since `started`.
    async fn attempt(&self, url: &str, started: Instant) -> Result<ScoreRecord, AuditError> {
        let attempt_started = Instant::now();
        let mut session = self.launcher.launch().await?;
        let port = session.port();
        debug!("Running Lighthouse for {} against port {}", url, port);

        let outcome = match timeout(self.attempt_timeout, self.scorer.audit(url, port)).await {
            Ok(result) => result,
            Err(_) => Err(AuditError::Timeout(self.attempt_timeout)),
        };
        let elapsed = started.elapsed();
        let attempt_elapsed = attempt_started.elapsed();

        if let Err(e) = session.terminate().await {
            warn!("Failed to terminate browser for {}: {}", url, e);
        }

        let record = outcome.and_then(|result| ScoreRecord::from_lighthouse(&result, url, elapsed));

        self.metrics.record_attempt(attempt_elapsed, record.is_ok());
        if let Err(e) = &record {
            self.metrics.record_attempt_error(e);
        }

        record
    }
}
