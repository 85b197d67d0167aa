use metrics::{Counter, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::AuditError;

/// Counters and histograms updated while a batch runs
///
/// Handles are resolved against whichever recorder is installed when [`Metrics::new`] runs.
/// Without a recorder they are no-ops.
pub struct Metrics {
    pub audits_succeeded: Counter,
    pub audits_failed: Counter,
    pub attempts_failed: Counter,
    pub retry_count: Counter,
    pub sink_failures: Counter,
    pub attempt_duration: Histogram,
    pub batch_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            audits_succeeded: metrics::register_counter!("lighthouse_audits_succeeded_total"),
            audits_failed: metrics::register_counter!("lighthouse_audits_failed_total"),
            attempts_failed: metrics::register_counter!("lighthouse_attempts_failed_total"),
            retry_count: metrics::register_counter!("lighthouse_retries_total"),
            sink_failures: metrics::register_counter!("lighthouse_sink_failures_total"),
            attempt_duration: metrics::register_histogram!("lighthouse_attempt_duration_seconds"),
            batch_duration: metrics::register_histogram!("lighthouse_batch_duration_seconds"),
        }
    }

    pub fn noop() -> Self {
        Self {
            audits_succeeded: Counter::noop(),
            audits_failed: Counter::noop(),
            attempts_failed: Counter::noop(),
            retry_count: Counter::noop(),
            sink_failures: Counter::noop(),
            attempt_duration: Histogram::noop(),
            batch_duration: Histogram::noop(),
        }
    }

    pub fn record_attempt(&self, duration: Duration, success: bool) {
        if !success {
            self.attempts_failed.increment(1);
        }

        self.attempt_duration.record(duration.as_secs_f64());
    }

    pub fn record_attempt_error(&self, error: &AuditError) {
        metrics::increment_counter!("lighthouse_attempt_errors_total", "kind" => error.kind());
    }

    pub fn record_audit(&self, success: bool) {
        if success {
            self.audits_succeeded.increment(1);
        } else {
            self.audits_failed.increment(1);
        }
    }

    pub fn record_retries(&self, retries: usize) {
        self.retry_count.increment(retries as u64);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.increment(1);
    }

    pub fn record_batch(&self, duration: Duration) {
        self.batch_duration.record(duration.as_secs_f64());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the Prometheus recorder as the global metrics recorder.
///
/// Must run before [`Metrics::new`] for the batch counters to be captured.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, AuditError> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::set_boxed_recorder(Box::new(recorder))
        .map_err(|e| AuditError::Configuration(format!("Failed to install metrics recorder: {e}")))?;

    Ok(handle)
}

/// Write the Prometheus text exposition of `handle` to `path`.
pub async fn write_metrics_file(handle: &PrometheusHandle, path: &Path) -> Result<(), AuditError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(path, handle.render()).await?;
    info!("Metrics written to {}", path.display());
    Ok(())
}
