use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{
    AuditError, BatchReport, ChromeLauncher, Config, FileSink, LighthouseCli, Metrics,
    RemoteSink, ResultSink, ScoreRecord, UrlAuditor,
};

/// Per-URL outcome streamed to observers while the batch runs
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Audited(ScoreRecord),
    Failed { url: String, error: String },
}

/// Audits a list of URLs and hands the ordered report to the configured sinks
pub struct BatchRunner {
    auditor: UrlAuditor,
    sinks: Vec<Box<dyn ResultSink>>,
    concurrency: usize,
    metrics: Arc<Metrics>,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl BatchRunner {
    pub fn new(auditor: UrlAuditor, config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            auditor,
            sinks: Vec::new(),
            concurrency: config.concurrency.max(1),
            metrics,
            events: None,
        }
    }

    /// Runner backed by headless Chrome and the Lighthouse CLI, persisting to the configured
    /// output file and, when set, the remote endpoint.
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, AuditError> {
        let auditor = UrlAuditor::new(
            Arc::new(ChromeLauncher::new(config.clone())),
            Arc::new(LighthouseCli::from_config(config)),
            config,
            metrics.clone(),
        );

        let mut runner =
            Self::new(auditor, config, metrics).with_sink(Box::new(FileSink::new(&config.output_file)));

        if let Some(endpoint) = &config.remote_endpoint {
            runner = runner.with_sink(Box::new(RemoteSink::new(endpoint.clone())?));
        }

        Ok(runner)
    }

    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Audit every URL and persist the successful records.
    ///
    /// Records keep the input order regardless of concurrency. URLs that fail all attempts
    /// are logged, listed in `failed_urls` and left out of the records. Sink failures are
    /// logged and do not alter the returned report.
    pub async fn run_batch(&self, urls: &[String]) -> BatchReport {
        let run_id = uuid::Uuid::new_v4();
        let span = info_span!("batch", run_id = %run_id);

        async {
            info!(
                "Auditing {} URL(s) with concurrency {}",
                urls.len(),
                self.concurrency
            );

            let started = Instant::now();
            let tracker = ProgressTracker::new(urls.len());
            let mut report = BatchReport::default();

            let mut results = stream::iter(urls)
                .map(|url| async move { (url, self.auditor.audit_url(url).await) })
                .buffered(self.concurrency);

            while let Some((url, result)) = results.next().await {
                match result {
                    Ok(record) => {
                        tracker.record_completion(true);
                        self.emit(BatchEvent::Audited(record.clone()));
                        report.records.push(record);
                    }
                    Err(e) => {
                        tracker.record_completion(false);
                        error!("Giving up on {}: {}", url, e);
                        self.emit(BatchEvent::Failed {
                            url: url.clone(),
                            error: e.to_string(),
                        });
                        report.failed_urls.push(url.clone());
                    }
                }

                let progress = tracker.get_progress();
                debug!(
                    "Progress {}/{} ({} failed, eta {:?})",
                    progress.completed, progress.total, progress.errors, progress.eta
                );
            }

            let elapsed = started.elapsed();
            report.total_elapsed_seconds = elapsed.as_secs_f64();
            self.metrics.record_batch(elapsed);

            info!(
                "Batch finished in {:.1}s: {} audited, {} failed",
                report.total_elapsed_seconds,
                report.records.len(),
                report.failed_urls.len()
            );

            self.persist(&report).await;
            report
        }
        .instrument(span)
        .await
    }

    async fn persist(&self, report: &BatchReport) {
        for sink in &self.sinks {
            if let Err(e) = sink.persist(report).await {
                error!("Failed to persist results to {}: {}", sink.describe(), e);
                self.metrics.record_sink_failure();
            }
        }
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!("Batch event receiver dropped");
            }
        }
    }
}

pub struct ProgressTracker {
    total: usize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_completion(&self, success: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get_progress(&self) -> ProgressInfo {
        let completed = self.completed.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let elapsed = self.start_time.elapsed();
        let secs = elapsed.as_secs_f64();

        let rate = if secs > 0.0 {
            completed as f64 / secs
        } else {
            0.0
        };

        ProgressInfo {
            total: self.total,
            completed,
            errors,
            success: completed - errors,
            elapsed,
            rate,
            eta: if completed > 0 && rate > 0.0 {
                let remaining = self.total.saturating_sub(completed);
                Some(Duration::from_secs_f64(remaining as f64 / rate))
            } else {
                None
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Relaxed) >= self.total
    }
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub total: usize,
    pub completed: usize,
    pub errors: usize,
    pub success: usize,
    pub elapsed: Duration,
    pub rate: f64,
    pub eta: Option<Duration>,
}
