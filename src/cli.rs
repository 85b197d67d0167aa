use crate::{
    format_duration, validate_url, AuditError, BatchEvent, BatchReport, BatchRunner, Config,
    Metrics, EXAMPLE_URL,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lighthouse-batch")]
#[command(about = "Run Lighthouse against a list of URLs and collect the category scores")]
#[command(version)]
pub struct Cli {
    #[arg(
        value_name = "URLS",
        required_unless_present = "example",
        help = "URLs to audit, in order"
    )]
    pub urls: Vec<String>,

    #[arg(short, long, help = "Results file (default: ./output/results.json)")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Audit https://example.com instead of the given URLs")]
    pub example: bool,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Retries after a failed attempt")]
    pub retries: Option<usize>,

    #[arg(long, value_name = "MS", help = "Delay between attempts in milliseconds")]
    pub retry_delay: Option<u64>,

    #[arg(long, value_name = "MULTIPLIER", help = "Backoff multiplier for the retry delay")]
    pub backoff: Option<f64>,

    #[arg(long, value_name = "SECS", help = "Timeout for a single Lighthouse run in seconds")]
    pub timeout: Option<u64>,

    #[arg(short, long, help = "Number of URLs audited at once")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Lighthouse executable path")]
    pub lighthouse_path: Option<String>,

    #[arg(long, value_name = "URL", help = "Also POST the results to this endpoint")]
    pub post_url: Option<String>,

    #[arg(long, help = "Write Prometheus metrics to this file after the batch")]
    pub metrics_file: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    /// URLs to audit, validated before anything is launched.
    pub fn target_urls(&self) -> Result<Vec<String>, AuditError> {
        if self.example {
            return Ok(vec![EXAMPLE_URL.to_string()]);
        }

        if self.urls.is_empty() {
            return Err(AuditError::Usage("No URLs given".to_string()));
        }

        self.urls
            .iter()
            .map(|url| validate_url(url).map(|_| url.clone()))
            .collect()
    }

    /// Apply command-line overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output_file = output.clone();
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(delay) = self.retry_delay {
            config.retry_delay = Duration::from_millis(delay);
        }
        if let Some(backoff) = self.backoff {
            config.backoff_multiplier = backoff;
        }
        if let Some(timeout) = self.timeout {
            config.attempt_timeout = Duration::from_secs(timeout);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        if let Some(lighthouse_path) = &self.lighthouse_path {
            config.lighthouse_path = lighthouse_path.clone();
        }
        if let Some(post_url) = &self.post_url {
            config.remote_endpoint = Some(post_url.clone());
        }
        if let Some(metrics_file) = &self.metrics_file {
            config.metrics_file = Some(metrics_file.clone());
        }
    }
}

/// Load the configuration file if one was given, apply CLI overrides and validate.
pub async fn load_config(args: &Cli) -> Result<Config, AuditError> {
    let mut config = if let Some(config_path) = &args.config {
        let content = tokio::fs::read_to_string(config_path).await.map_err(|e| {
            AuditError::Configuration(format!("Failed to read {}: {e}", config_path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AuditError::Configuration(format!("Failed to parse {}: {e}", config_path.display()))
        })?
    } else {
        Config::default()
    };

    args.apply_overrides(&mut config);
    config.validate()?;

    info!("Configuration loaded successfully");
    info!(
        "Retries: {}, retry delay: {:?}, attempt timeout: {:?}, concurrency: {}",
        config.retries, config.retry_delay, config.attempt_timeout, config.concurrency
    );

    Ok(config)
}

pub struct CliRunner {
    pub config: Config,
}

impl CliRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Audit `urls`, printing each outcome as it arrives and the final report at the end.
    pub async fn run(&self, urls: &[String]) -> Result<BatchReport, AuditError> {
        let metrics = Arc::new(Metrics::new());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let runner = BatchRunner::from_config(&self.config, metrics)?.with_events(events_tx);

        let total = urls.len();
        let printer = tokio::spawn(async move {
            let mut done = 0;
            while let Some(event) = events_rx.recv().await {
                done += 1;
                match event {
                    BatchEvent::Audited(record) => println!(
                        "[{done}/{total}] {} ({:.1}s) performance {:.0}, accessibility {:.0}, best-practices {:.0}, seo {:.0}, pwa {:.0}",
                        record.url,
                        record.elapsed_seconds,
                        record.scores.performance,
                        record.scores.accessibility,
                        record.scores.best_practices,
                        record.scores.seo,
                        record.scores.pwa
                    ),
                    BatchEvent::Failed { url, error } => {
                        println!("[{done}/{total}] {url} failed: {error}")
                    }
                }
            }
        });

        let report = runner.run_batch(urls).await;
        drop(runner);

        if let Err(e) = printer.await {
            warn!("Progress printer stopped unexpectedly: {}", e);
        }

        print_report(&report)?;
        Ok(report)
    }
}

/// Print the records as JSON followed by a short summary.
pub fn print_report(report: &BatchReport) -> Result<(), AuditError> {
    println!("{}", report.to_json()?);
    println!(
        "Total Time: {}",
        format_duration(Duration::from_secs_f64(report.total_elapsed_seconds))
    );

    if !report.failed_urls.is_empty() {
        println!("Failed ({}):", report.failed_urls.len());
        for url in &report.failed_urls {
            println!("  {url}");
        }
    }

    Ok(())
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
}
