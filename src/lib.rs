//! # Lighthouse Batch
//!
//! Runs Google Lighthouse against a list of URLs and collects the five category scores
//! (accessibility, best-practices, performance, pwa, seo) of each page into a single JSON
//! report.
//!
//! Every audit attempt launches its own headless Chrome, points the Lighthouse CLI at its
//! debugging port and tears the browser down afterwards. Failed attempts are retried with a
//! fixed (or optionally exponential) delay. URLs that still fail are logged and left out of
//! the report, so one broken page never aborts the batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lighthouse_batch::{BatchRunner, Config, Metrics};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let runner = BatchRunner::from_config(&config, Arc::new(Metrics::new()))?;
//!
//!     let urls = vec!["https://example.com".to_string()];
//!     let report = runner.run_batch(&urls).await;
//!     println!("{}", report.to_json()?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! lighthouse-batch https://example.com https://www.rust-lang.org --output results.json
//! lighthouse-batch --example --retries 1 --concurrency 2
//! ```

/// Configuration and settings for a batch run
pub mod config;

/// Error types
pub mod error;

/// Bounded retry executor
pub mod retry;

/// Score records and batch reports
pub mod report;

/// Headless Chrome sessions
pub mod browser;

/// Lighthouse CLI integration
pub mod scoring;

/// Single-URL audits with retry
pub mod auditor;

/// Batch orchestration and progress tracking
pub mod batch;

/// Result persistence
pub mod sink;

/// Command-line interface implementation
pub mod cli;

/// Metrics handles and Prometheus export
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use auditor::*;
pub use batch::*;
pub use browser::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use self::metrics::*;
pub use report::*;
pub use retry::*;
pub use scoring::*;
pub use sink::*;
pub use utils::*;
