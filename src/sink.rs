//! Report persistence
//!
//! Sinks run once per batch, after every URL has been processed. A failing sink never
//! changes the in-memory report.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{AuditError, BatchReport};

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Short description used in logs.
    fn describe(&self) -> String;

    async fn persist(&self, report: &BatchReport) -> Result<(), AuditError>;
}

/// Writes the report as a JSON array to a file
///
/// The file is written to a uniquely named temporary sibling first and persisted into place,
/// so readers never observe a partially written report. The temporary file is removed if
/// any step fails.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &str, err: std::io::Error) -> AuditError {
        AuditError::Persistence(format!("{} {}: {}", action, self.path.display(), err))
    }
}

#[async_trait]
impl ResultSink for FileSink {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn persist(&self, report: &BatchReport) -> Result<(), AuditError> {
        let mut json = report.to_json()?;
        json.push('\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, json.as_bytes()))
            .await
            .map_err(|e| AuditError::Persistence(format!("Write task failed: {e}")))?
            .map_err(|e| self.io_error("Failed to write", e))?;

        info!(
            "Saved {} result(s) to {}",
            report.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// POSTs the report's JSON array to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct RemoteSink {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AuditError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("lighthouse-batch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ResultSink for RemoteSink {
    fn describe(&self) -> String {
        format!("endpoint {}", self.endpoint)
    }

    async fn persist(&self, report: &BatchReport) -> Result<(), AuditError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&report.records)
            .send()
            .await?
            .error_for_status()?;

        info!(
            "Posted {} result(s) to {} ({})",
            report.records.len(),
            self.endpoint,
            response.status()
        );
        Ok(())
    }
}
