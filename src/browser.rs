//! Headless Chrome sessions for Lighthouse
//!
//! Every audit attempt launches its own Chrome process, hands the remote debugging port to
//! Lighthouse and tears the process down afterwards. Sessions are never shared between
//! attempts.

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{create_browser_config, session_profile_dir, AuditError, Config};

/// A running browser that Lighthouse can connect to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserSession: Send {
    /// Remote debugging port of the browser.
    fn port(&self) -> u16;

    /// Shut the browser down. Called exactly once per session.
    async fn terminate(&mut self) -> Result<(), AuditError>;
}

/// Starts fresh browser sessions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, AuditError>;
}

/// Launches headless Chrome through chromiumoxide
pub struct ChromeLauncher {
    config: Config,
}

impl ChromeLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, AuditError> {
        let session = self.launch_session(uuid::Uuid::new_v4().to_string()).await?;
        Ok(Box::new(session))
    }
}

impl ChromeLauncher {
    /// Launch Chrome with a fresh profile dir for `session_id`
    ///
    /// The profile dir is removed again on every failure path.
    async fn launch_session(&self, session_id: String) -> Result<ChromeSession, AuditError> {
        let profile_dir = session_profile_dir(&session_id);

        tokio::fs::create_dir_all(&profile_dir).await.map_err(|e| {
            AuditError::BrowserLaunchFailed(format!("Failed to create profile dir: {e}"))
        })?;

        let launched = match create_browser_config(&self.config, &session_id) {
            Ok(browser_config) => Browser::launch(browser_config)
                .await
                .map_err(|e| AuditError::BrowserLaunchFailed(e.to_string())),
            Err(e) => Err(e),
        };
        let (browser, mut handler) = match launched {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile_dir(&profile_dir).await;
                return Err(e);
            }
        };

        // The handler drives the CDP connection and must be polled for the browser to respond
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Handler error: {}", e);
                    break;
                }
            }
            debug!("Handler stream ended");
        });

        let mut session = ChromeSession {
            id: session_id,
            browser,
            handler: handler_task,
            port: 0,
            profile_dir,
        };

        match debugging_port(session.browser.websocket_address()) {
            Ok(port) => {
                session.port = port;
                info!("Browser session {} listening on port {}", session.id, port);
                Ok(session)
            }
            Err(e) => {
                let _ = session.terminate().await;
                Err(e)
            }
        }
    }
}

async fn remove_profile_dir(profile_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(profile_dir).await {
        debug!(
            "Could not remove profile dir {}: {}",
            profile_dir.display(),
            e
        );
    }
}

/// A Chrome process owned by one audit attempt
pub struct ChromeSession {
    id: String,
    browser: Browser,
    handler: JoinHandle<()>,
    port: u16,
    profile_dir: PathBuf,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn port(&self) -> u16 {
        self.port
    }

    async fn terminate(&mut self) -> Result<(), AuditError> {
        let closed = self.browser.close().await;

        if closed.is_err() {
            warn!("Browser session {} did not close cleanly, killing it", self.id);
            if let Some(Err(e)) = self.browser.kill().await {
                warn!("Failed to kill browser session {}: {}", self.id, e);
            }
        }

        if let Err(e) = self.browser.wait().await {
            debug!("Waiting for browser session {} failed: {}", self.id, e);
        }
        self.handler.abort();

        remove_profile_dir(&self.profile_dir).await;

        closed
            .map(|_| debug!("Browser session {} terminated", self.id))
            .map_err(|e| AuditError::BrowserTerminateFailed(e.to_string()))
    }
}

/// Extract the debugging port from the browser's DevTools websocket address.
pub fn debugging_port(websocket_address: &str) -> Result<u16, AuditError> {
    url::Url::parse(websocket_address)
        .ok()
        .and_then(|u| u.port())
        .ok_or_else(|| {
            AuditError::BrowserLaunchFailed(format!(
                "No debugging port in websocket address '{websocket_address}'"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debugging_port_from_websocket_address() {
        let port =
            debugging_port("ws://127.0.0.1:41235/devtools/browser/2a7c5b0e-1f4f-4c0b").unwrap();
        assert_eq!(port, 41235);
    }

    #[test]
    fn test_debugging_port_missing() {
        assert!(matches!(
            debugging_port("ws://localhost/devtools/browser/abc"),
            Err(AuditError::BrowserLaunchFailed(_))
        ));
        assert!(debugging_port("garbage").is_err());
    }

    #[tokio::test]
    async fn test_failed_launch_removes_profile_dir() {
        let launcher = ChromeLauncher::new(Config {
            chrome_path: Some("/nonexistent/chrome".to_string()),
            ..Default::default()
        });
        let session_id = uuid::Uuid::new_v4().to_string();

        let result = launcher.launch_session(session_id.clone()).await;

        assert!(matches!(result, Err(AuditError::BrowserLaunchFailed(_))));
        assert!(!session_profile_dir(&session_id).exists());
    }
}
