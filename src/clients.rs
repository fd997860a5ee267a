//! Window clients controlled by the worker.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Abstraction over the host's window management.
#[async_trait]
pub trait Clients: Send + Sync {
    /// Opens (or focuses) a window showing `url`.
    async fn open_window(&self, url: &str) -> Result<()>;
}

/// Clients implementation that logs and records each opened window.
#[derive(Debug, Default)]
pub struct LoggingClients {
    opened: Mutex<Vec<String>>,
}

impl LoggingClients {
    /// Creates an instance with no recorded windows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs opened so far, in order.
    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Clients for LoggingClients {
    async fn open_window(&self, url: &str) -> Result<()> {
        log::info!("Opening window: {url}");
        self.opened
            .lock()
            .map_err(|_| Error::Host("client list poisoned".to_string()))?
            .push(url.to_string());
        Ok(())
    }
}
