//! Operator notifications
//!
//! Fire-and-forget alerts for rugs, large native transfers and executed
//! trades. A [`MultiNotifier`] fans one message out to every sink and
//! succeeds when at least one of them does.

pub mod webhook;

pub use webhook::WebhookNotifier;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, title: &str, message: &str) -> Result<()>;
}

/// Writes notifications to the structured log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, title: &str, message: &str) -> Result<()> {
        info!("🔔 {} | {}", title, message);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MultiNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn with_sink(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver to every sink; Ok when at least one accepted the message
    pub async fn send(&self, title: &str, message: &str) -> Result<()> {
        if self.sinks.is_empty() {
            return Ok(());
        }
        let results =
            futures::future::join_all(self.sinks.iter().map(|s| s.send(title, message))).await;

        let mut delivered = 0usize;
        for (sink, result) in self.sinks.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Notifier '{}' failed: {}", sink.name(), e),
            }
        }
        if delivered == 0 {
            return Err(anyhow!("all {} notifiers failed", self.sinks.len()));
        }
        Ok(())
    }

    /// Send without caring about the outcome
    pub async fn notify(&self, title: &str, message: &str) {
        if let Err(e) = self.send(title, message).await {
            warn!("Notification '{}' dropped: {}", title, e);
        }
    }
}
