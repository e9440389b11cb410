//! Log Subscriber
//!
//! Push-mode ingestion. Subscribes with the registry's address/topic
//! filter and hands every log to the pipeline on its own task. Registry
//! changes are coalesced over a short debounce; the replacement
//! subscription is opened before the old one is dropped, and a failed
//! rebuild keeps the old one. A subscription that fails or ends is
//! re-opened after a fixed backoff. There is no retry limit.

use super::pipeline::EventPipeline;
use super::registry::MonitorRegistry;
use crate::chain::{ChainGateway, LogStream};
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

const STATS_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

pub struct LogSubscriber {
    gateway: Arc<dyn ChainGateway>,
    pipeline: Arc<EventPipeline>,
    registry: MonitorRegistry,
    backoff: Duration,
    debounce: Duration,
}

impl LogSubscriber {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        pipeline: Arc<EventPipeline>,
        registry: MonitorRegistry,
        backoff: Duration,
    ) -> Self {
        Self {
            gateway,
            pipeline,
            registry,
            backoff,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Quiet period after a registry change before the filter is rebuilt
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sleep out the backoff. Returns true if shutdown arrived first.
    async fn backoff(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = shutdown.recv() => true,
            _ = tokio::time::sleep(self.backoff) => false,
        }
    }

    /// Subscribe with the current filter, marking every change so far as seen
    async fn open(&self, changes: &mut watch::Receiver<u64>) -> Result<LogStream> {
        changes.borrow_and_update();
        let filter = self.registry.filter();
        self.gateway.subscribe_logs(&filter).await
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut changes = self.registry.subscribe();
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut delivered: u64 = 0;
        let mut sessions: u64 = 0;
        let mut stats = tokio::time::interval(STATS_INTERVAL);

        'session: loop {
            let mut stream = match self.open(&mut changes).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("⚠️ Subscribe failed: {:#}, retrying in {:?}", e, self.backoff);
                    if self.backoff(&mut shutdown).await {
                        break 'session;
                    }
                    continue 'session;
                }
            };
            sessions += 1;
            info!(
                "📡 Log subscription #{} open ({} targets, generation {})",
                sessions,
                self.registry.len(),
                self.registry.generation()
            );
            let mut rebuild_at: Option<Instant> = None;

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Log subscriber shutting down");
                        break 'session;
                    }
                    Ok(()) = changes.changed(), if rebuild_at.is_none() => {
                        debug!("Monitor set changed, rebuilding in {:?}", self.debounce);
                        rebuild_at = Some(Instant::now() + self.debounce);
                    }
                    _ = sleep_until(rebuild_at.unwrap_or_else(Instant::now)), if rebuild_at.is_some() => {
                        rebuild_at = None;
                        match self.open(&mut changes).await {
                            Ok(next) => {
                                stream = next;
                                sessions += 1;
                                info!(
                                    "📡 Log subscription #{} rebuilt ({} targets, generation {})",
                                    sessions,
                                    self.registry.len(),
                                    self.registry.generation()
                                );
                            }
                            Err(e) => {
                                warn!("⚠️ Rebuild failed: {:#}, keeping current subscription", e);
                                rebuild_at = Some(Instant::now() + self.backoff);
                            }
                        }
                    }
                    item = stream.next() => match item {
                        Some(log) => {
                            delivered += 1;
                            let pipeline = self.pipeline.clone();
                            in_flight.spawn(async move { pipeline.handle_log(log).await });
                            while in_flight.try_join_next().is_some() {}
                        }
                        None => {
                            warn!("⚠️ Log subscription dropped, resubscribing in {:?}", self.backoff);
                            if self.backoff(&mut shutdown).await {
                                break 'session;
                            }
                            continue 'session;
                        }
                    },
                    _ = stats.tick() => {
                        debug!("Subscriber: {} logs delivered, {} in flight", delivered, in_flight.len());
                    }
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
        info!("Log subscriber stopped after {} logs", delivered);
    }
}
