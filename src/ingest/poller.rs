//! Block Poller
//!
//! On every tick: read the tip, fetch receipts for every block after the
//! marker, feed them to the pipeline, then move the marker to the end of
//! the batch. The marker lock is held for the whole pass so two passes
//! never overlap. A block whose receipts fail to load is skipped.

use super::pipeline::EventPipeline;
use crate::chain::ChainGateway;
use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Blocks whose receipts are fetched at once; a long catch-up after an
/// outage would otherwise open one request per missed block
const FETCH_CONCURRENCY: usize = 16;

/// What one pass covered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPass {
    pub from: u64,
    pub to: u64,
    pub failed: usize,
    pub events: usize,
}

pub struct BlockPoller {
    gateway: Arc<dyn ChainGateway>,
    pipeline: Arc<EventPipeline>,
    last_processed: Mutex<Option<u64>>,
    backfill: u64,
    /// Optional per-pass cap; `None` covers everything up to the tip
    max_blocks: Option<u64>,
    interval: Duration,
}

impl BlockPoller {
    /// `max_blocks` of 0 means every pass runs up to the tip
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        pipeline: Arc<EventPipeline>,
        backfill: u64,
        max_blocks: u64,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            pipeline,
            last_processed: Mutex::new(None),
            backfill,
            max_blocks: (max_blocks > 0).then_some(max_blocks),
            interval,
        }
    }

    pub async fn last_processed(&self) -> Option<u64> {
        *self.last_processed.lock().await
    }

    /// One pass. `None` when there was nothing new.
    pub async fn poll_once(&self) -> Result<Option<PollPass>> {
        let mut marker = self.last_processed.lock().await;
        let latest = self
            .gateway
            .latest_block()
            .await
            .context("Failed to read latest block")?;

        let last = match *marker {
            Some(m) => m,
            None => {
                let seeded = latest.saturating_sub(self.backfill);
                info!("📍 Starting at block {} (tip {}, backfill {})", seeded + 1, latest, self.backfill);
                *marker = Some(seeded);
                seeded
            }
        };
        if latest <= last {
            return Ok(None);
        }

        let end = match self.max_blocks {
            Some(cap) => latest.min(last + cap),
            None => latest,
        };
        let results: Vec<Option<usize>> = stream::iter(last + 1..=end)
            .map(|b| self.process_block(b))
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_none()).count();
        let events = results.iter().flatten().sum();
        *marker = Some(end);

        if end < latest {
            debug!("Catching up: processed to {}, tip {}", end, latest);
        }
        Ok(Some(PollPass {
            from: last + 1,
            to: end,
            failed,
            events,
        }))
    }

    /// Events produced by one block, `None` if its receipts failed to load
    async fn process_block(&self, block: u64) -> Option<usize> {
        let receipts = match self.gateway.block_receipts(block).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping block {}: {:#}", block, e);
                return None;
            }
        };
        let mut events = 0;
        for receipt in receipts {
            events += self.pipeline.handle_receipt(receipt).await;
        }
        Some(events)
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("🔄 Block poller running every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Block poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(Some(pass)) if pass.events > 0 || pass.failed > 0 => info!(
                            "Blocks {}-{}: {} events, {} skipped",
                            pass.from, pass.to, pass.events, pass.failed
                        ),
                        Ok(_) => {}
                        Err(e) => warn!("Poll failed: {:#}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::{raw_log, receipt_with, transfer_log, MockGateway};
    use crate::contracts::TOKEN_MANAGER_V2;
    use crate::events::topics;
    use crate::events::words::{address_word, encode_words};
    use crate::ingest::pipeline::testing::pipeline;
    use crate::types::{EventKind, MonitorTarget};
    use alloy::primitives::{Address, U256};

    fn poller(gateway: Arc<MockGateway>, backfill: u64, max_blocks: u64) -> BlockPoller {
        let (pipeline, _, _) = pipeline(gateway.clone(), vec![MonitorTarget::named("all")]);
        BlockPoller::new(gateway, Arc::new(pipeline), backfill, max_blocks, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_first_pass_backfills_and_covers_every_block_once() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_latest(110);
        let p = poller(gateway.clone(), 10, 0);

        let pass = p.poll_once().await.unwrap().unwrap();
        assert_eq!((pass.from, pass.to), (101, 110));
        let mut fetched = gateway.fetched();
        fetched.sort_unstable();
        assert_eq!(fetched, (101..=110).collect::<Vec<_>>());
        assert_eq!(p.last_processed().await, Some(110));

        // Nothing new
        assert!(p.poll_once().await.unwrap().is_none());
        assert_eq!(gateway.fetched().len(), 10);
    }

    #[tokio::test]
    async fn test_failed_block_is_skipped_not_retried() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_latest(105);
        gateway.fail_block(103);
        let p = poller(gateway.clone(), 5, 100);

        let pass = p.poll_once().await.unwrap().unwrap();
        assert_eq!(pass.failed, 1);
        assert_eq!(p.last_processed().await, Some(105));

        gateway.set_latest(107);
        let pass = p.poll_once().await.unwrap().unwrap();
        assert_eq!((pass.from, pass.to), (106, 107));
        assert_eq!(gateway.fetched().iter().filter(|b| **b == 103).count(), 1);
    }

    #[tokio::test]
    async fn test_marker_is_monotonic_and_batches_are_capped() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_latest(100);
        let p = poller(gateway.clone(), 0, 3);
        assert!(p.poll_once().await.unwrap().is_none());
        assert_eq!(p.last_processed().await, Some(100));

        gateway.set_latest(108);
        let pass = p.poll_once().await.unwrap().unwrap();
        assert_eq!((pass.from, pass.to), (101, 103));

        // Lagging node reports an older tip
        gateway.set_latest(102);
        assert!(p.poll_once().await.unwrap().is_none());
        assert_eq!(p.last_processed().await, Some(103));
    }

    #[tokio::test]
    async fn test_uncapped_pass_reaches_tip_after_long_gap() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_latest(100);
        let p = poller(gateway.clone(), 0, 0);
        assert!(p.poll_once().await.unwrap().is_none());

        gateway.set_latest(600);
        let pass = p.poll_once().await.unwrap().unwrap();
        assert_eq!((pass.from, pass.to), (101, 600));
        assert_eq!(gateway.fetched().len(), 500);
        assert_eq!(p.last_processed().await, Some(600));
    }

    #[tokio::test]
    async fn test_receipts_in_block_reach_the_pipeline() {
        let gateway = Arc::new(MockGateway::new());
        let token = Address::repeat_byte(1);
        let (pipeline, store, _) = pipeline(gateway.clone(), vec![MonitorTarget::named("all").for_token(token, &[])]);
        let p = BlockPoller::new(gateway.clone(), Arc::new(pipeline), 2, 0, Duration::from_millis(10));

        let buyer = Address::repeat_byte(2);
        let purchase = encode_words(&[
            U256::from_be_bytes(address_word(token)),
            U256::from_be_bytes(address_word(buyer)),
            U256::from(1),
            U256::from(10),
            U256::from(100),
            U256::from(1),
            U256::ZERO,
            U256::ZERO,
        ]);
        let mut receipt = receipt_with(vec![
            raw_log(TOKEN_MANAGER_V2, vec![topics::V2_PURCHASE], purchase),
            transfer_log(token, TOKEN_MANAGER_V2, buyer, U256::from(10)),
        ]);
        receipt.block_number = 9;
        gateway.insert_block(9, vec![receipt]);
        gateway.set_latest(10);

        let pass = p.poll_once().await.unwrap().unwrap();
        assert_eq!((pass.from, pass.to), (9, 10));
        assert_eq!(pass.events, 1);
        let trades = store.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].type_code, EventKind::Buy.code());
        assert_eq!(trades[0].token, token);
    }
}
