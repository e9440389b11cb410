//! Bounded trade dispatch
//!
//! Ingestion and the risk loop never wait on a trade. Jobs go into a
//! bounded queue; a single worker drains it and runs up to `concurrency`
//! router calls at once. A full queue drops the job with a warning; the
//! last quarter of the queue only takes exits, so a burst of buy triggers
//! cannot crowd them out.

use super::router::TradeRouter;
use crate::store::TradeAction;
use crate::types::MonitorTarget;
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub enum TradeJob {
    Buy {
        target: Arc<MonitorTarget>,
        token: Address,
    },
    LiquidityBuy {
        target: Arc<MonitorTarget>,
        pair: Address,
    },
    Sell {
        target: Arc<MonitorTarget>,
        token: Address,
        quantity: U256,
        action: TradeAction,
    },
}

impl TradeJob {
    pub fn is_exit(&self) -> bool {
        matches!(self, TradeJob::Sell { .. })
    }

    fn describe(&self) -> String {
        match self {
            TradeJob::Buy { token, .. } => format!("buy {:#x}", token),
            TradeJob::LiquidityBuy { pair, .. } => format!("liquidity buy via pair {:#x}", pair),
            TradeJob::Sell { token, action, .. } => format!("{:?} {:#x}", action, token),
        }
    }
}

#[derive(Clone)]
pub struct TradeDispatcher {
    tx: mpsc::Sender<TradeJob>,
    /// Free slots only exits may use
    exit_reserve: usize,
}

impl TradeDispatcher {
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<TradeJob>) {
        let depth = depth.max(1);
        let (tx, rx) = mpsc::channel(depth);
        (
            Self {
                tx,
                exit_reserve: depth / 4,
            },
            rx,
        )
    }

    /// Queue `job` without waiting. Returns false when it was dropped.
    pub fn dispatch(&self, job: TradeJob) -> bool {
        if !job.is_exit() && self.exit_reserve > 0 && self.tx.capacity() <= self.exit_reserve {
            warn!("⚠️ Trade queue nearly full, dropping {}", job.describe());
            return false;
        }
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!("⚠️ Trade queue full, dropping {}", job.describe());
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!("Trade worker stopped, dropping {}", job.describe());
                false
            }
        }
    }
}

async fn execute(router: &TradeRouter, job: TradeJob) {
    let label = job.describe();
    let result = match job {
        TradeJob::Buy { target, token } => router.execute_buy(&target, token).await,
        TradeJob::LiquidityBuy { target, pair } => router.execute_liquidity_buy(&target, pair).await,
        TradeJob::Sell {
            target,
            token,
            quantity,
            action,
        } => router.execute_sell(&target, token, quantity, action).await,
    };
    match result {
        Ok(Some(hash)) => info!("Trade job {} submitted: {:#x}", label, hash),
        Ok(None) => {}
        Err(e) => error!("❌ Trade job {} failed: {:#}", label, e),
    }
}

/// Drain the queue until shutdown, then finish the jobs already running
pub async fn run_worker(
    router: Arc<TradeRouter>,
    mut rx: mpsc::Receiver<TradeJob>,
    concurrency: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut running = JoinSet::new();
    info!("🔧 Trade worker started (concurrency {})", concurrency.max(1));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("Trade worker shutting down");
                break;
            }
            job = rx.recv() => {
                let Some(job) = job else { break };
                let Ok(permit) = permits.clone().acquire_owned().await else { break };
                let router = router.clone();
                running.spawn(async move {
                    execute(&router, job).await;
                    drop(permit);
                });
                while running.try_join_next().is_some() {}
            }
        }
    }

    while let Some(res) = running.join_next().await {
        if let Err(e) = res {
            warn!("Trade job panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_queue_drops_job() {
        let (dispatcher, mut rx) = TradeDispatcher::channel(1);
        let target = Arc::new(MonitorTarget::named("t"));
        let job = TradeJob::Buy {
            target,
            token: Address::repeat_byte(1),
        };
        assert!(dispatcher.dispatch(job.clone()));
        assert!(!dispatcher.dispatch(job));

        match rx.recv().await {
            Some(TradeJob::Buy { token, .. }) => assert_eq!(token, Address::repeat_byte(1)),
            other => panic!("unexpected job {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_buys_leave_room_for_exits() {
        let (dispatcher, _rx) = TradeDispatcher::channel(4);
        let target = Arc::new(MonitorTarget::named("t"));
        let buy = TradeJob::Buy {
            target: target.clone(),
            token: Address::repeat_byte(1),
        };
        for _ in 0..3 {
            assert!(dispatcher.dispatch(buy.clone()));
        }
        assert!(!dispatcher.dispatch(buy));

        let sell = TradeJob::Sell {
            target,
            token: Address::repeat_byte(1),
            quantity: U256::from(10),
            action: TradeAction::SellStopLoss,
        };
        assert!(dispatcher.dispatch(sell.clone()));
        assert!(!dispatcher.dispatch(sell));
    }

    #[tokio::test]
    async fn test_closed_queue_drops_job() {
        let (dispatcher, rx) = TradeDispatcher::channel(4);
        drop(rx);
        let job = TradeJob::LiquidityBuy {
            target: Arc::new(MonitorTarget::named("t")),
            pair: Address::repeat_byte(2),
        };
        assert!(!dispatcher.dispatch(job));
    }
}
