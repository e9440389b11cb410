//! Risk Evaluator
//!
//! Every tick: mark each open position, compare value / entry cost with
//! the take-profit and stop-loss multiples, close the position in the
//! ledger and queue the exit. Closing happens before the sell is even
//! submitted, so a slow or failed exit never triggers twice. An exit the
//! queue refuses reopens the position and is retried next tick.

use super::exit::ExitQueue;
use super::ledger::PositionLedger;
use crate::store::TradeAction;
use crate::trade::{MarketReader, SecondaryMarket};
use crate::types::{to_f64, Position};
use alloy::primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// BNB value of holding `quantity` of `token` right now
#[async_trait]
pub trait MarkPriceSource: Send + Sync {
    async fn mark_value(&self, token: Address, quantity: U256) -> Result<U256>;
}

/// PancakeSwap quote first, the launchpad's `trySell` when there is no pool
pub struct MarketPricer {
    secondary: Arc<SecondaryMarket>,
    market: Arc<MarketReader>,
}

impl MarketPricer {
    pub fn new(secondary: Arc<SecondaryMarket>, market: Arc<MarketReader>) -> Self {
        Self { secondary, market }
    }
}

#[async_trait]
impl MarkPriceSource for MarketPricer {
    async fn mark_value(&self, token: Address, quantity: U256) -> Result<U256> {
        match self.secondary.quote_sell(token, quantity).await {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!("Pancake quote for {:#x} unavailable ({:#}), using curve quote", token, e);
                Ok(self.market.try_sell(token, quantity).await?.funds)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
}

impl ExitReason {
    pub fn action(&self) -> TradeAction {
        match self {
            ExitReason::TakeProfit => TradeAction::SellTakeProfit,
            ExitReason::StopLoss => TradeAction::SellStopLoss,
        }
    }
}

pub struct RiskEvaluator {
    ledger: PositionLedger,
    pricer: Arc<dyn MarkPriceSource>,
    exits: ExitQueue,
    interval: Duration,
}

impl RiskEvaluator {
    pub fn new(
        ledger: PositionLedger,
        pricer: Arc<dyn MarkPriceSource>,
        exits: ExitQueue,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            pricer,
            exits,
            interval,
        }
    }

    /// Exit decision for one position at `value_bnb`. A worthless
    /// position is a stop loss; a position with no entry cost has no ratio.
    pub fn evaluate(position: &Position, value_bnb: f64) -> Option<ExitReason> {
        if position.entry_cost.is_zero() {
            return None;
        }
        let ratio = position.ratio(value_bnb);
        if ratio >= position.take_profit {
            Some(ExitReason::TakeProfit)
        } else if ratio <= position.stop_loss {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }

    /// One evaluation pass. Returns the exits that were queued.
    pub async fn tick(&self) -> Vec<(Address, ExitReason)> {
        let positions = self.ledger.open_positions();
        if positions.is_empty() {
            return Vec::new();
        }

        let marks = join_all(
            positions
                .iter()
                .map(|p| self.pricer.mark_value(p.token, p.quantity)),
        )
        .await;

        let mut exits = Vec::new();
        let mut total_cost = 0.0;
        let mut total_value = 0.0;

        for (position, mark) in positions.iter().zip(marks) {
            let value = match mark {
                Ok(v) => to_f64(v),
                Err(e) => {
                    warn!("Price fetch failed for {:#x}, skipping this tick: {:#}", position.token, e);
                    continue;
                }
            };
            let cost = to_f64(position.entry_cost);
            total_cost += cost;
            total_value += value;

            let ratio = position.ratio(value);
            debug!(
                "{:#x} value={:.6} BNB cost={:.6} BNB ratio={:.3}x",
                position.token, value, cost, ratio
            );

            let Some(reason) = Self::evaluate(position, value) else {
                continue;
            };
            // Lost the race with another closer
            let Some(closed) = self.ledger.close(position.token) else {
                continue;
            };

            match reason {
                ExitReason::TakeProfit => info!(
                    "🎯 Take profit {:#x} | ratio {:.3}x >= {}x",
                    position.token, ratio, position.take_profit
                ),
                ExitReason::StopLoss => warn!(
                    "🛑 Stop loss {:#x} | ratio {:.3}x <= {}x",
                    position.token, ratio, position.stop_loss
                ),
            }

            if self.exits.submit(&closed, reason.action()).await {
                exits.push((position.token, reason));
            }
        }

        let pnl = total_value - total_cost;
        info!(
            "📊 Portfolio: {} open | cost {:.4} BNB | value {:.4} BNB | P&L {:+.4} BNB",
            self.ledger.open_count(),
            total_cost,
            total_value,
            pnl
        );
        exits
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!("🛡️ Risk evaluator running every {:?}", self.interval);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Risk evaluator shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
