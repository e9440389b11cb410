//! Exit submission
//!
//! Hands a position that was just closed to the trade queue. A sell the
//! queue refuses never left the process, so the position is reopened for
//! the next risk tick, the refusal is stored as a failed trade and the
//! operator is told.

use super::ledger::PositionLedger;
use crate::notify::MultiNotifier;
use crate::store::{RecordStore, TradeAction, TradeRecord};
use crate::trade::{TradeDispatcher, TradeJob};
use crate::types::Position;
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct ExitQueue {
    ledger: PositionLedger,
    dispatcher: TradeDispatcher,
    store: Arc<dyn RecordStore>,
    notifier: MultiNotifier,
}

impl ExitQueue {
    pub fn new(
        ledger: PositionLedger,
        dispatcher: TradeDispatcher,
        store: Arc<dyn RecordStore>,
        notifier: MultiNotifier,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            store,
            notifier,
        }
    }

    /// Queue the sell for `closed`. Returns whether it was queued.
    pub async fn submit(&self, closed: &Position, action: TradeAction) -> bool {
        let queued = self.dispatcher.dispatch(TradeJob::Sell {
            target: closed.target.clone(),
            token: closed.token,
            quantity: closed.quantity,
            action,
        });
        if queued {
            return true;
        }

        self.ledger.reopen(closed.token);
        let record = TradeRecord::agent(
            action,
            closed.version,
            Address::ZERO,
            closed.token,
            None,
            closed.quantity,
            U256::ZERO,
            closed.target.sell_slippage,
        )
        .failed("exit not queued: trade queue full or stopped");
        if let Err(e) = self.store.save_trade_record(&record) {
            warn!("Failed to persist refused exit for {:#x}: {:#}", closed.token, e);
        }

        let message = format!(
            "{:?} for {:#x} ({} tokens) was not queued; position reopened for retry",
            action, closed.token, closed.quantity
        );
        warn!("❌ {}", message);
        self.notifier.notify("Exit not queued", &message).await;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::testing::MemoryStore;
    use crate::store::TradeStatus;
    use crate::types::{to_wei, MonitorTarget, ProtocolVersion};
    use alloy::primitives::B256;

    #[tokio::test]
    async fn test_refused_exit_reopens_records_and_notifies() {
        let ledger = PositionLedger::new();
        let token = Address::repeat_byte(1);
        ledger.open(Position::new(
            token,
            B256::ZERO,
            to_wei(1.0),
            to_wei(1000.0),
            ProtocolVersion::V2,
            Arc::new(MonitorTarget::named("t")),
        ));
        let (dispatcher, rx) = TradeDispatcher::channel(4);
        drop(rx);
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(RecordingNotifier::default());
        let exits = ExitQueue::new(
            ledger.clone(),
            dispatcher,
            store.clone(),
            MultiNotifier::default().with_sink(sink.clone()),
        );

        let closed = ledger.close(token).unwrap();
        assert!(!exits.submit(&closed, TradeAction::SellStopLoss).await);

        assert!(ledger.is_holding(token));
        let trades = store.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Failed);
        assert_eq!(trades[0].action, Some(TradeAction::SellStopLoss));
        assert_eq!(sink.titles(), vec!["Exit not queued".to_string()]);
    }
}
