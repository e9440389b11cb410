//! Large native transfer heuristic
//!
//! Flags plain BNB transfers above a threshold and tells whether the
//! receiver is a fresh address (pending nonce 0). Candidates are cheap to
//! spot from the receipt alone; confirmation needs the full transaction
//! and a nonce lookup, so it runs on a bounded pool of tasks.

use crate::chain::{ChainGateway, ReceiptLogs};
use crate::notify::MultiNotifier;
use crate::types::{to_f64, to_wei};
use alloy::primitives::{Address, B256, U256};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Legacy and EIP-1559 envelopes only
const PLAIN_TX_TYPES: [u8; 2] = [0, 2];

#[derive(Debug, Clone, PartialEq)]
pub struct NativeTransferFinding {
    pub tx_hash: B256,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    /// Receiver had never sent a transaction
    pub fresh_receiver: bool,
}

pub struct NativeTransferWatcher {
    gateway: Arc<dyn ChainGateway>,
    notifier: MultiNotifier,
    permits: Arc<Semaphore>,
    min_value: U256,
    max_gas: u64,
}

impl NativeTransferWatcher {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        notifier: MultiNotifier,
        pool_size: usize,
        min_value_bnb: f64,
        max_gas: u64,
    ) -> Self {
        Self {
            gateway,
            notifier,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            min_value: to_wei(min_value_bnb),
            max_gas,
        }
    }

    /// Receipt looks like a plain value transfer
    pub fn is_candidate(&self, receipt: &ReceiptLogs) -> bool {
        receipt.success
            && receipt.logs.is_empty()
            && receipt.to.is_some()
            && receipt.gas_used <= self.max_gas
    }

    /// Inspect `receipt` on the pool. Waits for a free slot, so a burst of
    /// candidates back-pressures the caller instead of piling up tasks.
    pub async fn dispatch(self: &Arc<Self>, receipt: ReceiptLogs) -> Option<JoinHandle<()>> {
        if !self.is_candidate(&receipt) {
            return None;
        }
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return None,
        };
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _permit = permit;
            match this.inspect(&receipt).await {
                Ok(Some(finding)) => this.report(&finding).await,
                Ok(None) => {}
                Err(e) => warn!("Native transfer check for {:#x} failed: {}", receipt.tx_hash, e),
            }
        }))
    }

    /// Confirm a candidate against the full transaction
    pub async fn inspect(&self, receipt: &ReceiptLogs) -> Result<Option<NativeTransferFinding>> {
        if !self.is_candidate(receipt) {
            return Ok(None);
        }
        let Some(tx) = self.gateway.transaction(receipt.tx_hash).await? else {
            debug!("Transaction {:#x} not found", receipt.tx_hash);
            return Ok(None);
        };
        if !PLAIN_TX_TYPES.contains(&tx.tx_type) {
            return Ok(None);
        }
        let Some(to) = tx.to else { return Ok(None) };
        if tx.value <= self.min_value {
            return Ok(None);
        }

        let nonce = self.gateway.pending_nonce(to).await?;
        Ok(Some(NativeTransferFinding {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            from: tx.from,
            to,
            value: tx.value,
            fresh_receiver: nonce == 0,
        }))
    }

    async fn report(&self, finding: &NativeTransferFinding) {
        let label = if finding.fresh_receiver { "fresh" } else { "seasoned" };
        let message = format!(
            "{:.2} BNB {:#x} -> {:#x} ({} receiver) | tx {:#x} block {}",
            to_f64(finding.value),
            finding.from,
            finding.to,
            label,
            finding.tx_hash,
            finding.block_number
        );
        info!("🐋 Large native transfer | {}", message);
        self.notifier.notify("Large native transfer", &message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::{receipt_with, transfer_log, MockGateway};
    use crate::chain::TxSummary;

    fn watcher(gateway: Arc<MockGateway>) -> NativeTransferWatcher {
        NativeTransferWatcher::new(gateway, MultiNotifier::default(), 2, 10.0, 30_000)
    }

    fn plain_receipt() -> ReceiptLogs {
        let mut r = receipt_with(vec![]);
        r.gas_used = 21_000;
        r
    }

    fn tx(value_bnb: f64, tx_type: u8) -> TxSummary {
        TxSummary {
            hash: B256::repeat_byte(0xee),
            from: Address::repeat_byte(0xaa),
            to: Some(Address::repeat_byte(0xbb)),
            value: to_wei(value_bnb),
            gas_limit: 21_000,
            tx_type,
        }
    }

    #[test]
    fn test_candidate_filter() {
        let w = watcher(Arc::new(MockGateway::new()));
        assert!(w.is_candidate(&plain_receipt()));

        let mut heavy = plain_receipt();
        heavy.gas_used = 50_000;
        assert!(!w.is_candidate(&heavy));

        let with_logs = receipt_with(vec![transfer_log(
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
            U256::from(1),
        )]);
        assert!(!w.is_candidate(&with_logs));

        let mut creation = plain_receipt();
        creation.to = None;
        assert!(!w.is_candidate(&creation));
    }

    #[tokio::test]
    async fn test_fresh_receiver_flagged() {
        let gateway = Arc::new(MockGateway::new());
        gateway.insert_tx(tx(25.0, 0));
        gateway.set_nonce_for(Address::repeat_byte(0xbb), 0);
        let finding = watcher(gateway).inspect(&plain_receipt()).await.unwrap().unwrap();
        assert!(finding.fresh_receiver);
        assert_eq!(finding.value, to_wei(25.0));
    }

    #[tokio::test]
    async fn test_small_or_typed_transfers_ignored() {
        let gateway = Arc::new(MockGateway::new());
        gateway.insert_tx(tx(10.0, 0));
        assert!(watcher(gateway.clone()).inspect(&plain_receipt()).await.unwrap().is_none());

        gateway.insert_tx(tx(50.0, 1));
        assert!(watcher(gateway).inspect(&plain_receipt()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seasoned_receiver() {
        let gateway = Arc::new(MockGateway::new());
        gateway.insert_tx(tx(11.0, 2));
        gateway.set_nonce_for(Address::repeat_byte(0xbb), 4);
        let w = Arc::new(watcher(gateway));
        let finding = w.inspect(&plain_receipt()).await.unwrap().unwrap();
        assert!(!finding.fresh_receiver);
        let handle = w.dispatch(plain_receipt()).await.unwrap();
        handle.await.unwrap();
    }
}
