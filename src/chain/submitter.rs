//! Transaction Submitter
//!
//! Builds, signs and submits legacy (EIP-155) transactions. Nonce lookup
//! and submission are serialized behind one lock so concurrent trades from
//! the dispatch queue never race for the same pending nonce.

use super::gateway::ChainGateway;
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const GWEI: u128 = 1_000_000_000;

/// Gas limit for launchpad and router trades
pub const TRADE_GAS_LIMIT: u64 = 1_200_000;
/// Gas limit for BEP20 approvals
pub const APPROVE_GAS_LIMIT: u64 = 100_000;

/// Gas pricing rules
#[derive(Debug, Clone)]
pub struct GasPolicy {
    /// Multiplier applied to the node's suggested price
    pub multiplier: f64,
    /// Used when the node cannot suggest a price
    pub fallback_wei: u128,
    /// Hard ceiling
    pub max_wei: u128,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            multiplier: 1.1,
            fallback_wei: GWEI,
            max_wei: 10 * GWEI,
        }
    }
}

impl GasPolicy {
    pub fn with_max_gwei(mut self, gwei: u64) -> Self {
        self.max_wei = u128::from(gwei) * GWEI;
        self
    }

    /// Apply the multiplier and ceiling to a suggested price
    pub fn price(&self, suggested: Option<u128>) -> u128 {
        let base = match suggested {
            Some(p) => (p as f64 * self.multiplier) as u128,
            None => self.fallback_wei,
        };
        base.min(self.max_wei)
    }
}

/// A contract call ready to be signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
}

pub struct TxSubmitter {
    gateway: Arc<dyn ChainGateway>,
    signer: PrivateKeySigner,
    chain_id: u64,
    gas: GasPolicy,
    dry_run: bool,
    submit_lock: Mutex<()>,
}

impl TxSubmitter {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        signer: PrivateKeySigner,
        chain_id: u64,
        gas: GasPolicy,
    ) -> Self {
        Self {
            gateway,
            signer,
            chain_id,
            gas,
            dry_run: false,
            submit_lock: Mutex::new(()),
        }
    }

    /// Enable or disable dry run mode
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
        if dry_run {
            info!("Submitter in DRY RUN mode - transactions are signed but never sent");
        } else {
            warn!("⚠️ Submitter in LIVE mode - transactions will be broadcast!");
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    async fn gas_price(&self) -> u128 {
        let suggested = match self.gateway.gas_price().await {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Gas price lookup failed, using fallback: {}", e);
                None
            }
        };
        self.gas.price(suggested)
    }

    /// Sign and broadcast `req`, returning the transaction hash
    pub async fn submit(&self, req: CallRequest) -> Result<B256> {
        let _guard = self.submit_lock.lock().await;

        let nonce = self.gateway.pending_nonce(self.address()).await?;
        let gas_price = self.gas_price().await;

        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit: req.gas_limit,
            to: TxKind::Call(req.to),
            value: req.value,
            input: req.data,
        };

        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .context("Failed to sign transaction")?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        let hash = *signed.tx_hash();

        if self.dry_run {
            info!(
                "🧪 DRY RUN tx {:#x} | to={:#x} nonce={} gas_price={} value={}",
                hash, req.to, nonce, gas_price, req.value
            );
            return Ok(hash);
        }

        let raw = Bytes::from(signed.encoded_2718());
        let sent = self.gateway.send_raw(raw).await?;
        info!("📤 Submitted tx {:#x} | to={:#x} nonce={}", sent, req.to, nonce);
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::MockGateway;

    #[test]
    fn test_gas_policy() {
        let policy = GasPolicy::default();
        assert_eq!(policy.price(Some(GWEI)), 1_100_000_000);
        assert_eq!(policy.price(None), GWEI);
        assert_eq!(policy.price(Some(100 * GWEI)), 10 * GWEI);
        assert_eq!(GasPolicy::default().with_max_gwei(3).max_wei, 3 * GWEI);
    }

    #[tokio::test]
    async fn test_submit_sends_signed_raw_tx() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_nonce(7);
        let submitter = TxSubmitter::new(
            gateway.clone(),
            PrivateKeySigner::random(),
            56,
            GasPolicy::default(),
        );
        let req = CallRequest {
            to: Address::repeat_byte(9),
            data: Bytes::from(vec![1, 2, 3, 4]),
            value: U256::from(5),
            gas_limit: TRADE_GAS_LIMIT,
        };
        let hash = submitter.submit(req).await.unwrap();
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(hash, gateway.last_sent_hash().unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_send() {
        let gateway = Arc::new(MockGateway::new());
        let mut submitter = TxSubmitter::new(
            gateway.clone(),
            PrivateKeySigner::random(),
            56,
            GasPolicy::default(),
        );
        submitter.set_dry_run(true);
        let req = CallRequest {
            to: Address::repeat_byte(9),
            data: Bytes::new(),
            value: U256::ZERO,
            gas_limit: APPROVE_GAS_LIMIT,
        };
        let hash = submitter.submit(req).await.unwrap();
        assert_ne!(hash, B256::ZERO);
        assert!(gateway.sent().is_empty());
    }
}
