//! Chain Gateway
//!
//! Thin facade over the alloy provider. Everything above this layer talks
//! to the chain through [`ChainGateway`] and sees only the flattened
//! [`ReceiptLogs`] / [`RawLog`] shapes, which keeps the classifier pure and
//! lets the poller, router and risk loop run against an in-memory fake.

use alloy::consensus::Transaction as _;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log, TransactionInput, TransactionReceipt, TransactionRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

/// Push stream of logs; dropping it cancels the subscription
pub type LogStream = Pin<Box<dyn Stream<Item = RawLog> + Send>>;

/// One log with its chain coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
    pub tx_hash: B256,
}

impl RawLog {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

impl From<&Log> for RawLog {
    fn from(log: &Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number: log.block_number.unwrap_or_default(),
            tx_index: log.transaction_index.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            tx_hash: log.transaction_hash.unwrap_or_default(),
        }
    }
}

/// The parts of a receipt the agent cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLogs {
    pub block_number: u64,
    pub tx_index: u64,
    pub tx_hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub gas_used: u64,
    pub success: bool,
    pub logs: Vec<RawLog>,
}

impl From<&TransactionReceipt> for ReceiptLogs {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            block_number: receipt.block_number.unwrap_or_default(),
            tx_index: receipt.transaction_index.unwrap_or_default(),
            tx_hash: receipt.transaction_hash,
            from: receipt.from,
            to: receipt.to,
            gas_used: receipt.gas_used,
            success: receipt.status(),
            logs: receipt.inner.logs().iter().map(RawLog::from).collect(),
        }
    }
}

/// Summary of a transaction body (native-transfer heuristic)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSummary {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_limit: u64,
    /// EIP-2718 type byte (0 legacy, 2 dynamic fee)
    pub tx_type: u8,
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn latest_block(&self) -> Result<u64>;
    async fn block_receipts(&self, block: u64) -> Result<Vec<ReceiptLogs>>;
    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream>;
    async fn pending_nonce(&self, address: Address) -> Result<u64>;
    async fn gas_price(&self) -> Result<u128>;
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
    async fn send_raw(&self, raw: Bytes) -> Result<B256>;
    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptLogs>>;
    async fn transaction(&self, hash: B256) -> Result<Option<TxSummary>>;
}

/// [`ChainGateway`] backed by any alloy provider (WS in production)
pub struct AlloyGateway<P> {
    provider: P,
}

impl<P: Provider> AlloyGateway<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider + Send + Sync + 'static> ChainGateway for AlloyGateway<P> {
    async fn latest_block(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("eth_blockNumber failed")
    }

    async fn block_receipts(&self, block: u64) -> Result<Vec<ReceiptLogs>> {
        let receipts = self
            .provider
            .get_block_receipts(BlockNumberOrTag::Number(block).into())
            .await
            .with_context(|| format!("eth_getBlockReceipts failed for block {}", block))?
            .unwrap_or_default();
        Ok(receipts.iter().map(ReceiptLogs::from).collect())
    }

    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream> {
        let sub = self
            .provider
            .subscribe_logs(filter)
            .await
            .context("eth_subscribe(logs) failed")?;
        let stream = sub.into_stream().map(|log| RawLog::from(&log));
        Ok(Box::pin(stream))
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .with_context(|| format!("pending nonce lookup failed for {:#x}", address))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider
            .get_gas_price()
            .await
            .context("eth_gasPrice failed")
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(data));
        self.provider
            .call(tx)
            .await
            .with_context(|| format!("eth_call to {:#x} failed", to))
    }

    async fn send_raw(&self, raw: Bytes) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .context("eth_sendRawTransaction failed")?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptLogs>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .with_context(|| format!("receipt lookup failed for {:#x}", hash))?;
        Ok(receipt.as_ref().map(ReceiptLogs::from))
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TxSummary>> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .with_context(|| format!("transaction lookup failed for {:#x}", hash))?;
        Ok(tx.map(|tx| TxSummary {
            hash,
            from: tx.inner.signer(),
            to: tx.to(),
            value: tx.value(),
            gas_limit: tx.gas_limit(),
            tx_type: tx.inner.tx_type() as u8,
        }))
    }
}
