//! In-memory [`ChainGateway`] used by unit tests

use super::gateway::{ChainGateway, LogStream, RawLog, ReceiptLogs, TxSummary};
use crate::events::topics;
use crate::events::words::address_word;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::rpc::types::Filter;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct MockGateway {
    latest: Mutex<u64>,
    blocks: Mutex<HashMap<u64, Vec<ReceiptLogs>>>,
    failing_blocks: Mutex<HashSet<u64>>,
    fetched: Mutex<Vec<u64>>,
    receipts: Mutex<HashMap<B256, ReceiptLogs>>,
    txs: Mutex<HashMap<B256, TxSummary>>,
    call_responses: Mutex<HashMap<[u8; 4], Bytes>>,
    calls: Mutex<Vec<(Address, Bytes)>>,
    nonce: Mutex<u64>,
    nonces: Mutex<HashMap<Address, u64>>,
    gas_price: Mutex<Option<u128>>,
    sent: Mutex<Vec<Bytes>>,
    streams: Mutex<VecDeque<LogStream>>,
    subscriptions: Mutex<Vec<Filter>>,
    fail_subscribe: Mutex<bool>,
    fail_send: Mutex<bool>,
    auto_confirm: Mutex<bool>,
}

impl MockGateway {
    pub fn new() -> Self {
        let gw = Self::default();
        *gw.gas_price.lock().unwrap() = Some(1_000_000_000);
        gw
    }

    pub fn set_latest(&self, block: u64) {
        *self.latest.lock().unwrap() = block;
    }

    pub fn insert_block(&self, block: u64, receipts: Vec<ReceiptLogs>) {
        self.blocks.lock().unwrap().insert(block, receipts);
    }

    pub fn fail_block(&self, block: u64) {
        self.failing_blocks.lock().unwrap().insert(block);
    }

    /// Blocks requested so far, in request order
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn insert_receipt(&self, receipt: ReceiptLogs) {
        self.receipts.lock().unwrap().insert(receipt.tx_hash, receipt);
    }

    pub fn insert_tx(&self, tx: TxSummary) {
        self.txs.lock().unwrap().insert(tx.hash, tx);
    }

    /// Respond to every `eth_call` whose calldata starts with `selector`
    pub fn respond(&self, selector: [u8; 4], data: Vec<u8>) {
        self.call_responses
            .lock()
            .unwrap()
            .insert(selector, Bytes::from(data));
    }

    pub fn calls(&self) -> Vec<(Address, Bytes)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_nonce(&self, nonce: u64) {
        *self.nonce.lock().unwrap() = nonce;
    }

    pub fn set_nonce_for(&self, address: Address, nonce: u64) {
        self.nonces.lock().unwrap().insert(address, nonce);
    }

    /// Reject every broadcast
    pub fn fail_sends(&self) {
        *self.fail_send.lock().unwrap() = true;
    }

    /// Store an empty successful receipt for every broadcast
    pub fn auto_confirm(&self) {
        *self.auto_confirm.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_sent_hash(&self) -> Option<B256> {
        self.sent.lock().unwrap().last().map(|raw| keccak256(raw))
    }

    /// Queue the logs delivered by the next subscription; the stream ends after them
    pub fn push_stream(&self, logs: Vec<RawLog>) {
        self.streams
            .lock()
            .unwrap()
            .push_back(Box::pin(futures::stream::iter(logs)));
    }

    /// Queue a next subscription that stays open and yields whatever is sent
    pub fn live_stream(&self) -> mpsc::UnboundedSender<RawLog> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|log| (log, rx)) });
        self.streams.lock().unwrap().push_back(Box::pin(stream));
        tx
    }

    /// Reject subscription attempts; they are still recorded
    pub fn fail_subscriptions(&self, fail: bool) {
        *self.fail_subscribe.lock().unwrap() = fail;
    }

    pub fn subscriptions(&self) -> Vec<Filter> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn latest_block(&self) -> Result<u64> {
        Ok(*self.latest.lock().unwrap())
    }

    async fn block_receipts(&self, block: u64) -> Result<Vec<ReceiptLogs>> {
        self.fetched.lock().unwrap().push(block);
        if self.failing_blocks.lock().unwrap().contains(&block) {
            return Err(anyhow!("block {} unavailable", block));
        }
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&block)
            .cloned()
            .unwrap_or_default())
    }

    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream> {
        self.subscriptions.lock().unwrap().push(filter.clone());
        if *self.fail_subscribe.lock().unwrap() {
            return Err(anyhow!("subscription rejected"));
        }
        match self.streams.lock().unwrap().pop_front() {
            Some(stream) => Ok(stream),
            None => Ok(Box::pin(futures::stream::pending::<RawLog>())),
        }
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        if let Some(n) = self.nonces.lock().unwrap().get(&address) {
            return Ok(*n);
        }
        Ok(*self.nonce.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<u128> {
        self.gas_price
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("gas price unavailable"))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.calls.lock().unwrap().push((to, data.clone()));
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| anyhow!("calldata too short"))?;
        self.call_responses
            .lock()
            .unwrap()
            .get(&selector)
            .cloned()
            .ok_or_else(|| anyhow!("execution reverted"))
    }

    async fn send_raw(&self, raw: Bytes) -> Result<B256> {
        if *self.fail_send.lock().unwrap() {
            return Err(anyhow!("insufficient funds for gas * price + value"));
        }
        let hash = keccak256(&raw);
        self.sent.lock().unwrap().push(raw);
        if *self.auto_confirm.lock().unwrap() {
            let mut receipt = receipt_with(Vec::new());
            receipt.tx_hash = hash;
            self.receipts.lock().unwrap().insert(hash, receipt);
        }
        Ok(hash)
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptLogs>> {
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TxSummary>> {
        Ok(self.txs.lock().unwrap().get(&hash).cloned())
    }
}

/// Log with default coordinates
pub fn raw_log(address: Address, topics: Vec<B256>, data: Vec<u8>) -> RawLog {
    RawLog {
        address,
        topics,
        data: Bytes::from(data),
        block_number: 100,
        tx_index: 1,
        log_index: 0,
        tx_hash: B256::repeat_byte(0xee),
    }
}

/// BEP20 Transfer log
pub fn transfer_log(token: Address, from: Address, to: Address, value: U256) -> RawLog {
    raw_log(
        token,
        vec![
            topics::TRANSFER,
            B256::from(address_word(from)),
            B256::from(address_word(to)),
        ],
        value.to_be_bytes::<32>().to_vec(),
    )
}

/// Successful receipt wrapping `logs`, with log indexes assigned in order
pub fn receipt_with(logs: Vec<RawLog>) -> ReceiptLogs {
    let logs = logs
        .into_iter()
        .enumerate()
        .map(|(i, mut log)| {
            log.log_index = i as u64;
            log
        })
        .collect();
    ReceiptLogs {
        block_number: 100,
        tx_index: 1,
        tx_hash: B256::repeat_byte(0xee),
        from: Address::repeat_byte(0xaa),
        to: Some(Address::repeat_byte(0xbb)),
        gas_used: 150_000,
        success: true,
        logs,
    }
}
