//! Classification sink
//!
//! Receives receipts (polling) or single logs (subscription), classifies
//! them, persists the result and fans out triggers. Triggers only ever
//! enqueue trade jobs, so nothing here waits on a submission.

use super::registry::MonitorRegistry;
use crate::chain::{ChainGateway, RawLog, ReceiptLogs};
use crate::events::{topics, Classifier, NativeTransferWatcher};
use crate::filters::CreatorReputation;
use crate::notify::MultiNotifier;
use crate::oracle::PriceOracle;
use crate::positions::{ExitQueue, PositionLedger};
use crate::store::{CreationRecord, RecordStore, TradeAction, TradeRecord};
use crate::trade::{TradeDispatcher, TradeJob};
use crate::types::{to_units_string, to_wei, ClassifiedEvent, EventKind, MonitorTarget, Settlement};
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Transactions whose full receipt was already fetched in subscription mode
const FETCHED_TX_MEMORY: usize = 512;
const DEFAULT_RUNTIME_TARGET_TTL: Duration = Duration::from_secs(3600);

pub struct EventPipeline {
    classifier: Classifier,
    registry: MonitorRegistry,
    reputation: Arc<CreatorReputation>,
    ledger: PositionLedger,
    store: Arc<dyn RecordStore>,
    notifier: MultiNotifier,
    oracle: Arc<PriceOracle>,
    dispatcher: TradeDispatcher,
    exits: ExitQueue,
    native: Arc<NativeTransferWatcher>,
    gateway: Arc<dyn ChainGateway>,
    /// Idle runtime targets of tokens we no longer hold go after this
    runtime_target_ttl: Duration,
    smart_wallets: HashSet<Address>,
    smart_wallet_min: U256,
    /// Our own address; its trades never trigger anything
    wallet: Address,
    fetched_txs: Mutex<VecDeque<B256>>,
}

impl EventPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Classifier,
        registry: MonitorRegistry,
        reputation: Arc<CreatorReputation>,
        ledger: PositionLedger,
        store: Arc<dyn RecordStore>,
        notifier: MultiNotifier,
        oracle: Arc<PriceOracle>,
        dispatcher: TradeDispatcher,
        native: Arc<NativeTransferWatcher>,
        gateway: Arc<dyn ChainGateway>,
        wallet: Address,
    ) -> Self {
        let exits = ExitQueue::new(ledger.clone(), dispatcher.clone(), store.clone(), notifier.clone());
        Self {
            classifier,
            registry,
            reputation,
            ledger,
            store,
            notifier,
            oracle,
            dispatcher,
            exits,
            native,
            gateway,
            runtime_target_ttl: DEFAULT_RUNTIME_TARGET_TTL,
            smart_wallets: HashSet::new(),
            smart_wallet_min: U256::ZERO,
            wallet,
            fetched_txs: Mutex::new(VecDeque::with_capacity(FETCHED_TX_MEMORY)),
        }
    }

    pub fn with_smart_wallets(mut self, wallets: &[Address], min_amount_bnb: f64) -> Self {
        self.smart_wallets = wallets.iter().copied().collect();
        self.smart_wallet_min = to_wei(min_amount_bnb);
        self
    }

    pub fn with_runtime_target_ttl(mut self, ttl: Duration) -> Self {
        self.runtime_target_ttl = ttl;
        self
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    /// One transaction receipt from a polled block. Returns how many
    /// events it produced.
    pub async fn handle_receipt(&self, receipt: ReceiptLogs) -> usize {
        if self.native.is_candidate(&receipt) {
            self.native.dispatch(receipt).await;
            return 0;
        }
        if !self.registry.is_relevant(&receipt) {
            return 0;
        }
        self.classify_receipt(&receipt).await
    }

    async fn classify_receipt(&self, receipt: &ReceiptLogs) -> usize {
        let events = self.classifier.classify(receipt);
        let count = events.len();
        for ev in events {
            self.on_event(ev).await;
        }
        count
    }

    /// One log from the subscription. Manager events need the whole
    /// transaction, everything else is classified on its own.
    pub async fn handle_log(&self, log: RawLog) {
        let Some(topic0) = log.topic0().copied() else { return };

        if topics::needs_full_receipt(&topic0) {
            if !self.remember_tx(log.tx_hash) {
                return;
            }
            match self.gateway.receipt(log.tx_hash).await {
                Ok(Some(receipt)) => {
                    self.classify_receipt(&receipt).await;
                }
                Ok(None) => debug!("Receipt {:#x} not available yet", log.tx_hash),
                Err(e) => warn!("Receipt fetch for {:#x} failed: {:#}", log.tx_hash, e),
            }
            return;
        }

        // Settlement transfer of a transaction already classified in full
        if topic0 == topics::TRANSFER && self.seen_tx(log.tx_hash) {
            return;
        }
        if let Some(ev) = self.classifier.classify_log(&log) {
            self.on_event(ev).await;
        }
    }

    /// Returns false when `tx` was already remembered
    fn remember_tx(&self, tx: B256) -> bool {
        let mut seen = self.fetched_txs.lock().unwrap_or_else(|e| e.into_inner());
        if seen.contains(&tx) {
            return false;
        }
        if seen.len() >= FETCHED_TX_MEMORY {
            seen.pop_front();
        }
        seen.push_back(tx);
        true
    }

    fn seen_tx(&self, tx: B256) -> bool {
        self.fetched_txs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&tx)
    }

    // ── Event handling ────────────────────────────────────────────────

    pub async fn on_event(&self, ev: ClassifiedEvent) {
        self.persist(&ev);
        match ev.kind {
            EventKind::Created => self.on_created(&ev),
            EventKind::Buy | EventKind::Sell => self.on_trade(&ev).await,
            EventKind::PairCreated => self.on_pair_created(&ev),
            EventKind::LiquidityAdded => self.on_liquidity_added(&ev),
            EventKind::Destroyed | EventKind::OwnershipTransferred | EventKind::GenericTransfer => {}
        }
    }

    fn persist(&self, ev: &ClassifiedEvent) {
        let saved = if ev.kind.is_lifecycle() {
            self.store.save_creation_record(&CreationRecord::from_event(ev))
        } else {
            let bnb_per_quote = match ev.settlement {
                Settlement::Native => None,
                Settlement::Quote(_) => self.oracle.bnb_per_usd(),
            };
            self.store
                .save_trade_record(&TradeRecord::from_event(ev, bnb_per_quote))
        };
        if let Err(e) = saved {
            warn!("Failed to persist {:?} for {:#x}: {:#}", ev.kind, ev.token, e);
        }
    }

    fn on_created(&self, ev: &ClassifiedEvent) {
        let creator = ev.creator.unwrap_or(ev.from);
        if creator != Address::ZERO {
            self.reputation.record_creation(ev.token, creator, Utc::now());
        }

        if !self.reputation.is_whitelisted(creator) {
            return;
        }
        info!("⭐ Whitelisted creator {:#x} launched {:#x}", creator, ev.token);
        if let Some(target) = self
            .registry
            .matching(ev.token)
            .into_iter()
            .find(|t| t.trigger_on_creator_action)
        {
            self.queue_buy(target, ev.token);
        }
    }

    /// Queue a buy of `token`. A catch-all target that monitors new tokens
    /// first gets a token-specific child in the registry, and the buy runs
    /// under it.
    fn queue_buy(&self, target: Arc<MonitorTarget>, token: Address) {
        let target = if target.token.is_none() && target.monitor_new_tokens {
            let derived = target.for_token(token, &[]);
            self.registry.append(derived.clone());
            Arc::new(derived)
        } else {
            target
        };
        self.dispatcher.dispatch(TradeJob::Buy { target, token });
    }

    async fn on_trade(&self, ev: &ClassifiedEvent) {
        if let Some(creator) = self.reputation.record_trade(ev, Utc::now()) {
            self.on_rug(ev.token, creator).await;
        }

        if ev.kind != EventKind::Buy {
            return;
        }
        let trader = ev.trader.unwrap_or(ev.to);
        if trader == self.wallet {
            return;
        }

        let smart = self.smart_wallets.contains(&trader) && ev.payment_amount >= self.smart_wallet_min;
        let Some(target) = self
            .registry
            .matching(ev.token)
            .into_iter()
            .find(|t| t.trigger_on_buy || (smart && t.trigger_on_smart_wallet_buy))
        else {
            return;
        };

        if smart {
            info!(
                "🧠 Smart wallet {:#x} bought {:#x} for {} {}",
                trader,
                ev.token,
                to_units_string(ev.payment_amount),
                ev.settlement
            );
        } else {
            debug!("Buy trigger on {:#x} by {:#x} ({})", ev.token, trader, target.name);
        }
        self.queue_buy(target, ev.token);
    }

    async fn on_rug(&self, token: Address, creator: Address) {
        let message = format!("creator {:#x} sold {:#x} right after launch", creator, token);
        warn!("🚨 Rug pattern: {}", message);
        self.notifier.notify("Rug detected", &message).await;

        if let Some(position) = self.ledger.close(token) {
            warn!("🛑 Exiting {:#x} after creator dump", token);
            self.exits.submit(&position, TradeAction::SellStopLoss).await;
        }
    }

    fn on_pair_created(&self, ev: &ClassifiedEvent) {
        let Some(pair) = ev.pair else { return };
        let Some(template) = self.registry.matching(ev.token).into_iter().next() else {
            return;
        };
        // Only tokens already watched or held get their pair watched
        if template.token.is_some() || (template.monitor_new_tokens && self.ledger.is_holding(ev.token)) {
            info!("🥞 Pair {:#x} created for {:#x}", pair, ev.token);
            self.registry.append(template.for_token(ev.token, &[pair]));
        }
    }

    fn on_liquidity_added(&self, ev: &ClassifiedEvent) {
        let pair = ev.pair.unwrap_or(ev.token);
        let targets = self.registry.targets();
        let target = targets
            .iter()
            .find(|t| t.buy_on_liquidity_add && t.watch_addresses.contains(&pair))
            .or_else(|| targets.iter().find(|t| t.buy_on_liquidity_add && t.token.is_none()));
        if let Some(target) = target {
            info!("💧 Liquidity added to {:#x}, queueing secondary buy", pair);
            self.dispatcher.dispatch(TradeJob::LiquidityBuy {
                target: target.clone(),
                pair,
            });
        }
    }

    /// Purge expired token stats and idle runtime targets as of `now`
    pub fn housekeep(&self, now: DateTime<Utc>) {
        let purged = self.reputation.purge_expired(now);
        if purged > 0 {
            debug!(
                "Purged {} token stats, {} tracked",
                purged,
                self.reputation.tracked_tokens()
            );
        }
        let ttl = chrono::Duration::from_std(self.runtime_target_ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        let expired = self.registry.expire(now - ttl, |token| self.ledger.is_holding(token));
        if expired > 0 {
            debug!("{} targets left after expiry", self.registry.len());
        }
    }

    pub async fn run_housekeeping(self: Arc<Self>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => self.housekeep(Utc::now()),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::chain::testing::MockGateway;
    use crate::config::Protocols;
    use crate::store::testing::MemoryStore;
    use crate::types::MonitorTarget;
    use tokio::sync::mpsc;

    pub const WALLET: Address = Address::repeat_byte(0x77);

    /// Pipeline over in-memory collaborators; trade jobs land in the receiver
    pub fn pipeline(
        gateway: Arc<MockGateway>,
        targets: Vec<MonitorTarget>,
    ) -> (EventPipeline, Arc<MemoryStore>, mpsc::Receiver<TradeJob>) {
        let store = Arc::new(MemoryStore::default());
        let (dispatcher, jobs) = TradeDispatcher::channel(16);
        let native = Arc::new(NativeTransferWatcher::new(
            gateway.clone(),
            MultiNotifier::default(),
            2,
            10.0,
            30_000,
        ));
        let pipeline = EventPipeline::new(
            Classifier::new(Protocols::default()),
            MonitorRegistry::new(targets),
            Arc::new(CreatorReputation::new(600, 60)),
            PositionLedger::new(),
            store.clone(),
            MultiNotifier::default(),
            Arc::new(PriceOracle::new("http://127.0.0.1:9")),
            dispatcher,
            native,
            gateway,
            WALLET,
        );
        (pipeline, store, jobs)
    }
}
