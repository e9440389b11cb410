//! Trade Router
//!
//! Entry point for every trade the agent makes:
//! 1. policy checks (amount, open position, creator reputation)
//! 2. market state query and adapter selection
//! 3. min-output bound, approval when the adapter needs one
//! 4. sign + submit; failures are recorded and returned
//! 5. confirmation runs in the background and settles the ledger once
//!
//! Policy violations come back as `Ok(None)`; only real failures are errors.

use super::market::{MarketReader, TokenStatus};
use super::min_output::{apply_slippage, clamp_min_output};
use super::secondary::SecondaryMarket;
use super::strategy::StrategyTable;
use crate::chain::{
    extract_token_out, wait_for_receipt, CallRequest, ChainGateway, ReceiptLogs,
    ReceiptPolicy, TxSubmitter, APPROVE_GAS_LIMIT,
};
use crate::contracts::IERC20;
use crate::error::TradeError;
use crate::filters::CreatorReputation;
use crate::notify::MultiNotifier;
use crate::positions::PositionLedger;
use crate::store::{RecordStore, TradeAction, TradeRecord, TradeStatus};
use crate::types::{to_units_string, MonitorTarget, Position, ProtocolVersion, TradeSide};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use anyhow::Result;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Everything the background confirmation of one trade needs
struct PendingTrade {
    action: TradeAction,
    token: Address,
    tx_hash: B256,
    version: ProtocolVersion,
    amount_in: U256,
    min_out: U256,
    /// Contracts the settling transfer may come from
    sources: Vec<Address>,
    target: Arc<MonitorTarget>,
}

pub struct TradeRouter {
    submitter: Arc<TxSubmitter>,
    gateway: Arc<dyn ChainGateway>,
    market: Arc<MarketReader>,
    strategies: StrategyTable,
    secondary: Arc<SecondaryMarket>,
    ledger: PositionLedger,
    reputation: Arc<CreatorReputation>,
    store: Arc<dyn RecordStore>,
    notifier: MultiNotifier,
    receipt_policy: ReceiptPolicy,
    confirmations: Mutex<JoinSet<()>>,
}

impl TradeRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        submitter: Arc<TxSubmitter>,
        gateway: Arc<dyn ChainGateway>,
        market: Arc<MarketReader>,
        strategies: StrategyTable,
        secondary: Arc<SecondaryMarket>,
        ledger: PositionLedger,
        reputation: Arc<CreatorReputation>,
        store: Arc<dyn RecordStore>,
        notifier: MultiNotifier,
        receipt_policy: ReceiptPolicy,
    ) -> Self {
        Self {
            submitter,
            gateway,
            market,
            strategies,
            secondary,
            ledger,
            reputation,
            store,
            notifier,
            receipt_policy,
            confirmations: Mutex::new(JoinSet::new()),
        }
    }

    pub fn wallet(&self) -> Address {
        self.submitter.address()
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    // ── Buy ───────────────────────────────────────────────────────────

    /// Buy `token` on its launchpad curve with the target's sizing
    pub async fn execute_buy(&self, target: &Arc<MonitorTarget>, token: Address) -> Result<Option<B256>> {
        swallow_policy(token, "buy", self.buy_primary(target, token)).await
    }

    async fn buy_primary(&self, target: &Arc<MonitorTarget>, token: Address) -> Result<B256> {
        let amount = self.check_buy_policy(target, token)?;

        let state = self.market.token_state(token).await?;
        if state.status() != TokenStatus::Trading {
            return Err(TradeError::NotTrading {
                token,
                status: state.status(),
            }
            .into());
        }

        let adapter = self.strategies.resolve(token, &state)?;
        let version = adapter.version();
        let min_out = clamp_min_output(
            adapter
                .compute_min_output(TradeSide::Buy, token, amount, target.slippage, &state)
                .await,
        );
        let req = adapter.build_call(TradeSide::Buy, token, amount, min_out, self.wallet())?;

        info!(
            "🛒 Buying {:#x} via {} | funds={} BNB min_out={} slippage={}",
            token,
            version,
            to_units_string(amount),
            min_out,
            target.slippage
        );

        let pending = PendingTrade {
            action: TradeAction::BuyManager,
            token,
            tx_hash: B256::ZERO,
            version,
            amount_in: amount,
            min_out,
            sources: vec![adapter.spender(), state.manager],
            target: target.clone(),
        };
        self.submit_tracked(req, pending, target.slippage).await
    }

    /// Buy on PancakeSwap once a pair gets liquidity
    pub async fn execute_liquidity_buy(&self, target: &Arc<MonitorTarget>, pair: Address) -> Result<Option<B256>> {
        let token = self.secondary.pair_token(pair).await?;
        swallow_policy(token, "secondary buy", self.buy_secondary(target, token, pair)).await
    }

    async fn buy_secondary(&self, target: &Arc<MonitorTarget>, token: Address, pair: Address) -> Result<B256> {
        let amount = self.check_buy_policy(target, token)?;

        let expected = self.secondary.quote_buy(token, amount).await?;
        let min_out = clamp_min_output(apply_slippage(expected, target.slippage));
        let req = self.secondary.build_buy(token, amount, min_out, self.wallet());

        info!(
            "🥞 Secondary buy {:#x} | funds={} BNB expected={} min_out={}",
            token,
            to_units_string(amount),
            expected,
            min_out
        );

        let pending = PendingTrade {
            action: TradeAction::BuySecondary,
            token,
            tx_hash: B256::ZERO,
            version: ProtocolVersion::V2,
            amount_in: amount,
            min_out,
            sources: vec![pair],
            target: target.clone(),
        };
        self.submit_tracked(req, pending, target.slippage).await
    }

    fn check_buy_policy(&self, target: &MonitorTarget, token: Address) -> Result<U256, TradeError> {
        let amount = target.buy_amount_wei();
        if amount.is_zero() {
            return Err(TradeError::ZeroAmount(token));
        }
        if let Some(creator) = self.reputation.creator_of(token) {
            if self.reputation.is_blacklisted(creator) {
                return Err(TradeError::CreatorBlacklisted { token, creator });
            }
        }
        Ok(amount)
    }

    // ── Sell ──────────────────────────────────────────────────────────

    /// Sell `quantity` of `token`. Curve tokens go through their adapter;
    /// graduated (or unknown) tokens through PancakeSwap.
    pub async fn execute_sell(
        &self,
        target: &Arc<MonitorTarget>,
        token: Address,
        quantity: U256,
        action: TradeAction,
    ) -> Result<Option<B256>> {
        swallow_policy(token, "sell", self.sell(target, token, quantity, action)).await
    }

    async fn sell(
        &self,
        target: &Arc<MonitorTarget>,
        token: Address,
        quantity: U256,
        action: TradeAction,
    ) -> Result<B256> {
        if quantity.is_zero() {
            return Err(TradeError::ZeroAmount(token).into());
        }

        let state = match self.market.token_state(token).await {
            Ok(s) if s.status() == TokenStatus::Trading => Some(s),
            Ok(_) => None,
            Err(e) => {
                debug!("No curve state for {:#x}, selling on PancakeSwap: {:#}", token, e);
                None
            }
        };

        let (req, version, spender, min_out) = match state {
            Some(state) => {
                let adapter = self.strategies.resolve(token, &state)?;
                let min_out = clamp_min_output(
                    adapter
                        .compute_min_output(TradeSide::Sell, token, quantity, target.sell_slippage, &state)
                        .await,
                );
                let req = adapter.build_call(TradeSide::Sell, token, quantity, min_out, self.wallet())?;
                let spender = adapter
                    .requires_approval(TradeSide::Sell)
                    .then(|| adapter.spender());
                (req, adapter.version(), spender, min_out)
            }
            None => {
                let expected = self.secondary.quote_sell(token, quantity).await?;
                let min_out = clamp_min_output(apply_slippage(expected, target.sell_slippage));
                let req = self.secondary.build_sell(token, quantity, min_out, self.wallet());
                (req, ProtocolVersion::V2, Some(self.secondary.router()), min_out)
            }
        };

        if let Some(spender) = spender {
            self.ensure_allowance(token, spender, quantity).await?;
        }

        info!(
            "💰 Selling {:#x} via {} | qty={} min_out={} BNB ({:?})",
            token,
            version,
            quantity,
            to_units_string(min_out),
            action
        );

        let pending = PendingTrade {
            action,
            token,
            tx_hash: B256::ZERO,
            version,
            amount_in: quantity,
            min_out,
            sources: Vec::new(),
            target: target.clone(),
        };
        self.submit_tracked(req, pending, target.sell_slippage).await
    }

    /// Approve `spender` for `amount` unless the current allowance covers it
    async fn ensure_allowance(&self, token: Address, spender: Address, amount: U256) -> Result<()> {
        let current = self.market.allowance(token, self.wallet(), spender).await?;
        if current >= amount {
            debug!("Allowance {} covers {} for {:#x}", current, amount, token);
            return Ok(());
        }

        info!(
            "🔓 Allowance {} < {} on {:#x}, approving {:#x}",
            current, amount, token, spender
        );
        let data = IERC20::approveCall { spender, amount }.abi_encode();
        let hash = self
            .submitter
            .submit(CallRequest {
                to: token,
                data: Bytes::from(data),
                value: U256::ZERO,
                gas_limit: APPROVE_GAS_LIMIT,
            })
            .await
            .map_err(|e| TradeError::Submission(format!("approve: {:#}", e)))?;

        if self.submitter.is_dry_run() {
            return Ok(());
        }
        match wait_for_receipt(self.gateway.as_ref(), hash, self.receipt_policy).await {
            Some(r) if r.success => {
                info!("Approval {:#x} confirmed", hash);
                Ok(())
            }
            _ => Err(TradeError::ApprovalUnconfirmed { token }.into()),
        }
    }

    // ── Submission and confirmation ───────────────────────────────────

    async fn submit_tracked(&self, req: CallRequest, mut pending: PendingTrade, slippage: f64) -> Result<B256> {
        let record = TradeRecord::agent(
            pending.action,
            pending.version,
            req.to,
            pending.token,
            None,
            pending.amount_in,
            pending.min_out,
            slippage,
        );

        let hash = match self.submitter.submit(req.clone()).await {
            Ok(h) => h,
            Err(e) => {
                let msg = format!("{:#}", e);
                error!("❌ {:?} submission for {:#x} failed: {}", pending.action, pending.token, msg);
                self.persist(&record.failed(msg.clone()));
                return Err(TradeError::Submission(msg).into());
            }
        };

        let record = TradeRecord {
            unique_seq: format!("{:?}-{:#x}", pending.action, hash),
            tx_hash: hash,
            ..record
        };
        self.persist(&record);

        if self.submitter.is_dry_run() {
            info!("🧪 DRY RUN {:?} {:#x} | would-be tx {:#x}", pending.action, pending.token, hash);
            return Ok(hash);
        }

        pending.tx_hash = hash;
        let job = Confirmation {
            gateway: self.gateway.clone(),
            ledger: self.ledger.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            wallet: self.wallet(),
            policy: self.receipt_policy,
        };
        let mut set = self.confirmations.lock().unwrap_or_else(|e| e.into_inner());
        while set.try_join_next().is_some() {}
        set.spawn(async move { job.settle(pending).await });
        Ok(hash)
    }

    fn persist(&self, record: &TradeRecord) {
        if let Err(e) = self.store.save_trade_record(record) {
            warn!("Failed to persist trade record {}: {:#}", record.unique_seq, e);
        }
    }

    /// Wait for every in-flight confirmation
    pub async fn drain(&self) {
        let mut set = {
            let mut guard = self.confirmations.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        let count = set.len();
        if count > 0 {
            info!("Waiting for {} pending confirmations", count);
        }
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                warn!("Confirmation task failed: {}", e);
            }
        }
    }

    pub fn pending_confirmations(&self) -> usize {
        self.confirmations.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Log and swallow policy no-ops
async fn swallow_policy<F>(token: Address, what: &str, fut: F) -> Result<Option<B256>>
where
    F: Future<Output = Result<B256>>,
{
    match fut.await {
        Ok(hash) => Ok(Some(hash)),
        Err(e) => match e.downcast_ref::<TradeError>() {
            Some(te) if te.is_policy() => {
                info!("⏭️ Skipping {} of {:#x}: {}", what, token, te);
                Ok(None)
            }
            _ => Err(e),
        },
    }
}

struct Confirmation {
    gateway: Arc<dyn ChainGateway>,
    ledger: PositionLedger,
    store: Arc<dyn RecordStore>,
    notifier: MultiNotifier,
    wallet: Address,
    policy: ReceiptPolicy,
}

impl Confirmation {
    async fn settle(self, trade: PendingTrade) {
        let receipt = wait_for_receipt(self.gateway.as_ref(), trade.tx_hash, self.policy).await;
        let is_buy = matches!(trade.action, TradeAction::BuyManager | TradeAction::BuySecondary);
        if is_buy {
            self.settle_buy(trade, receipt).await;
        } else {
            self.settle_sell(trade, receipt).await;
        }
    }

    fn status(&self, hash: B256, status: TradeStatus, error: Option<String>) {
        if let Err(e) = self.store.update_status(hash, status, error) {
            warn!("Failed to update status of {:#x}: {:#}", hash, e);
        }
    }

    async fn settle_buy(&self, trade: PendingTrade, receipt: Option<ReceiptLogs>) {
        let quantity = match &receipt {
            Some(r) if !r.success => {
                error!("❌ Buy {:#x} for {:#x} reverted", trade.tx_hash, trade.token);
                self.status(trade.tx_hash, TradeStatus::Failed, Some("reverted".into()));
                self.notifier
                    .notify("Buy reverted", &format!("{:#x} tx {:#x}", trade.token, trade.tx_hash))
                    .await;
                return;
            }
            Some(r) => {
                let settled = extract_token_out(r, trade.token, &trade.sources, self.wallet);
                if settled.is_none() {
                    warn!("No settling transfer in {:#x}, using min_out", trade.tx_hash);
                }
                self.status(trade.tx_hash, TradeStatus::Success, None);
                settled.unwrap_or(trade.min_out)
            }
            None => {
                warn!(
                    "Receipt for buy {:#x} not seen in time, recording min_out {} for {:#x}",
                    trade.tx_hash, trade.min_out, trade.token
                );
                trade.min_out
            }
        };

        let position = Position::new(
            trade.token,
            trade.tx_hash,
            trade.amount_in,
            quantity,
            trade.version,
            trade.target.clone(),
        );
        let message = format!(
            "{:#x} | qty={} cost={} BNB via {} | tx {:#x}",
            trade.token,
            to_units_string(quantity),
            to_units_string(trade.amount_in),
            trade.version,
            trade.tx_hash
        );
        self.ledger.open(position);
        self.notifier.notify("Position opened", &message).await;
    }

    async fn settle_sell(&self, trade: PendingTrade, receipt: Option<ReceiptLogs>) {
        match receipt {
            Some(r) if r.success => {
                debug!("Sell {:#x} used {} gas", r.tx_hash, r.gas_used);
                self.status(trade.tx_hash, TradeStatus::Success, None);
                // Usually closed already by whoever queued the exit
                self.ledger.close(trade.token);
                info!("✅ Exit {:?} for {:#x} confirmed", trade.action, trade.token);
                self.notifier
                    .notify(
                        "Position exited",
                        &format!("{:#x} {:?} | tx {:#x}", trade.token, trade.action, trade.tx_hash),
                    )
                    .await;
            }
            Some(_) => {
                error!("❌ Sell {:#x} for {:#x} reverted; position stays closed", trade.tx_hash, trade.token);
                self.status(trade.tx_hash, TradeStatus::Failed, Some("reverted".into()));
                self.notifier
                    .notify("Sell failed", &format!("{:#x} tx {:#x} reverted", trade.token, trade.tx_hash))
                    .await;
            }
            None => {
                warn!("Receipt for sell {:#x} not seen in time", trade.tx_hash);
                self.notifier
                    .notify("Sell unconfirmed", &format!("{:#x} tx {:#x}", trade.token, trade.tx_hash))
                    .await;
            }
        }
    }
}
