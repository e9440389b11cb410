//! Core domain types shared by the ingestion, trading and position layers.
//!
//! Amounts that live on chain stay in `U256` base units (18 decimals for
//! both BNB and launchpad tokens). Ratios and human-readable prices are
//! `f64`; persisted amounts are rendered through `format_units`.

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Decimals shared by BNB, WBNB, USD1 and every launchpad token
pub const TOKEN_DECIMALS: u8 = 18;

/// Launchpad manager generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Legacy TokenManager (5-word trade events)
    V1,
    /// TokenManager2, native BNB settlement
    V2,
    /// TokenManagerHelper3, quote-token settlement (USD1 and friends)
    V3,
}

impl ProtocolVersion {
    /// Protocol tag written into persisted records
    pub fn tag(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "managerV1",
            ProtocolVersion::V2 => "managerV2",
            ProtocolVersion::V3 => "managerV3",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Asset a trade was paid in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Settlement {
    Native,
    Quote(Address),
}

impl Settlement {
    pub fn is_native(&self) -> bool {
        matches!(self, Settlement::Native)
    }

    /// Payment token address; the zero address stands for BNB
    pub fn token(&self) -> Address {
        match self {
            Settlement::Native => Address::ZERO,
            Settlement::Quote(addr) => *addr,
        }
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Settlement::Native => write!(f, "BNB"),
            Settlement::Quote(addr) => write!(f, "{:#x}", addr),
        }
    }
}

/// What a classified occurrence represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Destroyed,
    OwnershipTransferred,
    Buy,
    Sell,
    LiquidityAdded,
    PairCreated,
    GenericTransfer,
}

impl EventKind {
    /// Numeric type code used by the record store.
    ///
    /// 0 create, 1 pair created, 2 liquidity added, 3 buy, 4 sell,
    /// 5 transfer, 7 ownership transfer, 8 destroy.
    pub fn code(&self) -> u8 {
        match self {
            EventKind::Created => 0,
            EventKind::PairCreated => 1,
            EventKind::LiquidityAdded => 2,
            EventKind::Buy => 3,
            EventKind::Sell => 4,
            EventKind::GenericTransfer => 5,
            EventKind::OwnershipTransferred => 7,
            EventKind::Destroyed => 8,
        }
    }

    /// Creation-family events go to the creation table
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            EventKind::Created | EventKind::Destroyed | EventKind::OwnershipTransferred
        )
    }
}

/// Block / transaction / log coordinates of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCoord {
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
    pub tx_hash: B256,
}

impl LogCoord {
    /// Lexically sortable unique key for this coordinate
    pub fn unique_seq(&self) -> String {
        crate::store::tx_unique_seq(self.block_number, self.tx_index, self.log_index)
    }
}

/// One decoded occurrence, consumed once by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub kind: EventKind,
    pub token: Address,
    /// Sender side (previous owner for lifecycle events)
    pub from: Address,
    /// Receiver side (new owner for lifecycle events)
    pub to: Address,
    /// Account that initiated a trade, taken from the manager event
    pub trader: Option<Address>,
    /// Real creator when a TokenCreate event was present
    pub creator: Option<Address>,
    /// Pancake pair for PairCreated / LiquidityAdded
    pub pair: Option<Address>,
    pub token_amount: U256,
    pub payment_amount: U256,
    pub fee_amount: U256,
    pub version: ProtocolVersion,
    pub protocol_address: Address,
    pub settlement: Settlement,
    pub coord: LogCoord,
}

impl ClassifiedEvent {
    /// Payment per token in the settlement asset
    pub fn unit_price(&self) -> Option<f64> {
        let tokens = to_f64(self.token_amount);
        if tokens <= 0.0 {
            return None;
        }
        Some(to_f64(self.payment_amount) / tokens)
    }
}

/// Which side of the book a trade is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Immutable watch policy for one token or protocol surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub name: String,
    /// Specific token; `None` watches every launchpad token
    #[serde(default)]
    pub token: Option<Address>,
    /// Extra addresses to watch (Pancake pairs discovered at runtime)
    #[serde(default)]
    pub watch_addresses: Vec<Address>,
    #[serde(default = "default_managers")]
    pub managers: Vec<Address>,
    #[serde(default = "default_native_topics")]
    pub native_topics: Vec<B256>,
    #[serde(default = "default_dex_topics")]
    pub dex_topics: Vec<B256>,
    #[serde(default = "default_custom_topics")]
    pub custom_topics: Vec<B256>,

    /// Buy whenever a primary-market buy is classified
    #[serde(default)]
    pub trigger_on_buy: bool,
    /// Buy when a configured smart wallet buys
    #[serde(default)]
    pub trigger_on_smart_wallet_buy: bool,
    /// Buy when a whitelisted creator launches a token
    #[serde(default)]
    pub trigger_on_creator_action: bool,
    /// Buy on Pancake once liquidity is added
    #[serde(default)]
    pub buy_on_liquidity_add: bool,
    /// Watch each token this catch-all target buys under its own derived target
    #[serde(default)]
    pub monitor_new_tokens: bool,

    #[serde(default = "default_buy_amount")]
    pub buy_amount_bnb: f64,
    #[serde(default = "default_slippage")]
    pub slippage: f64,
    #[serde(default = "default_sell_slippage")]
    pub sell_slippage: f64,
    #[serde(default = "default_take_profit")]
    pub take_profit: f64,
    #[serde(default = "default_stop_loss")]
    pub stop_loss: f64,
}

fn default_managers() -> Vec<Address> {
    vec![
        crate::contracts::TOKEN_MANAGER_V2,
        crate::contracts::TOKEN_MANAGER_HELPER3,
        crate::contracts::TOKEN_MANAGER_V1,
    ]
}
fn default_native_topics() -> Vec<B256> {
    crate::events::topics::native_topics()
}
fn default_dex_topics() -> Vec<B256> {
    crate::events::topics::dex_topics()
}
fn default_custom_topics() -> Vec<B256> {
    crate::events::topics::custom_topics()
}
fn default_buy_amount() -> f64 { 0.1 }
fn default_slippage() -> f64 { 0.12 }
fn default_sell_slippage() -> f64 { 0.15 }
fn default_take_profit() -> f64 { 4.0 }
fn default_stop_loss() -> f64 { 0.5 }

impl MonitorTarget {
    /// Target with every field at its default
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            token: None,
            watch_addresses: Vec::new(),
            managers: default_managers(),
            native_topics: default_native_topics(),
            dex_topics: default_dex_topics(),
            custom_topics: default_custom_topics(),
            trigger_on_buy: false,
            trigger_on_smart_wallet_buy: false,
            trigger_on_creator_action: false,
            buy_on_liquidity_add: false,
            monitor_new_tokens: false,
            buy_amount_bnb: default_buy_amount(),
            slippage: default_slippage(),
            sell_slippage: default_sell_slippage(),
            take_profit: default_take_profit(),
            stop_loss: default_stop_loss(),
        }
    }

    /// Derive a token-specific target that inherits this policy
    pub fn for_token(&self, token: Address, extra: &[Address]) -> Self {
        let mut derived = self.clone();
        derived.name = format!("{}:{:#x}", self.name, token);
        derived.token = Some(token);
        derived.watch_addresses = extra.to_vec();
        derived.monitor_new_tokens = false;
        derived
    }

    pub fn buy_amount_wei(&self) -> U256 {
        to_wei(self.buy_amount_bnb)
    }

    /// All topics across the three allow-lists
    pub fn topics(&self) -> impl Iterator<Item = &B256> {
        self.native_topics
            .iter()
            .chain(self.dex_topics.iter())
            .chain(self.custom_topics.iter())
    }

    /// Addresses this target watches: token, managers and extras
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.token
            .into_iter()
            .chain(self.managers.iter().copied())
            .chain(self.watch_addresses.iter().copied())
    }

    /// Whether this target covers `addr`
    pub fn covers(&self, addr: Address) -> bool {
        self.addresses().any(|a| a == addr)
    }
}

/// One open (or closed-but-not-cleaned-up) primary-market holding
#[derive(Debug, Clone)]
pub struct Position {
    pub token: Address,
    pub entry_tx: B256,
    /// BNB spent, in wei
    pub entry_cost: U256,
    /// Tokens received, in base units
    pub quantity: U256,
    /// BNB per token
    pub avg_price: f64,
    pub opened_at: DateTime<Utc>,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub version: ProtocolVersion,
    pub closed: bool,
    /// Policy the position was opened under (exit slippage and friends)
    pub target: Arc<MonitorTarget>,
}

impl Position {
    pub fn new(
        token: Address,
        entry_tx: B256,
        entry_cost: U256,
        quantity: U256,
        version: ProtocolVersion,
        target: Arc<MonitorTarget>,
    ) -> Self {
        let qty = to_f64(quantity);
        let avg_price = if qty > 0.0 { to_f64(entry_cost) / qty } else { 0.0 };
        Self {
            token,
            entry_tx,
            entry_cost,
            quantity,
            avg_price,
            opened_at: Utc::now(),
            take_profit: target.take_profit,
            stop_loss: target.stop_loss,
            version,
            closed: false,
            target,
        }
    }

    /// Current value over entry cost
    pub fn ratio(&self, current_value_bnb: f64) -> f64 {
        let cost = to_f64(self.entry_cost);
        if cost <= 0.0 {
            return 0.0;
        }
        current_value_bnb / cost
    }
}

/// Human units of an 18-decimal amount
pub fn to_f64(amount: U256) -> f64 {
    format_units(amount, TOKEN_DECIMALS)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Base units of an 18-decimal amount given in human units
pub fn to_wei(amount: f64) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::ZERO;
    }
    U256::from((amount * 1e18).round() as u128)
}

/// Decimal string rendering for persisted records
pub fn to_units_string(amount: U256) -> String {
    format_units(amount, TOKEN_DECIMALS).unwrap_or_else(|_| amount.to_string())
}
