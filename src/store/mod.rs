//! Record Store
//!
//! Audit rows for classified trades, lifecycle events and the agent's own
//! trades, plus the creator black/white list entries that must survive a
//! restart. The pipeline and router only produce records; the store decides
//! where they go. Writes are idempotent on the unique sequence key.

pub mod jsonl;

pub use jsonl::JsonlRecordStore;

use crate::types::{to_units_string, ClassifiedEvent, EventKind, ProtocolVersion, Settlement};
use alloy::primitives::{Address, B256, U256};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Zero-padded (block, tx, log) key; lexical order equals chain order
pub fn tx_unique_seq(block_number: u64, tx_index: u64, log_index: u64) -> String {
    format!("{:09}{:04}{:04}", block_number, tx_index, log_index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Success,
    Failed,
}

/// What the agent itself did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    BuyManager,
    SellManager,
    BuySecondary,
    SellTakeProfit,
    SellStopLoss,
}

/// One trade row: either an observed trade or one of ours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub unique_seq: String,
    pub block_number: u64,
    pub tx_index: u64,
    pub tx_hash: B256,
    /// Classification code (3 buy, 4 sell, 5 transfer)
    pub type_code: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<TradeAction>,
    pub protocol: String,
    pub protocol_address: Address,
    pub token: Address,
    /// Zero address for BNB
    pub payment_token: Address,
    #[serde(default)]
    pub trader: Option<Address>,
    pub token_amount: Decimal,
    pub payment_amount: Decimal,
    pub fee_amount: Decimal,
    /// BNB per token
    pub price: Decimal,
    /// BNB value of the trade
    pub volume: Decimal,
    #[serde(default)]
    pub slippage: Option<f64>,
    pub status: TradeStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    /// Observed trade. Quote-settled amounts are converted into BNB with
    /// `bnb_per_quote` when known; otherwise price and volume stay in the
    /// quote unit.
    pub fn from_event(ev: &ClassifiedEvent, bnb_per_quote: Option<f64>) -> Self {
        let payment = decimal_units(ev.payment_amount);
        let tokens = decimal_units(ev.token_amount);
        let scale = match ev.settlement {
            Settlement::Native => Decimal::ONE,
            Settlement::Quote(_) => bnb_per_quote
                .and_then(Decimal::from_f64)
                .unwrap_or(Decimal::ONE),
        };
        let volume = payment * scale;
        let price = if tokens.is_zero() { Decimal::ZERO } else { volume / tokens };

        Self {
            unique_seq: ev.coord.unique_seq(),
            block_number: ev.coord.block_number,
            tx_index: ev.coord.tx_index,
            tx_hash: ev.coord.tx_hash,
            type_code: ev.kind.code(),
            action: None,
            protocol: ev.version.tag().to_string(),
            protocol_address: ev.protocol_address,
            token: ev.token,
            payment_token: ev.settlement.token(),
            trader: ev.trader,
            token_amount: tokens,
            payment_amount: payment,
            fee_amount: decimal_units(ev.fee_amount),
            price,
            volume,
            slippage: None,
            status: TradeStatus::Success,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// One of the agent's own trades. `amount_in` is what we paid, BNB
    /// for buys and tokens for sells.
    #[allow(clippy::too_many_arguments)]
    pub fn agent(
        action: TradeAction,
        version: ProtocolVersion,
        protocol_address: Address,
        token: Address,
        tx_hash: Option<B256>,
        amount_in: U256,
        amount_out: U256,
        slippage: f64,
    ) -> Self {
        let is_buy = matches!(action, TradeAction::BuyManager | TradeAction::BuySecondary);
        let (tokens, bnb) = if is_buy {
            (amount_out, amount_in)
        } else {
            (amount_in, amount_out)
        };
        let token_amount = decimal_units(tokens);
        let volume = decimal_units(bnb);
        let price = if token_amount.is_zero() { Decimal::ZERO } else { volume / token_amount };
        let timestamp = Utc::now();
        let unique_seq = match tx_hash {
            Some(h) => format!("{:?}-{:#x}", action, h),
            None => format!("{:?}-{:#x}-{}", action, token, timestamp.timestamp_nanos_opt().unwrap_or_default()),
        };

        Self {
            unique_seq,
            block_number: 0,
            tx_index: 0,
            tx_hash: tx_hash.unwrap_or_default(),
            type_code: if is_buy { EventKind::Buy.code() } else { EventKind::Sell.code() },
            action: Some(action),
            protocol: version.tag().to_string(),
            protocol_address,
            token,
            payment_token: Address::ZERO,
            trader: None,
            token_amount,
            payment_amount: volume,
            fee_amount: Decimal::ZERO,
            price,
            volume,
            slippage: Some(slippage),
            status: TradeStatus::Pending,
            error: None,
            timestamp,
        }
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = TradeStatus::Failed;
        self.error = Some(error.into());
        self
    }
}

/// Token lifecycle row (create / ownership transfer / destroy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationRecord {
    pub unique_seq: String,
    pub block_number: u64,
    pub tx_index: u64,
    pub tx_hash: B256,
    pub send: Address,
    pub receive: Address,
    /// 0 create, 7 ownership transfer, 8 destroy
    pub type_code: u8,
    pub protocol: String,
    pub protocol_address: Address,
    pub token: Address,
    pub creator: Address,
    pub timestamp: DateTime<Utc>,
}

impl CreationRecord {
    pub fn from_event(ev: &ClassifiedEvent) -> Self {
        Self {
            unique_seq: ev.coord.unique_seq(),
            block_number: ev.coord.block_number,
            tx_index: ev.coord.tx_index,
            tx_hash: ev.coord.tx_hash,
            send: ev.from,
            receive: ev.to,
            type_code: ev.kind.code(),
            protocol: ev.version.tag().to_string(),
            protocol_address: ev.protocol_address,
            token: ev.token,
            creator: ev.creator.unwrap_or(ev.from),
            timestamp: Utc::now(),
        }
    }
}

/// Later status change for one of our transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub tx_hash: B256,
    pub status: TradeStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatorList {
    Blacklist,
    Whitelist,
}

/// A creator added to one of the reputation lists at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorListEntry {
    pub creator: Address,
    pub list: CreatorList,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl CreatorListEntry {
    pub fn new(creator: Address, list: CreatorList, reason: &str) -> Self {
        Self {
            creator,
            list,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

pub trait RecordStore: Send + Sync {
    /// Returns false when the key was already stored
    fn save_trade_record(&self, record: &TradeRecord) -> Result<bool>;

    fn save_creation_record(&self, record: &CreationRecord) -> Result<bool>;

    fn update_status(&self, tx_hash: B256, status: TradeStatus, error: Option<String>) -> Result<()>;

    /// Returns false when the creator was already on that list
    fn save_creator_entry(&self, entry: &CreatorListEntry) -> Result<bool>;

    /// Every stored list entry, oldest first
    fn load_creator_entries(&self) -> Result<Vec<CreatorListEntry>>;
}

/// Human units as a decimal; amounts beyond `Decimal` precision saturate to zero
pub fn decimal_units(amount: U256) -> Decimal {
    Decimal::from_str(&to_units_string(amount)).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory store with the same idempotency rules as the JSONL one
    #[derive(Default)]
    pub struct MemoryStore {
        pub trades: Mutex<Vec<TradeRecord>>,
        pub creations: Mutex<Vec<CreationRecord>>,
        pub statuses: Mutex<Vec<StatusUpdate>>,
        pub creators: Mutex<Vec<CreatorListEntry>>,
        seen: Mutex<HashSet<String>>,
    }

    impl MemoryStore {
        pub fn trades(&self) -> Vec<TradeRecord> {
            self.trades.lock().unwrap().clone()
        }

        pub fn creations(&self) -> Vec<CreationRecord> {
            self.creations.lock().unwrap().clone()
        }

        pub fn statuses(&self) -> Vec<StatusUpdate> {
            self.statuses.lock().unwrap().clone()
        }

        pub fn creators(&self) -> Vec<CreatorListEntry> {
            self.creators.lock().unwrap().clone()
        }
    }

    impl RecordStore for MemoryStore {
        fn save_trade_record(&self, record: &TradeRecord) -> Result<bool> {
            if !self.seen.lock().unwrap().insert(format!("t{}", record.unique_seq)) {
                return Ok(false);
            }
            self.trades.lock().unwrap().push(record.clone());
            Ok(true)
        }

        fn save_creation_record(&self, record: &CreationRecord) -> Result<bool> {
            if !self.seen.lock().unwrap().insert(format!("c{}", record.unique_seq)) {
                return Ok(false);
            }
            self.creations.lock().unwrap().push(record.clone());
            Ok(true)
        }

        fn update_status(&self, tx_hash: B256, status: TradeStatus, error: Option<String>) -> Result<()> {
            self.statuses.lock().unwrap().push(StatusUpdate {
                tx_hash,
                status,
                error,
                timestamp: Utc::now(),
            });
            Ok(())
        }

        fn save_creator_entry(&self, entry: &CreatorListEntry) -> Result<bool> {
            let mut creators = self.creators.lock().unwrap();
            if creators
                .iter()
                .any(|e| e.creator == entry.creator && e.list == entry.list)
            {
                return Ok(false);
            }
            creators.push(entry.clone());
            Ok(true)
        }

        fn load_creator_entries(&self) -> Result<Vec<CreatorListEntry>> {
            Ok(self.creators())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogCoord;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unique_seq_is_padded_and_ordered() {
        let a = tx_unique_seq(123, 4, 5);
        assert_eq!(a, "00000012300040005");
        assert_eq!(a.len(), 17);

        let keys = [
            tx_unique_seq(99, 9999, 9999),
            tx_unique_seq(100, 0, 0),
            tx_unique_seq(100, 0, 12),
            tx_unique_seq(100, 2, 1),
        ];
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(sorted, keys);
    }

    fn event(settlement: Settlement) -> ClassifiedEvent {
        ClassifiedEvent {
            kind: EventKind::Buy,
            token: Address::repeat_byte(1),
            from: Address::repeat_byte(2),
            to: Address::repeat_byte(3),
            trader: Some(Address::repeat_byte(3)),
            creator: None,
            pair: None,
            token_amount: crate::types::to_wei(1000.0),
            payment_amount: crate::types::to_wei(2.0),
            fee_amount: U256::ZERO,
            version: ProtocolVersion::V2,
            protocol_address: crate::contracts::TOKEN_MANAGER_V2,
            settlement,
            coord: LogCoord {
                block_number: 7,
                tx_index: 1,
                log_index: 2,
                tx_hash: B256::repeat_byte(9),
            },
        }
    }

    #[test]
    fn test_record_from_native_event() {
        let rec = TradeRecord::from_event(&event(Settlement::Native), None);
        assert_eq!(rec.unique_seq, "00000000700010002");
        assert_eq!(rec.type_code, 3);
        assert_eq!(rec.protocol, "managerV2");
        assert_eq!(rec.volume, dec!(2));
        assert_eq!(rec.price, dec!(0.002));
    }

    #[test]
    fn test_quote_event_scaled_to_native() {
        let ev = event(Settlement::Quote(crate::contracts::USD1));
        let rec = TradeRecord::from_event(&ev, Some(0.5));
        assert_eq!(rec.volume, dec!(1));
        assert_eq!(rec.payment_token, crate::contracts::USD1);
    }

    #[test]
    fn test_agent_record() {
        let rec = TradeRecord::agent(
            TradeAction::BuyManager,
            ProtocolVersion::V2,
            crate::contracts::TOKEN_MANAGER_V2,
            Address::repeat_byte(1),
            None,
            crate::types::to_wei(0.1),
            crate::types::to_wei(100.0),
            0.12,
        )
        .failed("nonce too low");
        assert_eq!(rec.status, TradeStatus::Failed);
        assert_eq!(rec.price, dec!(0.001));
        assert_eq!(rec.error.as_deref(), Some("nonce too low"));
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"buy_manager\""));
        assert!(json.contains("\"failed\""));
    }
}
