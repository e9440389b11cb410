//! Receipt Classifier
//!
//! Turns the logs of one transaction into at most two [`ClassifiedEvent`]s:
//! a lifecycle event (creation / ownership change / destruction) and a
//! settled trade. Three passes over the same log slice:
//!
//! 1. ownership: first `OwnershipTransferred`, creator taken from `TokenCreate`
//! 2. custom trade: the manager's own purchase/sale event (plus quote detection)
//! 3. settlement: the token `Transfer` whose value equals the traded amount
//!
//! Log order inside the receipt never changes the outcome. The classifier
//! holds no mutable state; triggers live in the ingest pipeline.

use crate::chain::{RawLog, ReceiptLogs};
use crate::config::Protocols;
use crate::events::topics;
use crate::events::words::{single_word, split_words, topic_to_address, word_to_address};
use crate::types::{ClassifiedEvent, EventKind, LogCoord, ProtocolVersion, Settlement};
use alloy::primitives::{Address, U256};
use tracing::{debug, info};

/// Manager-side trade facts, before settlement is confirmed
#[derive(Debug, Clone)]
struct CustomTrade {
    token: Address,
    trader: Address,
    token_amount: U256,
    payment_amount: U256,
    fee_amount: U256,
    version: ProtocolVersion,
    protocol_address: Address,
    settlement: Settlement,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    protocols: Protocols,
}

impl Classifier {
    pub fn new(protocols: Protocols) -> Self {
        Self { protocols }
    }

    pub fn protocols(&self) -> &Protocols {
        &self.protocols
    }

    /// Classify every relevant occurrence in one receipt
    pub fn classify(&self, receipt: &ReceiptLogs) -> Vec<ClassifiedEvent> {
        let mut events = Vec::new();
        if receipt.logs.is_empty() {
            return events;
        }

        if let Some(ev) = self.scan_ownership(receipt) {
            events.push(ev);
        }

        if let Some(trade) = self.scan_custom_trade(&receipt.logs) {
            match self.confirm_settlement(receipt, &trade) {
                Some(ev) => events.push(ev),
                None => debug!(
                    "No settling transfer for {:#x} amount {} in {:#x}",
                    trade.token, trade.token_amount, receipt.tx_hash
                ),
            }
        }

        events
    }

    // ── Pass 1: ownership ─────────────────────────────────────────────

    fn scan_ownership(&self, receipt: &ReceiptLogs) -> Option<ClassifiedEvent> {
        let log = receipt.logs.iter().find(|l| {
            l.topics.len() >= 3 && l.topics[0] == topics::OWNERSHIP_TRANSFERRED
        })?;

        let previous = topic_to_address(&log.topics[1]);
        let new_owner = topic_to_address(&log.topics[2]);
        let token = log.address;

        let kind = if previous == Address::ZERO {
            EventKind::Created
        } else if new_owner == Address::ZERO {
            EventKind::Destroyed
        } else {
            EventKind::OwnershipTransferred
        };

        let creator = find_creator(&receipt.logs, token);
        let (version, protocol_address) = match self.protocols.version_of(new_owner) {
            Some(v) => (v, new_owner),
            None => (ProtocolVersion::V2, self.protocols.manager_v2),
        };

        if kind == EventKind::Created {
            info!(
                "🆕 Token created {:#x} | creator={:#x} protocol={}",
                token,
                creator.unwrap_or(previous),
                version
            );
        }

        let mut ev = blank_event(kind, token, coord(receipt, log), version, protocol_address);
        ev.from = previous;
        ev.to = new_owner;
        ev.creator = creator;
        Some(ev)
    }

    // ── Pass 2: manager trade event ───────────────────────────────────

    fn scan_custom_trade(&self, logs: &[RawLog]) -> Option<CustomTrade> {
        for log in logs {
            let Some(topic0) = log.topic0() else { continue };
            let (version, min_words) = if topics::is_v1_trade(topic0) {
                (ProtocolVersion::V1, topics::V1_TRADE_WORDS)
            } else if topics::is_v2_trade(topic0) {
                (ProtocolVersion::V2, topics::V2_TRADE_WORDS)
            } else {
                continue;
            };

            let words = split_words(&log.data);
            if words.len() < min_words {
                debug!(
                    "Skipping short {} trade body ({} words) at log {}",
                    version,
                    words.len(),
                    log.log_index
                );
                continue;
            }

            let (token_amount, payment_amount, fee_amount) = match version {
                ProtocolVersion::V1 => (words[2], words[3], words[4]),
                _ => (words[3], words[4], words[5]),
            };

            let mut trade = CustomTrade {
                token: word_to_address(&words[0]),
                trader: word_to_address(&words[1]),
                token_amount,
                payment_amount,
                fee_amount,
                version,
                protocol_address: log.address,
                settlement: Settlement::Native,
            };

            if let Some(quote) = self.quote_settlement(logs) {
                trade.settlement = Settlement::Quote(quote);
                trade.version = ProtocolVersion::V3;
                trade.protocol_address = self.protocols.helper3;
            }

            return Some(trade);
        }
        None
    }

    /// Quote token moved to or from the helper in the same transaction
    fn quote_settlement(&self, logs: &[RawLog]) -> Option<Address> {
        logs.iter().find_map(|log| {
            if log.topics.len() < 3
                || log.topics[0] != topics::TRANSFER
                || !self.protocols.is_quote_token(log.address)
            {
                return None;
            }
            let from = topic_to_address(&log.topics[1]);
            let to = topic_to_address(&log.topics[2]);
            (from == self.protocols.helper3 || to == self.protocols.helper3).then_some(log.address)
        })
    }

    // ── Pass 3: settlement ────────────────────────────────────────────

    fn confirm_settlement(&self, receipt: &ReceiptLogs, trade: &CustomTrade) -> Option<ClassifiedEvent> {
        let mut generic: Option<(&RawLog, Address, Address)> = None;

        for log in &receipt.logs {
            if log.address != trade.token
                || log.topics.len() < 3
                || log.topics[0] != topics::TRANSFER
            {
                continue;
            }
            if single_word(&log.data) != Some(trade.token_amount) {
                continue;
            }
            let from = topic_to_address(&log.topics[1]);
            let to = topic_to_address(&log.topics[2]);

            if self.protocols.is_manager(to) {
                return Some(self.trade_event(EventKind::Sell, receipt, log, from, to, trade));
            }
            if self.protocols.is_manager(from) {
                return Some(self.trade_event(EventKind::Buy, receipt, log, from, to, trade));
            }
            generic.get_or_insert((log, from, to));
        }

        generic.map(|(log, from, to)| {
            self.trade_event(EventKind::GenericTransfer, receipt, log, from, to, trade)
        })
    }

    fn trade_event(
        &self,
        kind: EventKind,
        receipt: &ReceiptLogs,
        log: &RawLog,
        from: Address,
        to: Address,
        trade: &CustomTrade,
    ) -> ClassifiedEvent {
        let mut ev = blank_event(
            kind,
            trade.token,
            coord(receipt, log),
            trade.version,
            trade.protocol_address,
        );
        ev.from = from;
        ev.to = to;
        ev.trader = Some(trade.trader);
        ev.token_amount = trade.token_amount;
        ev.payment_amount = trade.payment_amount;
        ev.fee_amount = trade.fee_amount;
        ev.settlement = trade.settlement;
        ev
    }

    // ── Single-log path ───────────────────────────────────────────────

    /// Classify one log without its receipt.
    ///
    /// Used by the subscription for native and DEX topics: manager
    /// transfers become buys/sells, Pancake `PairCreated` and `Mint`
    /// become pair/liquidity events.
    pub fn classify_log(&self, log: &RawLog) -> Option<ClassifiedEvent> {
        let topic0 = *log.topic0()?;
        let log_coord = LogCoord {
            block_number: log.block_number,
            tx_index: log.tx_index,
            log_index: log.log_index,
            tx_hash: log.tx_hash,
        };

        if topic0 == topics::TRANSFER && log.topics.len() >= 3 {
            let value = single_word(&log.data)?;
            let from = topic_to_address(&log.topics[1]);
            let to = topic_to_address(&log.topics[2]);
            let (kind, trader, manager) = if self.protocols.is_manager(from) {
                (EventKind::Buy, to, from)
            } else if self.protocols.is_manager(to) {
                (EventKind::Sell, from, to)
            } else {
                (EventKind::GenericTransfer, from, Address::ZERO)
            };
            let version = self.protocols.version_of(manager).unwrap_or(ProtocolVersion::V2);
            let mut ev = blank_event(kind, log.address, log_coord, version, manager);
            ev.from = from;
            ev.to = to;
            ev.trader = Some(trader);
            ev.token_amount = value;
            return Some(ev);
        }

        if topic0 == topics::PAIR_CREATED && log.topics.len() >= 3 {
            let words = split_words(&log.data);
            let pair = word_to_address(words.first()?);
            let token0 = topic_to_address(&log.topics[1]);
            let token1 = topic_to_address(&log.topics[2]);
            let token = if token0 == self.protocols.wbnb { token1 } else { token0 };
            let mut ev = blank_event(
                EventKind::PairCreated,
                token,
                log_coord,
                ProtocolVersion::V2,
                log.address,
            );
            ev.from = token0;
            ev.to = token1;
            ev.pair = Some(pair);
            return Some(ev);
        }

        if topic0 == topics::MINT {
            let words = split_words(&log.data);
            if words.len() < 2 {
                return None;
            }
            // Token side is read from the pair when the trade executes
            let mut ev = blank_event(
                EventKind::LiquidityAdded,
                log.address,
                log_coord,
                ProtocolVersion::V2,
                log.address,
            );
            ev.pair = Some(log.address);
            ev.from = log.topics.get(1).map(topic_to_address).unwrap_or_default();
            ev.token_amount = words[0];
            ev.payment_amount = words[1];
            return Some(ev);
        }

        None
    }
}

/// Creator from a `TokenCreate` whose token word matches `token`
fn find_creator(logs: &[RawLog], token: Address) -> Option<Address> {
    logs.iter()
        .filter(|l| l.topic0() == Some(&topics::V2_CREATE))
        .find_map(|l| {
            let words = split_words(&l.data);
            if words.len() < 2 || word_to_address(&words[1]) != token {
                return None;
            }
            Some(word_to_address(&words[0]))
        })
}

fn coord(receipt: &ReceiptLogs, log: &RawLog) -> LogCoord {
    LogCoord {
        block_number: receipt.block_number,
        tx_index: receipt.tx_index,
        log_index: log.log_index,
        tx_hash: receipt.tx_hash,
    }
}

fn blank_event(
    kind: EventKind,
    token: Address,
    coord: LogCoord,
    version: ProtocolVersion,
    protocol_address: Address,
) -> ClassifiedEvent {
    ClassifiedEvent {
        kind,
        token,
        from: Address::ZERO,
        to: Address::ZERO,
        trader: None,
        creator: None,
        pair: None,
        token_amount: U256::ZERO,
        payment_amount: U256::ZERO,
        fee_amount: U256::ZERO,
        version,
        protocol_address,
        settlement: Settlement::Native,
        coord,
    }
}
