//! Position Ledger
//!
//! One entry per token. Opened by the router after a confirmed (or timed
//! out) buy, flipped to closed by the risk evaluator before it submits the
//! exit. Closed entries stay until `remove` so a failed exit is visible.

use crate::types::Position;
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct PositionLedger {
    positions: Arc<RwLock<HashMap<Address, Position>>>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a position; an existing one for the same token is replaced
    /// and returned
    pub fn open(&self, position: Position) -> Option<Position> {
        let token = position.token;
        let summary = format!(
            "qty={} cost={} avg={:.10} tp={}x sl={}x",
            position.quantity, position.entry_cost, position.avg_price, position.take_profit, position.stop_loss
        );
        let previous = self
            .positions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token, position);

        match &previous {
            Some(old) => warn!(
                "⚠️ Position {:#x} overwritten (old entry tx {:#x}) | {}",
                token, old.entry_tx, summary
            ),
            None => info!("📈 Position opened {:#x} | {}", token, summary),
        }
        previous
    }

    pub fn get(&self, token: Address) -> Option<Position> {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&token)
            .cloned()
    }

    /// Every position at this instant, closed ones included
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Positions not yet closed
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|p| !p.closed)
            .cloned()
            .collect()
    }

    /// Mark a position closed. Returns it only if it was open, so two
    /// concurrent exits cannot both win.
    pub fn close(&self, token: Address) -> Option<Position> {
        let mut positions = self.positions.write().unwrap_or_else(|e| e.into_inner());
        let pos = positions.get_mut(&token)?;
        if pos.closed {
            return None;
        }
        pos.closed = true;
        Some(pos.clone())
    }

    /// Undo a `close` whose exit never left the process. Returns false
    /// when there is nothing closed to reopen.
    pub fn reopen(&self, token: Address) -> bool {
        let mut positions = self.positions.write().unwrap_or_else(|e| e.into_inner());
        match positions.get_mut(&token) {
            Some(pos) if pos.closed => {
                pos.closed = false;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, token: Address) -> Option<Position> {
        self.positions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&token)
    }

    pub fn is_holding(&self, token: Address) -> bool {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&token)
            .map_or(false, |p| !p.closed)
    }

    pub fn open_count(&self) -> usize {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|p| !p.closed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.positions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{to_wei, MonitorTarget, ProtocolVersion};
    use alloy::primitives::B256;

    fn position(token: u8, entry: u8) -> Position {
        Position::new(
            Address::repeat_byte(token),
            B256::repeat_byte(entry),
            to_wei(0.1),
            to_wei(1000.0),
            ProtocolVersion::V2,
            Arc::new(MonitorTarget::named("t")),
        )
    }

    #[test]
    fn test_open_close_remove() {
        let ledger = PositionLedger::new();
        assert!(ledger.open(position(1, 1)).is_none());
        assert!(ledger.is_holding(Address::repeat_byte(1)));
        assert_eq!(ledger.open_count(), 1);

        assert!(ledger.close(Address::repeat_byte(1)).is_some());
        assert!(ledger.close(Address::repeat_byte(1)).is_none());
        assert_eq!(ledger.open_count(), 0);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.open_positions().is_empty());
        let all = ledger.snapshot();
        assert_eq!(all.len(), 1);
        assert!(all[0].closed);

        assert!(ledger.remove(Address::repeat_byte(1)).is_some());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_reopen_only_undoes_a_close() {
        let ledger = PositionLedger::new();
        let token = Address::repeat_byte(1);
        assert!(!ledger.reopen(token));
        ledger.open(position(1, 1));
        assert!(!ledger.reopen(token));

        ledger.close(token);
        assert!(ledger.reopen(token));
        assert!(ledger.is_holding(token));
        assert_eq!(ledger.open_positions().len(), 1);
        assert!(ledger.close(token).is_some());
    }

    #[test]
    fn test_duplicate_open_overwrites() {
        let ledger = PositionLedger::new();
        ledger.open(position(1, 1));
        let previous = ledger.open(position(1, 2)).unwrap();
        assert_eq!(previous.entry_tx, B256::repeat_byte(1));
        assert_eq!(ledger.get(Address::repeat_byte(1)).unwrap().entry_tx, B256::repeat_byte(2));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_concurrent_close_single_winner() {
        let ledger = PositionLedger::new();
        ledger.open(position(1, 1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let l = ledger.clone();
                std::thread::spawn(move || l.close(Address::repeat_byte(1)).is_some())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
