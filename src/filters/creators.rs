//! Creator Reputation
//!
//! Blacklist / whitelist of token creators plus a short-lived cache of
//! per-token trade stats. A creator selling their own token within the rug
//! window after launch is blacklisted and the token dropped from the cache.
//!
//! Address sets are keyed by lower-case hex so lists loaded from config
//! and addresses seen on chain always compare equal. Runtime additions are
//! written to the record store and reloaded from it at start-up.

use crate::store::{CreatorList, CreatorListEntry, RecordStore};
use crate::types::{to_f64, ClassifiedEvent, EventKind};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Trade counters for a recently created token
#[derive(Debug, Clone)]
pub struct TokenStats {
    pub creator: Address,
    pub created_at: DateTime<Utc>,
    pub buy_count: u32,
    pub sell_count: u32,
    pub buy_volume_bnb: f64,
    pub sell_volume_bnb: f64,
    /// Last write; entries expire a TTL after this
    touched_at: DateTime<Utc>,
}

pub struct CreatorReputation {
    blacklist: RwLock<HashSet<String>>,
    whitelist: RwLock<HashSet<String>>,
    tokens: DashMap<Address, TokenStats>,
    ttl: Duration,
    rug_window: Duration,
    store: Option<Arc<dyn RecordStore>>,
}

fn key(addr: Address) -> String {
    format!("{:#x}", addr).to_lowercase()
}

impl CreatorReputation {
    pub fn new(ttl_secs: u64, rug_window_secs: i64) -> Self {
        Self {
            blacklist: RwLock::new(HashSet::new()),
            whitelist: RwLock::new(HashSet::new()),
            tokens: DashMap::new(),
            ttl: Duration::seconds(ttl_secs as i64),
            rug_window: Duration::seconds(rug_window_secs),
            store: None,
        }
    }

    /// Reload the entries saved by earlier runs and persist new ones to `store`
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Result<Self> {
        let entries = store
            .load_creator_entries()
            .context("Failed to load saved creator lists")?;
        {
            let mut wl = self.whitelist.write().unwrap_or_else(|e| e.into_inner());
            let mut bl = self.blacklist.write().unwrap_or_else(|e| e.into_inner());
            for entry in &entries {
                match entry.list {
                    CreatorList::Whitelist => wl.insert(key(entry.creator)),
                    CreatorList::Blacklist => bl.insert(key(entry.creator)),
                };
            }
        }
        if !entries.is_empty() {
            info!("Restored {} saved creator list entries", entries.len());
        }
        self.store = Some(store);
        Ok(self)
    }

    fn persist(&self, creator: Address, list: CreatorList, reason: &str) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.save_creator_entry(&CreatorListEntry::new(creator, list, reason)) {
            warn!("Failed to persist {:?} entry for {:#x}: {:#}", list, creator, e);
        }
    }

    /// Seed both lists
    pub fn with_lists(self, whitelist: &[Address], blacklist: &[Address]) -> Self {
        {
            let mut wl = self.whitelist.write().unwrap_or_else(|e| e.into_inner());
            wl.extend(whitelist.iter().copied().map(key));
            let mut bl = self.blacklist.write().unwrap_or_else(|e| e.into_inner());
            bl.extend(blacklist.iter().copied().map(key));
        }
        info!(
            "Creator lists loaded: {} whitelisted, {} blacklisted",
            whitelist.len(),
            blacklist.len()
        );
        self
    }

    pub fn is_blacklisted(&self, creator: Address) -> bool {
        self.blacklist
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key(creator))
    }

    pub fn is_whitelisted(&self, creator: Address) -> bool {
        self.whitelist
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key(creator))
    }

    pub fn blacklist(&self, creator: Address, reason: &str) {
        let inserted = self
            .blacklist
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key(creator));
        if inserted {
            warn!("⛔ Creator {:#x} blacklisted: {}", creator, reason);
            self.persist(creator, CreatorList::Blacklist, reason);
        }
    }

    pub fn whitelist(&self, creator: Address, reason: &str) {
        let inserted = self
            .whitelist
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key(creator));
        if inserted {
            info!("✅ Creator {:#x} whitelisted: {}", creator, reason);
            self.persist(creator, CreatorList::Whitelist, reason);
        }
    }

    /// Start tracking a freshly created token
    pub fn record_creation(&self, token: Address, creator: Address, at: DateTime<Utc>) {
        self.tokens.insert(
            token,
            TokenStats {
                creator,
                created_at: at,
                buy_count: 0,
                sell_count: 0,
                buy_volume_bnb: 0.0,
                sell_volume_bnb: 0.0,
                touched_at: at,
            },
        );
        debug!("Tracking new token {:#x} (creator {:#x})", token, creator);
    }

    pub fn creator_of(&self, token: Address) -> Option<Address> {
        self.tokens.get(&token).map(|s| s.creator)
    }

    pub fn stats(&self, token: Address) -> Option<TokenStats> {
        self.tokens.get(&token).map(|s| s.clone())
    }

    /// Fold a classified trade into the token's counters.
    ///
    /// Returns the creator when this trade is a rug: the creator selling
    /// within the rug window after creation. The creator is blacklisted
    /// before returning; the token stays tracked so later buys still see
    /// who launched it. A creator is flagged only once.
    pub fn record_trade(&self, ev: &ClassifiedEvent, at: DateTime<Utc>) -> Option<Address> {
        let is_buy = match ev.kind {
            EventKind::Buy => true,
            EventKind::Sell => false,
            _ => return None,
        };
        let volume = to_f64(ev.payment_amount);
        let seller = ev.trader.unwrap_or(ev.from);
        let already_flagged = self.is_blacklisted(seller);

        let rug = {
            let mut entry = self.tokens.get_mut(&ev.token)?;
            if at - entry.touched_at > self.ttl {
                None
            } else {
                entry.touched_at = at;
                if is_buy {
                    entry.buy_count += 1;
                    entry.buy_volume_bnb += volume;
                    None
                } else {
                    entry.sell_count += 1;
                    entry.sell_volume_bnb += volume;
                    (!already_flagged && seller == entry.creator && at - entry.created_at <= self.rug_window)
                        .then_some(entry.creator)
                }
            }
        };

        if let Some(creator) = rug {
            self.blacklist(
                creator,
                &format!("sold {:#x} within {}s of launch", ev.token, self.rug_window.num_seconds()),
            );
        }
        rug
    }

    /// Drop entries not touched within the TTL; returns how many went
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, s| now - s.touched_at <= self.ttl);
        let purged = before - self.tokens.len();
        if purged > 0 {
            debug!("Purged {} expired token stats", purged);
        }
        purged
    }

    pub fn tracked_tokens(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{to_wei, LogCoord, ProtocolVersion, Settlement};
    use alloy::primitives::{B256, U256};

    fn sell(token: Address, seller: Address) -> ClassifiedEvent {
        ClassifiedEvent {
            kind: EventKind::Sell,
            token,
            from: seller,
            to: crate::contracts::TOKEN_MANAGER_V2,
            trader: Some(seller),
            creator: None,
            pair: None,
            token_amount: U256::from(1000),
            payment_amount: to_wei(0.5),
            fee_amount: U256::ZERO,
            version: ProtocolVersion::V2,
            protocol_address: crate::contracts::TOKEN_MANAGER_V2,
            settlement: Settlement::Native,
            coord: LogCoord {
                block_number: 1,
                tx_index: 0,
                log_index: 0,
                tx_hash: B256::ZERO,
            },
        }
    }

    #[test]
    fn test_creator_sell_inside_window_is_rug() {
        let rep = CreatorReputation::new(600, 60);
        let token = Address::repeat_byte(1);
        let creator = Address::repeat_byte(2);
        let t0 = Utc::now();
        rep.record_creation(token, creator, t0);

        let flagged = rep.record_trade(&sell(token, creator), t0 + Duration::seconds(30));
        assert_eq!(flagged, Some(creator));
        assert!(rep.is_blacklisted(creator));
        assert_eq!(rep.creator_of(token), Some(creator));
        assert!(rep.record_trade(&sell(token, creator), t0 + Duration::seconds(40)).is_none());
    }

    #[test]
    fn test_creator_sell_after_window_is_not_rug() {
        let rep = CreatorReputation::new(600, 60);
        let token = Address::repeat_byte(1);
        let creator = Address::repeat_byte(2);
        let t0 = Utc::now();
        rep.record_creation(token, creator, t0);

        assert!(rep.record_trade(&sell(token, creator), t0 + Duration::seconds(61)).is_none());
        assert!(!rep.is_blacklisted(creator));
        assert_eq!(rep.stats(token).unwrap().sell_count, 1);
    }

    #[test]
    fn test_other_seller_only_counts() {
        let rep = CreatorReputation::new(600, 60);
        let token = Address::repeat_byte(1);
        rep.record_creation(token, Address::repeat_byte(2), Utc::now());
        assert!(rep.record_trade(&sell(token, Address::repeat_byte(3)), Utc::now()).is_none());
        let stats = rep.stats(token).unwrap();
        assert_eq!(stats.sell_count, 1);
        assert!((stats.sell_volume_bnb - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_lists_are_case_insensitive_and_purge() {
        let creator = Address::repeat_byte(0xab);
        let rep = CreatorReputation::new(600, 60).with_lists(&[creator], &[]);
        assert!(rep.is_whitelisted(creator));
        assert!(!rep.is_blacklisted(creator));

        let t0 = Utc::now();
        rep.record_creation(Address::repeat_byte(1), creator, t0);
        assert_eq!(rep.purge_expired(t0 + Duration::seconds(599)), 0);
        assert_eq!(rep.purge_expired(t0 + Duration::seconds(601)), 1);
        assert_eq!(rep.tracked_tokens(), 0);
    }

    #[test]
    fn test_rug_creator_survives_restart() {
        let store = Arc::new(crate::store::testing::MemoryStore::default());
        let token = Address::repeat_byte(1);
        let creator = Address::repeat_byte(2);
        let t0 = Utc::now();

        let rep = CreatorReputation::new(600, 60).with_store(store.clone()).unwrap();
        rep.record_creation(token, creator, t0);
        rep.record_trade(&sell(token, creator), t0 + Duration::seconds(10));
        rep.whitelist(Address::repeat_byte(3), "operator");
        rep.whitelist(Address::repeat_byte(3), "operator");

        let saved = store.creators();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].creator, creator);
        assert_eq!(saved[0].list, CreatorList::Blacklist);

        let restarted = CreatorReputation::new(600, 60).with_store(store.clone()).unwrap();
        assert!(restarted.is_blacklisted(creator));
        assert!(restarted.is_whitelisted(Address::repeat_byte(3)));
        assert_eq!(store.creators().len(), 2);
    }
}
