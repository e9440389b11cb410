//! Monitor Registry
//!
//! The configured targets plus whatever gets discovered at runtime (tokens
//! being bought, their Pancake pairs). Readers take cheap `Arc`
//! snapshots; every change bumps a `watch` generation so the subscriber
//! knows to rebuild its filter. Runtime targets carry the time they were
//! last touched and can be expired; configured ones never are.

use crate::chain::ReceiptLogs;
use crate::types::MonitorTarget;
use alloy::primitives::{Address, B256};
use alloy::rpc::types::Filter;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Clone)]
pub struct MonitorRegistry {
    targets: Arc<RwLock<Vec<Arc<MonitorTarget>>>>,
    /// Token of each runtime-appended target and when it was last touched
    appended: Arc<RwLock<HashMap<Address, DateTime<Utc>>>>,
    generation: Arc<watch::Sender<u64>>,
}

impl MonitorRegistry {
    pub fn new(targets: Vec<MonitorTarget>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            targets: Arc::new(RwLock::new(targets.into_iter().map(Arc::new).collect())),
            appended: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(generation),
        }
    }

    /// Add a runtime-discovered target. A token already present gets the
    /// new watch addresses merged in. Returns whether anything changed.
    pub fn append(&self, target: MonitorTarget) -> bool {
        self.append_at(target, Utc::now())
    }

    pub fn append_at(&self, target: MonitorTarget, at: DateTime<Utc>) -> bool {
        let changed = {
            let mut targets = self.targets.write().unwrap_or_else(|e| e.into_inner());
            let mut appended = self.appended.write().unwrap_or_else(|e| e.into_inner());
            if let Some(touched) = target.token.and_then(|token| appended.get_mut(&token)) {
                *touched = at;
            }
            match target
                .token
                .and_then(|token| targets.iter().position(|t| t.token == Some(token)))
            {
                Some(idx) => {
                    let existing = &targets[idx];
                    let extra: Vec<Address> = target
                        .watch_addresses
                        .iter()
                        .copied()
                        .filter(|a| !existing.watch_addresses.contains(a))
                        .collect();
                    if extra.is_empty() {
                        false
                    } else {
                        let mut merged = (**existing).clone();
                        merged.watch_addresses.extend(extra);
                        targets[idx] = Arc::new(merged);
                        true
                    }
                }
                None => {
                    info!("➕ Monitoring {} ({} targets)", target.name, targets.len() + 1);
                    if let Some(token) = target.token {
                        appended.insert(token, at);
                    }
                    targets.push(Arc::new(target));
                    true
                }
            }
        };

        if changed {
            self.generation.send_modify(|g| *g += 1);
        }
        changed
    }

    /// Drop runtime targets last touched before `cutoff` unless `keep`
    /// says their token is still needed. Returns how many went.
    pub fn expire(&self, cutoff: DateTime<Utc>, keep: impl Fn(Address) -> bool) -> usize {
        let removed = {
            let mut targets = self.targets.write().unwrap_or_else(|e| e.into_inner());
            let mut appended = self.appended.write().unwrap_or_else(|e| e.into_inner());
            let stale: Vec<Address> = appended
                .iter()
                .filter(|(token, touched)| **touched < cutoff && !keep(**token))
                .map(|(token, _)| *token)
                .collect();
            for token in &stale {
                appended.remove(token);
            }
            let before = targets.len();
            targets.retain(|t| t.token.map_or(true, |token| !stale.contains(&token)));
            before - targets.len()
        };

        if removed > 0 {
            info!("➖ Expired {} runtime targets", removed);
            self.generation.send_modify(|g| *g += 1);
        }
        removed
    }

    /// Runtime-appended targets currently held
    pub fn appended_len(&self) -> usize {
        self.appended.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn targets(&self) -> Vec<Arc<MonitorTarget>> {
        self.targets.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.targets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change notifications; the value is a generation counter
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Union of watched addresses, sorted and deduplicated
    pub fn addresses(&self) -> Vec<Address> {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        targets
            .iter()
            .flat_map(|t| t.addresses())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Union of topic allow-lists
    pub fn topics(&self) -> Vec<B256> {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        targets
            .iter()
            .flat_map(|t| t.topics().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Subscription filter for the current target set
    pub fn filter(&self) -> Filter {
        let addresses = self.addresses();
        let topics = self.topics();
        debug!("Filter: {} addresses, {} topics", addresses.len(), topics.len());
        Filter::new().address(addresses).event_signature(topics)
    }

    /// Targets that apply to `token`: token-specific ones first, then the
    /// catch-alls
    pub fn matching(&self, token: Address) -> Vec<Arc<MonitorTarget>> {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        let specific = targets.iter().filter(|t| t.token == Some(token));
        let general = targets.iter().filter(|t| t.token.is_none());
        specific.chain(general).cloned().collect()
    }

    /// Any log in the receipt comes from a watched address with a watched topic
    pub fn is_relevant(&self, receipt: &ReceiptLogs) -> bool {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        receipt.logs.iter().any(|log| {
            let Some(topic0) = log.topic0() else { return false };
            targets
                .iter()
                .any(|t| t.covers(log.address) && t.topics().any(|x| x == topic0))
        })
    }
}
