//! JSONL Record Store
//!
//! Append-only files under the records directory, one JSON object per line:
//! - trades.jsonl: observed and agent trades
//! - creations.jsonl: token lifecycle events
//! - status.jsonl: later status changes of agent transactions
//! - creators.jsonl: creators added to the black or white list
//!
//! Keys already present on disk are loaded at start-up, so replaying the
//! same blocks after a restart does not duplicate rows.

use super::{CreationRecord, CreatorList, CreatorListEntry, RecordStore, StatusUpdate, TradeRecord, TradeStatus};
use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

const TRADES_FILE: &str = "trades.jsonl";
const CREATIONS_FILE: &str = "creations.jsonl";
const STATUS_FILE: &str = "status.jsonl";
const CREATORS_FILE: &str = "creators.jsonl";

#[derive(Default)]
struct SeenKeys {
    trades: HashSet<String>,
    creations: HashSet<String>,
    creators: HashSet<(Address, CreatorList)>,
}

pub struct JsonlRecordStore {
    base_dir: PathBuf,
    seen: Mutex<SeenKeys>,
}

impl JsonlRecordStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create records directory: {:?}", base_dir))?;

        let trades: Vec<TradeRecord> = read_lines(&base_dir.join(TRADES_FILE))?;
        let creations: Vec<CreationRecord> = read_lines(&base_dir.join(CREATIONS_FILE))?;
        let creators: Vec<CreatorListEntry> = read_lines(&base_dir.join(CREATORS_FILE))?;
        let seen = SeenKeys {
            trades: trades.into_iter().map(|r| r.unique_seq).collect(),
            creations: creations.into_iter().map(|r| r.unique_seq).collect(),
            creators: creators.into_iter().map(|e| (e.creator, e.list)).collect(),
        };
        info!(
            "📒 Record store at {:?} ({} trades, {} creations, {} listed creators on disk)",
            base_dir,
            seen.trades.len(),
            seen.creations.len(),
            seen.creators.len()
        );

        Ok(Self {
            base_dir,
            seen: Mutex::new(seen),
        })
    }

    fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<()> {
        let path = self.base_dir.join(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open records file: {:?}", path))?;
        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        writeln!(handle, "{}", json)?;
        Ok(())
    }

    pub fn read_trades(&self) -> Result<Vec<TradeRecord>> {
        read_lines(&self.base_dir.join(TRADES_FILE))
    }

    pub fn read_creations(&self) -> Result<Vec<CreationRecord>> {
        read_lines(&self.base_dir.join(CREATIONS_FILE))
    }

    pub fn read_status_updates(&self) -> Result<Vec<StatusUpdate>> {
        read_lines(&self.base_dir.join(STATUS_FILE))
    }
}

impl RecordStore for JsonlRecordStore {
    fn save_trade_record(&self, record: &TradeRecord) -> Result<bool> {
        // Held across the write so two writers cannot both pass the check
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.trades.contains(&record.unique_seq) {
            debug!("Trade {} already stored", record.unique_seq);
            return Ok(false);
        }
        self.append(TRADES_FILE, record)?;
        seen.trades.insert(record.unique_seq.clone());
        Ok(true)
    }

    fn save_creation_record(&self, record: &CreationRecord) -> Result<bool> {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.creations.contains(&record.unique_seq) {
            debug!("Creation {} already stored", record.unique_seq);
            return Ok(false);
        }
        self.append(CREATIONS_FILE, record)?;
        seen.creations.insert(record.unique_seq.clone());
        Ok(true)
    }

    fn update_status(&self, tx_hash: B256, status: TradeStatus, error: Option<String>) -> Result<()> {
        let _guard = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        self.append(
            STATUS_FILE,
            &StatusUpdate {
                tx_hash,
                status,
                error,
                timestamp: Utc::now(),
            },
        )
    }

    fn save_creator_entry(&self, entry: &CreatorListEntry) -> Result<bool> {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.creators.contains(&(entry.creator, entry.list)) {
            return Ok(false);
        }
        self.append(CREATORS_FILE, entry)?;
        seen.creators.insert((entry.creator, entry.list));
        Ok(true)
    }

    fn load_creator_entries(&self) -> Result<Vec<CreatorListEntry>> {
        let _guard = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        read_lines(&self.base_dir.join(CREATORS_FILE))
    }
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse JSON line in {:?}: {}", path, line))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TradeAction;
    use crate::types::ProtocolVersion;
    use alloy::primitives::{Address, U256};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fourmeme-records-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn record(hash: u8) -> TradeRecord {
        TradeRecord::agent(
            TradeAction::SellTakeProfit,
            ProtocolVersion::V2,
            Address::repeat_byte(2),
            Address::repeat_byte(1),
            Some(B256::repeat_byte(hash)),
            U256::from(10),
            U256::from(20),
            0.15,
        )
    }

    #[test]
    fn test_idempotent_across_restart() {
        let dir = temp_dir("idem");
        let store = JsonlRecordStore::new(&dir).unwrap();
        assert!(store.save_trade_record(&record(1)).unwrap());
        assert!(!store.save_trade_record(&record(1)).unwrap());
        assert!(store.save_trade_record(&record(2)).unwrap());
        drop(store);

        let reopened = JsonlRecordStore::new(&dir).unwrap();
        assert!(!reopened.save_trade_record(&record(2)).unwrap());
        assert_eq!(reopened.read_trades().unwrap().len(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_status_updates_appended() {
        let dir = temp_dir("status");
        let store = JsonlRecordStore::new(&dir).unwrap();
        store
            .update_status(B256::repeat_byte(3), TradeStatus::Failed, Some("reverted".into()))
            .unwrap();
        let updates = store.read_status_updates().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, TradeStatus::Failed);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_creator_entries_survive_restart() {
        let dir = temp_dir("creators");
        let store = JsonlRecordStore::new(&dir).unwrap();
        let rugger = Address::repeat_byte(7);
        let entry = CreatorListEntry::new(rugger, CreatorList::Blacklist, "sold within 60s of launch");
        assert!(store.save_creator_entry(&entry).unwrap());
        assert!(!store.save_creator_entry(&entry).unwrap());
        assert!(store
            .save_creator_entry(&CreatorListEntry::new(Address::repeat_byte(8), CreatorList::Whitelist, "config"))
            .unwrap());
        drop(store);

        let reopened = JsonlRecordStore::new(&dir).unwrap();
        assert!(!reopened.save_creator_entry(&entry).unwrap());
        let entries = reopened.load_creator_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].creator, rugger);
        assert_eq!(entries[0].list, CreatorList::Blacklist);
        let _ = fs::remove_dir_all(&dir);
    }
}
