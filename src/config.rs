//! Configuration management
//!
//! Two sources, both read once at start-up:
//! - `.env` / environment: chain endpoints, signing key, gas caps, sinks
//! - policy TOML: runtime knobs, monitor targets, creator and smart-wallet lists
//!
//! Any failure here is fatal; the agent never starts half-configured.

use crate::contracts;
use crate::types::{MonitorTarget, ProtocolVersion};
use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Chain (environment) ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub ws_url: String,
    pub http_url: Option<String>,
    pub private_key: String,
    pub chain_id: u64,
    pub gas_multiplier: f64,
    pub max_gas_price_gwei: u64,
    pub records_dir: PathBuf,
    pub webhook_url: Option<String>,
    pub price_api_url: String,
}

const DEFAULT_PRICE_API: &str = "https://min-api.cryptocompare.com/data/price?fsym=BNB&tsyms=USDT";

impl ChainConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let private_key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY not set")?;
        if private_key.trim().is_empty() {
            bail!("PRIVATE_KEY is empty");
        }

        Ok(Self {
            ws_url: std::env::var("BSC_WS_URL").context("BSC_WS_URL not set")?,
            http_url: std::env::var("BSC_HTTP_URL").ok(),
            private_key,
            chain_id: env_or("CHAIN_ID", 56)?,
            gas_multiplier: env_or("GAS_PRICE_MULTIPLIER", 1.1)?,
            max_gas_price_gwei: env_or("MAX_GAS_PRICE_GWEI", 10)?,
            records_dir: std::env::var("RECORDS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/records")),
            webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            price_api_url: std::env::var("PRICE_API_URL")
                .unwrap_or_else(|_| DEFAULT_PRICE_API.to_string()),
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

// ── Protocol addresses ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocols {
    #[serde(default = "default_v1")]
    pub manager_v1: Address,
    #[serde(default = "default_v2")]
    pub manager_v2: Address,
    #[serde(default = "default_helper3")]
    pub helper3: Address,
    #[serde(default = "default_wbnb")]
    pub wbnb: Address,
    #[serde(default = "default_factory")]
    pub pancake_factory: Address,
    #[serde(default = "default_router")]
    pub pancake_router: Address,
    /// Stable quote tokens settled through the helper
    #[serde(default = "default_quote_tokens")]
    pub quote_tokens: Vec<Address>,
}

fn default_v1() -> Address { contracts::TOKEN_MANAGER_V1 }
fn default_v2() -> Address { contracts::TOKEN_MANAGER_V2 }
fn default_helper3() -> Address { contracts::TOKEN_MANAGER_HELPER3 }
fn default_wbnb() -> Address { contracts::WBNB }
fn default_factory() -> Address { contracts::PANCAKE_FACTORY }
fn default_router() -> Address { contracts::PANCAKE_ROUTER }
fn default_quote_tokens() -> Vec<Address> { vec![contracts::USD1] }

impl Default for Protocols {
    fn default() -> Self {
        Self {
            manager_v1: default_v1(),
            manager_v2: default_v2(),
            helper3: default_helper3(),
            wbnb: default_wbnb(),
            pancake_factory: default_factory(),
            pancake_router: default_router(),
            quote_tokens: default_quote_tokens(),
        }
    }
}

impl Protocols {
    pub fn managers(&self) -> [Address; 3] {
        [self.manager_v2, self.helper3, self.manager_v1]
    }

    pub fn is_manager(&self, addr: Address) -> bool {
        self.managers().contains(&addr)
    }

    pub fn version_of(&self, addr: Address) -> Option<ProtocolVersion> {
        if addr == self.manager_v1 {
            Some(ProtocolVersion::V1)
        } else if addr == self.manager_v2 {
            Some(ProtocolVersion::V2)
        } else if addr == self.helper3 {
            Some(ProtocolVersion::V3)
        } else {
            None
        }
    }

    pub fn is_quote_token(&self, addr: Address) -> bool {
        self.quote_tokens.contains(&addr)
    }
}

// ── Policy file (TOML) ────────────────────────────────────────────────

/// How blocks reach the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    Poll,
    Subscribe,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_mode")]
    pub mode: DriveMode,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_backfill")]
    pub backfill_blocks: u64,
    /// 0 lets every pass run to the tip
    #[serde(default = "default_max_blocks")]
    pub max_blocks_per_pass: u64,
    #[serde(default = "default_risk_interval")]
    pub risk_interval_secs: u64,
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_receipt_poll")]
    pub receipt_poll_secs: u64,
    #[serde(default = "default_resubscribe")]
    pub resubscribe_backoff_secs: u64,
    /// Quiet period after a monitor-set change before resubscribing
    #[serde(default = "default_resubscribe_debounce")]
    pub resubscribe_debounce_ms: u64,
    /// Idle runtime targets of tokens no longer held are dropped after this
    #[serde(default = "default_runtime_target_ttl")]
    pub runtime_target_ttl_secs: u64,
    #[serde(default = "default_queue_depth")]
    pub dispatch_queue_depth: usize,
    #[serde(default = "default_concurrency")]
    pub dispatch_concurrency: usize,
    #[serde(default = "default_heuristic_pool")]
    pub heuristic_pool_size: usize,
    #[serde(default = "default_native_min")]
    pub native_min_value_bnb: f64,
    #[serde(default = "default_native_gas")]
    pub native_max_gas: u64,
    #[serde(default = "default_reputation_ttl")]
    pub reputation_ttl_secs: u64,
    #[serde(default = "default_rug_window")]
    pub rug_window_secs: i64,
    #[serde(default = "default_price_refresh")]
    pub price_refresh_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_mode() -> DriveMode { DriveMode::Poll }
fn default_poll_interval() -> u64 { 1000 }
fn default_backfill() -> u64 { 10 }
fn default_max_blocks() -> u64 { 0 }
fn default_risk_interval() -> u64 { 10 }
fn default_receipt_timeout() -> u64 { 120 }
fn default_receipt_poll() -> u64 { 3 }
fn default_resubscribe() -> u64 { 5 }
fn default_resubscribe_debounce() -> u64 { 2000 }
fn default_runtime_target_ttl() -> u64 { 3600 }
fn default_queue_depth() -> usize { 64 }
fn default_concurrency() -> usize { 4 }
fn default_heuristic_pool() -> usize { 20 }
fn default_native_min() -> f64 { 10.0 }
fn default_native_gas() -> u64 { 30_000 }
fn default_reputation_ttl() -> u64 { 600 }
fn default_rug_window() -> i64 { 60 }
fn default_price_refresh() -> u64 { 600 }
fn default_log_level() -> String { "info".to_string() }

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            poll_interval_ms: default_poll_interval(),
            backfill_blocks: default_backfill(),
            max_blocks_per_pass: default_max_blocks(),
            risk_interval_secs: default_risk_interval(),
            receipt_timeout_secs: default_receipt_timeout(),
            receipt_poll_secs: default_receipt_poll(),
            resubscribe_backoff_secs: default_resubscribe(),
            resubscribe_debounce_ms: default_resubscribe_debounce(),
            runtime_target_ttl_secs: default_runtime_target_ttl(),
            dispatch_queue_depth: default_queue_depth(),
            dispatch_concurrency: default_concurrency(),
            heuristic_pool_size: default_heuristic_pool(),
            native_min_value_bnb: default_native_min(),
            native_max_gas: default_native_gas(),
            reputation_ttl_secs: default_reputation_ttl(),
            rug_window_secs: default_rug_window(),
            price_refresh_secs: default_price_refresh(),
            log_level: default_log_level(),
        }
    }
}

impl RuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn risk_interval(&self) -> Duration {
        Duration::from_secs(self.risk_interval_secs)
    }

    pub fn receipt_policy(&self) -> crate::chain::ReceiptPolicy {
        crate::chain::ReceiptPolicy {
            timeout: Duration::from_secs(self.receipt_timeout_secs),
            poll: Duration::from_secs(self.receipt_poll_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatorsConfig {
    #[serde(default)]
    pub whitelist: Vec<Address>,
    #[serde(default)]
    pub blacklist: Vec<Address>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartWalletsConfig {
    #[serde(default)]
    pub wallets: Vec<Address>,
    /// Ignore smart-wallet buys paying less than this
    #[serde(default)]
    pub min_amount_bnb: f64,
}

/// Top-level policy file structure
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<MonitorTarget>,
    #[serde(default)]
    pub creators: CreatorsConfig,
    #[serde(default)]
    pub smart_wallets: SmartWalletsConfig,
    #[serde(default)]
    pub protocols: Protocols,
}

impl PolicyConfig {
    /// Load and validate a policy file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read policy file: {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse policy file: {}", path.as_ref().display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("policy defines no [[target]] entries");
        }
        for t in &self.targets {
            if !(0.0..1.0).contains(&t.slippage) || !(0.0..1.0).contains(&t.sell_slippage) {
                bail!("target '{}': slippage must be within [0, 1)", t.name);
            }
            if t.take_profit <= 1.0 {
                bail!("target '{}': take_profit must be > 1.0 (got {})", t.name, t.take_profit);
            }
            if t.stop_loss <= 0.0 || t.stop_loss >= 1.0 {
                bail!("target '{}': stop_loss must be within (0, 1) (got {})", t.name, t.stop_loss);
            }
            if t.buy_amount_bnb <= 0.0 {
                bail!("target '{}': buy_amount_bnb must be positive", t.name);
            }
        }
        if self.runtime.dispatch_concurrency == 0 || self.runtime.heuristic_pool_size == 0 {
            bail!("runtime: worker pool sizes must be non-zero");
        }
        Ok(())
    }
}

/// Everything the agent needs at start-up
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub policy: PolicyConfig,
}

pub fn load_config<P: AsRef<Path>>(policy_path: P) -> Result<AppConfig> {
    let chain = ChainConfig::from_env()?;
    let policy = PolicyConfig::load(policy_path)?;
    Ok(AppConfig { chain, policy })
}
