//! BNB/USD Price Oracle
//!
//! Pulls the BNB/USDT ticker from a public HTTP endpoint and caches it.
//! Readers never block on the network: a stale or missing price reads as
//! `None` and the caller skips whatever needed it.
//!
//! Endpoint response shape: `{"USDT": 612.34}`

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct Ticker {
    #[serde(rename = "USDT")]
    usdt: f64,
}

pub struct PriceOracle {
    url: String,
    client: reqwest::Client,
    /// Last price and when it was fetched
    cache: RwLock<Option<(f64, Instant)>>,
    ttl: Duration,
}

impl PriceOracle {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
            cache: RwLock::new(None),
            ttl: Duration::from_secs(600),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// USD per BNB, if a fresh price is cached
    pub fn usd_per_bnb(&self) -> Option<f64> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        match *cache {
            Some((price, at)) if at.elapsed() < self.ttl => Some(price),
            _ => None,
        }
    }

    /// BNB per USD, the factor that turns USD1 amounts into native units
    pub fn bnb_per_usd(&self) -> Option<f64> {
        self.usd_per_bnb().filter(|p| *p > 0.0).map(|p| 1.0 / p)
    }

    pub fn set_price(&self, usd_per_bnb: f64) {
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some((usd_per_bnb, Instant::now()));
    }

    pub async fn refresh(&self) -> Result<f64> {
        let ticker: Ticker = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("price request failed")?
            .error_for_status()
            .context("price endpoint returned an error")?
            .json()
            .await
            .context("price response was not the expected JSON")?;

        if !ticker.usdt.is_finite() || ticker.usdt <= 0.0 {
            return Err(anyhow!("implausible BNB price {}", ticker.usdt));
        }
        self.set_price(ticker.usdt);
        debug!("BNB/USDT refreshed: {:.2}", ticker.usdt);
        Ok(ticker.usdt)
    }

    /// Refresh now and then every `interval` until shutdown
    pub fn spawn_refresher(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.refresh().await {
                            Ok(p) => info!("💲 BNB/USDT = {:.2}", p),
                            Err(e) => warn!("Price refresh failed: {:#}", e),
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("Price refresher stopping");
                        break;
                    }
                }
            }
        })
    }
}
