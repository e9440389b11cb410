//! Application context
//!
//! Every long-lived component is built once here and handed to its
//! consumers explicitly. `spawn` starts one task per duty on a `JoinSet`;
//! all of them stop on the shared broadcast shutdown.

use crate::chain::{AlloyGateway, ChainGateway, GasPolicy, TxSubmitter};
use crate::config::{AppConfig, DriveMode, PolicyConfig};
use crate::events::{Classifier, NativeTransferWatcher};
use crate::filters::CreatorReputation;
use crate::ingest::{BlockPoller, EventPipeline, LogSubscriber, MonitorRegistry};
use crate::notify::{LogNotifier, MultiNotifier, WebhookNotifier};
use crate::oracle::PriceOracle;
use crate::positions::{ExitQueue, MarketPricer, PositionLedger, RiskEvaluator};
use crate::store::{JsonlRecordStore, RecordStore};
use crate::trade::{run_worker, MarketReader, SecondaryMarket, StrategyTable, TradeDispatcher, TradeJob, TradeRouter};
use alloy::providers::{ProviderBuilder, WsConnect};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::info;

pub struct AppContext {
    pub policy: PolicyConfig,
    pub gateway: Arc<dyn ChainGateway>,
    pub registry: MonitorRegistry,
    pub ledger: PositionLedger,
    pub reputation: Arc<CreatorReputation>,
    pub store: Arc<dyn RecordStore>,
    pub notifier: MultiNotifier,
    pub oracle: Arc<PriceOracle>,
    pub router: Arc<TradeRouter>,
    pub dispatcher: TradeDispatcher,
    pub pipeline: Arc<EventPipeline>,
    pub risk: Arc<RiskEvaluator>,
    jobs: Mutex<Option<mpsc::Receiver<TradeJob>>>,
    shutdown: broadcast::Sender<()>,
}

impl AppContext {
    /// Connect to the chain and build everything from `config`.
    /// Polling prefers the HTTP endpoint when one is configured.
    pub async fn connect(config: &AppConfig, mode: DriveMode, dry_run: bool) -> Result<Self> {
        let chain = &config.chain;
        let gateway: Arc<dyn ChainGateway> = match (mode, &chain.http_url) {
            (DriveMode::Poll, Some(http)) => {
                info!("Connecting over HTTP: {}", http);
                let url: reqwest::Url = http.parse().with_context(|| format!("Invalid BSC_HTTP_URL '{}'", http))?;
                Arc::new(AlloyGateway::new(ProviderBuilder::new().connect_http(url)))
            }
            _ => {
                info!("Connecting over WebSocket: {}", chain.ws_url);
                let provider = ProviderBuilder::new()
                    .connect_ws(WsConnect::new(&chain.ws_url))
                    .await
                    .with_context(|| format!("Failed to connect to {}", chain.ws_url))?;
                Arc::new(AlloyGateway::new(provider))
            }
        };

        let tip = gateway.latest_block().await.context("Chain endpoint is not answering")?;
        info!("Connected! Current block: {}", tip);

        let store = Arc::new(JsonlRecordStore::new(&chain.records_dir)?);
        info!("Records: {}", chain.records_dir.display());
        Self::assemble(config, gateway, store, dry_run)
    }

    /// Build the component graph over an existing gateway and store
    pub fn assemble(
        config: &AppConfig,
        gateway: Arc<dyn ChainGateway>,
        store: Arc<dyn RecordStore>,
        dry_run: bool,
    ) -> Result<Self> {
        let chain = &config.chain;
        let policy = config.policy.clone();
        let runtime = &policy.runtime;
        let protocols = policy.protocols.clone();

        let signer: PrivateKeySigner = chain
            .private_key
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid PRIVATE_KEY: {}", e))?;
        let wallet = signer.address();
        info!("Wallet: {:#x}", wallet);

        let gas = GasPolicy {
            multiplier: chain.gas_multiplier,
            ..GasPolicy::default()
        }
        .with_max_gwei(chain.max_gas_price_gwei);
        let mut submitter = TxSubmitter::new(gateway.clone(), signer, chain.chain_id, gas);
        submitter.set_dry_run(dry_run);

        let mut notifier = MultiNotifier::default().with_sink(Arc::new(LogNotifier));
        if let Some(url) = &chain.webhook_url {
            notifier = notifier.with_sink(Arc::new(WebhookNotifier::new(url.clone())));
        }

        let oracle = Arc::new(
            PriceOracle::new(chain.price_api_url.clone())
                .with_ttl(Duration::from_secs(runtime.price_refresh_secs)),
        );
        let reputation = Arc::new(
            CreatorReputation::new(runtime.reputation_ttl_secs, runtime.rug_window_secs)
                .with_store(store.clone())?
                .with_lists(&policy.creators.whitelist, &policy.creators.blacklist),
        );
        let ledger = PositionLedger::new();
        let registry = MonitorRegistry::new(policy.targets.clone());

        let market = Arc::new(MarketReader::new(gateway.clone(), protocols.helper3));
        let secondary = Arc::new(SecondaryMarket::new(
            gateway.clone(),
            protocols.pancake_router,
            protocols.pancake_factory,
            protocols.wbnb,
        ));
        let strategies = StrategyTable::standard(protocols.clone(), market.clone());
        let router = Arc::new(TradeRouter::new(
            Arc::new(submitter),
            gateway.clone(),
            market.clone(),
            strategies,
            secondary.clone(),
            ledger.clone(),
            reputation.clone(),
            store.clone(),
            notifier.clone(),
            runtime.receipt_policy(),
        ));

        let (dispatcher, jobs) = TradeDispatcher::channel(runtime.dispatch_queue_depth);

        let native = Arc::new(NativeTransferWatcher::new(
            gateway.clone(),
            notifier.clone(),
            runtime.heuristic_pool_size,
            runtime.native_min_value_bnb,
            runtime.native_max_gas,
        ));
        let pipeline = Arc::new(
            EventPipeline::new(
                Classifier::new(protocols),
                registry.clone(),
                reputation.clone(),
                ledger.clone(),
                store.clone(),
                notifier.clone(),
                oracle.clone(),
                dispatcher.clone(),
                native,
                gateway.clone(),
                wallet,
            )
            .with_smart_wallets(&policy.smart_wallets.wallets, policy.smart_wallets.min_amount_bnb)
            .with_runtime_target_ttl(Duration::from_secs(runtime.runtime_target_ttl_secs)),
        );

        let risk = Arc::new(RiskEvaluator::new(
            ledger.clone(),
            Arc::new(MarketPricer::new(secondary, market)),
            ExitQueue::new(ledger.clone(), dispatcher.clone(), store.clone(), notifier.clone()),
            runtime.risk_interval(),
        ));

        let (shutdown, _) = broadcast::channel(4);

        Ok(Self {
            policy,
            gateway,
            registry,
            ledger,
            reputation,
            store,
            notifier,
            oracle,
            router,
            dispatcher,
            pipeline,
            risk,
            jobs: Mutex::new(Some(jobs)),
            shutdown,
        })
    }

    /// Start every duty. Ingestion runs in `mode`.
    pub fn spawn(&self, mode: DriveMode, tasks: &mut JoinSet<()>) -> Result<()> {
        let runtime = &self.policy.runtime;
        let jobs = self
            .jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| anyhow!("context already started"))?;

        tasks.spawn(run_worker(
            self.router.clone(),
            jobs,
            runtime.dispatch_concurrency,
            self.shutdown.subscribe(),
        ));
        tasks.spawn(self.risk.clone().run(self.shutdown.subscribe()));
        tasks.spawn(
            self.pipeline
                .clone()
                .run_housekeeping(Duration::from_secs(60), self.shutdown.subscribe()),
        );

        let refresher = self
            .oracle
            .clone()
            .spawn_refresher(Duration::from_secs(runtime.price_refresh_secs), self.shutdown.subscribe());
        tasks.spawn(async move {
            let _ = refresher.await;
        });

        match mode {
            DriveMode::Poll => {
                let poller = Arc::new(BlockPoller::new(
                    self.gateway.clone(),
                    self.pipeline.clone(),
                    runtime.backfill_blocks,
                    runtime.max_blocks_per_pass,
                    runtime.poll_interval(),
                ));
                tasks.spawn(poller.run(self.shutdown.subscribe()));
            }
            DriveMode::Subscribe => {
                let subscriber = Arc::new(
                    LogSubscriber::new(
                        self.gateway.clone(),
                        self.pipeline.clone(),
                        self.registry.clone(),
                        Duration::from_secs(runtime.resubscribe_backoff_secs),
                    )
                    .with_debounce(Duration::from_millis(runtime.resubscribe_debounce_ms)),
                );
                tasks.spawn(subscriber.run(self.shutdown.subscribe()));
            }
        }

        info!(
            "🚀 Agent running ({:?} mode, {} targets, {} creators whitelisted)",
            mode,
            self.registry.len(),
            self.policy.creators.whitelist.len()
        );
        Ok(())
    }

    /// Signal every task, wait for them, then for pending confirmations
    pub async fn stop(&self, mut tasks: JoinSet<()>) {
        let _ = self.shutdown.send(());
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::warn!("Task ended abnormally: {}", e);
            }
        }
        self.router.drain().await;
        info!(
            "Stopped. {} open positions, {} tracked tokens",
            self.ledger.open_count(),
            self.reputation.tracked_tokens()
        );
    }
}
