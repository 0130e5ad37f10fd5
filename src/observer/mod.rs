/// Chain Observer: fork-aware block ingester.
///
/// Grounded in `original_source/observer/observer.go` (three cooperative
/// loops spawned at startup) and `fetch.go`/`prune.go`/`alert.go`, translated
/// from goroutines + `gorm.DB` to `tokio::spawn` + `sqlx::AnyPool`.
mod alert;
mod fetch;
mod prune;

use crate::alerting::AlertSink;
use crate::chain::fleet::LatestBlockCache;
use crate::chain::SwapAgent;
use crate::config::{AlertConfig, ChainConfig, Dialect};
use crate::recorder::Recorder;
use sqlx::AnyPool;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Observer {
    pub chain_id: String,
    pub pool: AnyPool,
    pub rpc: Arc<dyn crate::chain::EthRpc>,
    pub recorder: Recorder,
    pub latest_block: Arc<LatestBlockCache>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub start_height: i64,
    pub fetch_interval: std::time::Duration,
    pub prune_interval: std::time::Duration,
    pub alert_interval: std::time::Duration,
    pub max_block_lag: i64,
    pub block_update_timeout: std::time::Duration,
    pub dialect: Dialect,
}

const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 10;
const DEFAULT_ALERT_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_BLOCK_LAG: i64 = 10_000;

impl Observer {
    /// `latest_block` must be the same `Arc<LatestBlockCache>` held by this
    /// chain's `ChainEntry` in the shared `ChainFleet` — the engines read it
    /// through `has_block_confirmed`, so the Observer has to write into that
    /// exact instance rather than a private one (spec.md §5).
    pub fn new(
        chain: &ChainConfig,
        alert: &AlertConfig,
        pool: AnyPool,
        rpc: Arc<dyn crate::chain::EthRpc>,
        swap_agent: Arc<dyn SwapAgent>,
        alert_sink: Arc<dyn AlertSink>,
        hmac_key: String,
        dialect: Dialect,
        latest_block: Arc<LatestBlockCache>,
    ) -> Self {
        let recorder = Recorder::new(chain.id.clone(), swap_agent, latest_block.clone(), hmac_key, dialect);

        Self {
            chain_id: chain.id.clone(),
            pool,
            rpc,
            recorder,
            latest_block,
            alert_sink,
            start_height: chain.start_height,
            fetch_interval: std::time::Duration::from_secs(chain.observer_fetch_interval),
            prune_interval: std::time::Duration::from_secs(DEFAULT_PRUNE_INTERVAL_SECS),
            alert_interval: std::time::Duration::from_secs(DEFAULT_ALERT_INTERVAL_SECS),
            max_block_lag: DEFAULT_MAX_BLOCK_LAG,
            block_update_timeout: std::time::Duration::from_secs(alert.block_update_timeout_secs),
            dialect,
        }
    }

    /// Spawns the fetch/prune/alert loops and returns their join handles so
    /// the caller can await or abort them on shutdown.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(fetch::run(self.clone())),
            tokio::spawn(prune::run(self.clone())),
            tokio::spawn(alert::run(self.clone())),
        ]
    }
}
