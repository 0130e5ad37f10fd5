/// Swap State Machine (spec.md §4.4): four cooperative polling loops that
/// advance `Swap` rows from `request_ongoing` to a terminal fill state.
///
/// Grounded in `original_source/swap-engine/erc721/{manage_ongoing,
/// manage_confirmed, manage_tx_created, manage_tx_sent}.go`.
mod confirmed;
mod ongoing;
mod tx_created;
mod tx_sent;

use crate::alerting::AlertSink;
use crate::chain::fleet::ChainFleet;
use crate::config::ChainConfig;
use crate::metrics;
use crate::telemetry::ProgressCounter;
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::error;

const WATCH_SWAP_EVENT_DELAY_SECS: u64 = 3;
const WAIT_LOG_INTERVAL: u64 = 20;

pub struct SwapEngine {
    pub chain_id: String,
    pub pool: AnyPool,
    pub fleet: Arc<ChainFleet>,
    pub hmac_key: String,
    pub confirm_num: i64,
    pub max_track_retry: i64,
    pub explorer_url: String,
    pub dialect: crate::config::Dialect,
    pub alert_sink: Arc<dyn AlertSink>,
    pub loop_delay: Duration,
    pub wait_log_progress: ProgressCounter,
}

impl SwapEngine {
    pub fn new(chain: &ChainConfig, pool: AnyPool, fleet: Arc<ChainFleet>, hmac_key: String, dialect: crate::config::Dialect, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            chain_id: chain.id.clone(),
            pool,
            fleet,
            hmac_key,
            confirm_num: chain.confirm_num,
            max_track_retry: chain.max_track_retry,
            explorer_url: chain.explorer_url.clone(),
            dialect,
            alert_sink,
            loop_delay: Duration::from_secs(WATCH_SWAP_EVENT_DELAY_SECS),
            wait_log_progress: ProgressCounter::new(WAIT_LOG_INTERVAL),
        }
    }

    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(ongoing::run(self.clone())),
            tokio::spawn(confirmed::run(self.clone())),
            tokio::spawn(tx_created::run(self.clone())),
            tokio::spawn(tx_sent::run(self.clone())),
        ]
    }
}

/// Advisory notification on a terminal failure; never changes state
/// (same advisory contract as the Observer's alert loop).
async fn alert(engine: &SwapEngine, msg: &str) {
    if let Err(e) = engine.alert_sink.send(msg).await {
        error!(chain_id = %engine.chain_id, error = %e, "failed to send alert");
    } else {
        metrics::ALERTS_EMITTED.with_label_values(&[&engine.chain_id]).inc();
    }
}
