/// Pair-Registration State Machine (spec.md §4.3): four cooperative polling
/// loops that advance `SwapPair` rows from `registration_ongoing` to
/// `creation_tx_confirmed`.
///
/// Grounded in `original_source/swap-pair-engine/erc721/{register,tx}.go`.
/// `SwapPair` carries no HMAC envelope (only `Swap` does per spec.md §3),
/// so these loops skip the verify/resign step the swap engine performs.
mod confirmed;
mod ongoing;
mod tx_created;
mod tx_sent;

use crate::chain::fleet::ChainFleet;
use crate::config::ChainConfig;
use crate::telemetry::ProgressCounter;
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const WATCH_REGISTER_EVENT_DELAY_SECS: u64 = 3;
const WAIT_LOG_INTERVAL: u64 = 20;

pub struct PairEngine {
    pub chain_id: String,
    pub pool: AnyPool,
    pub fleet: Arc<ChainFleet>,
    pub confirm_num: i64,
    pub max_track_retry: i64,
    pub explorer_url: String,
    pub dialect: crate::config::Dialect,
    pub loop_delay: Duration,
    pub wait_log_progress: ProgressCounter,
}

impl PairEngine {
    pub fn new(chain: &ChainConfig, pool: AnyPool, fleet: Arc<ChainFleet>, dialect: crate::config::Dialect) -> Self {
        Self {
            chain_id: chain.id.clone(),
            pool,
            fleet,
            confirm_num: chain.confirm_num,
            max_track_retry: chain.max_track_retry,
            explorer_url: chain.explorer_url.clone(),
            dialect,
            loop_delay: Duration::from_secs(WATCH_REGISTER_EVENT_DELAY_SECS),
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
