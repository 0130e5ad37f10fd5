/// Prune loop (spec.md §4.1): bound `block_log` growth by age.
use super::Observer;
use crate::db::repository;
use std::sync::Arc;
use tracing::{error, info};

pub async fn run(ob: Arc<Observer>) {
    loop {
        match repository::latest_block_log(&ob.pool, &ob.chain_id).await {
            Ok(Some(tip)) => {
                let cutoff = tip.height - ob.max_block_lag;
                if cutoff > 0 {
                    match repository::prune_block_log(&ob.pool, &ob.chain_id, cutoff).await {
                        Ok(n) if n > 0 => info!(chain_id = %ob.chain_id, rows = n, cutoff, "pruned block log"),
                        Ok(_) => {}
                        Err(e) => error!(chain_id = %ob.chain_id, error = %e, "prune failed"),
                    }
                }
            }
            Ok(None) => {}
            Err(e) => error!(chain_id = %ob.chain_id, error = %e, "failed to read current block log"),
        }

        tokio::time::sleep(ob.prune_interval).await;
    }
}
