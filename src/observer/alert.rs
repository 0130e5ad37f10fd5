/// Alert loop (spec.md §4.1): advisory staleness notification, never
/// mutates state.
use super::Observer;
use crate::db::repository;
use crate::metrics;
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

pub async fn run(ob: Arc<Observer>) {
    loop {
        match repository::latest_block_log(&ob.pool, &ob.chain_id).await {
            Ok(Some(tip)) if tip.height > 0 => {
                let age = Utc::now().signed_duration_since(tip.created_at);
                metrics::LATEST_BLOCK_AGE_SECONDS.with_label_values(&[&ob.chain_id]).set(age.num_seconds().max(0));
                if age.to_std().map(|d| d > ob.block_update_timeout).unwrap_or(false) {
                    let msg = format!("last block fetched at {}, chain={}, height={}", tip.created_at, ob.chain_id, tip.height);
                    if let Err(e) = ob.alert_sink.send(&msg).await {
                        error!(chain_id = %ob.chain_id, error = %e, "failed to send alert");
                    } else {
                        metrics::ALERTS_EMITTED.with_label_values(&[&ob.chain_id]).inc();
                    }
                }
            }
            Ok(_) => {}
            Err(e) => error!(chain_id = %ob.chain_id, error = %e, "failed to read current block log"),
        }

        tokio::time::sleep(ob.alert_interval).await;
    }
}
