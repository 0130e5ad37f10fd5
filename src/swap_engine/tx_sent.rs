/// Tx-Sent -> Confirmed loop: batch-confirm once the destination chain has
/// enough confirmations over the fill tx.
use super::SwapEngine;
use crate::db::models::SwapState;
use crate::db::repository;
use crate::integrity;
use crate::metrics;
use crate::retry::has_block_confirmed;
use std::sync::Arc;
use tracing::{error, info, warn};

pub async fn run(engine: Arc<SwapEngine>) {
    loop {
        if let Err(e) = tick(&engine).await {
            warn!(chain_id = %engine.chain_id, error = %e, "tx-sent-swap tick failed");
        }
        tokio::time::sleep(engine.loop_delay).await;
    }
}

async fn tick(engine: &SwapEngine) -> crate::error::Result<()> {
    let swaps = repository::swaps_in_state(&engine.pool, &engine.chain_id, &SwapState::FillTxSent.to_string()).await?;

    let mut confirmed_rows = Vec::new();
    for swap in swaps {
        integrity::verify(&engine.hmac_key, &swap)?;

        let Some(fill_tx_hash) = swap.fill_tx_hash.clone() else { continue };
        match has_block_confirmed(&engine.fleet, &swap.dst_chain_id, &fill_tx_hash, engine.confirm_num).await {
            Ok(true) => {
                let mut confirmed = swap.clone();
                confirmed.set_state(SwapState::FillTxConfirmed);
                let signature = integrity::sign(&engine.hmac_key, &confirmed);
                confirmed_rows.push((confirmed.id.clone(), signature));
            }
            Ok(false) => {}
            Err(e) => error!(chain_id = %engine.chain_id, swap_id = %swap.id, error = %e, "failed to check block confirmation"),
        }
    }

    if confirmed_rows.is_empty() {
        return Ok(());
    }

    repository::mark_swaps_confirmed(&engine.pool, &confirmed_rows, &SwapState::FillTxConfirmed.to_string()).await?;
    metrics::STATE_TRANSITIONS
        .with_label_values(&[&engine.chain_id, "swap", "fill_tx_confirmed"])
        .inc_by(confirmed_rows.len() as u64);

    for (id, _) in &confirmed_rows {
        info!(chain_id = %engine.chain_id, swap_id = %id, "swap fill confirmed");
    }

    Ok(())
}
