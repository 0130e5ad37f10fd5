/// Tx-Sent -> Confirmed loop: batch-confirm and flip `Available` once the
/// destination chain has enough confirmations over the creation tx.
use super::PairEngine;
use crate::db::models::SwapPairState;
use crate::db::repository;
use crate::metrics;
use crate::retry::has_block_confirmed;
use std::sync::Arc;
use tracing::{error, info, warn};

pub async fn run(engine: Arc<PairEngine>) {
    loop {
        if let Err(e) = tick(&engine).await {
            warn!(chain_id = %engine.chain_id, error = %e, "tx-sent-pair tick failed");
        }
        tokio::time::sleep(engine.loop_delay).await;
    }
}

async fn tick(engine: &PairEngine) -> crate::error::Result<()> {
    let pairs = repository::swap_pairs_in_state(&engine.pool, &engine.chain_id, &SwapPairState::CreationTxSent.to_string()).await?;

    let mut confirmed_ids = Vec::new();
    for pair in &pairs {
        let Some(create_tx_hash) = &pair.create_tx_hash else { continue };
        match has_block_confirmed(&engine.fleet, &pair.dst_chain_id, create_tx_hash, engine.confirm_num).await {
            Ok(true) => confirmed_ids.push(pair.id.clone()),
            Ok(false) => {}
            Err(e) => error!(chain_id = %engine.chain_id, pair_id = %pair.id, error = %e, "failed to check block confirmation"),
        }
    }

    if confirmed_ids.is_empty() {
        return Ok(());
    }

    repository::mark_swap_pairs_confirmed(&engine.pool, &confirmed_ids, &SwapPairState::CreationTxConfirmed.to_string()).await?;
    metrics::STATE_TRANSITIONS
        .with_label_values(&[&engine.chain_id, "swap_pair", "creation_tx_confirmed"])
        .inc_by(confirmed_ids.len() as u64);

    for id in &confirmed_ids {
        info!(chain_id = %engine.chain_id, pair_id = %id, "swap pair creation confirmed, now available");
    }

    Ok(())
}
