/// Confirmed -> Tx-Created loop: dry-run then real send of the pair
/// creation tx.
use super::PairEngine;
use crate::db::models::SwapPairState;
use crate::db::repository;
use crate::metrics;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(engine: Arc<PairEngine>) {
    loop {
        if let Err(e) = tick(&engine).await {
            warn!(chain_id = %engine.chain_id, error = %e, "confirmed-pair tick failed");
        }
        tokio::time::sleep(engine.loop_delay).await;
    }
}

async fn tick(engine: &PairEngine) -> crate::error::Result<()> {
    let pairs = repository::swap_pairs_in_state(&engine.pool, &engine.chain_id, &SwapPairState::RegistrationConfirmed.to_string()).await?;

    for mut pair in pairs {
        let dst = engine.fleet.get(&pair.dst_chain_id)?;

        let dry_run = dst
            .swap_agent
            .create_swap_pair(&pair.register_tx_hash, &pair.src_token_addr, &pair.src_chain_id, &pair.src_token_name, &pair.symbol, true)
            .await;

        let dry_run = match dry_run {
            Ok(v) => v,
            Err(e) => {
                pair.set_state(SwapPairState::CreationTxDryRunFailed);
                pair.message_log = Some(e.to_string());
                repository::save_swap_pair(&engine.pool, &pair).await?;
                metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap_pair", "creation_tx_dry_run_failed"]).inc();
                continue;
            }
        };

        pair.set_state(SwapPairState::CreationTxCreated);
        pair.create_tx_hash = Some(dry_run.tx_hash);
        repository::save_swap_pair(&engine.pool, &pair).await?;

        info!(chain_id = %engine.chain_id, pair_id = %pair.id, "sent dry-run pair creation tx");

        let sent = dst
            .swap_agent
            .create_swap_pair(&pair.register_tx_hash, &pair.src_token_addr, &pair.src_chain_id, &pair.src_token_name, &pair.symbol, false)
            .await;

        match sent {
            Ok(sent) => {
                pair.create_tx_hash = Some(sent.tx_hash);
                repository::save_swap_pair(&engine.pool, &pair).await?;
                info!(chain_id = %engine.chain_id, pair_id = %pair.id, explorer = %engine.explorer_url, "sent pair creation tx");
            }
            Err(e) if e.to_string().contains("replace underpriced") || e.to_string().contains("replacement transaction underpriced") => {
                pair.set_state(SwapPairState::RegistrationConfirmed);
                pair.message_log = Some(e.to_string());
                repository::save_swap_pair(&engine.pool, &pair).await?;
            }
            Err(e) => {
                pair.set_state(SwapPairState::CreationTxFailed);
                pair.message_log = Some(e.to_string());
                repository::save_swap_pair(&engine.pool, &pair).await?;
                metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap_pair", "creation_tx_failed"]).inc();
            }
        }
    }

    Ok(())
}
