/// Ongoing -> Confirmed loop.
use super::PairEngine;
use crate::db::models::SwapPairState;
use crate::db::repository;
use crate::metrics;
use crate::retry::has_block_confirmed;
use std::sync::Arc;
use tracing::{error, warn};

pub async fn run(engine: Arc<PairEngine>) {
    loop {
        if let Err(e) = tick(&engine).await {
            warn!(chain_id = %engine.chain_id, error = %e, "ongoing-pair tick failed");
        }
        tokio::time::sleep(engine.loop_delay).await;
    }
}

async fn tick(engine: &PairEngine) -> crate::error::Result<()> {
    let pairs = repository::swap_pairs_in_state(&engine.pool, &engine.chain_id, &SwapPairState::RegistrationOngoing.to_string()).await?;

    let mut confirmed_ids = Vec::new();
    for pair in &pairs {
        match has_block_confirmed(&engine.fleet, &engine.chain_id, &pair.register_tx_hash, engine.confirm_num).await {
            Ok(true) => confirmed_ids.push(pair.id.clone()),
            Ok(false) => {}
            Err(e) => error!(chain_id = %engine.chain_id, pair_id = %pair.id, error = %e, "failed to check block confirmation"),
        }
    }

    if confirmed_ids.is_empty() {
        return Ok(());
    }

    repository::update_swap_pair_states(&engine.pool, &confirmed_ids, &SwapPairState::RegistrationConfirmed.to_string()).await?;
    metrics::STATE_TRANSITIONS
        .with_label_values(&[&engine.chain_id, "swap_pair", "registration_confirmed"])
        .inc_by(confirmed_ids.len() as u64);

    Ok(())
}
