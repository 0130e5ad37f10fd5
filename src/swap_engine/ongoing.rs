/// Ongoing -> Confirmed (or Rejected) loop.
use super::{alert, SwapEngine};
use crate::db::models::{Swap, SwapState};
use crate::db::repository;
use crate::integrity;
use crate::metrics;
use crate::retry::has_block_confirmed;
use std::sync::Arc;
use tracing::{error, warn};

pub async fn run(engine: Arc<SwapEngine>) {
    loop {
        if let Err(e) = tick(&engine).await {
            warn!(chain_id = %engine.chain_id, error = %e, "ongoing-swap tick failed");
        }
        tokio::time::sleep(engine.loop_delay).await;
    }
}

async fn tick(engine: &SwapEngine) -> crate::error::Result<()> {
    let swaps = repository::swaps_in_state(&engine.pool, &engine.chain_id, &SwapState::RequestOngoing.to_string()).await?;

    let mut ready = Vec::new();
    for mut swap in swaps {
        integrity::verify(&engine.hmac_key, &swap)?;

        if swap.is_required_info_valid() {
            ready.push(swap);
            continue;
        }

        fill_required_info(engine, &mut swap).await?;
        swap.request_track_retry += 1;

        if !swap.is_required_info_valid() {
            if swap.request_track_retry > engine.max_track_retry {
                swap.set_state(SwapState::RequestRejected);
                resign_and_save(engine, &mut swap).await?;
                metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap", "request_rejected"]).inc();
                alert(engine, &format!("swap {} rejected on chain {}: required info never became valid", swap.id, engine.chain_id)).await;
            } else {
                resign_and_save(engine, &mut swap).await?;
            }
            continue;
        }

        resign_and_save(engine, &mut swap).await?;
        ready.push(swap);
    }

    let mut confirmed_rows = Vec::new();
    for swap in &ready {
        match has_block_confirmed(&engine.fleet, &engine.chain_id, &swap.request_tx_hash, engine.confirm_num).await {
            Ok(true) => {
                let mut confirmed = swap.clone();
                confirmed.set_state(SwapState::RequestConfirmed);
                let signature = integrity::sign(&engine.hmac_key, &confirmed);
                confirmed_rows.push((confirmed.id.clone(), signature));
            }
            Ok(false) => {}
            Err(e) => error!(chain_id = %engine.chain_id, swap_id = %swap.id, error = %e, "failed to check block confirmation"),
        }
    }

    repository::mark_swaps_confirmed(&engine.pool, &confirmed_rows, &SwapState::RequestConfirmed.to_string()).await?;
    if !confirmed_rows.is_empty() {
        metrics::STATE_TRANSITIONS
            .with_label_values(&[&engine.chain_id, "swap", "request_confirmed"])
            .inc_by(confirmed_rows.len() as u64);
    }

    Ok(())
}

async fn fill_required_info(engine: &SwapEngine, swap: &mut Swap) -> crate::error::Result<()> {
    let Some(pair) = repository::find_available_swap_pair(&engine.pool, &swap.src_chain_id, &swap.dst_chain_id, &swap.src_token_addr).await? else {
        return Ok(());
    };

    let token_uri = engine
        .fleet
        .get(&swap.src_chain_id)?
        .erc721_reader
        .token_uri(&swap.src_token_addr, &swap.token_id)
        .await
        .unwrap_or_default();

    swap.dst_token_addr = pair.dst_token_addr.clone();
    swap.src_token_name = Some(pair.src_token_name.clone());
    swap.dst_token_name = pair.dst_token_addr.as_ref().map(|_| pair.symbol.clone());
    swap.token_uri = Some(token_uri);

    Ok(())
}

async fn resign_and_save(engine: &SwapEngine, swap: &mut Swap) -> crate::error::Result<()> {
    swap.signature = integrity::sign(&engine.hmac_key, swap);
    repository::save_swap(&engine.pool, swap).await
}
