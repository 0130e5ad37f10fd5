/// Confirmed -> Tx-Created loop: dry-run then real send of the fill tx.
use super::{alert, SwapEngine};
use crate::db::models::{Swap, SwapState, FILL_HEIGHT_UNSET};
use crate::db::repository;
use crate::integrity;
use crate::metrics;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(engine: Arc<SwapEngine>) {
    loop {
        if let Err(e) = tick(&engine).await {
            warn!(chain_id = %engine.chain_id, error = %e, "confirmed-swap tick failed");
        }
        tokio::time::sleep(engine.loop_delay).await;
    }
}

async fn tick(engine: &SwapEngine) -> crate::error::Result<()> {
    let swaps = repository::swaps_in_state(&engine.pool, &engine.chain_id, &SwapState::RequestConfirmed.to_string()).await?;

    for mut swap in swaps {
        integrity::verify(&engine.hmac_key, &swap)?;

        let dst = engine.fleet.get(&swap.dst_chain_id)?;

        let dry_run = dst
            .swap_agent
            .fill(
                &swap.request_tx_hash,
                &swap.src_token_addr,
                &swap.recipient,
                &swap.src_chain_id,
                &swap.token_id,
                swap.token_uri.as_deref().unwrap_or(""),
                true,
            )
            .await;

        let dry_run = match dry_run {
            Ok(v) => v,
            Err(e) => {
                swap.set_state(SwapState::FillTxDryRunFailed);
                swap.message_log = Some(e.to_string());
                resign_and_save(engine, &mut swap).await?;
                metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap", "fill_tx_dry_run_failed"]).inc();
                alert(engine, &format!("fill dry-run failed for swap {} on chain {}: {e}", swap.id, engine.chain_id)).await;
                continue;
            }
        };

        swap.set_state(SwapState::FillTxCreated);
        swap.fill_tx_hash = Some(dry_run.tx_hash);
        swap.fill_height = FILL_HEIGHT_UNSET;
        resign_and_save(engine, &mut swap).await?;

        info!(chain_id = %engine.chain_id, swap_id = %swap.id, "sent dry-run fill tx");

        let sent = dst
            .swap_agent
            .fill(
                &swap.request_tx_hash,
                &swap.src_token_addr,
                &swap.recipient,
                &swap.src_chain_id,
                &swap.token_id,
                swap.token_uri.as_deref().unwrap_or(""),
                false,
            )
            .await;

        match sent {
            Ok(sent) => {
                swap.fill_tx_hash = Some(sent.tx_hash);
                resign_and_save(engine, &mut swap).await?;
                info!(chain_id = %engine.chain_id, swap_id = %swap.id, explorer = %engine.explorer_url, "sent fill tx");
            }
            Err(e) if e.to_string().contains("replace underpriced") || e.to_string().contains("replacement transaction underpriced") => {
                swap.set_state(SwapState::RequestConfirmed);
                swap.message_log = Some(e.to_string());
                resign_and_save(engine, &mut swap).await?;
            }
            Err(e) => {
                swap.set_state(SwapState::FillTxFailed);
                swap.message_log = Some(e.to_string());
                resign_and_save(engine, &mut swap).await?;
                metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap", "fill_tx_failed"]).inc();
                alert(engine, &format!("fill tx send failed for swap {} on chain {}: {e}", swap.id, engine.chain_id)).await;
            }
        }
    }

    Ok(())
}

async fn resign_and_save(engine: &SwapEngine, swap: &mut Swap) -> crate::error::Result<()> {
    swap.signature = integrity::sign(&engine.hmac_key, swap);
    repository::save_swap(&engine.pool, swap).await
}
