/// Tx-Created -> Tx-Sent loop: poll the destination chain for a receipt,
/// verify the `SwapFilled` event actually landed, then record fee/gas info.
use super::{alert, SwapEngine};
use crate::db::models::SwapState;
use crate::db::repository;
use crate::integrity;
use crate::metrics;
use crate::telemetry::truncate_hex;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(engine: Arc<SwapEngine>) {
    loop {
        if let Err(e) = tick(&engine).await {
            warn!(chain_id = %engine.chain_id, error = %e, "tx-created-swap tick failed");
        }
        tokio::time::sleep(engine.loop_delay).await;
    }
}

async fn tick(engine: &SwapEngine) -> crate::error::Result<()> {
    let swaps = repository::swaps_in_state(&engine.pool, &engine.chain_id, &SwapState::FillTxCreated.to_string()).await?;

    for mut swap in swaps {
        integrity::verify(&engine.hmac_key, &swap)?;

        let fill_tx_hash = match &swap.fill_tx_hash {
            Some(h) => h.clone(),
            None => continue,
        };

        let dst = engine.fleet.get(&swap.dst_chain_id)?;

        let exists = dst.rpc.transaction_exists(&fill_tx_hash).await?;
        let receipt = dst.rpc.transaction_receipt(&fill_tx_hash).await?;

        if !exists || receipt.is_none() {
            swap.fill_track_retry += 1;
            if swap.fill_track_retry > engine.max_track_retry {
                swap.set_state(SwapState::FillTxMissing);
                swap.message_log = Some("tx is missing".to_string());
                metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap", "fill_tx_missing"]).inc();
                alert(engine, &format!("fill tx went missing for swap {} on chain {}", swap.id, engine.chain_id)).await;
            }
            swap.signature = integrity::sign(&engine.hmac_key, &swap);
            repository::save_swap(&engine.pool, &swap).await?;
            continue;
        }

        let receipt = receipt.expect("checked above");

        let Some(block_log) = repository::find_block_log_by_hash(&engine.pool, &swap.dst_chain_id, &receipt.block_hash).await? else {
            if engine.wait_log_progress.should_log() {
                info!(chain_id = %engine.chain_id, swap_id = %swap.id, block_hash = %truncate_hex(&receipt.block_hash, 10), "waiting for observer to catch up with destination block");
            }
            continue;
        };

        let fill_logs = dst.swap_agent.filter_swap_filled(receipt.height, &swap.request_tx_hash).await?;
        let event_found = !fill_logs.is_empty();

        if !event_found {
            swap.set_state(SwapState::FillTxFailed);
            swap.message_log = Some("swap fill event was not found".to_string());
            swap.signature = integrity::sign(&engine.hmac_key, &swap);
            repository::save_swap(&engine.pool, &swap).await?;
            metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap", "fill_tx_failed"]).inc();
            alert(engine, &format!("swap fill event not found for swap {} on chain {}", swap.id, engine.chain_id)).await;
            continue;
        }

        swap.fill_gas_price = Some(receipt.effective_gas_price.clone());
        swap.fill_gas_used = Some(receipt.gas_used as i64);
        swap.fill_consumed_fee_amount = Some(fee_amount(&receipt.effective_gas_price, receipt.gas_used));
        swap.fill_height = receipt.height;
        swap.fill_block_hash = Some(receipt.block_hash.clone());
        swap.fill_block_log_id = Some(block_log.id);
        swap.set_state(SwapState::FillTxSent);
        swap.signature = integrity::sign(&engine.hmac_key, &swap);
        repository::save_swap(&engine.pool, &swap).await?;

        info!(chain_id = %engine.chain_id, swap_id = %swap.id, tx_hash = %truncate_hex(&fill_tx_hash, 10), "fill tx confirmed on-chain");
    }

    Ok(())
}

fn fee_amount(gas_price: &str, gas_used: u64) -> String {
    gas_price.parse::<u128>().map(|p| (p * gas_used as u128).to_string()).unwrap_or_default()
}
