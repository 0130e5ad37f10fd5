/// Tx-Created -> Tx-Sent loop: poll the destination chain for a receipt,
/// resolve the minted destination token address, record fee/gas info.
use super::PairEngine;
use crate::db::models::SwapPairState;
use crate::db::repository;
use crate::metrics;
use crate::telemetry::truncate_hex;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(engine: Arc<PairEngine>) {
    loop {
        if let Err(e) = tick(&engine).await {
            warn!(chain_id = %engine.chain_id, error = %e, "tx-created-pair tick failed");
        }
        tokio::time::sleep(engine.loop_delay).await;
    }
}

async fn tick(engine: &PairEngine) -> crate::error::Result<()> {
    let pairs = repository::swap_pairs_in_state(&engine.pool, &engine.chain_id, &SwapPairState::CreationTxCreated.to_string()).await?;

    for mut pair in pairs {
        let create_tx_hash = match &pair.create_tx_hash {
            Some(h) => h.clone(),
            None => continue,
        };

        let dst = engine.fleet.get(&pair.dst_chain_id)?;

        let exists = dst.rpc.transaction_exists(&create_tx_hash).await?;
        let receipt = dst.rpc.transaction_receipt(&create_tx_hash).await?;

        if !exists || receipt.is_none() {
            pair.create_track_retry += 1;
            if pair.create_track_retry > engine.max_track_retry {
                pair.set_state(SwapPairState::CreationTxMissing);
                pair.message_log = Some("tx is missing".to_string());
                metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap_pair", "creation_tx_missing"]).inc();
            }
            repository::save_swap_pair(&engine.pool, &pair).await?;
            continue;
        }

        let receipt = receipt.expect("checked above");

        let Some(block_log) = repository::find_block_log_by_hash(&engine.pool, &pair.dst_chain_id, &receipt.block_hash).await? else {
            if engine.wait_log_progress.should_log() {
                info!(chain_id = %engine.chain_id, pair_id = %pair.id, block_hash = %truncate_hex(&receipt.block_hash, 10), "waiting for observer to catch up with destination block");
            }
            continue;
        };

        let created_logs = dst.swap_agent.filter_swap_pair_created(receipt.height, &pair.register_tx_hash).await?;
        let dst_token_addr = created_logs.into_iter().find(|l| l.src_token_addr == pair.src_token_addr).map(|l| l.dst_token_addr);

        let Some(dst_token_addr) = dst_token_addr else {
            pair.set_state(SwapPairState::CreationTxFailed);
            pair.message_log = Some("swap pair creation event was not found".to_string());
            repository::save_swap_pair(&engine.pool, &pair).await?;
            metrics::STATE_TRANSITIONS.with_label_values(&[&engine.chain_id, "swap_pair", "creation_tx_failed"]).inc();
            continue;
        };

        pair.dst_token_addr = Some(dst_token_addr);
        pair.create_gas_price = Some(receipt.effective_gas_price.clone());
        pair.create_gas_used = Some(receipt.gas_used as i64);
        pair.create_consumed_fee_amount = Some(fee_amount(&receipt.effective_gas_price, receipt.gas_used));
        pair.create_height = Some(receipt.height);
        pair.create_block_hash = Some(receipt.block_hash.clone());
        pair.create_block_log_id = Some(block_log.id);
        pair.set_state(SwapPairState::CreationTxSent);
        repository::save_swap_pair(&engine.pool, &pair).await?;

        info!(chain_id = %engine.chain_id, pair_id = %pair.id, tx_hash = %truncate_hex(&create_tx_hash, 10), "pair creation confirmed on-chain");
    }

    Ok(())
}

fn fee_amount(gas_price: &str, gas_used: u64) -> String {
    gas_price.parse::<u128>().map(|p| (p * gas_used as u128).to_string()).unwrap_or_default()
}
