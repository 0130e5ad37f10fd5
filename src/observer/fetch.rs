/// Fetch loop (spec.md §4.1): advance one block at a time, handling forks.
use super::Observer;
use crate::db::models::BlockLog;
use crate::db::repository;
use crate::metrics;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub async fn run(ob: Arc<Observer>) {
    loop {
        if let Err(e) = tick(&ob).await {
            warn!(chain_id = %ob.chain_id, error = %e, "fetch tick failed");
        }
        tokio::time::sleep(ob.fetch_interval).await;
    }
}

async fn tick(ob: &Observer) -> crate::error::Result<()> {
    let current = repository::latest_block_log(&ob.pool, &ob.chain_id).await?;
    let (cur_height, cur_hash) = match &current {
        Some(b) => (b.height, b.block_hash.clone()),
        None => (0, String::new()),
    };

    let next_height = if cur_height == 0 && ob.start_height != 0 { ob.start_height } else { cur_height + 1 };

    debug!(chain_id = %ob.chain_id, next_height, "fetching block");
    let Some(header) = ob.rpc.header_by_number(next_height).await? else {
        return Ok(());
    };

    if cur_height != 0 && header.parent_hash != cur_hash {
        warn!(chain_id = %ob.chain_id, height = cur_height, "fork detected, deleting tip");
        let mut tx = repository::begin(&ob.pool).await?;
        repository::delete_block_log_from_height(&mut tx, &ob.chain_id, cur_height).await?;
        tx.commit().await.map_err(crate::error::BridgeError::Database)?;
        metrics::FORKS_HANDLED.with_label_values(&[&ob.chain_id]).inc();
        return Ok(());
    }

    let block = BlockLog::new(ob.chain_id.clone(), header.height, header.block_hash, header.parent_hash, header.block_time);

    let mut tx = repository::begin(&ob.pool).await?;
    match repository::insert_block_log(&mut tx, &block).await {
        Ok(()) => {}
        Err(e) => {
            error!(chain_id = %ob.chain_id, error = %e, "failed to insert block log, rolling back");
            tx.rollback().await.map_err(crate::error::BridgeError::Database)?;
            return Err(e);
        }
    }

    if let Err(e) = ob.recorder.record(&mut tx, &block).await {
        error!(chain_id = %ob.chain_id, error = %e, "recorder failed, rolling back block");
        tx.rollback().await.map_err(crate::error::BridgeError::Database)?;
        return Err(e);
    }

    tx.commit().await.map_err(crate::error::BridgeError::Database)?;
    metrics::BLOCKS_INGESTED.with_label_values(&[&ob.chain_id]).inc();
    metrics::CHAIN_TIP_HEIGHT.with_label_values(&[&ob.chain_id]).set(block.height);

    Ok(())
}
