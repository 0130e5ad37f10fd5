/// Pure event-extraction: given an already-open transaction and a
/// just-inserted `BlockLog`, scan that exact height for `SwapPairRegister`
/// and `SwapStarted` events and insert one domain row per distinct event.
///
/// Grounded in `original_source/recorder/erc721/record.go` (the per-family
/// dispatch) and `recorder/erc721/swap.go` (sentinel defaults, idempotent
/// batch insert). The split into `SwapPairRegisterEvent`/`SwapPairCreateTx`
/// that the original later grew is not carried over: spec.md models a
/// single `SwapPair` row instead, so the register event seeds the row
/// directly and the Pair-Engine fills in the create-side fields in place.
use crate::chain::fleet::LatestBlockCache;
use crate::chain::SwapAgent;
use crate::config::Dialect;
use crate::db::models::{BlockLog, SwapPair, SwapPairState, SwapState, FILL_HEIGHT_UNSET};
use crate::db::repository;
use crate::error::Result;
use crate::integrity;
use crate::metrics;
use sqlx::{Any, Transaction};
use std::sync::Arc;
use ulid::Ulid;

pub struct Recorder {
    chain_id: String,
    swap_agent: Arc<dyn SwapAgent>,
    latest_block: Arc<LatestBlockCache>,
    hmac_key: String,
    dialect: Dialect,
}

impl Recorder {
    pub fn new(chain_id: impl Into<String>, swap_agent: Arc<dyn SwapAgent>, latest_block: Arc<LatestBlockCache>, hmac_key: String, dialect: Dialect) -> Self {
        Self { chain_id: chain_id.into(), swap_agent, latest_block, hmac_key, dialect }
    }

    pub async fn record(&self, tx: &mut Transaction<'_, Any>, block: &BlockLog) -> Result<()> {
        self.record_swap_pair_register(tx, block).await?;
        self.record_swap_started(tx, block).await?;
        self.latest_block.set(block.height);
        Ok(())
    }

    async fn record_swap_pair_register(&self, tx: &mut Transaction<'_, Any>, block: &BlockLog) -> Result<()> {
        let logs = self.swap_agent.filter_swap_pair_register(block.height, block.height).await?;
        for log in logs {
            let now = chrono::Utc::now();
            let row = SwapPair {
                id: Ulid::new().to_string(),
                src_chain_id: self.chain_id.clone(),
                dst_chain_id: log.dst_chain_id,
                src_token_addr: log.src_token_addr,
                src_token_name: log.src_token_name,
                symbol: log.symbol,
                sponsor: log.sponsor,
                dst_token_addr: None,
                available: false,
                register_tx_hash: log.tx_hash,
                register_height: log.height,
                register_block_hash: log.block_hash,
                register_block_log_id: Some(block.id.clone()),
                create_tx_hash: None,
                create_height: None,
                create_block_hash: None,
                create_block_log_id: None,
                create_gas_price: None,
                create_gas_used: None,
                create_consumed_fee_amount: None,
                create_track_retry: 0,
                state: SwapPairState::RegistrationOngoing.to_string(),
                message_log: None,
                created_at: now,
                updated_at: now,
            };

            let inserted = repository::insert_swap_pair_if_absent(tx, self.dialect, &row).await?;
            if inserted {
                metrics::EVENTS_RECORDED.with_label_values(&[&self.chain_id, "swap_pair_register"]).inc();
            }
        }
        Ok(())
    }

    async fn record_swap_started(&self, tx: &mut Transaction<'_, Any>, block: &BlockLog) -> Result<()> {
        let logs = self.swap_agent.filter_swap_started(block.height, block.height).await?;
        for log in logs {
            let now = chrono::Utc::now();
            let mut row = crate::db::models::Swap {
                id: Ulid::new().to_string(),
                src_chain_id: self.chain_id.clone(),
                dst_chain_id: log.dst_chain_id,
                src_token_addr: log.src_token_addr,
                dst_token_addr: None,
                src_token_name: None,
                dst_token_name: None,
                sender: log.sender,
                recipient: log.recipient,
                token_id: log.token_id,
                token_uri: None,
                state: SwapState::RequestOngoing.to_string(),
                signature: String::new(),
                request_tx_hash: log.tx_hash,
                request_height: log.height,
                request_block_hash: log.block_hash,
                request_block_log_id: Some(block.id.clone()),
                request_track_retry: 0,
                fill_tx_hash: None,
                fill_height: FILL_HEIGHT_UNSET,
                fill_block_hash: None,
                fill_block_log_id: None,
                fill_gas_price: None,
                fill_gas_used: None,
                fill_consumed_fee_amount: None,
                fill_track_retry: 0,
                message_log: None,
                created_at: now,
                updated_at: now,
            };
            row.signature = integrity::sign(&self.hmac_key, &row);

            let inserted = repository::insert_swap_if_absent(tx, self.dialect, &row).await?;
            if inserted {
                metrics::EVENTS_RECORDED.with_label_values(&[&self.chain_id, "swap_started"]).inc();
            }
        }
        Ok(())
    }
}
