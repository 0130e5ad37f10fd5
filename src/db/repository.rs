/// Parameterized queries used by the Observer, Recorder, and the two
/// polling engines. Grounded in `original_source/recorder/erc721/record.go`
/// (idempotent insert keyed by tx hash) and `swap-engine/erc721/manage_*.go`
/// (state-scoped polling queries, batched confirm updates).
use super::models::{BlockLog, Swap, SwapPair};
use crate::config::Dialect;
use crate::error::{BridgeError, Result};
use crate::metrics;
use chrono::Utc;
use sqlx::any::AnyKind;
use sqlx::{Any, AnyPool, Transaction};

const POLL_BATCH_LIMIT: i64 = 50;

fn dialect_of(pool: &AnyPool) -> Dialect {
    match pool.any_kind() {
        AnyKind::Sqlite => Dialect::Sqlite3,
        AnyKind::MySql => Dialect::Mysql,
        other => panic!("unsupported backing dialect: {other:?}"),
    }
}

pub async fn insert_block_log<'a>(tx: &mut Transaction<'a, Any>, row: &BlockLog) -> Result<()> {
    sqlx::query(
        "INSERT INTO block_log (id, chain_id, height, block_hash, parent_hash, block_time, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(&row.chain_id)
    .bind(row.height)
    .bind(&row.block_hash)
    .bind(&row.parent_hash)
    .bind(row.block_time)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(BridgeError::Database)?;
    Ok(())
}

pub async fn latest_block_log(pool: &AnyPool, chain_id: &str) -> Result<Option<BlockLog>> {
    let _t = metrics::timer(&metrics::DB_CALL_DURATION, "latest_block_log");
    sqlx::query_as::<_, BlockLog>(
        "SELECT * FROM block_log WHERE chain_id = ? ORDER BY height DESC LIMIT 1",
    )
    .bind(chain_id)
    .fetch_optional(pool)
    .await
    .map_err(BridgeError::Database)
}

pub async fn find_block_log_by_hash(pool: &AnyPool, chain_id: &str, block_hash: &str) -> Result<Option<BlockLog>> {
    sqlx::query_as::<_, BlockLog>("SELECT * FROM block_log WHERE chain_id = ? AND block_hash = ?")
        .bind(chain_id)
        .bind(block_hash)
        .fetch_optional(pool)
        .await
        .map_err(BridgeError::Database)
}

/// Fork handling: delete the tip (and anything above it, defensively) when
/// the freshly fetched block's parent hash doesn't match our stored tip.
pub async fn delete_block_log_from_height(tx: &mut Transaction<'_, Any>, chain_id: &str, from_height: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM block_log WHERE chain_id = ? AND height >= ?")
        .bind(chain_id)
        .bind(from_height)
        .execute(&mut **tx)
        .await
        .map_err(BridgeError::Database)?;
    Ok(result.rows_affected())
}

/// Prune rows older than `older_than_height`, keeping recent history for
/// fork detection but bounding table growth (spec.md §4.1 prune loop).
pub async fn prune_block_log(pool: &AnyPool, chain_id: &str, older_than_height: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM block_log WHERE chain_id = ? AND height < ?")
        .bind(chain_id)
        .bind(older_than_height)
        .execute(pool)
        .await
        .map_err(BridgeError::Database)?;
    Ok(result.rows_affected())
}

pub async fn insert_swap_pair_if_absent<'a>(tx: &mut Transaction<'a, Any>, dialect: Dialect, row: &SwapPair) -> Result<bool> {
    let keyword = super::insert_ignore_keyword(dialect);
    let sql = format!(
        "{keyword} erc721_swap_pairs
         (id, src_chain_id, dst_chain_id, src_token_addr, src_token_name, symbol, sponsor, dst_token_addr,
          available, register_tx_hash, register_height, register_block_hash, register_block_log_id,
          create_track_retry, state, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );

    let result = sqlx::query(&sql)
        .bind(&row.id)
        .bind(&row.src_chain_id)
        .bind(&row.dst_chain_id)
        .bind(&row.src_token_addr)
        .bind(&row.src_token_name)
        .bind(&row.symbol)
        .bind(&row.sponsor)
        .bind(&row.dst_token_addr)
        .bind(row.available)
        .bind(&row.register_tx_hash)
        .bind(row.register_height)
        .bind(&row.register_block_hash)
        .bind(&row.register_block_log_id)
        .bind(row.create_track_retry)
        .bind(&row.state)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(BridgeError::Database)?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_swap_if_absent<'a>(tx: &mut Transaction<'a, Any>, dialect: Dialect, row: &Swap) -> Result<bool> {
    let keyword = super::insert_ignore_keyword(dialect);
    let sql = format!(
        "{keyword} erc721_swaps
         (id, src_chain_id, dst_chain_id, src_token_addr, dst_token_addr, src_token_name, dst_token_name,
          sender, recipient, token_id, token_uri, state, signature,
          request_tx_hash, request_height, request_block_hash, request_block_log_id, request_track_retry,
          fill_height, fill_track_retry, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );

    let result = sqlx::query(&sql)
        .bind(&row.id)
        .bind(&row.src_chain_id)
        .bind(&row.dst_chain_id)
        .bind(&row.src_token_addr)
        .bind(&row.dst_token_addr)
        .bind(&row.src_token_name)
        .bind(&row.dst_token_name)
        .bind(&row.sender)
        .bind(&row.recipient)
        .bind(&row.token_id)
        .bind(&row.token_uri)
        .bind(&row.state)
        .bind(&row.signature)
        .bind(&row.request_tx_hash)
        .bind(row.request_height)
        .bind(&row.request_block_hash)
        .bind(&row.request_block_log_id)
        .bind(row.request_track_retry)
        .bind(row.fill_height)
        .bind(row.fill_track_retry)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(BridgeError::Database)?;

    Ok(result.rows_affected() > 0)
}

pub async fn swap_pairs_in_state(pool: &AnyPool, chain_id: &str, state: &str) -> Result<Vec<SwapPair>> {
    let _t = metrics::timer(&metrics::DB_CALL_DURATION, "swap_pairs_in_state");
    sqlx::query_as::<_, SwapPair>(
        "SELECT * FROM erc721_swap_pairs WHERE src_chain_id = ? AND state = ?
         ORDER BY register_height ASC LIMIT ?",
    )
    .bind(chain_id)
    .bind(state)
    .bind(POLL_BATCH_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(BridgeError::Database)
}

pub async fn swaps_in_state(pool: &AnyPool, chain_id: &str, state: &str) -> Result<Vec<Swap>> {
    let _t = metrics::timer(&metrics::DB_CALL_DURATION, "swaps_in_state");
    sqlx::query_as::<_, Swap>(
        "SELECT * FROM erc721_swaps WHERE src_chain_id = ? AND state = ?
         ORDER BY request_height ASC LIMIT ?",
    )
    .bind(chain_id)
    .bind(state)
    .bind(POLL_BATCH_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(BridgeError::Database)
}

pub async fn find_available_swap_pair(pool: &AnyPool, src_chain_id: &str, dst_chain_id: &str, src_token_addr: &str) -> Result<Option<SwapPair>> {
    sqlx::query_as::<_, SwapPair>(
        "SELECT * FROM erc721_swap_pairs
         WHERE src_chain_id = ? AND dst_chain_id = ? AND src_token_addr = ? AND available = ?",
    )
    .bind(src_chain_id)
    .bind(dst_chain_id)
    .bind(src_token_addr)
    .bind(true)
    .fetch_optional(pool)
    .await
    .map_err(BridgeError::Database)
}

pub async fn save_swap_pair(pool: &AnyPool, row: &SwapPair) -> Result<()> {
    let _t = metrics::timer(&metrics::DB_CALL_DURATION, "save_swap_pair");
    sqlx::query(
        "UPDATE erc721_swap_pairs SET
            dst_token_addr = ?, available = ?,
            create_tx_hash = ?, create_height = ?, create_block_hash = ?, create_block_log_id = ?,
            create_gas_price = ?, create_gas_used = ?, create_consumed_fee_amount = ?, create_track_retry = ?,
            state = ?, message_log = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&row.dst_token_addr)
    .bind(row.available)
    .bind(&row.create_tx_hash)
    .bind(row.create_height)
    .bind(&row.create_block_hash)
    .bind(&row.create_block_log_id)
    .bind(&row.create_gas_price)
    .bind(row.create_gas_used)
    .bind(&row.create_consumed_fee_amount)
    .bind(row.create_track_retry)
    .bind(&row.state)
    .bind(&row.message_log)
    .bind(Utc::now())
    .bind(&row.id)
    .execute(pool)
    .await
    .map_err(BridgeError::Database)?;
    Ok(())
}

pub async fn save_swap(pool: &AnyPool, row: &Swap) -> Result<()> {
    let _t = metrics::timer(&metrics::DB_CALL_DURATION, "save_swap");
    sqlx::query(
        "UPDATE erc721_swaps SET
            dst_token_addr = ?, src_token_name = ?, dst_token_name = ?, token_uri = ?,
            state = ?, signature = ?, request_track_retry = ?,
            fill_tx_hash = ?, fill_height = ?, fill_block_hash = ?, fill_block_log_id = ?,
            fill_gas_price = ?, fill_gas_used = ?, fill_consumed_fee_amount = ?, fill_track_retry = ?,
            message_log = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&row.dst_token_addr)
    .bind(&row.src_token_name)
    .bind(&row.dst_token_name)
    .bind(&row.token_uri)
    .bind(&row.state)
    .bind(&row.signature)
    .bind(row.request_track_retry)
    .bind(&row.fill_tx_hash)
    .bind(row.fill_height)
    .bind(&row.fill_block_hash)
    .bind(&row.fill_block_log_id)
    .bind(&row.fill_gas_price)
    .bind(row.fill_gas_used)
    .bind(&row.fill_consumed_fee_amount)
    .bind(row.fill_track_retry)
    .bind(&row.message_log)
    .bind(Utc::now())
    .bind(&row.id)
    .execute(pool)
    .await
    .map_err(BridgeError::Database)?;
    Ok(())
}

/// Batch-confirm: used by the `tx_sent -> confirmed` loops once
/// `has_block_confirmed` says the fill/create height has enough
/// confirmations. Takes `(id, signature)` pairs rather than bare ids since
/// the integrity envelope must be recomputed on every write that changes
/// `state` (spec.md §4.5).
pub async fn mark_swaps_confirmed(pool: &AnyPool, rows: &[(String, String)], confirmed_state: &str) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(BridgeError::Database)?;
    for (id, signature) in rows {
        sqlx::query("UPDATE erc721_swaps SET state = ?, signature = ?, updated_at = ? WHERE id = ?")
            .bind(confirmed_state)
            .bind(signature)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(BridgeError::Database)?;
    }
    tx.commit().await.map_err(BridgeError::Database)?;
    Ok(())
}

pub async fn update_swap_pair_states(pool: &AnyPool, ids: &[String], state: &str) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(BridgeError::Database)?;
    for id in ids {
        sqlx::query("UPDATE erc721_swap_pairs SET state = ?, updated_at = ? WHERE id = ?")
            .bind(state)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(BridgeError::Database)?;
    }
    tx.commit().await.map_err(BridgeError::Database)?;
    Ok(())
}

pub async fn mark_swap_pairs_confirmed(pool: &AnyPool, ids: &[String], confirmed_state: &str) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(BridgeError::Database)?;
    for id in ids {
        sqlx::query("UPDATE erc721_swap_pairs SET state = ?, available = ?, updated_at = ? WHERE id = ?")
            .bind(confirmed_state)
            .bind(true)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(BridgeError::Database)?;
    }
    tx.commit().await.map_err(BridgeError::Database)?;
    Ok(())
}

pub async fn begin(pool: &AnyPool) -> Result<Transaction<'_, Any>> {
    pool.begin().await.map_err(BridgeError::Database)
}

pub fn dialect(pool: &AnyPool) -> Dialect {
    dialect_of(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{SwapPairState, SwapState, FILL_HEIGHT_UNSET};
    use chrono::Utc;
    use sqlx::any::AnyPoolOptions;

    async fn memory_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_block(chain_id: &str, height: i64, hash: &str, parent: &str) -> BlockLog {
        BlockLog::new(chain_id, height, hash, parent, 1_700_000_000)
    }

    #[tokio::test]
    async fn insert_and_fetch_latest_block_log() {
        let pool = memory_pool().await;
        assert!(latest_block_log(&pool, "56").await.unwrap().is_none());

        let mut tx = begin(&pool).await.unwrap();
        insert_block_log(&mut tx, &sample_block("56", 100, "0xa", "0xgenesis")).await.unwrap();
        tx.commit().await.unwrap();

        let tip = latest_block_log(&pool, "56").await.unwrap().unwrap();
        assert_eq!(tip.height, 100);
        assert_eq!(tip.block_hash, "0xa");
    }

    #[tokio::test]
    async fn fork_delete_removes_tip_and_above() {
        let pool = memory_pool().await;
        let mut tx = begin(&pool).await.unwrap();
        insert_block_log(&mut tx, &sample_block("56", 100, "0xa", "0xgenesis")).await.unwrap();
        insert_block_log(&mut tx, &sample_block("56", 101, "0xb", "0xa")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = begin(&pool).await.unwrap();
        let deleted = delete_block_log_from_height(&mut tx, "56", 100).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(deleted, 2);
        assert!(latest_block_log(&pool, "56").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_only_removes_rows_older_than_cutoff() {
        let pool = memory_pool().await;
        let mut tx = begin(&pool).await.unwrap();
        insert_block_log(&mut tx, &sample_block("56", 100, "0xa", "0xgenesis")).await.unwrap();
        insert_block_log(&mut tx, &sample_block("56", 200, "0xb", "0xa")).await.unwrap();
        tx.commit().await.unwrap();

        let pruned = prune_block_log(&pool, "56", 150).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(find_block_log_by_hash(&pool, "56", "0xa").await.unwrap().is_none());
        assert!(find_block_log_by_hash(&pool, "56", "0xb").await.unwrap().is_some());
    }

    fn sample_swap(id: &str, request_tx_hash: &str) -> Swap {
        let now = Utc::now();
        Swap {
            id: id.to_string(),
            src_chain_id: "56".into(),
            dst_chain_id: "1".into(),
            src_token_addr: "0xsrc".into(),
            dst_token_addr: None,
            src_token_name: None,
            dst_token_name: None,
            sender: "0xsender".into(),
            recipient: "0xrecipient".into(),
            token_id: "7".into(),
            token_uri: None,
            state: SwapState::RequestOngoing.to_string(),
            signature: "deadbeef".into(),
            request_tx_hash: request_tx_hash.to_string(),
            request_height: 100,
            request_block_hash: "0xa".into(),
            request_block_log_id: None,
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
        }
    }

    #[tokio::test]
    async fn insert_swap_if_absent_is_idempotent_on_request_tx_hash() {
        let pool = memory_pool().await;
        let dialect = dialect_of(&pool);
        let row = sample_swap("swap1", "0xrequest");

        let mut tx = begin(&pool).await.unwrap();
        let first = insert_swap_if_absent(&mut tx, dialect, &row).await.unwrap();
        tx.commit().await.unwrap();
        assert!(first);

        let mut dup = sample_swap("swap2", "0xrequest");
        dup.sender = "0xother".into();
        let mut tx = begin(&pool).await.unwrap();
        let second = insert_swap_if_absent(&mut tx, dialect, &dup).await.unwrap();
        tx.commit().await.unwrap();
        assert!(!second);

        let rows = swaps_in_state(&pool, "56", &SwapState::RequestOngoing.to_string()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sender, "0xsender");
    }

    #[tokio::test]
    async fn mark_swaps_confirmed_updates_state_and_signature() {
        let pool = memory_pool().await;
        let dialect = dialect_of(&pool);
        let row = sample_swap("swap1", "0xrequest");

        let mut tx = begin(&pool).await.unwrap();
        insert_swap_if_absent(&mut tx, dialect, &row).await.unwrap();
        tx.commit().await.unwrap();

        mark_swaps_confirmed(&pool, &[("swap1".to_string(), "newsig".to_string())], &SwapState::FillTxConfirmed.to_string()).await.unwrap();

        let rows = swaps_in_state(&pool, "56", &SwapState::FillTxConfirmed.to_string()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].signature, "newsig");
    }

    fn sample_pair(id: &str, register_tx_hash: &str) -> SwapPair {
        let now = Utc::now();
        SwapPair {
            id: id.to_string(),
            src_chain_id: "56".into(),
            dst_chain_id: "1".into(),
            src_token_addr: "0xsrc".into(),
            src_token_name: "Cats".into(),
            symbol: "CAT".into(),
            sponsor: "0xsponsor".into(),
            dst_token_addr: None,
            available: false,
            register_tx_hash: register_tx_hash.to_string(),
            register_height: 100,
            register_block_hash: "0xa".into(),
            register_block_log_id: None,
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
        }
    }

    #[tokio::test]
    async fn insert_swap_pair_if_absent_is_idempotent_on_register_tx_hash() {
        let pool = memory_pool().await;
        let dialect = dialect_of(&pool);
        let row = sample_pair("pair1", "0xregister");

        let mut tx = begin(&pool).await.unwrap();
        let first = insert_swap_pair_if_absent(&mut tx, dialect, &row).await.unwrap();
        tx.commit().await.unwrap();
        assert!(first);

        let mut tx = begin(&pool).await.unwrap();
        let second = insert_swap_pair_if_absent(&mut tx, dialect, &row).await.unwrap();
        tx.commit().await.unwrap();
        assert!(!second);
    }

    #[tokio::test]
    async fn find_available_swap_pair_only_returns_available_rows() {
        let pool = memory_pool().await;
        let dialect = dialect_of(&pool);
        let mut row = sample_pair("pair1", "0xregister");
        row.available = true;
        row.dst_token_addr = Some("0xdst".into());
        row.set_state(SwapPairState::CreationTxConfirmed);

        let mut tx = begin(&pool).await.unwrap();
        insert_swap_pair_if_absent(&mut tx, dialect, &row).await.unwrap();
        tx.commit().await.unwrap();
        save_swap_pair(&pool, &row).await.unwrap();

        let found = find_available_swap_pair(&pool, "56", "1", "0xsrc").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().dst_token_addr.as_deref(), Some("0xdst"));
    }

    #[tokio::test]
    async fn mark_swap_pairs_confirmed_sets_available() {
        let pool = memory_pool().await;
        let dialect = dialect_of(&pool);
        let row = sample_pair("pair1", "0xregister");

        let mut tx = begin(&pool).await.unwrap();
        insert_swap_pair_if_absent(&mut tx, dialect, &row).await.unwrap();
        tx.commit().await.unwrap();

        mark_swap_pairs_confirmed(&pool, &["pair1".to_string()], &SwapPairState::CreationTxConfirmed.to_string()).await.unwrap();

        let pairs = swap_pairs_in_state(&pool, "56", &SwapPairState::CreationTxConfirmed.to_string()).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].available);
    }
}
