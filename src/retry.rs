/// Exponential-backoff RPC retry and the shared `has_block_confirmed`
/// predicate used by both engines.
///
/// The backoff shape (500ms base, doubling, capped at 30s, 5 attempts) is
/// carried over from the `retry_rpc` helper in the stableguard indexer
/// example; `has_block_confirmed` is new, grounded directly in
/// `original_source/swap-engine/erc721/swap.go`'s `hasBlockConfirmed`.
use crate::chain::{ChainFleet, EthRpc};
use crate::error::Result;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub async fn retry_rpc<F, Fut, T, E>(mut f: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut delay = Duration::from_millis(500);
    const MAX_RETRIES: u32 = 5;

    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                warn!(attempt = attempt + 1, max_retries = MAX_RETRIES, error = %e, delay_ms = delay.as_millis() as u64, "rpc call failed, retrying");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }
        }
    }

    f().await
}

/// Returns `true` iff the given chain's `LatestBlockCached` is populated and
/// its height has advanced at least `confirm_num` blocks past the tx's
/// inclusion height. A missing cache or missing receipt is benign (`Ok(false)`);
/// RPC failure propagates so the caller can skip this row for the tick.
pub async fn has_block_confirmed(fleet: &ChainFleet, chain_id: &str, tx_hash: &str, confirm_num: i64) -> Result<bool> {
    let entry = fleet.get(chain_id)?;

    let Some(latest_height) = entry.latest_block.get() else {
        return Ok(false);
    };

    let Some(receipt) = entry.rpc.transaction_receipt(tx_hash).await? else {
        return Ok(false);
    };

    Ok(latest_height >= receipt.height + confirm_num)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::contract::{Erc721Reader, SentTx, SwapAgent, SwapFilledLog, SwapPairCreatedLog, SwapPairRegisterLog, SwapStartedLog};
    use crate::chain::fleet::{ChainEntry, LatestBlockCache};
    use crate::chain::rpc::{BlockHeader, ReceiptInfo};
    use crate::error::BridgeError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retry_rpc_succeeds_on_later_attempt() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, String> = retry_rpc(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("not yet".to_string())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    struct FakeRpc {
        receipt: Option<ReceiptInfo>,
        fail: bool,
    }

    #[async_trait]
    impl EthRpc for FakeRpc {
        async fn header_by_number(&self, _height: i64) -> Result<Option<BlockHeader>> {
            Ok(None)
        }
        async fn transaction_exists(&self, _tx_hash: &str) -> Result<bool> {
            Ok(self.receipt.is_some())
        }
        async fn transaction_receipt(&self, _tx_hash: &str) -> Result<Option<ReceiptInfo>> {
            if self.fail {
                return Err(BridgeError::rpc("boom"));
            }
            Ok(self.receipt.clone())
        }
        async fn pending_nonce_at(&self, _address: &str) -> Result<u64> {
            Ok(0)
        }
        async fn suggest_gas_price(&self) -> Result<String> {
            Ok("0".to_string())
        }
        async fn estimate_gas(&self, _to: &str, _data: &[u8]) -> Result<u64> {
            Ok(0)
        }
    }

    struct FakeSwapAgent;

    #[async_trait]
    impl SwapAgent for FakeSwapAgent {
        async fn filter_swap_pair_register(&self, _from_height: i64, _to_height: i64) -> Result<Vec<SwapPairRegisterLog>> {
            Ok(vec![])
        }
        async fn filter_swap_started(&self, _from_height: i64, _to_height: i64) -> Result<Vec<SwapStartedLog>> {
            Ok(vec![])
        }
        async fn filter_swap_pair_created(&self, _height: i64, _register_tx_hash: &str) -> Result<Vec<SwapPairCreatedLog>> {
            Ok(vec![])
        }
        async fn filter_swap_filled(&self, _height: i64, _request_tx_hash: &str) -> Result<Vec<SwapFilledLog>> {
            Ok(vec![])
        }
        async fn create_swap_pair(
            &self,
            _register_tx_hash: &str,
            _src_token_addr: &str,
            _src_chain_id: &str,
            _src_token_name: &str,
            _symbol: &str,
            _dry_run: bool,
        ) -> Result<SentTx> {
            Ok(SentTx { tx_hash: String::new() })
        }
        async fn fill(
            &self,
            _request_tx_hash: &str,
            _src_token_addr: &str,
            _recipient: &str,
            _src_chain_id: &str,
            _token_id: &str,
            _token_uri: &str,
            _dry_run: bool,
        ) -> Result<SentTx> {
            Ok(SentTx { tx_hash: String::new() })
        }
    }

    struct FakeErc721Reader;

    #[async_trait]
    impl Erc721Reader for FakeErc721Reader {
        async fn token_uri(&self, _token_addr: &str, _token_id: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    fn fleet_with(chain_id: &str, rpc: FakeRpc, latest_height: Option<i64>) -> ChainFleet {
        let mut fleet = ChainFleet::new();
        let cache = LatestBlockCache::default();
        if let Some(h) = latest_height {
            cache.set(h);
        }
        fleet.insert(
            chain_id,
            ChainEntry {
                rpc: Arc::new(rpc),
                swap_agent: Arc::new(FakeSwapAgent),
                erc721_reader: Arc::new(FakeErc721Reader),
                latest_block: Arc::new(cache),
            },
        );
        fleet
    }

    #[tokio::test]
    async fn unconfirmed_when_cache_unset() {
        let fleet = fleet_with("bsc", FakeRpc { receipt: None, fail: false }, None);
        let confirmed = has_block_confirmed(&fleet, "bsc", "0xabc", 5).await.unwrap();
        assert!(!confirmed);
    }

    #[tokio::test]
    async fn unconfirmed_when_receipt_missing() {
        let fleet = fleet_with("bsc", FakeRpc { receipt: None, fail: false }, Some(100));
        let confirmed = has_block_confirmed(&fleet, "bsc", "0xabc", 5).await.unwrap();
        assert!(!confirmed);
    }

    #[tokio::test]
    async fn confirmed_once_enough_blocks_elapsed() {
        let receipt = ReceiptInfo { height: 90, block_hash: "0xblk".into(), success: true, gas_used: 21000, effective_gas_price: "1".into() };
        let fleet = fleet_with("bsc", FakeRpc { receipt: Some(receipt), fail: false }, Some(95));
        assert!(!has_block_confirmed(&fleet, "bsc", "0xabc", 10).await.unwrap());

        let receipt = ReceiptInfo { height: 90, block_hash: "0xblk".into(), success: true, gas_used: 21000, effective_gas_price: "1".into() };
        let fleet = fleet_with("bsc", FakeRpc { receipt: Some(receipt), fail: false }, Some(100));
        assert!(has_block_confirmed(&fleet, "bsc", "0xabc", 10).await.unwrap());
    }

    #[tokio::test]
    async fn rpc_failure_propagates() {
        let fleet = fleet_with("bsc", FakeRpc { receipt: None, fail: true }, Some(100));
        assert!(has_block_confirmed(&fleet, "bsc", "0xabc", 5).await.is_err());
    }

    #[tokio::test]
    async fn unknown_chain_errors() {
        let fleet = fleet_with("bsc", FakeRpc { receipt: None, fail: false }, Some(100));
        let err = has_block_confirmed(&fleet, "eth", "0xabc", 5).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownChain(_)));
    }
}
