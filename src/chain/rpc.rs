/// Thin RPC client trait plus an `ethers`-backed implementation.
///
/// Grounded in `original_source/client/eth.go`: that client wraps
/// `ethclient.Client` behind a `sync.RWMutex`, taking a write lock only
/// around the two calls that mutate node-side state for this account
/// (`PendingNonceAt`, `EstimateGas`) and a read lock everywhere else. The
/// same split is reproduced here with `tokio::sync::RwLock`.
use crate::error::{BridgeError, Result};
use crate::metrics;
use async_trait::async_trait;
use ethers::prelude::*;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub height: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub block_time: i64,
}

#[derive(Debug, Clone)]
pub struct ReceiptInfo {
    pub height: i64,
    pub block_hash: String,
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: String,
}

#[async_trait]
pub trait EthRpc: Send + Sync {
    async fn header_by_number(&self, height: i64) -> Result<Option<BlockHeader>>;
    async fn transaction_exists(&self, tx_hash: &str) -> Result<bool>;
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptInfo>>;
    async fn pending_nonce_at(&self, address: &str) -> Result<u64>;
    async fn suggest_gas_price(&self) -> Result<String>;
    async fn estimate_gas(&self, to: &str, data: &[u8]) -> Result<u64>;
}

pub struct EthersRpc {
    provider: Arc<Provider<Http>>,
    lock: RwLock<()>,
}

impl EthersRpc {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider, lock: RwLock::new(()) }
    }
}

#[async_trait]
impl EthRpc for EthersRpc {
    async fn header_by_number(&self, height: i64) -> Result<Option<BlockHeader>> {
        let _t = metrics::timer(&metrics::RPC_CALL_DURATION, "header_by_number");
        let _guard = self.lock.read().await;
        let block = self
            .provider
            .get_block(height as u64)
            .await
            .map_err(|e| BridgeError::rpc(e.to_string()))?;

        Ok(block.map(|b| BlockHeader {
            height: b.number.map(|n| n.as_u64() as i64).unwrap_or(height),
            block_hash: b.hash.map(|h| format!("{h:#x}")).unwrap_or_default(),
            parent_hash: format!("{:#x}", b.parent_hash),
            block_time: b.timestamp.as_u64() as i64,
        }))
    }

    async fn transaction_exists(&self, tx_hash: &str) -> Result<bool> {
        let _t = metrics::timer(&metrics::RPC_CALL_DURATION, "transaction_exists");
        let _guard = self.lock.read().await;
        let hash: H256 = tx_hash.parse().map_err(|_| BridgeError::rpc("invalid tx hash"))?;
        let tx = self
            .provider
            .get_transaction(hash)
            .await
            .map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(tx.is_some())
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptInfo>> {
        let _t = metrics::timer(&metrics::RPC_CALL_DURATION, "transaction_receipt");
        let _guard = self.lock.read().await;
        let hash: H256 = tx_hash.parse().map_err(|_| BridgeError::rpc("invalid tx hash"))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| BridgeError::rpc(e.to_string()))?;

        Ok(receipt.map(|r| ReceiptInfo {
            height: r.block_number.map(|n| n.as_u64() as i64).unwrap_or(0),
            block_hash: r.block_hash.map(|h| format!("{h:#x}")).unwrap_or_default(),
            success: r.status.map(|s| s.as_u64() == 1).unwrap_or(false),
            gas_used: r.gas_used.map(|g| g.as_u64()).unwrap_or(0),
            effective_gas_price: r.effective_gas_price.map(|p| p.to_string()).unwrap_or_default(),
        }))
    }

    async fn pending_nonce_at(&self, address: &str) -> Result<u64> {
        let _t = metrics::timer(&metrics::RPC_CALL_DURATION, "pending_nonce_at");
        let _guard = self.lock.write().await;
        let addr: Address = address.parse().map_err(|_| BridgeError::rpc("invalid address"))?;
        let nonce = self
            .provider
            .get_transaction_count(addr, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(nonce.as_u64())
    }

    async fn suggest_gas_price(&self) -> Result<String> {
        let _t = metrics::timer(&metrics::RPC_CALL_DURATION, "suggest_gas_price");
        let _guard = self.lock.read().await;
        let price = self.provider.get_gas_price().await.map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(price.to_string())
    }

    async fn estimate_gas(&self, to: &str, data: &[u8]) -> Result<u64> {
        let _t = metrics::timer(&metrics::RPC_CALL_DURATION, "estimate_gas");
        let _guard = self.lock.write().await;
        let addr: Address = to.parse().map_err(|_| BridgeError::rpc("invalid address"))?;
        let tx = TransactionRequest::new().to(addr).data(data.to_vec());
        let gas = self
            .provider
            .estimate_gas(&tx.into(), None)
            .await
            .map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(gas.as_u64())
    }
}
