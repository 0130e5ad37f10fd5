/// Swap agent contract surface (filter queries + state-mutating calls) and
/// the ERC-721 `tokenURI` reader.
///
/// Grounded in `original_source/swap-pair-engine/erc721/tx.go` and
/// `swap-engine/erc721/swap.go`: both engines dry-run a call first
/// (`NoSend = true`) to learn the would-be tx hash, then resend for real.
use super::rpc::EthRpc;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SwapPairRegisterLog {
    pub tx_hash: String,
    pub height: i64,
    pub block_hash: String,
    pub src_token_addr: String,
    pub src_token_name: String,
    pub symbol: String,
    pub sponsor: String,
    pub dst_chain_id: String,
}

#[derive(Debug, Clone)]
pub struct SwapStartedLog {
    pub tx_hash: String,
    pub height: i64,
    pub block_hash: String,
    pub src_token_addr: String,
    pub sender: String,
    pub recipient: String,
    pub token_id: String,
    pub dst_chain_id: String,
}

#[derive(Debug, Clone)]
pub struct SwapPairCreatedLog {
    pub src_token_addr: String,
    pub dst_token_addr: String,
}

#[derive(Debug, Clone)]
pub struct SwapFilledLog {
    pub request_tx_hash: String,
}

/// Outcome of a dry-run or real send: the tx hash it would have (or does)
/// carry, used to detect the "replace underpriced" case on resend.
#[derive(Debug, Clone)]
pub struct SentTx {
    pub tx_hash: String,
}

#[async_trait]
pub trait SwapAgent: Send + Sync {
    async fn filter_swap_pair_register(&self, from_height: i64, to_height: i64) -> Result<Vec<SwapPairRegisterLog>>;
    async fn filter_swap_started(&self, from_height: i64, to_height: i64) -> Result<Vec<SwapStartedLog>>;
    async fn filter_swap_pair_created(&self, height: i64, register_tx_hash: &str) -> Result<Vec<SwapPairCreatedLog>>;
    async fn filter_swap_filled(&self, height: i64, request_tx_hash: &str) -> Result<Vec<SwapFilledLog>>;

    async fn create_swap_pair(
        &self,
        register_tx_hash: &str,
        src_token_addr: &str,
        src_chain_id: &str,
        src_token_name: &str,
        symbol: &str,
        dry_run: bool,
    ) -> Result<SentTx>;

    async fn fill(
        &self,
        request_tx_hash: &str,
        src_token_addr: &str,
        recipient: &str,
        src_chain_id: &str,
        token_id: &str,
        token_uri: &str,
        dry_run: bool,
    ) -> Result<SentTx>;
}

#[async_trait]
pub trait Erc721Reader: Send + Sync {
    /// `tokenURI` reverting because the function doesn't exist on this
    /// token is not an error: the caller treats it as an empty string
    /// (`original_source/swap-engine/erc721/swap.go`'s `fillRequiredInfo`).
    async fn token_uri(&self, token_addr: &str, token_id: &str) -> Result<String>;
}

pub struct EthersSwapAgent {
    provider: Arc<Provider<Http>>,
    wallet: LocalWallet,
    contract_addr: Address,
    rpc: Arc<dyn EthRpc>,
}

impl EthersSwapAgent {
    pub fn new(provider: Arc<Provider<Http>>, wallet: LocalWallet, contract_addr: Address, rpc: Arc<dyn EthRpc>) -> Self {
        Self { provider, wallet, contract_addr, rpc }
    }

    fn signer(&self) -> SignerMiddleware<Arc<Provider<Http>>, LocalWallet> {
        SignerMiddleware::new(self.provider.clone(), self.wallet.clone())
    }

    /// Fills nonce/gas price/gas limit through the shared `EthRpc` so two
    /// engines sharing a signing key never race on the same nonce
    /// (`original_source/client/eth.go`'s write-locked `PendingNonceAt`).
    async fn prepare_tx(&self, mut tx: TransactionRequest, data: &[u8]) -> Result<TransactionRequest> {
        let nonce = self.rpc.pending_nonce_at(&format!("{:#x}", self.wallet.address())).await?;
        let gas_price = self.rpc.suggest_gas_price().await?;
        let gas_price: U256 = gas_price.parse().map_err(|_| BridgeError::rpc("invalid gas price returned by rpc"))?;
        let to = tx.to.clone().ok_or_else(|| BridgeError::rpc("transaction request missing recipient"))?;
        let to_addr = match to {
            NameOrAddress::Address(a) => a,
            NameOrAddress::Name(_) => return Err(BridgeError::rpc("ENS recipients are not supported")),
        };
        let gas = self.rpc.estimate_gas(&format!("{to_addr:#x}"), data).await?;
        tx = tx.nonce(nonce).gas_price(gas_price).gas(gas);
        Ok(tx)
    }
}

#[async_trait]
impl SwapAgent for EthersSwapAgent {
    async fn filter_swap_pair_register(&self, from_height: i64, to_height: i64) -> Result<Vec<SwapPairRegisterLog>> {
        let filter = Filter::new()
            .address(self.contract_addr)
            .from_block(from_height as u64)
            .to_block(to_height as u64)
            .event("SwapPairRegister(bytes32,address,string,string,address,string)");

        let logs = self.provider.get_logs(&filter).await.map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(logs
            .into_iter()
            .map(|log| SwapPairRegisterLog {
                tx_hash: log.transaction_hash.map(|h| format!("{h:#x}")).unwrap_or_default(),
                height: log.block_number.map(|n| n.as_u64() as i64).unwrap_or(0),
                block_hash: log.block_hash.map(|h| format!("{h:#x}")).unwrap_or_default(),
                src_token_addr: String::new(),
                src_token_name: String::new(),
                symbol: String::new(),
                sponsor: String::new(),
                dst_chain_id: String::new(),
            })
            .collect())
    }

    async fn filter_swap_started(&self, from_height: i64, to_height: i64) -> Result<Vec<SwapStartedLog>> {
        let filter = Filter::new()
            .address(self.contract_addr)
            .from_block(from_height as u64)
            .to_block(to_height as u64)
            .event("SwapStarted(bytes32,address,address,address,uint256,string)");

        let logs = self.provider.get_logs(&filter).await.map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(logs
            .into_iter()
            .map(|log| SwapStartedLog {
                tx_hash: log.transaction_hash.map(|h| format!("{h:#x}")).unwrap_or_default(),
                height: log.block_number.map(|n| n.as_u64() as i64).unwrap_or(0),
                block_hash: log.block_hash.map(|h| format!("{h:#x}")).unwrap_or_default(),
                src_token_addr: String::new(),
                sender: String::new(),
                recipient: String::new(),
                token_id: String::new(),
                dst_chain_id: String::new(),
            })
            .collect())
    }

    async fn filter_swap_pair_created(&self, height: i64, register_tx_hash: &str) -> Result<Vec<SwapPairCreatedLog>> {
        let filter = Filter::new()
            .address(self.contract_addr)
            .from_block(height as u64)
            .to_block(height as u64)
            .event("SwapPairCreated(bytes32,address,address)");

        let logs = self.provider.get_logs(&filter).await.map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(logs
            .into_iter()
            .filter(|log| log.topics.get(1).map(|t| format!("{t:#x}") == register_tx_hash).unwrap_or(false))
            .map(|_| SwapPairCreatedLog { src_token_addr: String::new(), dst_token_addr: String::new() })
            .collect())
    }

    async fn filter_swap_filled(&self, height: i64, request_tx_hash: &str) -> Result<Vec<SwapFilledLog>> {
        let filter = Filter::new()
            .address(self.contract_addr)
            .from_block(height as u64)
            .to_block(height as u64)
            .event("SwapFilled(bytes32)");

        let logs = self.provider.get_logs(&filter).await.map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(logs
            .into_iter()
            .filter(|log| log.topics.get(1).map(|t| format!("{t:#x}") == request_tx_hash).unwrap_or(false))
            .map(|_| SwapFilledLog { request_tx_hash: request_tx_hash.to_string() })
            .collect())
    }

    async fn create_swap_pair(
        &self,
        register_tx_hash: &str,
        src_token_addr: &str,
        src_chain_id: &str,
        src_token_name: &str,
        symbol: &str,
        dry_run: bool,
    ) -> Result<SentTx> {
        let req_hash: H256 = register_tx_hash.parse().map_err(|_| BridgeError::rpc("invalid register tx hash"))?;
        let addr: Address = src_token_addr.parse().map_err(|_| BridgeError::rpc("invalid src token addr"))?;
        let chain_id: U256 = src_chain_id.parse().map_err(|_| BridgeError::rpc("invalid src chain id"))?;
        let signer = self.signer();
        let data = ethers::abi::encode(&[
            ethers::abi::Token::FixedBytes(req_hash.as_bytes().to_vec()),
            ethers::abi::Token::Address(addr),
            ethers::abi::Token::Uint(chain_id),
            ethers::abi::Token::String(src_token_name.to_string()),
            ethers::abi::Token::String(symbol.to_string()),
        ]);

        let tx = self.prepare_tx(TransactionRequest::new().to(self.contract_addr).data(data.clone()), &data).await?;
        if dry_run {
            let mut typed: TypedTransaction = tx.into();
            signer.fill_transaction(&mut typed, None).await.map_err(|e| BridgeError::rpc(e.to_string()))?;
            return Ok(SentTx { tx_hash: format!("{:#x}", H256::zero()) });
        }

        let pending = signer.send_transaction(tx, None).await.map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(SentTx { tx_hash: format!("{:#x}", *pending) })
    }

    async fn fill(
        &self,
        request_tx_hash: &str,
        src_token_addr: &str,
        recipient: &str,
        src_chain_id: &str,
        token_id: &str,
        token_uri: &str,
        dry_run: bool,
    ) -> Result<SentTx> {
        let req_hash: H256 = request_tx_hash.parse().map_err(|_| BridgeError::rpc("invalid request tx hash"))?;
        let src_addr: Address = src_token_addr.parse().map_err(|_| BridgeError::rpc("invalid src token addr"))?;
        let recipient_addr: Address = recipient.parse().map_err(|_| BridgeError::rpc("invalid recipient"))?;
        let chain_id: U256 = src_chain_id.parse().map_err(|_| BridgeError::rpc("invalid src chain id"))?;
        let token_id: U256 = token_id.parse().map_err(|_| BridgeError::rpc("invalid token id"))?;

        let signer = self.signer();
        let data = ethers::abi::encode(&[
            ethers::abi::Token::FixedBytes(req_hash.as_bytes().to_vec()),
            ethers::abi::Token::Address(src_addr),
            ethers::abi::Token::Address(recipient_addr),
            ethers::abi::Token::Uint(chain_id),
            ethers::abi::Token::Uint(token_id),
            ethers::abi::Token::String(token_uri.to_string()),
        ]);

        let tx = self.prepare_tx(TransactionRequest::new().to(self.contract_addr).data(data.clone()), &data).await?;
        if dry_run {
            let mut typed: TypedTransaction = tx.into();
            signer.fill_transaction(&mut typed, None).await.map_err(|e| BridgeError::rpc(e.to_string()))?;
            return Ok(SentTx { tx_hash: format!("{:#x}", H256::zero()) });
        }

        let pending = signer.send_transaction(tx, None).await.map_err(|e| BridgeError::rpc(e.to_string()))?;
        Ok(SentTx { tx_hash: format!("{:#x}", *pending) })
    }
}

pub struct EthersErc721Reader {
    provider: Arc<Provider<Http>>,
}

impl EthersErc721Reader {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Erc721Reader for EthersErc721Reader {
    async fn token_uri(&self, token_addr: &str, token_id: &str) -> Result<String> {
        let addr: Address = token_addr.parse().map_err(|_| BridgeError::rpc("invalid token addr"))?;
        let id: U256 = token_id.parse().map_err(|_| BridgeError::rpc("invalid token id"))?;

        let selector = ethers::utils::id("tokenURI(uint256)");
        let mut data = selector.to_vec();
        data.extend_from_slice(&ethers::abi::encode(&[ethers::abi::Token::Uint(id)]));

        let tx = TransactionRequest::new().to(addr).data(data);
        match self.provider.call(&tx.into(), None).await {
            Ok(bytes) => Ok(ethers::abi::decode(&[ethers::abi::ParamType::String], &bytes)
                .ok()
                .and_then(|mut t| t.pop())
                .and_then(|t| t.into_string())
                .unwrap_or_default()),
            Err(_) => Ok(String::new()),
        }
    }
}
