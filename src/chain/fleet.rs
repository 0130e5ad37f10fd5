/// Per-chain RPC/contract clients plus the in-memory `LatestBlockCached`
/// gate, keyed by chain id.
///
/// Grounded in `original_source/swap-engine/erc721/engine.go`'s
/// `Dependencies` struct, which holds `map[string]client.ETHClient`,
/// `map[string]agent.SwapAgent` and `map[string]token.IToken` keyed by
/// chain id the same way.
use super::contract::{Erc721Reader, SwapAgent};
use super::rpc::EthRpc;
use crate::error::{BridgeError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Height/hash of the most recently ingested block for one chain. Engines
/// must never act on a chain whose Observer hasn't ingested at least one
/// block yet (spec.md §5).
#[derive(Debug)]
pub struct LatestBlockCache {
    height: AtomicI64,
}

impl Default for LatestBlockCache {
    fn default() -> Self {
        Self { height: AtomicI64::new(0) }
    }
}

impl LatestBlockCache {
    pub fn set(&self, height: i64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// `None` until the Observer has committed its first block.
    pub fn get(&self) -> Option<i64> {
        let h = self.height.load(Ordering::SeqCst);
        if h == 0 {
            None
        } else {
            Some(h)
        }
    }
}

pub struct ChainEntry {
    pub rpc: Arc<dyn EthRpc>,
    pub swap_agent: Arc<dyn SwapAgent>,
    pub erc721_reader: Arc<dyn Erc721Reader>,
    pub latest_block: Arc<LatestBlockCache>,
}

#[derive(Default)]
pub struct ChainFleet {
    chains: HashMap<String, ChainEntry>,
}

impl ChainFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain_id: impl Into<String>, entry: ChainEntry) {
        self.chains.insert(chain_id.into(), entry);
    }

    pub fn get(&self, chain_id: &str) -> Result<&ChainEntry> {
        self.chains.get(chain_id).ok_or_else(|| BridgeError::UnknownChain(chain_id.to_string()))
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(|s| s.as_str())
    }
}
