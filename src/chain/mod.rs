pub mod contract;
pub mod fleet;
pub mod rpc;

pub use contract::{Erc721Reader, SwapAgent};
pub use fleet::{ChainEntry, ChainFleet, LatestBlockCache};
pub use rpc::EthRpc;
