/// Domain error taxonomy.
///
/// Mirrors the distinction spec'd for the bridge core: transient I/O errors
/// are things callers retry on the next tick, protocol/domain mismatches are
/// recorded into a row's `MessageLog` instead of propagating, and integrity
/// failures are fatal for the row that triggered them.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("chain rpc error: {0}")]
    Rpc(String),

    #[error("chain id {0} is not configured in the fleet")]
    UnknownChain(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("integrity check failed for row {id}: signature mismatch")]
    IntegrityViolation { id: String },
}

impl BridgeError {
    pub fn rpc(msg: impl Into<String>) -> Self {
        BridgeError::Rpc(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
