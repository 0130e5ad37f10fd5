/// Persisted entities (spec.md §3).
///
/// All three carry a ULID primary key generated on insert plus
/// `created_at`/`updated_at` timestamps, matching
/// `original_source/model/erc721/swap.go`'s `BeforeCreate` (`util.ULID()`).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Sentinel fill height for rows whose fill side hasn't happened yet,
/// matching original_source's `FillHeight = math.MaxInt64`.
pub const FILL_HEIGHT_UNSET: i64 = i64::MAX;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BlockLog {
    pub id: String,
    pub chain_id: String,
    pub height: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub block_time: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlockLog {
    pub fn new(chain_id: impl Into<String>, height: i64, block_hash: impl Into<String>, parent_hash: impl Into<String>, block_time: i64) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string(),
            chain_id: chain_id.into(),
            height,
            block_hash: block_hash.into(),
            parent_hash: parent_hash.into(),
            block_time,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapPairState {
    RegistrationOngoing,
    RegistrationConfirmed,
    CreationTxDryRunFailed,
    CreationTxCreated,
    CreationTxSent,
    CreationTxFailed,
    CreationTxMissing,
    CreationTxConfirmed,
}

impl SwapPairState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::CreationTxConfirmed | Self::CreationTxFailed | Self::CreationTxMissing
        )
    }
}

impl fmt::Display for SwapPairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RegistrationOngoing => "registration_ongoing",
            Self::RegistrationConfirmed => "registration_confirmed",
            Self::CreationTxDryRunFailed => "creation_tx_dry_run_failed",
            Self::CreationTxCreated => "creation_tx_created",
            Self::CreationTxSent => "creation_tx_sent",
            Self::CreationTxFailed => "creation_tx_failed",
            Self::CreationTxMissing => "creation_tx_missing",
            Self::CreationTxConfirmed => "creation_tx_confirmed",
        };
        f.write_str(s)
    }
}

impl FromStr for SwapPairState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "registration_ongoing" => Self::RegistrationOngoing,
            "registration_confirmed" => Self::RegistrationConfirmed,
            "creation_tx_dry_run_failed" => Self::CreationTxDryRunFailed,
            "creation_tx_created" => Self::CreationTxCreated,
            "creation_tx_sent" => Self::CreationTxSent,
            "creation_tx_failed" => Self::CreationTxFailed,
            "creation_tx_missing" => Self::CreationTxMissing,
            "creation_tx_confirmed" => Self::CreationTxConfirmed,
            other => return Err(format!("unknown swap pair state: {other}")),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SwapPair {
    pub id: String,

    pub src_chain_id: String,
    pub dst_chain_id: String,
    pub src_token_addr: String,
    pub src_token_name: String,
    pub symbol: String,
    pub sponsor: String,
    pub dst_token_addr: Option<String>,

    pub available: bool,

    pub register_tx_hash: String,
    pub register_height: i64,
    pub register_block_hash: String,
    pub register_block_log_id: Option<String>,

    pub create_tx_hash: Option<String>,
    pub create_height: Option<i64>,
    pub create_block_hash: Option<String>,
    pub create_block_log_id: Option<String>,
    pub create_gas_price: Option<String>,
    pub create_gas_used: Option<i64>,
    pub create_consumed_fee_amount: Option<String>,
    pub create_track_retry: i64,

    pub state: String,
    pub message_log: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwapPair {
    pub fn state(&self) -> SwapPairState {
        self.state.parse().expect("state column holds a valid SwapPairState")
    }

    pub fn set_state(&mut self, state: SwapPairState) {
        self.state = state.to_string();
    }

    /// Invariant from spec.md §3: `Available ⇒ State = creation_tx_confirmed ∧ DstTokenAddr ≠ ∅`.
    pub fn check_availability_invariant(&self) -> bool {
        if self.available {
            self.state() == SwapPairState::CreationTxConfirmed && self.dst_token_addr.as_deref().map_or(false, |a| !a.is_empty())
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapState {
    RequestOngoing,
    RequestRejected,
    RequestConfirmed,
    FillTxDryRunFailed,
    FillTxCreated,
    FillTxSent,
    FillTxConfirmed,
    FillTxFailed,
    FillTxMissing,
}

impl SwapState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::RequestRejected | Self::FillTxConfirmed | Self::FillTxFailed | Self::FillTxMissing | Self::FillTxDryRunFailed
        )
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RequestOngoing => "request_ongoing",
            Self::RequestRejected => "request_rejected",
            Self::RequestConfirmed => "request_confirmed",
            Self::FillTxDryRunFailed => "fill_tx_dry_run_failed",
            Self::FillTxCreated => "fill_tx_created",
            Self::FillTxSent => "fill_tx_sent",
            Self::FillTxConfirmed => "fill_tx_confirmed",
            Self::FillTxFailed => "fill_tx_failed",
            Self::FillTxMissing => "fill_tx_missing",
        };
        f.write_str(s)
    }
}

impl FromStr for SwapState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "request_ongoing" => Self::RequestOngoing,
            "request_rejected" => Self::RequestRejected,
            "request_confirmed" => Self::RequestConfirmed,
            "fill_tx_dry_run_failed" => Self::FillTxDryRunFailed,
            "fill_tx_created" => Self::FillTxCreated,
            "fill_tx_sent" => Self::FillTxSent,
            "fill_tx_confirmed" => Self::FillTxConfirmed,
            "fill_tx_failed" => Self::FillTxFailed,
            "fill_tx_missing" => Self::FillTxMissing,
            other => return Err(format!("unknown swap state: {other}")),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Swap {
    pub id: String,

    pub src_chain_id: String,
    pub dst_chain_id: String,
    pub src_token_addr: String,
    pub dst_token_addr: Option<String>,
    pub src_token_name: Option<String>,
    pub dst_token_name: Option<String>,
    pub sender: String,
    pub recipient: String,
    pub token_id: String,
    pub token_uri: Option<String>,

    pub state: String,
    pub signature: String,

    pub request_tx_hash: String,
    pub request_height: i64,
    pub request_block_hash: String,
    pub request_block_log_id: Option<String>,
    pub request_track_retry: i64,

    pub fill_tx_hash: Option<String>,
    pub fill_height: i64,
    pub fill_block_hash: Option<String>,
    pub fill_block_log_id: Option<String>,
    pub fill_gas_price: Option<String>,
    pub fill_gas_used: Option<i64>,
    pub fill_consumed_fee_amount: Option<String>,
    pub fill_track_retry: i64,

    pub message_log: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Swap {
    pub fn state(&self) -> SwapState {
        self.state.parse().expect("state column holds a valid SwapState")
    }

    pub fn set_state(&mut self, state: SwapState) {
        self.state = state.to_string();
    }

    /// Required information for progressing past `request_ongoing`:
    /// destination token address/name and (possibly empty) token URI.
    pub fn is_required_info_valid(&self) -> bool {
        self.dst_token_addr.as_deref().map_or(false, |a| !a.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_pair_state_round_trips_through_display_and_from_str() {
        for state in [
            SwapPairState::RegistrationOngoing,
            SwapPairState::RegistrationConfirmed,
            SwapPairState::CreationTxDryRunFailed,
            SwapPairState::CreationTxCreated,
            SwapPairState::CreationTxSent,
            SwapPairState::CreationTxFailed,
            SwapPairState::CreationTxMissing,
            SwapPairState::CreationTxConfirmed,
        ] {
            let parsed: SwapPairState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn swap_pair_terminal_states() {
        assert!(SwapPairState::CreationTxConfirmed.is_terminal());
        assert!(SwapPairState::CreationTxFailed.is_terminal());
        assert!(SwapPairState::CreationTxMissing.is_terminal());
        assert!(!SwapPairState::RegistrationOngoing.is_terminal());
        assert!(!SwapPairState::CreationTxSent.is_terminal());
    }

    #[test]
    fn swap_state_round_trips_through_display_and_from_str() {
        for state in [
            SwapState::RequestOngoing,
            SwapState::RequestRejected,
            SwapState::RequestConfirmed,
            SwapState::FillTxDryRunFailed,
            SwapState::FillTxCreated,
            SwapState::FillTxSent,
            SwapState::FillTxConfirmed,
            SwapState::FillTxFailed,
            SwapState::FillTxMissing,
        ] {
            let parsed: SwapState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn swap_terminal_states() {
        assert!(SwapState::RequestRejected.is_terminal());
        assert!(SwapState::FillTxConfirmed.is_terminal());
        assert!(SwapState::FillTxFailed.is_terminal());
        assert!(SwapState::FillTxMissing.is_terminal());
        assert!(SwapState::FillTxDryRunFailed.is_terminal());
        assert!(!SwapState::RequestOngoing.is_terminal());
        assert!(!SwapState::FillTxCreated.is_terminal());
    }

    #[test]
    fn unknown_state_string_is_rejected() {
        assert!("not_a_state".parse::<SwapPairState>().is_err());
        assert!("not_a_state".parse::<SwapState>().is_err());
    }

    fn sample_pair() -> SwapPair {
        let now = Utc::now();
        SwapPair {
            id: "pair1".into(),
            src_chain_id: "56".into(),
            dst_chain_id: "1".into(),
            src_token_addr: "0xsrc".into(),
            src_token_name: "Cats".into(),
            symbol: "CAT".into(),
            sponsor: "0xsponsor".into(),
            dst_token_addr: None,
            available: false,
            register_tx_hash: "0xreg".into(),
            register_height: 100,
            register_block_hash: "0xblk".into(),
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

    #[test]
    fn availability_invariant_holds_when_not_available() {
        let pair = sample_pair();
        assert!(pair.check_availability_invariant());
    }

    #[test]
    fn availability_invariant_rejects_available_without_dst_token() {
        let mut pair = sample_pair();
        pair.available = true;
        pair.set_state(SwapPairState::CreationTxConfirmed);
        assert!(!pair.check_availability_invariant());
    }

    #[test]
    fn availability_invariant_holds_when_confirmed_and_minted() {
        let mut pair = sample_pair();
        pair.available = true;
        pair.set_state(SwapPairState::CreationTxConfirmed);
        pair.dst_token_addr = Some("0xdst".into());
        assert!(pair.check_availability_invariant());
    }
}
