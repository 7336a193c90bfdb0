//! Wire-level records exchanged with host zones
//!
//! `IcaMsg` is what the engine asks a remote interchain account to execute;
//! `AckResponse` is what eventually comes back for the whole transaction.
//! Query requests and responses travel as JSON-encoded records.

use crate::callbacks::ledger::LedgerKey;
use cw_storage_plus::PrimaryKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An amount of one denomination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Message executed by an interchain account on its host chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcaMsg {
    Send {
        from_address: String,
        to_address: String,
        amount: Coin,
    },
    Delegate {
        delegator_address: String,
        validator_address: String,
        amount: Coin,
    },
    Undelegate {
        delegator_address: String,
        validator_address: String,
        amount: Coin,
    },
    Redelegate {
        delegator_address: String,
        src_validator_address: String,
        dst_validator_address: String,
        amount: Coin,
    },
    SetWithdrawAddress {
        delegator_address: String,
        withdraw_address: String,
    },
    WithdrawReward {
        delegator_address: String,
        validator_address: String,
    },
    /// ICS-20 transfer initiated from the remote account
    Transfer {
        source_channel: String,
        sender: String,
        receiver: String,
        token: Coin,
        /// Unix nanos
        timeout_timestamp: u64,
    },
    Swap {
        sender: String,
        pool_id: u64,
        token_in: Coin,
        token_out_denom: String,
        token_out_min_amount: u128,
    },
}

/// Per-message result inside a successful acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgResponse {
    Empty,
    Undelegate {
        /// Unix nanos at which the undelegation matures
        completion_time: u64,
    },
    Swap {
        token_out_amount: u128,
    },
}

/// Terminal outcome of an ICA transaction or transfer packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckResponse {
    /// One response per submitted message, in order
    Success(Vec<MsgResponse>),
    /// Error acknowledgement written by the host chain
    Failure(String),
    Timeout,
}

impl AckResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, AckResponse::Success(_))
    }

    /// Short description of a terminal failure
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            AckResponse::Success(_) => None,
            AckResponse::Failure(reason) => Some(reason.clone()),
            AckResponse::Timeout => Some("packet timed out".to_string()),
        }
    }
}

/// Identifies one in-flight packet: source port, source channel, sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketId {
    pub port_id: String,
    pub channel_id: String,
    pub sequence: u64,
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.port_id, self.channel_id, self.sequence)
    }
}

impl LedgerKey for PacketId {
    fn storage_key(&self) -> Vec<u8> {
        (self.port_id.as_str(), self.channel_id.as_str(), self.sequence).joined_key()
    }
}

/// Outcome delivered for an interchain query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Response(Vec<u8>),
    Timeout,
}

/// Store path of bank balances on the host chain
pub const BANK_BALANCE_PATH: &str = "store/bank/key";

/// Store path of pool spot prices on the trade chain
pub const SPOT_PRICE_PATH: &str = "store/twap/key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceQuery {
    pub address: String,
    pub denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotPriceQuery {
    pub pool_id: u64,
    pub base_denom: String,
    pub quote_denom: String,
}

/// `price` is the amount of quote denom paid per unit of base denom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotPriceResponse {
    pub price: crate::core::decimal::Decimal,
}
