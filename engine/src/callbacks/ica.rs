//! Interchain account callbacks
//!
//! The callback set is closed: every ICA transaction the engine submits is
//! tagged with one of these variants, and the orchestrator routes the
//! acknowledgement with an exhaustive match.

use crate::callbacks::ledger::{CallbackKind, CallbackLedger};
use crate::delegation::allocation::{Redelegation, SplitDelegation};
use crate::ibc::messages::PacketId;
use serde::{Deserialize, Serialize};

/// Leg of a trade route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeHop {
    HostToReward,
    RewardToTrade,
    TradeToHost,
}

impl TradeHop {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeHop::HostToReward => "host_to_reward",
            TradeHop::RewardToTrade => "reward_to_trade",
            TradeHop::TradeToHost => "trade_to_host",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcaCallback {
    /// Local ICS-20 transfer of a deposit record to the delegation account
    DepositTransfer { record_id: u64 },
    Delegate {
        chain_id: String,
        record_id: u64,
        splits: Vec<SplitDelegation>,
    },
    Undelegate {
        chain_id: String,
        epoch_numbers: Vec<u64>,
        splits: Vec<SplitDelegation>,
    },
    /// Redemption account → this chain
    Sweep {
        chain_id: String,
        epoch_numbers: Vec<u64>,
        amount: u128,
    },
    Reinvest { chain_id: String, amount: u128 },
    Rebalance {
        chain_id: String,
        redelegations: Vec<Redelegation>,
    },
    CommunityPoolDeposit { chain_id: String, amount: u128 },
    TradeHop {
        route_key: String,
        hop: TradeHop,
        amount: u128,
    },
    Swap {
        route_key: String,
        input_amount: u128,
        min_output: u128,
    },
}

pub const DEPOSIT_TRANSFER: &str = "deposit_transfer";
pub const DELEGATE: &str = "delegate";
pub const UNDELEGATE: &str = "undelegate";
pub const SWEEP: &str = "sweep";
pub const REINVEST: &str = "reinvest";
pub const REBALANCE: &str = "rebalance";
pub const COMMUNITY_POOL_DEPOSIT: &str = "community_pool_deposit";
pub const TRADE_HOP: &str = "trade_hop";
pub const SWAP: &str = "swap";

/// Every ICA callback id
pub const ICA_CALLBACK_IDS: [&str; 9] = [
    DEPOSIT_TRANSFER,
    DELEGATE,
    UNDELEGATE,
    SWEEP,
    REINVEST,
    REBALANCE,
    COMMUNITY_POOL_DEPOSIT,
    TRADE_HOP,
    SWAP,
];

impl IcaCallback {
    /// Whether resolving this callback moves stake on `address` of `chain_id`
    pub fn names_validator(&self, chain_id: &str, address: &str) -> bool {
        match self {
            IcaCallback::Delegate {
                chain_id: zone,
                splits,
                ..
            }
            | IcaCallback::Undelegate {
                chain_id: zone,
                splits,
                ..
            } => zone == chain_id && splits.iter().any(|s| s.validator_address == address),
            IcaCallback::Rebalance {
                chain_id: zone,
                redelegations,
            } => {
                zone == chain_id
                    && redelegations.iter().any(|r| {
                        r.src_validator_address == address || r.dst_validator_address == address
                    })
            }
            _ => false,
        }
    }
}

impl CallbackKind for IcaCallback {
    fn callback_id(&self) -> &'static str {
        match self {
            IcaCallback::DepositTransfer { .. } => DEPOSIT_TRANSFER,
            IcaCallback::Delegate { .. } => DELEGATE,
            IcaCallback::Undelegate { .. } => UNDELEGATE,
            IcaCallback::Sweep { .. } => SWEEP,
            IcaCallback::Reinvest { .. } => REINVEST,
            IcaCallback::Rebalance { .. } => REBALANCE,
            IcaCallback::CommunityPoolDeposit { .. } => COMMUNITY_POOL_DEPOSIT,
            IcaCallback::TradeHop { .. } => TRADE_HOP,
            IcaCallback::Swap { .. } => SWAP,
        }
    }
}

pub const ICA_CALLBACKS: CallbackLedger<PacketId, IcaCallback> = CallbackLedger::new("ica_callback");
