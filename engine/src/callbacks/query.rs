//! Interchain query callbacks

use crate::callbacks::ledger::{CallbackKind, CallbackLedger};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCallback {
    /// Host-denom balance of the withdrawal account, for reinvestment
    WithdrawalBalance { chain_id: String },
    /// Host-denom balance of the redemption account, for the sweep
    RedemptionBalance {
        chain_id: String,
        epoch_numbers: Vec<u64>,
        expected_amount: u128,
    },
    CommunityPoolBalance { chain_id: String },
    /// Reward-denom balance of the host withdrawal account (trade hop 1)
    WithdrawalRewardBalance { route_key: String },
    /// Reward-denom balance sitting on the trade account (swap input)
    TradeRewardBalance { route_key: String },
    PoolPrice { route_key: String },
}

pub const WITHDRAWAL_BALANCE: &str = "withdrawal_balance";
pub const REDEMPTION_BALANCE: &str = "redemption_balance";
pub const COMMUNITY_POOL_BALANCE: &str = "community_pool_balance";
pub const WITHDRAWAL_REWARD_BALANCE: &str = "withdrawal_reward_balance";
pub const TRADE_REWARD_BALANCE: &str = "trade_reward_balance";
pub const POOL_PRICE: &str = "pool_price";

/// Every ICQ callback id
pub const QUERY_CALLBACK_IDS: [&str; 6] = [
    WITHDRAWAL_BALANCE,
    REDEMPTION_BALANCE,
    COMMUNITY_POOL_BALANCE,
    WITHDRAWAL_REWARD_BALANCE,
    TRADE_REWARD_BALANCE,
    POOL_PRICE,
];

impl CallbackKind for QueryCallback {
    fn callback_id(&self) -> &'static str {
        match self {
            QueryCallback::WithdrawalBalance { .. } => WITHDRAWAL_BALANCE,
            QueryCallback::RedemptionBalance { .. } => REDEMPTION_BALANCE,
            QueryCallback::CommunityPoolBalance { .. } => COMMUNITY_POOL_BALANCE,
            QueryCallback::WithdrawalRewardBalance { .. } => WITHDRAWAL_REWARD_BALANCE,
            QueryCallback::TradeRewardBalance { .. } => TRADE_REWARD_BALANCE,
            QueryCallback::PoolPrice { .. } => POOL_PRICE,
        }
    }
}

pub const QUERY_CALLBACKS: CallbackLedger<String, QueryCallback> =
    CallbackLedger::new("icq_callback");
