//! Trade route model
//!
//! A trade route converts a reward token harvested on a host zone into the
//! host denom: host → reward zone → trade zone (swap) → host.

use crate::core::decimal::Decimal;
use crate::models::host_zone::IcaAccount;
use serde::{Deserialize, Serialize};

/// Swap parameters for a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeConfig {
    pub pool_id: u64,
    /// `output = swap_price * input`; refreshed by interchain query
    pub swap_price: Decimal,
    /// Unix seconds of the last price refresh
    pub price_update_timestamp: u64,
    /// 0.05 means the output may be at most 5% below the priced value
    pub max_allowed_swap_loss_rate: Decimal,
    pub min_swap_amount: u128,
    pub max_swap_amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRoute {
    pub reward_denom_on_host_zone: String,
    pub reward_denom_on_reward_zone: String,
    pub reward_denom_on_trade_zone: String,
    pub host_denom_on_trade_zone: String,
    pub host_denom_on_host_zone: String,

    pub host_account: IcaAccount,
    pub reward_account: IcaAccount,
    pub trade_account: IcaAccount,

    pub host_to_reward_channel_id: String,
    pub reward_to_trade_channel_id: String,
    pub trade_to_host_channel_id: String,

    pub trade_config: TradeConfig,
}

impl TradeRoute {
    pub fn key(&self) -> String {
        route_key(&self.reward_denom_on_host_zone, &self.host_denom_on_host_zone)
    }
}

/// Store key of a route: `{reward denom on host}-{host denom on host}`
pub fn route_key(reward_denom: &str, host_denom: &str) -> String {
    format!("{}-{}", reward_denom, host_denom)
}
