//! Trade route administration

use crate::core::context::Context;
use crate::core::decimal::Decimal;
use crate::models::host_zone::{IcaAccount, IcaAccountType};
use crate::models::state::{self, TRADE_ROUTES};
use crate::models::trade_route::{route_key, TradeConfig, TradeRoute};
use crate::orchestrator::engine::Orchestrator;
use crate::trade::TradeError;
use tracing::info;

/// Admin request creating a route for one (reward denom, host zone) pair
///
/// The host side account is the zone's withdrawal ICA; the reward and trade
/// accounts must already be registered on their chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTradeRoute {
    pub host_chain_id: String,
    pub reward_denom_on_host_zone: String,
    pub reward_denom_on_reward_zone: String,
    pub reward_denom_on_trade_zone: String,
    pub host_denom_on_trade_zone: String,
    pub host_to_reward_channel_id: String,
    pub reward_to_trade_channel_id: String,
    pub trade_to_host_channel_id: String,
    pub reward_account: IcaAccount,
    pub trade_account: IcaAccount,
    pub pool_id: u64,
    pub max_allowed_swap_loss_rate: Decimal,
    pub min_swap_amount: u128,
    pub max_swap_amount: u128,
}

/// Admin-tunable part of a [`TradeConfig`]; price fields are never set here
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeConfigUpdate {
    pub pool_id: u64,
    pub max_allowed_swap_loss_rate: Decimal,
    pub min_swap_amount: u128,
    pub max_swap_amount: u128,
}

fn invalid(reason: impl Into<String>) -> TradeError {
    TradeError::InvalidRoute(reason.into())
}

fn validate_config(update: &TradeConfigUpdate) -> Result<(), TradeError> {
    if update.max_allowed_swap_loss_rate >= Decimal::one() {
        return Err(TradeError::InvalidLossRate(update.max_allowed_swap_loss_rate));
    }
    if update.max_swap_amount == 0 || update.min_swap_amount > update.max_swap_amount {
        return Err(invalid("swap amount range must be non-empty"));
    }
    Ok(())
}

impl CreateTradeRoute {
    fn validate(&self) -> Result<(), TradeError> {
        let denoms = [
            &self.reward_denom_on_host_zone,
            &self.reward_denom_on_reward_zone,
            &self.reward_denom_on_trade_zone,
            &self.host_denom_on_trade_zone,
        ];
        if denoms.iter().any(|d| d.is_empty()) {
            return Err(invalid("all denoms must be set"));
        }
        let channels = [
            &self.host_to_reward_channel_id,
            &self.reward_to_trade_channel_id,
            &self.trade_to_host_channel_id,
        ];
        if channels.iter().any(|c| !c.starts_with("channel-")) {
            return Err(invalid("channel ids must look like channel-N"));
        }
        if self.reward_account.account_type != IcaAccountType::ConverterUnwind
            || self.trade_account.account_type != IcaAccountType::ConverterTrade
        {
            return Err(invalid("reward and trade accounts must be converter accounts"));
        }
        if self.reward_account.address.is_empty() || self.trade_account.address.is_empty() {
            return Err(invalid("reward and trade account addresses must be set"));
        }
        validate_config(&TradeConfigUpdate {
            pool_id: self.pool_id,
            max_allowed_swap_loss_rate: self.max_allowed_swap_loss_rate,
            min_swap_amount: self.min_swap_amount,
            max_swap_amount: self.max_swap_amount,
        })
    }
}

impl Orchestrator {
    pub fn create_trade_route(
        &self,
        ctx: &mut Context,
        sender: &str,
        msg: CreateTradeRoute,
    ) -> Result<TradeRoute, TradeError> {
        if !self.is_authority(sender) {
            return Err(TradeError::Unauthorized(sender.to_string()));
        }
        msg.validate()?;
        let zone = state::host_zone(ctx.store(), &msg.host_chain_id)?;
        let host_account = state::ica_account(&zone, IcaAccountType::Withdrawal)?;
        let key = route_key(&msg.reward_denom_on_host_zone, &zone.host_denom);
        if TRADE_ROUTES.has(ctx.store(), &key) {
            return Err(TradeError::RouteExists(key));
        }

        let route = TradeRoute {
            reward_denom_on_host_zone: msg.reward_denom_on_host_zone,
            reward_denom_on_reward_zone: msg.reward_denom_on_reward_zone,
            reward_denom_on_trade_zone: msg.reward_denom_on_trade_zone,
            host_denom_on_trade_zone: msg.host_denom_on_trade_zone,
            host_denom_on_host_zone: zone.host_denom.clone(),
            host_account,
            reward_account: msg.reward_account,
            trade_account: msg.trade_account,
            host_to_reward_channel_id: msg.host_to_reward_channel_id,
            reward_to_trade_channel_id: msg.reward_to_trade_channel_id,
            trade_to_host_channel_id: msg.trade_to_host_channel_id,
            trade_config: TradeConfig {
                pool_id: msg.pool_id,
                swap_price: Decimal::zero(),
                price_update_timestamp: 0,
                max_allowed_swap_loss_rate: msg.max_allowed_swap_loss_rate,
                min_swap_amount: msg.min_swap_amount,
                max_swap_amount: msg.max_swap_amount,
            },
        };
        TRADE_ROUTES.save(ctx.store_mut(), &key, &route)?;
        info!(route_key = %key, pool_id = msg.pool_id, "Created trade route");
        Ok(route)
    }

    pub fn update_trade_config(
        &self,
        ctx: &mut Context,
        sender: &str,
        route_key: &str,
        update: TradeConfigUpdate,
    ) -> Result<(), TradeError> {
        if !self.is_authority(sender) {
            return Err(TradeError::Unauthorized(sender.to_string()));
        }
        validate_config(&update)?;
        let mut route = state::trade_route(ctx.store(), route_key)?;
        let config = &mut route.trade_config;
        if config.pool_id != update.pool_id {
            // Price of the old pool says nothing about the new one
            config.swap_price = Decimal::zero();
            config.price_update_timestamp = 0;
        }
        config.pool_id = update.pool_id;
        config.max_allowed_swap_loss_rate = update.max_allowed_swap_loss_rate;
        config.min_swap_amount = update.min_swap_amount;
        config.max_swap_amount = update.max_swap_amount;
        TRADE_ROUTES.save(ctx.store_mut(), route_key, &route)?;
        info!(route_key, "Updated trade config");
        Ok(())
    }

    pub fn delete_trade_route(
        &self,
        ctx: &mut Context,
        sender: &str,
        route_key: &str,
    ) -> Result<(), TradeError> {
        if !self.is_authority(sender) {
            return Err(TradeError::Unauthorized(sender.to_string()));
        }
        state::trade_route(ctx.store(), route_key)?;
        TRADE_ROUTES.remove(ctx.store_mut(), route_key);
        info!(route_key, "Deleted trade route");
        Ok(())
    }

    pub fn all_trade_routes(&self, ctx: &Context) -> Result<Vec<TradeRoute>, TradeError> {
        Ok(state::values(&TRADE_ROUTES, ctx.store())?)
    }
}
