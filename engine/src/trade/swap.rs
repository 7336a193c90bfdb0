//! Bounded swap of reward tokens on the trade zone
//!
//! # Critical Invariants
//!
//! 1. **Fresh price**: a swap is submitted only while the last price refresh
//!    is within `swap_price_freshness_secs`
//! 2. **Loss bound**: the output must be at least
//!    `input * swap_price * (1 - max_allowed_swap_loss_rate)`; otherwise the
//!    swap callback fails, the trade config is left untouched and the output
//!    stays on the trade account
//! 3. **Amount window**: input is capped at `max_swap_amount` and balances
//!    below `min_swap_amount` are left to accumulate

use crate::callbacks::ica::{IcaCallback, TradeHop};
use crate::callbacks::query::QueryCallback;
use crate::core::context::Context;
use crate::core::decimal::{Decimal, DecimalError, DecimalExt};
use crate::core::time::EpochId;
use crate::ibc::messages::{
    AckResponse, BalanceQuery, Coin, IcaMsg, MsgResponse, SpotPriceQuery, BANK_BALANCE_PATH,
    SPOT_PRICE_PATH,
};
use crate::models::event::Event;
use crate::models::state::{self, TRADE_ROUTES};
use crate::models::trade_route::{TradeConfig, TradeRoute};
use crate::orchestrator::engine::Orchestrator;
use crate::trade::TradeError;
use tracing::{debug, error, info, warn};

/// Lowest acceptable output for swapping `input` under `config`
///
/// # Example
/// ```
/// use stakeibc_engine::models::TradeConfig;
/// use stakeibc_engine::trade::min_swap_output;
/// use stakeibc_engine::Decimal;
///
/// let config = TradeConfig {
///     pool_id: 1,
///     swap_price: Decimal::one(),
///     price_update_timestamp: 0,
///     max_allowed_swap_loss_rate: Decimal::percent(5),
///     min_swap_amount: 0,
///     max_swap_amount: 1_000_000,
/// };
/// assert_eq!(min_swap_output(&config, 1000).unwrap(), 950);
/// ```
pub fn min_swap_output(config: &TradeConfig, input: u128) -> Result<u128, TradeError> {
    let retained = Decimal::one()
        .checked_sub(config.max_allowed_swap_loss_rate)
        .map_err(|_| TradeError::InvalidLossRate(config.max_allowed_swap_loss_rate))?;
    let factor = config
        .swap_price
        .checked_mul(retained)
        .map_err(DecimalError::from)?;
    Ok(factor.mul_floor(input)?)
}

/// Reject an output below `min_output`
pub fn check_swap_output(
    route_key: &str,
    min_output: u128,
    actual_output: u128,
) -> Result<(), TradeError> {
    if actual_output < min_output {
        return Err(TradeError::ExcessiveSwapLoss {
            route_key: route_key.to_string(),
            min_output,
            actual_output,
        });
    }
    Ok(())
}

impl Orchestrator {
    // ========================================================================
    // Price refresh
    // ========================================================================

    pub fn update_all_trade_route_prices(&mut self, ctx: &mut Context) -> Result<(), TradeError> {
        for route in state::values(&TRADE_ROUTES, ctx.store())? {
            let key = route.key();
            let result = ctx.atomic(|ctx| {
                self.submit_query(
                    ctx,
                    &route.trade_account.connection_id,
                    SPOT_PRICE_PATH,
                    &SpotPriceQuery {
                        pool_id: route.trade_config.pool_id,
                        base_denom: route.reward_denom_on_trade_zone.clone(),
                        quote_denom: route.host_denom_on_trade_zone.clone(),
                    },
                    QueryCallback::PoolPrice {
                        route_key: key.clone(),
                    },
                )
            });
            if let Err(err) = result {
                error!(route_key = %key, error = %err, "Failed to query pool price");
            }
        }
        Ok(())
    }

    pub(crate) fn pool_price_callback(
        &mut self,
        ctx: &mut Context,
        route_key: &str,
        price: Decimal,
    ) -> Result<(), TradeError> {
        if !price.is_positive() {
            warn!(route_key, "Ignoring zero pool price");
            return Ok(());
        }
        let mut route = state::trade_route(ctx.store(), route_key)?;
        route.trade_config.swap_price = price;
        route.trade_config.price_update_timestamp = ctx.block_time_secs();
        TRADE_ROUTES.save(ctx.store_mut(), route_key, &route)?;
        ctx.emit(Event::TradePriceUpdated {
            height: ctx.block_height(),
            route_key: route_key.to_string(),
            price,
        });
        debug!(route_key, price = %price, "Updated swap price");
        Ok(())
    }

    // ========================================================================
    // Swap
    // ========================================================================

    /// Query every trade account's reward balance; the response swaps it
    pub fn swap_all_reward_tokens(&mut self, ctx: &mut Context) -> Result<(), TradeError> {
        for route in state::values(&TRADE_ROUTES, ctx.store())? {
            let key = route.key();
            let result = ctx.atomic(|ctx| {
                self.submit_query(
                    ctx,
                    &route.trade_account.connection_id,
                    BANK_BALANCE_PATH,
                    &BalanceQuery {
                        address: route.trade_account.address.clone(),
                        denom: route.reward_denom_on_trade_zone.clone(),
                    },
                    QueryCallback::TradeRewardBalance {
                        route_key: key.clone(),
                    },
                )
            });
            if let Err(err) = result {
                error!(route_key = %key, error = %err, "Failed to query trade balance");
            }
        }
        Ok(())
    }

    pub(crate) fn trade_reward_balance_callback(
        &mut self,
        ctx: &mut Context,
        route_key: &str,
        amount: u128,
    ) -> Result<(), TradeError> {
        let route = state::trade_route(ctx.store(), route_key)?;
        self.process_swap(ctx, &route, amount)?;
        Ok(())
    }

    /// Submit a swap of up to `balance` reward tokens; returns the input
    /// amount, or `None` when the balance is below the minimum
    pub fn process_swap(
        &mut self,
        ctx: &mut Context,
        route: &TradeRoute,
        balance: u128,
    ) -> Result<Option<u128>, TradeError> {
        let config = &route.trade_config;
        let route_key = route.key();
        if balance == 0 || balance < config.min_swap_amount {
            debug!(route_key = %route_key, balance, "Reward balance below minimum swap amount");
            return Ok(None);
        }

        let params = state::params(ctx.store())?;
        let now = ctx.block_time_secs();
        let fresh = config.swap_price.is_positive()
            && config.price_update_timestamp.saturating_add(params.swap_price_freshness_secs) >= now;
        if !fresh {
            return Err(TradeError::StalePrice {
                route_key,
                updated_at: config.price_update_timestamp,
                now,
            });
        }

        let input = balance.min(config.max_swap_amount);
        let min_output = min_swap_output(config, input)?;
        let msg = IcaMsg::Swap {
            sender: route.trade_account.address.clone(),
            pool_id: config.pool_id,
            token_in: Coin::new(route.reward_denom_on_trade_zone.as_str(), input),
            token_out_denom: route.host_denom_on_trade_zone.clone(),
            token_out_min_amount: min_output,
        };
        let timeout = self.ica_timeout(ctx, EpochId::Main)?;
        self.submit_ica_tx(
            ctx,
            &route.trade_account,
            vec![msg],
            timeout,
            Some(IcaCallback::Swap {
                route_key: route_key.clone(),
                input_amount: input,
                min_output,
            }),
        )?;

        ctx.emit(Event::SwapSubmitted {
            height: ctx.block_height(),
            route_key: route_key.clone(),
            input_amount: input,
            min_output,
        });
        info!(route_key = %route_key, input, min_output, "Submitted swap");
        Ok(Some(input))
    }

    pub(crate) fn swap_callback(
        &mut self,
        ctx: &mut Context,
        route_key: &str,
        input_amount: u128,
        min_output: u128,
        ack: &AckResponse,
    ) -> Result<(), TradeError> {
        let responses = match ack {
            AckResponse::Success(responses) => responses,
            _ => {
                warn!(
                    route_key,
                    input_amount,
                    reason = %ack.failure_reason().unwrap_or_default(),
                    "Swap failed, reward tokens stay on the trade account"
                );
                return Ok(());
            }
        };
        let actual_output = responses
            .iter()
            .find_map(|r| match r {
                MsgResponse::Swap { token_out_amount } => Some(*token_out_amount),
                _ => None,
            })
            .ok_or_else(|| TradeError::MissingSwapOutput(route_key.to_string()))?;
        check_swap_output(route_key, min_output, actual_output)?;

        ctx.emit(Event::SwapCompleted {
            height: ctx.block_height(),
            route_key: route_key.to_string(),
            input_amount,
            output_amount: actual_output,
        });
        let route = state::trade_route(ctx.store(), route_key)?;
        self.submit_trade_hop(
            ctx,
            route_key,
            TradeHop::TradeToHost,
            &route.trade_account,
            &route.trade_to_host_channel_id,
            &route.host_account.address,
            Coin::new(route.host_denom_on_trade_zone.as_str(), actual_output),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(price: Decimal, loss: Decimal) -> TradeConfig {
        TradeConfig {
            pool_id: 1,
            swap_price: price,
            price_update_timestamp: 0,
            max_allowed_swap_loss_rate: loss,
            min_swap_amount: 0,
            max_swap_amount: u128::MAX,
        }
    }

    #[test]
    fn test_min_output_at_unit_price() {
        let cfg = config(Decimal::one(), Decimal::percent(5));
        assert_eq!(min_swap_output(&cfg, 1000).unwrap(), 950);
    }

    #[test]
    fn test_min_output_scales_with_price() {
        let cfg = config(Decimal::percent(200), Decimal::percent(10));
        assert_eq!(min_swap_output(&cfg, 1000).unwrap(), 1800);
    }

    #[test]
    fn test_full_loss_rate_rejected() {
        let cfg = config(Decimal::one(), Decimal::percent(101));
        assert!(matches!(
            min_swap_output(&cfg, 1000),
            Err(TradeError::InvalidLossRate(_))
        ));
    }

    #[test]
    fn test_output_below_minimum_is_excessive_loss() {
        let err = check_swap_output("ureward-uatom", 950, 949).unwrap_err();
        assert!(matches!(
            err,
            TradeError::ExcessiveSwapLoss {
                min_output: 950,
                actual_output: 949,
                ..
            }
        ));
        assert!(check_swap_output("ureward-uatom", 950, 950).is_ok());
    }

    proptest! {
        #[test]
        fn prop_loss_bound_holds(input in 1u128..1_000_000_000, loss_pct in 0u64..100, actual in 0u128..2_000_000_000) {
            let cfg = config(Decimal::one(), Decimal::percent(loss_pct));
            let min_output = min_swap_output(&cfg, input).unwrap();
            prop_assert!(min_output <= input);
            let accepted = check_swap_output("r-h", min_output, actual).is_ok();
            prop_assert_eq!(accepted, actual >= min_output);
        }
    }
}
