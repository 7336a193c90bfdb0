//! Reward token hops towards the trade zone

use crate::callbacks::ica::{IcaCallback, TradeHop};
use crate::callbacks::query::QueryCallback;
use crate::core::context::Context;
use crate::core::time::EpochId;
use crate::ibc::messages::{AckResponse, BalanceQuery, Coin, IcaMsg, BANK_BALANCE_PATH};
use crate::models::event::Event;
use crate::models::host_zone::IcaAccount;
use crate::models::state::{self, TRADE_ROUTES};
use crate::orchestrator::engine::Orchestrator;
use crate::trade::TradeError;
use tracing::{debug, error, info, warn};

impl Orchestrator {
    /// Query the reward balance on every route's host account; the response
    /// starts hop 1
    pub fn transfer_all_reward_tokens(&mut self, ctx: &mut Context) -> Result<(), TradeError> {
        for route in state::values(&TRADE_ROUTES, ctx.store())? {
            let key = route.key();
            let result = ctx.atomic(|ctx| {
                self.submit_query(
                    ctx,
                    &route.host_account.connection_id,
                    BANK_BALANCE_PATH,
                    &BalanceQuery {
                        address: route.host_account.address.clone(),
                        denom: route.reward_denom_on_host_zone.clone(),
                    },
                    QueryCallback::WithdrawalRewardBalance {
                        route_key: key.clone(),
                    },
                )
            });
            if let Err(err) = result {
                error!(route_key = %key, error = %err, "Failed to query reward balance");
            }
        }
        Ok(())
    }

    /// Submit one hop as an ICS-20 transfer executed by `account`
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn submit_trade_hop(
        &mut self,
        ctx: &mut Context,
        route_key: &str,
        hop: TradeHop,
        account: &IcaAccount,
        channel_id: &str,
        receiver: &str,
        token: Coin,
    ) -> Result<(), TradeError> {
        let timeout = self.ica_timeout(ctx, EpochId::Main)?;
        let amount = token.amount;
        let msg = IcaMsg::Transfer {
            source_channel: channel_id.to_string(),
            sender: account.address.clone(),
            receiver: receiver.to_string(),
            token,
            timeout_timestamp: timeout,
        };
        self.submit_ica_tx(
            ctx,
            account,
            vec![msg],
            timeout,
            Some(IcaCallback::TradeHop {
                route_key: route_key.to_string(),
                hop,
                amount,
            }),
        )?;
        debug!(route_key, hop = hop.as_str(), amount, "Submitted trade hop");
        Ok(())
    }

    pub(crate) fn withdrawal_reward_balance_callback(
        &mut self,
        ctx: &mut Context,
        route_key: &str,
        amount: u128,
    ) -> Result<(), TradeError> {
        if amount == 0 {
            return Ok(());
        }
        let route = state::trade_route(ctx.store(), route_key)?;
        self.submit_trade_hop(
            ctx,
            route_key,
            TradeHop::HostToReward,
            &route.host_account,
            &route.host_to_reward_channel_id,
            &route.reward_account.address,
            Coin::new(route.reward_denom_on_host_zone.as_str(), amount),
        )
    }

    pub(crate) fn trade_hop_callback(
        &mut self,
        ctx: &mut Context,
        route_key: &str,
        hop: TradeHop,
        amount: u128,
        ack: &AckResponse,
    ) -> Result<(), TradeError> {
        if !ack.is_success() {
            warn!(
                route_key,
                hop = hop.as_str(),
                amount,
                reason = %ack.failure_reason().unwrap_or_default(),
                "Trade hop failed, tokens stay on the sending account"
            );
            return Ok(());
        }
        ctx.emit(Event::TradeHopCompleted {
            height: ctx.block_height(),
            route_key: route_key.to_string(),
            hop: hop.as_str().to_string(),
            amount,
        });

        match hop {
            TradeHop::HostToReward => {
                let route = state::trade_route(ctx.store(), route_key)?;
                self.submit_trade_hop(
                    ctx,
                    route_key,
                    TradeHop::RewardToTrade,
                    &route.reward_account,
                    &route.reward_to_trade_channel_id,
                    &route.trade_account.address,
                    Coin::new(route.reward_denom_on_reward_zone.as_str(), amount),
                )
            }
            // The swap is driven by the trade account balance query
            TradeHop::RewardToTrade => Ok(()),
            TradeHop::TradeToHost => {
                info!(route_key, amount, "Swapped rewards returned to host zone");
                Ok(())
            }
        }
    }
}
