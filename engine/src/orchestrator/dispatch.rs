//! ICA and ICQ dispatch
//!
//! Outbound: every submission goes through here so the ledger entry is
//! written in the same transition that sends the packet or query.
//! Inbound: terminal transport results are resolved against the ledgers and
//! routed to the owning pipeline with an exhaustive match.
//!
//! # Critical Invariants
//!
//! 1. **Timeout equals error-ack**: both resolve the entry and run the same
//!    failure path of the callback
//! 2. **Failures never re-queue**: a failing callback is rolled back, logged
//!    and reported, but its ledger entry stays deleted

use crate::callbacks::ica::{IcaCallback, ICA_CALLBACKS};
use crate::callbacks::ledger::{CallbackKind, LedgerEntry, LedgerError};
use crate::callbacks::query::{QueryCallback, QUERY_CALLBACKS};
use crate::core::context::Context;
use crate::core::time::EpochId;
use crate::ibc::messages::{
    AckResponse, BalanceResponse, Coin, IcaMsg, PacketId, QueryResult, SpotPriceResponse,
};
use crate::ibc::transport::TransportError;
use crate::models::event::Event;
use crate::models::host_zone::IcaAccount;
use crate::models::state::{self, StateError};
use crate::orchestrator::engine::{Orchestrator, StakeError};
use crate::trade::TradeError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Failure to hand a packet or query to the transport
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Failed to encode query request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Orchestrator {
    // ========================================================================
    // Outbound
    // ========================================================================

    /// Timeout for ICA transactions sent during the current `epoch`
    pub(crate) fn ica_timeout(&self, ctx: &Context, epoch: EpochId) -> Result<u64, DispatchError> {
        let params = state::params(ctx.store())?;
        let tracker = state::epoch_tracker(ctx.store(), epoch)?;
        match tracker.ica_timeout(params.buffer_size) {
            Some(timeout) if timeout > ctx.block_time() => Ok(timeout),
            _ => Ok(ctx
                .block_time()
                .saturating_add(params.ibc_transfer_timeout_nanos)),
        }
    }

    /// Timeout for transfers leaving this chain
    pub(crate) fn transfer_timeout(&self, ctx: &Context) -> Result<u64, DispatchError> {
        let params = state::params(ctx.store())?;
        Ok(ctx
            .block_time()
            .saturating_add(params.ibc_transfer_timeout_nanos))
    }

    pub(crate) fn submit_ica_tx(
        &mut self,
        ctx: &mut Context,
        account: &IcaAccount,
        msgs: Vec<IcaMsg>,
        timeout: u64,
        callback: Option<IcaCallback>,
    ) -> Result<PacketId, DispatchError> {
        let num_msgs = msgs.len();
        let packet_id =
            self.ibc
                .submit_ica_tx(&account.connection_id, &account.owner(), msgs, timeout)?;
        if let Some(callback) = callback {
            ICA_CALLBACKS.register(ctx, &packet_id, callback)?;
        }
        debug!(
            packet = %packet_id,
            owner = %account.owner(),
            num_msgs,
            "Submitted ICA tx"
        );
        Ok(packet_id)
    }

    /// ICS-20 transfer out of this chain, checked against the rate limits
    pub(crate) fn send_transfer(
        &mut self,
        ctx: &mut Context,
        channel_id: &str,
        sender: &str,
        receiver: &str,
        token: Coin,
        callback: Option<IcaCallback>,
    ) -> Result<PacketId, DispatchError> {
        self.rate_limits
            .check_transfer(channel_id, &token.denom, token.amount)?;
        let timeout = self.transfer_timeout(ctx)?;
        let packet_id = self
            .ibc
            .send_transfer(channel_id, sender, receiver, token, timeout)?;
        if let Some(callback) = callback {
            ICA_CALLBACKS.register(ctx, &packet_id, callback)?;
        }
        Ok(packet_id)
    }

    pub(crate) fn submit_query<R: Serialize>(
        &mut self,
        ctx: &mut Context,
        connection_id: &str,
        path: &str,
        request: &R,
        callback: QueryCallback,
    ) -> Result<String, DispatchError> {
        let params = state::params(ctx.store())?;
        let timeout = ctx.block_time().saturating_add(params.query_ttl_nanos);
        let request = serde_json::to_vec(request)?;
        let query_id = self
            .queries
            .submit_query(connection_id, path, request, timeout)?;
        QUERY_CALLBACKS.register(ctx, &query_id, callback)?;
        Ok(query_id)
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Deliver the acknowledgement of an ICA transaction or transfer.
    ///
    /// A delivery for an unknown packet is a no-op. A callback error is
    /// returned after being logged; callers must not abort the block on it.
    pub fn on_acknowledgement(
        &mut self,
        ctx: &mut Context,
        packet_id: &PacketId,
        ack: AckResponse,
    ) -> Result<(), StakeError> {
        let key = packet_id.to_string();
        let result = ICA_CALLBACKS.resolve(ctx, packet_id, |ctx, entry: LedgerEntry<PacketId, IcaCallback>| {
            if !self.callbacks.is_registered(&entry.callback_id) {
                warn!(packet = %key, callback_id = entry.callback_id.as_str(), "No handler for callback id");
                return Ok(());
            }
            self.route_ica_callback(ctx, entry.args, &ack)
        });
        self.report(ctx, "ica", &key, result)
    }

    pub fn on_timeout(&mut self, ctx: &mut Context, packet_id: &PacketId) -> Result<(), StakeError> {
        self.on_acknowledgement(ctx, packet_id, AckResponse::Timeout)
    }

    /// Deliver the response bytes of an interchain query
    pub fn on_query_response(
        &mut self,
        ctx: &mut Context,
        query_id: &str,
        response: &[u8],
    ) -> Result<(), StakeError> {
        self.resolve_query(ctx, query_id, QueryResult::Response(response.to_vec()))
    }

    /// The query expired without a response
    pub fn on_query_timeout(&mut self, ctx: &mut Context, query_id: &str) -> Result<(), StakeError> {
        self.resolve_query(ctx, query_id, QueryResult::Timeout)
    }

    fn resolve_query(
        &mut self,
        ctx: &mut Context,
        query_id: &str,
        result: QueryResult,
    ) -> Result<(), StakeError> {
        let key = query_id.to_string();
        let resolved = QUERY_CALLBACKS.resolve(ctx, &key, |ctx, entry: LedgerEntry<String, QueryCallback>| {
            if !self.callbacks.is_registered(entry.args.callback_id()) {
                warn!(query_id = %key, callback_id = entry.callback_id.as_str(), "No handler for callback id");
                return Ok(());
            }
            self.route_query_callback(ctx, entry.args, result)
        });
        self.report(ctx, "icq", query_id, resolved)
    }

    fn report(
        &self,
        ctx: &mut Context,
        kind: &str,
        key: &str,
        result: Result<bool, StakeError>,
    ) -> Result<(), StakeError> {
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(kind, key, class = ?err.class(), error = %err, "Callback failed");
                if let StakeError::Trade(TradeError::ExcessiveSwapLoss {
                    route_key,
                    min_output,
                    actual_output,
                }) = &err
                {
                    ctx.emit(Event::SwapLossExceeded {
                        height: ctx.block_height(),
                        route_key: route_key.clone(),
                        min_output: *min_output,
                        actual_output: *actual_output,
                    });
                }
                ctx.emit(Event::CallbackFailed {
                    height: ctx.block_height(),
                    callback_id: kind.to_string(),
                    key: key.to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn route_ica_callback(
        &mut self,
        ctx: &mut Context,
        callback: IcaCallback,
        ack: &AckResponse,
    ) -> Result<(), StakeError> {
        match callback {
            IcaCallback::DepositTransfer { record_id } => {
                self.deposit_transfer_callback(ctx, record_id, ack)?
            }
            IcaCallback::Delegate {
                chain_id,
                record_id,
                splits,
            } => self.delegate_callback(ctx, &chain_id, record_id, &splits, ack)?,
            IcaCallback::Undelegate {
                chain_id,
                epoch_numbers,
                splits,
            } => self.undelegate_callback(ctx, &chain_id, &epoch_numbers, &splits, ack)?,
            IcaCallback::Sweep {
                chain_id,
                epoch_numbers,
                amount,
            } => self.sweep_callback(ctx, &chain_id, &epoch_numbers, amount, ack)?,
            IcaCallback::Reinvest { chain_id, amount } => {
                self.reinvest_callback(ctx, &chain_id, amount, ack)?
            }
            IcaCallback::Rebalance {
                chain_id,
                redelegations,
            } => self.rebalance_callback(ctx, &chain_id, &redelegations, ack)?,
            IcaCallback::CommunityPoolDeposit { chain_id, amount } => {
                self.community_pool_deposit_callback(ctx, &chain_id, amount, ack)?
            }
            IcaCallback::TradeHop {
                route_key,
                hop,
                amount,
            } => self.trade_hop_callback(ctx, &route_key, hop, amount, ack)?,
            IcaCallback::Swap {
                route_key,
                input_amount,
                min_output,
            } => self.swap_callback(ctx, &route_key, input_amount, min_output, ack)?,
        }
        Ok(())
    }

    fn route_query_callback(
        &mut self,
        ctx: &mut Context,
        callback: QueryCallback,
        result: QueryResult,
    ) -> Result<(), StakeError> {
        let response = match result {
            QueryResult::Response(bytes) => bytes,
            QueryResult::Timeout => {
                if let QueryCallback::RedemptionBalance {
                    chain_id,
                    epoch_numbers,
                    ..
                } = &callback
                {
                    self.redemption_balance_timeout(ctx, chain_id, epoch_numbers)?;
                }
                warn!(callback_id = callback.callback_id(), "Interchain query timed out");
                return Ok(());
            }
        };

        match callback {
            QueryCallback::WithdrawalBalance { chain_id } => {
                let balance: BalanceResponse = decode("balance", &response)?;
                self.withdrawal_balance_callback(ctx, &chain_id, balance.amount)?
            }
            QueryCallback::RedemptionBalance {
                chain_id,
                epoch_numbers,
                expected_amount,
            } => {
                let balance: BalanceResponse = decode("balance", &response)?;
                self.redemption_balance_callback(
                    ctx,
                    &chain_id,
                    &epoch_numbers,
                    expected_amount,
                    balance.amount,
                )?
            }
            QueryCallback::CommunityPoolBalance { chain_id } => {
                let balance: BalanceResponse = decode("balance", &response)?;
                self.community_pool_balance_callback(ctx, &chain_id, balance.amount)?
            }
            QueryCallback::WithdrawalRewardBalance { route_key } => {
                let balance: BalanceResponse = decode("balance", &response)?;
                self.withdrawal_reward_balance_callback(ctx, &route_key, balance.amount)?
            }
            QueryCallback::TradeRewardBalance { route_key } => {
                let balance: BalanceResponse = decode("balance", &response)?;
                self.trade_reward_balance_callback(ctx, &route_key, balance.amount)?
            }
            QueryCallback::PoolPrice { route_key } => {
                let price: SpotPriceResponse = decode("spot price", &response)?;
                self.pool_price_callback(ctx, &route_key, price.price)?
            }
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(kind: &'static str, bytes: &[u8]) -> Result<T, StakeError> {
    serde_json::from_slice(bytes).map_err(|e| StakeError::MalformedPayload {
        kind,
        reason: e.to_string(),
    })
}
