//! Community pool staking
//!
//! Tokens the host zone's community pool sends to the deposit ICA are
//! brought to this chain, liquid staked on behalf of the local holding
//! address, and the liquid tokens are sent back to the return ICA.

use crate::callbacks::ica::IcaCallback;
use crate::callbacks::query::QueryCallback;
use crate::core::context::Context;
use crate::core::time::EpochId;
use crate::delegation::DepositError;
use crate::ibc::messages::{AckResponse, BalanceQuery, Coin, IcaMsg, BANK_BALANCE_PATH};
use crate::ibc::transport::escrow_address;
use crate::models::event::Event;
use crate::models::host_zone::IcaAccountType;
use crate::models::state;
use crate::orchestrator::engine::Orchestrator;
use tracing::{debug, error, info, warn};

impl Orchestrator {
    /// Query the community pool deposit account of every zone that has one
    pub fn process_all_community_pool_tokens(
        &mut self,
        ctx: &mut Context,
    ) -> Result<(), DepositError> {
        for zone in state::active_host_zones(ctx.store())? {
            let deposit = match zone.account(IcaAccountType::CommunityPoolDeposit) {
                Some(account) => account.clone(),
                None => continue,
            };
            let result = ctx.atomic(|ctx| {
                self.submit_query(
                    ctx,
                    &zone.connection_id,
                    BANK_BALANCE_PATH,
                    &BalanceQuery {
                        address: deposit.address.clone(),
                        denom: zone.host_denom.clone(),
                    },
                    QueryCallback::CommunityPoolBalance {
                        chain_id: zone.chain_id.clone(),
                    },
                )
            });
            if let Err(err) = result {
                error!(chain_id = %zone.chain_id, error = %err, "Failed to query community pool balance");
            }
        }
        Ok(())
    }

    pub(crate) fn community_pool_balance_callback(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        amount: u128,
    ) -> Result<(), DepositError> {
        if amount == 0 {
            debug!(chain_id, "Community pool deposit account is empty");
            return Ok(());
        }
        let zone = state::host_zone(ctx.store(), chain_id)?;
        let deposit = state::ica_account(&zone, IcaAccountType::CommunityPoolDeposit)?;
        let timeout = self.ica_timeout(ctx, EpochId::Main)?;
        let msg = IcaMsg::Transfer {
            source_channel: zone.transfer_channel_id.clone(),
            sender: deposit.address.clone(),
            receiver: self.config.community_pool_holding_address.clone(),
            token: Coin::new(zone.host_denom.as_str(), amount),
            timeout_timestamp: timeout,
        };
        self.submit_ica_tx(
            ctx,
            &deposit,
            vec![msg],
            timeout,
            Some(IcaCallback::CommunityPoolDeposit {
                chain_id: chain_id.to_string(),
                amount,
            }),
        )?;
        info!(chain_id, amount, "Moving community pool tokens to this chain");
        Ok(())
    }

    pub(crate) fn community_pool_deposit_callback(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        amount: u128,
        ack: &AckResponse,
    ) -> Result<(), DepositError> {
        if !ack.is_success() {
            warn!(
                chain_id,
                amount,
                reason = %ack.failure_reason().unwrap_or_default(),
                "Community pool transfer failed, tokens stay on the host zone"
            );
            return Ok(());
        }

        let zone = state::host_zone(ctx.store(), chain_id)?;
        let holding = self.config.community_pool_holding_address.clone();
        self.bank
            .mint(ctx, &holding, &Coin::new(zone.ibc_denom.as_str(), amount))?;
        if zone.halted {
            warn!(chain_id, amount, "Host zone halted, community pool tokens held locally");
            return Ok(());
        }

        let st_amount = self.stake_on_behalf(ctx, &holding, &zone, amount)?;
        let return_account = state::ica_account(&zone, IcaAccountType::CommunityPoolReturn)?;
        let token = Coin::new(zone.liquid_denom(), st_amount);
        self.bank.send(
            ctx,
            &holding,
            &escrow_address(&zone.transfer_channel_id),
            &token,
        )?;
        self.send_transfer(
            ctx,
            &zone.transfer_channel_id,
            &holding,
            &return_account.address,
            token,
            None,
        )?;

        ctx.emit(Event::CommunityPoolStaked {
            height: ctx.block_height(),
            chain_id: chain_id.to_string(),
            native_amount: amount,
            st_amount,
        });
        info!(chain_id, amount, st_amount, "Staked community pool tokens");
        Ok(())
    }
}
