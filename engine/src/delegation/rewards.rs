//! Staking reward harvest
//!
//! Rewards accrue on the host zone. Every main epoch the delegation account
//! claims them into the withdrawal account; a balance query then moves the
//! withdrawal balance back to the delegation account where it is queued for
//! delegation like any other deposit. The protocol fee is taken by minting
//! liquid tokens to the reward collector, which the mint epoch hands to the
//! fee recipient.

use crate::callbacks::ica::IcaCallback;
use crate::callbacks::query::QueryCallback;
use crate::core::context::Context;
use crate::core::decimal::DecimalExt;
use crate::core::time::EpochId;
use crate::delegation::DepositError;
use crate::ibc::messages::{AckResponse, BalanceQuery, Coin, IcaMsg, BANK_BALANCE_PATH};
use crate::models::deposit::{DepositRecord, DepositSource, DepositStatus};
use crate::models::event::Event;
use crate::models::host_zone::{HostZone, IcaAccountType};
use crate::models::state::{self, DEPOSIT_RECORDS};
use crate::orchestrator::engine::Orchestrator;
use tracing::{debug, error, info, warn};

impl Orchestrator {
    /// Withdraw accrued rewards from every validator we delegate to
    pub fn claim_accrued_staking_rewards(&mut self, ctx: &mut Context) -> Result<(), DepositError> {
        for zone in state::active_host_zones(ctx.store())? {
            if let Err(err) = ctx.atomic(|ctx| self.claim_zone_rewards(ctx, &zone)) {
                error!(chain_id = %zone.chain_id, error = %err, "Failed to claim staking rewards");
            }
        }
        Ok(())
    }

    fn claim_zone_rewards(&mut self, ctx: &mut Context, zone: &HostZone) -> Result<(), DepositError> {
        let delegation = state::ica_account(zone, IcaAccountType::Delegation)?;
        let msgs: Vec<IcaMsg> = zone
            .validators
            .iter()
            .filter(|v| v.delegation > 0)
            .map(|v| IcaMsg::WithdrawReward {
                delegator_address: delegation.address.clone(),
                validator_address: v.address.clone(),
            })
            .collect();
        if msgs.is_empty() {
            return Ok(());
        }
        let timeout = self.ica_timeout(ctx, EpochId::Main)?;
        self.submit_ica_tx(ctx, &delegation, msgs, timeout, None)?;
        Ok(())
    }

    /// Point delegation rewards at the withdrawal account
    pub fn set_withdrawal_address(&mut self, ctx: &mut Context) -> Result<(), DepositError> {
        for zone in state::active_host_zones(ctx.store())? {
            let result = ctx.atomic(|ctx| -> Result<(), DepositError> {
                let delegation = state::ica_account(&zone, IcaAccountType::Delegation)?;
                let withdrawal = state::ica_account(&zone, IcaAccountType::Withdrawal)?;
                let timeout = self.ica_timeout(ctx, EpochId::Main)?;
                let msg = IcaMsg::SetWithdrawAddress {
                    delegator_address: delegation.address.clone(),
                    withdraw_address: withdrawal.address,
                };
                self.submit_ica_tx(ctx, &delegation, vec![msg], timeout, None)?;
                Ok(())
            });
            if let Err(err) = result {
                debug!(chain_id = %zone.chain_id, error = %err, "Skipped withdrawal address update");
            }
        }
        Ok(())
    }

    /// Query every withdrawal account balance; the response reinvests it
    pub fn reinvest_rewards(&mut self, ctx: &mut Context) -> Result<(), DepositError> {
        for zone in state::active_host_zones(ctx.store())? {
            let result = ctx.atomic(|ctx| -> Result<(), DepositError> {
                let withdrawal = state::ica_account(&zone, IcaAccountType::Withdrawal)?;
                let request = BalanceQuery {
                    address: withdrawal.address,
                    denom: zone.host_denom.clone(),
                };
                self.submit_query(
                    ctx,
                    &zone.connection_id,
                    BANK_BALANCE_PATH,
                    &request,
                    QueryCallback::WithdrawalBalance {
                        chain_id: zone.chain_id.clone(),
                    },
                )?;
                Ok(())
            });
            if let Err(err) = result {
                error!(chain_id = %zone.chain_id, error = %err, "Failed to query withdrawal balance");
            }
        }
        Ok(())
    }

    pub(crate) fn withdrawal_balance_callback(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        amount: u128,
    ) -> Result<(), DepositError> {
        if amount == 0 {
            debug!(chain_id, "No rewards to reinvest");
            return Ok(());
        }
        let zone = state::host_zone(ctx.store(), chain_id)?;
        let withdrawal = state::ica_account(&zone, IcaAccountType::Withdrawal)?;
        let delegation = state::ica_account(&zone, IcaAccountType::Delegation)?;
        let msg = IcaMsg::Send {
            from_address: withdrawal.address.clone(),
            to_address: delegation.address,
            amount: Coin::new(zone.host_denom.as_str(), amount),
        };
        let timeout = self.ica_timeout(ctx, EpochId::Main)?;
        self.submit_ica_tx(
            ctx,
            &withdrawal,
            vec![msg],
            timeout,
            Some(IcaCallback::Reinvest {
                chain_id: chain_id.to_string(),
                amount,
            }),
        )?;
        info!(chain_id, amount, "Submitted reward reinvestment");
        Ok(())
    }

    pub(crate) fn reinvest_callback(
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
                "Reinvestment failed, rewards stay on the withdrawal account"
            );
            return Ok(());
        }

        let params = state::params(ctx.store())?;
        let zone = state::host_zone(ctx.store(), chain_id)?;
        let main = state::epoch_tracker(ctx.store(), EpochId::Main)?;

        let id = state::next_deposit_record_id(ctx.store_mut())?;
        let mut record = DepositRecord::new(id, chain_id, &zone.host_denom, main.epoch_number);
        record.amount = amount;
        record.status = DepositStatus::QueuedForDelegation;
        record.source = DepositSource::WithdrawalAccount;
        DEPOSIT_RECORDS.save(ctx.store_mut(), id, &record)?;

        let fee_native = amount.saturating_mul(params.fee_rate_percent as u128) / 100;
        let fee_st_amount = if fee_native > 0 && zone.redemption_rate.is_positive() {
            zone.redemption_rate.div_floor(fee_native)?
        } else {
            0
        };
        if fee_st_amount > 0 {
            let collector = self.config.reward_collector_address.clone();
            self.bank
                .mint(ctx, &collector, &Coin::new(zone.liquid_denom(), fee_st_amount))?;
        }

        ctx.emit(Event::RewardsReinvested {
            height: ctx.block_height(),
            chain_id: chain_id.to_string(),
            native_amount: amount,
            fee_st_amount,
        });
        info!(chain_id, amount, fee_st_amount, record_id = id, "Reinvested rewards");
        Ok(())
    }

    /// Move collected liquid fees from the reward collector to the fee recipient
    pub fn allocate_host_zone_rewards(&self, ctx: &mut Context) -> Result<(), DepositError> {
        let collector = self.config.reward_collector_address.clone();
        let recipient = self.config.fee_recipient_address.clone();
        for zone in state::all_host_zones(ctx.store())? {
            let denom = zone.liquid_denom();
            let balance = self.bank.balance(ctx, &collector, &denom)?;
            if balance == 0 {
                continue;
            }
            self.bank
                .send(ctx, &collector, &recipient, &Coin::new(denom.as_str(), balance))?;
            ctx.emit(Event::RewardsAllocated {
                height: ctx.block_height(),
                denom: denom.clone(),
                amount: balance,
            });
            info!(denom = %denom, amount = balance, "Allocated protocol fees");
        }
        Ok(())
    }
}
