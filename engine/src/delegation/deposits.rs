//! Liquid staking and the deposit record lifecycle
//!
//! ```text
//! liquid_stake ──► record (QueuedForTransfer) ──transfer──► TransferInProgress
//!                                                             │ ack
//!                           DelegationInProgress ◄──stake── QueuedForDelegation
//!                                    │ ack
//!                                 deleted, delegations credited
//! ```
//!
//! # Critical Invariants
//!
//! 1. **Amount conservation**: a record's amount never changes after it
//!    leaves `QueuedForTransfer`; a failed step reverts the status only
//! 2. **Stale deliveries are no-ops**: a callback for a record that is no
//!    longer in the matching in-progress status changes nothing
//! 3. **Halted zones**: no new stake is accepted and no deposit moves while
//!    the zone is halted

use crate::callbacks::ica::IcaCallback;
use crate::core::context::Context;
use crate::core::decimal::DecimalExt;
use crate::core::time::EpochId;
use crate::delegation::allocation::{allocate_delegation, SplitDelegation};
use crate::delegation::DepositError;
use crate::ibc::messages::{AckResponse, Coin, IcaMsg};
use crate::models::deposit::{DepositRecord, DepositSource, DepositStatus};
use crate::models::event::Event;
use crate::models::host_zone::{HostZone, IcaAccountType};
use crate::models::state::{self, DEPOSIT_RECORDS};
use crate::orchestrator::engine::Orchestrator;
use crate::orchestrator::hooks::StakeHooks;
use tracing::{debug, error, info, warn};

impl Orchestrator {
    // ========================================================================
    // Liquid stake
    // ========================================================================

    /// Deposit `amount` of the host zone's ibc denom and receive liquid tokens.
    ///
    /// Returns the amount of liquid tokens minted to `staker`.
    pub fn liquid_stake(
        &self,
        ctx: &mut Context,
        staker: &str,
        amount: u128,
        host_denom: &str,
    ) -> Result<u128, DepositError> {
        if staker.trim().is_empty() {
            return Err(DepositError::Validation("staker must be set".to_string()));
        }
        ctx.atomic(|ctx| {
            let zone = state::host_zone_by_denom(ctx.store(), host_denom)?;
            self.stake_on_behalf(ctx, staker, &zone, amount)
        })
    }

    /// Shared by user stakes and community pool deposits: take `amount` from
    /// `staker`, mint liquid tokens back at the current rate and queue the
    /// native tokens for transfer.
    pub(crate) fn stake_on_behalf(
        &self,
        ctx: &mut Context,
        staker: &str,
        zone: &HostZone,
        amount: u128,
    ) -> Result<u128, DepositError> {
        if amount == 0 {
            return Err(DepositError::Validation("amount must be positive".to_string()));
        }
        if zone.halted {
            return Err(DepositError::HostZoneHalted(zone.chain_id.clone()));
        }
        if !zone.redemption_rate.is_positive() {
            return Err(DepositError::Validation(format!(
                "{} has no redemption rate",
                zone.chain_id
            )));
        }
        let st_amount = zone.redemption_rate.div_floor(amount)?;
        if st_amount == 0 {
            return Err(DepositError::Validation(format!(
                "{} {} is too small to mint any liquid tokens",
                amount, zone.host_denom
            )));
        }

        self.bank.send(
            ctx,
            staker,
            &self.config.deposit_address,
            &Coin::new(zone.ibc_denom.as_str(), amount),
        )?;
        self.bank
            .mint(ctx, staker, &Coin::new(zone.liquid_denom(), st_amount))?;

        let main = state::epoch_tracker(ctx.store(), EpochId::Main)?;
        let mut record = match self.open_deposit_record(ctx, &zone.chain_id, main.epoch_number)? {
            Some(record) => record,
            None => {
                let id = state::next_deposit_record_id(ctx.store_mut())?;
                DepositRecord::new(id, &zone.chain_id, &zone.ibc_denom, main.epoch_number)
            }
        };
        record.amount = record
            .amount
            .checked_add(amount)
            .ok_or_else(|| DepositError::Validation("deposit amount overflow".to_string()))?;
        DEPOSIT_RECORDS.save(ctx.store_mut(), record.id, &record)?;

        self.stake_hooks
            .after_liquid_stake(ctx, staker, &zone.chain_id, st_amount);
        ctx.emit(Event::LiquidStake {
            height: ctx.block_height(),
            chain_id: zone.chain_id.clone(),
            staker: staker.to_string(),
            native_amount: amount,
            st_amount,
        });
        info!(
            chain_id = %zone.chain_id,
            staker,
            native_amount = amount,
            st_amount,
            "Liquid staked"
        );
        Ok(st_amount)
    }

    /// The local record still collecting deposits for `epoch`
    fn open_deposit_record(
        &self,
        ctx: &Context,
        chain_id: &str,
        epoch: u64,
    ) -> Result<Option<DepositRecord>, DepositError> {
        Ok(state::all_deposit_records(ctx.store())?
            .into_iter()
            .find(|r| {
                r.host_zone_id == chain_id
                    && r.deposit_epoch_number == epoch
                    && r.source == DepositSource::Local
                    && r.status == DepositStatus::QueuedForTransfer
            }))
    }

    // ========================================================================
    // Epoch steps
    // ========================================================================

    /// Open one empty record per host zone for `epoch`; idempotent
    pub fn create_deposit_records_for_epoch(
        &self,
        ctx: &mut Context,
        epoch: u64,
    ) -> Result<(), DepositError> {
        for zone in state::all_host_zones(ctx.store())? {
            if self.open_deposit_record(ctx, &zone.chain_id, epoch)?.is_some() {
                continue;
            }
            let id = state::next_deposit_record_id(ctx.store_mut())?;
            let record = DepositRecord::new(id, &zone.chain_id, &zone.ibc_denom, epoch);
            DEPOSIT_RECORDS.save(ctx.store_mut(), id, &record)?;
            debug!(chain_id = %zone.chain_id, record_id = id, epoch, "Created deposit record");
        }
        Ok(())
    }

    /// Send every closed, queued record to its zone's delegation account.
    ///
    /// Records of the running epoch are still collecting and are left alone.
    /// A failing record is logged and skipped.
    pub fn transfer_existing_deposits(
        &mut self,
        ctx: &mut Context,
        epoch: u64,
    ) -> Result<(), DepositError> {
        for zone in state::active_host_zones(ctx.store())? {
            let records: Vec<DepositRecord> = state::all_deposit_records(ctx.store())?
                .into_iter()
                .filter(|r| {
                    r.host_zone_id == zone.chain_id
                        && r.source == DepositSource::Local
                        && r.status == DepositStatus::QueuedForTransfer
                        && r.deposit_epoch_number < epoch
                })
                .collect();
            for record in records {
                let record_id = record.id;
                if let Err(err) = ctx.atomic(|ctx| self.transfer_deposit(ctx, &zone, record)) {
                    error!(
                        chain_id = %zone.chain_id,
                        record_id,
                        error = %err,
                        "Failed to transfer deposit record"
                    );
                }
            }
        }
        Ok(())
    }

    fn transfer_deposit(
        &mut self,
        ctx: &mut Context,
        zone: &HostZone,
        mut record: DepositRecord,
    ) -> Result<(), DepositError> {
        if record.amount == 0 {
            DEPOSIT_RECORDS.remove(ctx.store_mut(), record.id);
            debug!(chain_id = %zone.chain_id, record_id = record.id, "Removed empty deposit record");
            return Ok(());
        }
        let delegation = state::ica_account(zone, IcaAccountType::Delegation)?;
        let token = Coin::new(zone.ibc_denom.as_str(), record.amount);

        // Vouchers leaving this chain are burned; a failed transfer re-mints them
        let deposit_address = self.config.deposit_address.clone();
        self.bank.burn(ctx, &deposit_address, &token)?;
        let packet_id = self.send_transfer(
            ctx,
            &zone.transfer_channel_id,
            &deposit_address,
            &delegation.address,
            token,
            Some(IcaCallback::DepositTransfer {
                record_id: record.id,
            }),
        )?;

        record.transition(DepositStatus::TransferInProgress)?;
        DEPOSIT_RECORDS.save(ctx.store_mut(), record.id, &record)?;
        ctx.emit(Event::DepositTransferSubmitted {
            height: ctx.block_height(),
            chain_id: zone.chain_id.clone(),
            record_id: record.id,
            amount: record.amount,
        });
        info!(
            chain_id = %zone.chain_id,
            record_id = record.id,
            amount = record.amount,
            packet = %packet_id,
            "Submitted deposit transfer"
        );
        Ok(())
    }

    /// Delegate queued records, at most `max_stake_ica_calls_per_epoch` ICA
    /// transactions per call
    pub fn stake_existing_deposits(
        &mut self,
        ctx: &mut Context,
        epoch: u64,
    ) -> Result<(), DepositError> {
        let params = state::params(ctx.store())?;
        let mut ica_calls = 0u64;

        for zone in state::active_host_zones(ctx.store())? {
            let records: Vec<DepositRecord> = state::all_deposit_records(ctx.store())?
                .into_iter()
                .filter(|r| {
                    r.host_zone_id == zone.chain_id
                        && r.status == DepositStatus::QueuedForDelegation
                })
                .collect();
            for record in records {
                if ica_calls >= params.max_stake_ica_calls_per_epoch {
                    info!(epoch, ica_calls, "Reached ICA call limit for this epoch");
                    return Ok(());
                }
                let record_id = record.id;
                match ctx.atomic(|ctx| self.delegate_deposit(ctx, &zone, record)) {
                    Ok(true) => ica_calls += 1,
                    Ok(false) => {}
                    Err(err) => error!(
                        chain_id = %zone.chain_id,
                        record_id,
                        error = %err,
                        "Failed to delegate deposit record"
                    ),
                }
            }
        }
        Ok(())
    }

    /// Returns whether an ICA transaction was submitted
    fn delegate_deposit(
        &mut self,
        ctx: &mut Context,
        zone: &HostZone,
        mut record: DepositRecord,
    ) -> Result<bool, DepositError> {
        if record.amount == 0 {
            DEPOSIT_RECORDS.remove(ctx.store_mut(), record.id);
            return Ok(false);
        }
        let delegation = state::ica_account(zone, IcaAccountType::Delegation)?;
        let splits = allocate_delegation(&zone.validators, record.amount)?;
        let msgs = splits
            .iter()
            .map(|split| IcaMsg::Delegate {
                delegator_address: delegation.address.clone(),
                validator_address: split.validator_address.clone(),
                amount: Coin::new(zone.host_denom.as_str(), split.amount),
            })
            .collect();

        let timeout = self.ica_timeout(ctx, EpochId::Main)?;
        self.submit_ica_tx(
            ctx,
            &delegation,
            msgs,
            timeout,
            Some(IcaCallback::Delegate {
                chain_id: zone.chain_id.clone(),
                record_id: record.id,
                splits,
            }),
        )?;

        record.transition(DepositStatus::DelegationInProgress)?;
        DEPOSIT_RECORDS.save(ctx.store_mut(), record.id, &record)?;
        ctx.emit(Event::DelegationSubmitted {
            height: ctx.block_height(),
            chain_id: zone.chain_id.clone(),
            record_id: record.id,
            amount: record.amount,
        });
        Ok(true)
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    pub(crate) fn deposit_transfer_callback(
        &mut self,
        ctx: &mut Context,
        record_id: u64,
        ack: &AckResponse,
    ) -> Result<(), DepositError> {
        let mut record = state::deposit_record(ctx.store(), record_id)?;
        if record.status != DepositStatus::TransferInProgress {
            debug!(record_id, status = ?record.status, "Ignoring stale transfer callback");
            return Ok(());
        }

        if ack.is_success() {
            record.transition(DepositStatus::QueuedForDelegation)?;
            DEPOSIT_RECORDS.save(ctx.store_mut(), record_id, &record)?;
            ctx.emit(Event::DepositTransferred {
                height: ctx.block_height(),
                chain_id: record.host_zone_id.clone(),
                record_id,
            });
            info!(chain_id = %record.host_zone_id, record_id, "Deposit transferred");
            return Ok(());
        }

        // The vouchers come back to the deposit account
        let deposit_address = self.config.deposit_address.clone();
        self.bank.mint(
            ctx,
            &deposit_address,
            &Coin::new(record.denom.as_str(), record.amount),
        )?;
        record.transition(DepositStatus::QueuedForTransfer)?;
        self.revert_deposit_step(ctx, record, ack)
    }

    pub(crate) fn delegate_callback(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        record_id: u64,
        splits: &[SplitDelegation],
        ack: &AckResponse,
    ) -> Result<(), DepositError> {
        let mut record = state::deposit_record(ctx.store(), record_id)?;
        if record.status != DepositStatus::DelegationInProgress {
            debug!(record_id, status = ?record.status, "Ignoring stale delegation callback");
            return Ok(());
        }

        if !ack.is_success() {
            record.transition(DepositStatus::QueuedForDelegation)?;
            return self.revert_deposit_step(ctx, record, ack);
        }

        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        for split in splits {
            let validator = zone.validator_mut(&split.validator_address).ok_or_else(|| {
                DepositError::UnknownValidator {
                    chain_id: chain_id.to_string(),
                    address: split.validator_address.clone(),
                }
            })?;
            validator.delegation = validator.delegation.saturating_add(split.amount);
        }
        zone.total_delegated = zone.total_delegated.saturating_add(record.amount);
        state::save_host_zone(ctx.store_mut(), &zone)?;
        DEPOSIT_RECORDS.remove(ctx.store_mut(), record_id);

        ctx.emit(Event::DelegationCompleted {
            height: ctx.block_height(),
            chain_id: chain_id.to_string(),
            record_id,
            amount: record.amount,
        });
        info!(chain_id, record_id, amount = record.amount, "Delegation completed");
        Ok(())
    }

    fn revert_deposit_step(
        &self,
        ctx: &mut Context,
        mut record: DepositRecord,
        ack: &AckResponse,
    ) -> Result<(), DepositError> {
        record.failed_attempts = record.failed_attempts.saturating_add(1);
        DEPOSIT_RECORDS.save(ctx.store_mut(), record.id, &record)?;
        let reason = ack.failure_reason().unwrap_or_default();
        warn!(
            chain_id = %record.host_zone_id,
            record_id = record.id,
            status = ?record.status,
            failed_attempts = record.failed_attempts,
            reason = %reason,
            "Deposit step failed, record requeued"
        );
        ctx.emit(Event::DepositStepReverted {
            height: ctx.block_height(),
            chain_id: record.host_zone_id.clone(),
            record_id: record.id,
            failed_attempts: record.failed_attempts,
            reason,
        });
        Ok(())
    }
}
