//! Day-epoch unbonding steps
//!
//! ```text
//! UnbondingQueue ──initiate──► UnbondingInProgress ──(ack, matured)──► Unbonded
//!        ▲                            │ timeout / error
//!        └────────────────────────────┘
//! Unbonded ──balance query──► sweep transfer ──ack──► Claimable ──claims──► Claimed
//! ```
//!
//! # Critical Invariants
//!
//! 1. **Conservation**: the native amount of an unbonding equals the sum of
//!    the user redemption records written against it
//! 2. **Burn on ack**: escrowed liquid tokens are burned only once the host
//!    zone acknowledges the undelegation
//! 3. **Sweep exactly once**: `sweep_pending` blocks a second balance query
//!    or transfer for the same unbondings while a sweep callback for them is
//!    still registered; a flag left behind by a failed callback is retried

use crate::callbacks::ica::{IcaCallback, ICA_CALLBACKS};
use crate::callbacks::query::{QueryCallback, QUERY_CALLBACKS};
use crate::core::context::Context;
use crate::core::time::{EpochId, NANOS_PER_SECOND};
use crate::delegation::allocation::{allocate_undelegation, SplitDelegation};
use crate::ibc::messages::{AckResponse, BalanceQuery, Coin, IcaMsg, MsgResponse, BANK_BALANCE_PATH};
use crate::models::event::Event;
use crate::models::host_zone::{HostZone, IcaAccountType};
use crate::models::state::{self, EPOCH_UNBONDING_RECORDS};
use crate::models::unbonding::{EpochUnbondingRecord, HostZoneUnbonding, UnbondingStatus};
use crate::orchestrator::engine::Orchestrator;
use crate::unbonding::UnbondingError;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Apply `f` to the zone's unbonding in each of `epochs`, saving the records
fn update_unbondings<F>(
    ctx: &mut Context,
    chain_id: &str,
    epochs: &[u64],
    mut f: F,
) -> Result<(), UnbondingError>
where
    F: FnMut(u64, &mut HostZoneUnbonding) -> Result<(), UnbondingError>,
{
    for &epoch in epochs {
        let mut record = state::epoch_unbonding_record(ctx.store(), epoch)?;
        let unbonding =
            record
                .unbonding_mut(chain_id)
                .ok_or_else(|| UnbondingError::MissingUnbonding {
                    chain_id: chain_id.to_string(),
                    epoch,
                })?;
        f(epoch, unbonding)?;
        EPOCH_UNBONDING_RECORDS.save(ctx.store_mut(), epoch, &record)?;
    }
    Ok(())
}

/// Epochs of `chain_id` named by a registered balance query or sweep transfer
fn sweeps_in_flight(ctx: &Context, chain_id: &str) -> Result<BTreeSet<u64>, UnbondingError> {
    let mut epochs = BTreeSet::new();
    for entry in QUERY_CALLBACKS.entries(ctx)? {
        if let QueryCallback::RedemptionBalance {
            chain_id: zone,
            epoch_numbers,
            ..
        } = entry.args
        {
            if zone == chain_id {
                epochs.extend(epoch_numbers);
            }
        }
    }
    for entry in ICA_CALLBACKS.entries(ctx)? {
        if let IcaCallback::Sweep {
            chain_id: zone,
            epoch_numbers,
            ..
        } = entry.args
        {
            if zone == chain_id {
                epochs.extend(epoch_numbers);
            }
        }
    }
    Ok(epochs)
}

/// Epochs whose unbonding for `chain_id` is in `status`
fn epochs_in_status(
    ctx: &Context,
    chain_id: &str,
    epochs: &[u64],
    status: UnbondingStatus,
) -> Result<Vec<u64>, UnbondingError> {
    let mut matching = Vec::new();
    for &epoch in epochs {
        let record = state::epoch_unbonding_record(ctx.store(), epoch)?;
        if record.unbonding(chain_id).map(|u| u.status) == Some(status) {
            matching.push(epoch);
        }
    }
    Ok(matching)
}

impl Orchestrator {
    // ========================================================================
    // Initiate
    // ========================================================================

    /// Undelegate every queued redemption, one ICA transaction per zone
    pub fn initiate_all_host_zone_unbondings(
        &mut self,
        ctx: &mut Context,
        epoch: u64,
    ) -> Result<(), UnbondingError> {
        for zone in state::active_host_zones(ctx.store())? {
            if let Err(err) = ctx.atomic(|ctx| self.initiate_unbonding(ctx, &zone)) {
                error!(
                    chain_id = %zone.chain_id,
                    epoch,
                    error = %err,
                    "Failed to initiate unbonding"
                );
            }
        }
        Ok(())
    }

    fn initiate_unbonding(&mut self, ctx: &mut Context, zone: &HostZone) -> Result<(), UnbondingError> {
        let mut epoch_numbers = Vec::new();
        let mut total: u128 = 0;
        for record in state::all_epoch_unbonding_records(ctx.store())? {
            if let Some(unbonding) = record.unbonding(&zone.chain_id) {
                if unbonding.status == UnbondingStatus::UnbondingQueue && unbonding.native_amount > 0 {
                    epoch_numbers.push(record.epoch_number);
                    total = total.saturating_add(unbonding.native_amount);
                }
            }
        }
        if total == 0 {
            return Ok(());
        }

        let delegation = state::ica_account(zone, IcaAccountType::Delegation)?;
        let splits = allocate_undelegation(&zone.validators, total)?;
        let msgs = splits
            .iter()
            .map(|split| IcaMsg::Undelegate {
                delegator_address: delegation.address.clone(),
                validator_address: split.validator_address.clone(),
                amount: Coin::new(zone.host_denom.as_str(), split.amount),
            })
            .collect();
        let timeout = self.ica_timeout(ctx, EpochId::Day)?;
        self.submit_ica_tx(
            ctx,
            &delegation,
            msgs,
            timeout,
            Some(IcaCallback::Undelegate {
                chain_id: zone.chain_id.clone(),
                epoch_numbers: epoch_numbers.clone(),
                splits,
            }),
        )?;

        update_unbondings(ctx, &zone.chain_id, &epoch_numbers, |epoch, unbonding| {
            Ok(unbonding.transition(epoch, UnbondingStatus::UnbondingInProgress)?)
        })?;
        ctx.emit(Event::UnbondingInitiated {
            height: ctx.block_height(),
            chain_id: zone.chain_id.clone(),
            native_amount: total,
            epoch_numbers: epoch_numbers.clone(),
        });
        info!(
            chain_id = %zone.chain_id,
            native_amount = total,
            epochs = ?epoch_numbers,
            "Initiated unbonding"
        );
        Ok(())
    }

    pub(crate) fn undelegate_callback(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        epoch_numbers: &[u64],
        splits: &[SplitDelegation],
        ack: &AckResponse,
    ) -> Result<(), UnbondingError> {
        let in_progress =
            epochs_in_status(ctx, chain_id, epoch_numbers, UnbondingStatus::UnbondingInProgress)?;
        if in_progress.is_empty() {
            debug!(chain_id, "Ignoring stale undelegation callback");
            return Ok(());
        }

        let responses = match ack {
            AckResponse::Success(responses) => responses,
            _ => {
                update_unbondings(ctx, chain_id, &in_progress, |epoch, unbonding| {
                    unbonding.transition(epoch, UnbondingStatus::UnbondingQueue)?;
                    unbonding.failed_attempts = unbonding.failed_attempts.saturating_add(1);
                    Ok(())
                })?;
                let reason = ack.failure_reason().unwrap_or_default();
                warn!(chain_id, epochs = ?in_progress, reason = %reason, "Undelegation failed, unbonding requeued");
                ctx.emit(Event::UnbondingReverted {
                    height: ctx.block_height(),
                    chain_id: chain_id.to_string(),
                    epoch_numbers: in_progress,
                    reason,
                });
                return Ok(());
            }
        };

        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        let fallback = ctx
            .block_time()
            .saturating_add(zone.unbonding_period_secs.saturating_mul(NANOS_PER_SECOND));
        let completion_time = responses
            .iter()
            .filter_map(|r| match r {
                MsgResponse::Undelegate { completion_time } => Some(*completion_time),
                _ => None,
            })
            .max()
            .unwrap_or(fallback);

        let mut st_to_burn: u128 = 0;
        update_unbondings(ctx, chain_id, &in_progress, |_, unbonding| {
            unbonding.completion_time = completion_time;
            st_to_burn = st_to_burn.saturating_add(unbonding.st_amount);
            Ok(())
        })?;

        let mut undelegated: u128 = 0;
        for split in splits {
            let validator = zone.validator_mut(&split.validator_address).ok_or_else(|| {
                UnbondingError::UndelegationOverdraw {
                    address: split.validator_address.clone(),
                    amount: split.amount,
                }
            })?;
            validator.delegation = validator.delegation.checked_sub(split.amount).ok_or_else(|| {
                UnbondingError::UndelegationOverdraw {
                    address: split.validator_address.clone(),
                    amount: split.amount,
                }
            })?;
            undelegated = undelegated.saturating_add(split.amount);
        }
        zone.total_delegated = zone.total_delegated.saturating_sub(undelegated);
        state::save_host_zone(ctx.store_mut(), &zone)?;

        if st_to_burn > 0 {
            let deposit_address = self.config.deposit_address.clone();
            self.bank
                .burn(ctx, &deposit_address, &Coin::new(zone.liquid_denom(), st_to_burn))?;
        }

        ctx.emit(Event::UndelegationAcknowledged {
            height: ctx.block_height(),
            chain_id: chain_id.to_string(),
            native_amount: undelegated,
            completion_time,
        });
        info!(
            chain_id,
            native_amount = undelegated,
            st_burned = st_to_burn,
            completion_time,
            "Undelegation acknowledged"
        );
        Ok(())
    }

    // ========================================================================
    // Sweep
    // ========================================================================

    /// Mark matured unbondings and query the redemption account before
    /// sweeping them home
    pub fn sweep_all_unbonded_tokens(&mut self, ctx: &mut Context) -> Result<(), UnbondingError> {
        for zone in state::all_host_zones(ctx.store())? {
            if let Err(err) = ctx.atomic(|ctx| self.sweep_host_zone(ctx, &zone)) {
                error!(chain_id = %zone.chain_id, error = %err, "Failed to sweep unbonded tokens");
            }
        }
        Ok(())
    }

    fn sweep_host_zone(&mut self, ctx: &mut Context, zone: &HostZone) -> Result<(), UnbondingError> {
        let now = ctx.block_time();
        let mut matured = Vec::new();
        let mut sweepable = Vec::new();
        let mut expected_amount: u128 = 0;
        let in_flight = sweeps_in_flight(ctx, &zone.chain_id)?;
        for record in state::all_epoch_unbonding_records(ctx.store())? {
            let unbonding = match record.unbonding(&zone.chain_id) {
                Some(unbonding) => unbonding,
                None => continue,
            };
            match unbonding.status {
                UnbondingStatus::UnbondingInProgress
                    if unbonding.completion_time != 0 && unbonding.completion_time <= now =>
                {
                    matured.push(record.epoch_number);
                }
                UnbondingStatus::Unbonded => {
                    if unbonding.sweep_pending {
                        if in_flight.contains(&record.epoch_number) {
                            continue;
                        }
                        warn!(
                            chain_id = %zone.chain_id,
                            epoch = record.epoch_number,
                            "Sweep flag has no pending callback, retrying sweep"
                        );
                    }
                }
                _ => continue,
            }
            sweepable.push(record.epoch_number);
            expected_amount = expected_amount.saturating_add(unbonding.native_amount);
        }

        update_unbondings(ctx, &zone.chain_id, &matured, |epoch, unbonding| {
            Ok(unbonding.transition(epoch, UnbondingStatus::Unbonded)?)
        })?;
        if sweepable.is_empty() {
            return Ok(());
        }

        let redemption = state::ica_account(zone, IcaAccountType::Redemption)?;
        self.submit_query(
            ctx,
            &zone.connection_id,
            BANK_BALANCE_PATH,
            &BalanceQuery {
                address: redemption.address,
                denom: zone.host_denom.clone(),
            },
            QueryCallback::RedemptionBalance {
                chain_id: zone.chain_id.clone(),
                epoch_numbers: sweepable.clone(),
                expected_amount,
            },
        )?;
        update_unbondings(ctx, &zone.chain_id, &sweepable, |_, unbonding| {
            unbonding.sweep_pending = true;
            Ok(())
        })?;
        debug!(chain_id = %zone.chain_id, epochs = ?sweepable, expected_amount, "Queried redemption balance");
        Ok(())
    }

    pub(crate) fn redemption_balance_callback(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        epoch_numbers: &[u64],
        expected_amount: u128,
        balance: u128,
    ) -> Result<(), UnbondingError> {
        let unbonded = epochs_in_status(ctx, chain_id, epoch_numbers, UnbondingStatus::Unbonded)?;
        if unbonded.is_empty() {
            return Ok(());
        }
        if balance < expected_amount {
            warn!(
                chain_id,
                balance,
                expected_amount,
                "Redemption account short of unbonded tokens, sweep deferred"
            );
            return self.clear_sweep_pending(ctx, chain_id, &unbonded);
        }

        let zone = state::host_zone(ctx.store(), chain_id)?;
        let redemption = state::ica_account(&zone, IcaAccountType::Redemption)?;
        let timeout = self.ica_timeout(ctx, EpochId::Day)?;
        let msg = IcaMsg::Transfer {
            source_channel: zone.transfer_channel_id.clone(),
            sender: redemption.address.clone(),
            receiver: self.config.deposit_address.clone(),
            token: Coin::new(zone.host_denom.as_str(), expected_amount),
            timeout_timestamp: timeout,
        };
        self.submit_ica_tx(
            ctx,
            &redemption,
            vec![msg],
            timeout,
            Some(IcaCallback::Sweep {
                chain_id: chain_id.to_string(),
                epoch_numbers: unbonded,
                amount: expected_amount,
            }),
        )?;
        info!(chain_id, amount = expected_amount, "Submitted sweep of unbonded tokens");
        Ok(())
    }

    /// The balance query expired; let the next day epoch ask again
    pub(crate) fn redemption_balance_timeout(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        epoch_numbers: &[u64],
    ) -> Result<(), UnbondingError> {
        let unbonded = epochs_in_status(ctx, chain_id, epoch_numbers, UnbondingStatus::Unbonded)?;
        self.clear_sweep_pending(ctx, chain_id, &unbonded)
    }

    fn clear_sweep_pending(
        &self,
        ctx: &mut Context,
        chain_id: &str,
        epochs: &[u64],
    ) -> Result<(), UnbondingError> {
        update_unbondings(ctx, chain_id, epochs, |_, unbonding| {
            unbonding.sweep_pending = false;
            Ok(())
        })
    }

    pub(crate) fn sweep_callback(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        epoch_numbers: &[u64],
        amount: u128,
        ack: &AckResponse,
    ) -> Result<(), UnbondingError> {
        let unbonded = epochs_in_status(ctx, chain_id, epoch_numbers, UnbondingStatus::Unbonded)?;
        if unbonded.is_empty() {
            debug!(chain_id, "Ignoring stale sweep callback");
            return Ok(());
        }

        if !ack.is_success() {
            self.clear_sweep_pending(ctx, chain_id, &unbonded)?;
            let reason = ack.failure_reason().unwrap_or_default();
            warn!(chain_id, epochs = ?unbonded, reason = %reason, "Sweep failed, retrying next day");
            ctx.emit(Event::SweepFailed {
                height: ctx.block_height(),
                chain_id: chain_id.to_string(),
                epoch_numbers: unbonded,
                reason,
            });
            return Ok(());
        }

        let zone = state::host_zone(ctx.store(), chain_id)?;
        let deposit_address = self.config.deposit_address.clone();
        self.bank
            .mint(ctx, &deposit_address, &Coin::new(zone.ibc_denom.as_str(), amount))?;
        update_unbondings(ctx, chain_id, &unbonded, |epoch, unbonding| {
            unbonding.sweep_pending = false;
            Ok(unbonding.transition(epoch, UnbondingStatus::Claimable)?)
        })?;

        ctx.emit(Event::UnbondedTokensSwept {
            height: ctx.block_height(),
            chain_id: chain_id.to_string(),
            native_amount: amount,
            epoch_numbers: unbonded,
        });
        info!(chain_id, amount, "Swept unbonded tokens");
        Ok(())
    }

    // ========================================================================
    // Record bookkeeping
    // ========================================================================

    /// Drop records whose unbondings are all finished and that are older
    /// than the longest unbonding period of any zone
    pub fn cleanup_epoch_unbonding_records(
        &self,
        ctx: &mut Context,
        epoch: u64,
    ) -> Result<(), UnbondingError> {
        let max_period_nanos = state::all_host_zones(ctx.store())?
            .iter()
            .map(|z| z.unbonding_period_secs.saturating_mul(NANOS_PER_SECOND))
            .max()
            .unwrap_or(0);
        let now = ctx.block_time();

        for record in state::all_epoch_unbonding_records(ctx.store())? {
            if record.epoch_number >= epoch {
                continue;
            }
            let finished = record.host_zone_unbondings.iter().all(|u| u.is_finished());
            let expired = record.created_at.saturating_add(max_period_nanos) < now;
            if finished && expired {
                EPOCH_UNBONDING_RECORDS.remove(ctx.store_mut(), record.epoch_number);
                ctx.emit(Event::EpochUnbondingRecordPruned {
                    height: ctx.block_height(),
                    epoch_number: record.epoch_number,
                });
                debug!(epoch = record.epoch_number, "Pruned epoch unbonding record");
            }
        }
        Ok(())
    }

    /// Open the record collecting redemptions during day `epoch`
    pub fn create_epoch_unbonding_record(
        &self,
        ctx: &mut Context,
        epoch: u64,
    ) -> Result<(), UnbondingError> {
        if EPOCH_UNBONDING_RECORDS.has(ctx.store(), epoch) {
            return Ok(());
        }
        let record = EpochUnbondingRecord {
            epoch_number: epoch,
            created_at: ctx.block_time(),
            host_zone_unbondings: state::all_host_zones(ctx.store())?
                .iter()
                .map(|z| HostZoneUnbonding::new(&z.chain_id, &z.host_denom))
                .collect(),
        };
        EPOCH_UNBONDING_RECORDS.save(ctx.store_mut(), epoch, &record)?;
        debug!(epoch, "Created epoch unbonding record");
        Ok(())
    }
}
