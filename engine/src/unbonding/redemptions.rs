//! Redemption requests and claims
//!
//! A redemption escrows liquid tokens on the deposit account and adds the
//! equivalent native amount to the current day epoch's unbonding for the
//! zone. Redemptions keep working while a zone is halted.

use crate::core::context::Context;
use crate::core::decimal::DecimalExt;
use crate::core::time::EpochId;
use crate::ibc::messages::Coin;
use crate::models::event::Event;
use crate::models::state::{self, EPOCH_UNBONDING_RECORDS, USER_REDEMPTION_RECORDS};
use crate::models::unbonding::{UnbondingStatus, UserRedemptionRecord};
use crate::orchestrator::engine::Orchestrator;
use crate::unbonding::UnbondingError;
use tracing::info;

fn is_local_address(address: &str) -> bool {
    !address.is_empty() && !address.contains(char::is_whitespace)
}

impl Orchestrator {
    /// Redeem `st_amount` liquid tokens for native tokens claimable by
    /// `receiver` once the unbonding completes.
    ///
    /// Returns the native amount owed.
    pub fn redeem_stake(
        &self,
        ctx: &mut Context,
        redeemer: &str,
        st_amount: u128,
        chain_id: &str,
        receiver: &str,
    ) -> Result<u128, UnbondingError> {
        if !is_local_address(redeemer) || !is_local_address(receiver) {
            return Err(UnbondingError::Validation(
                "redeemer and receiver must be valid addresses".to_string(),
            ));
        }
        if st_amount == 0 {
            return Err(UnbondingError::Validation("amount must be positive".to_string()));
        }
        ctx.atomic(|ctx| self.redeem(ctx, redeemer, st_amount, chain_id, receiver))
    }

    fn redeem(
        &self,
        ctx: &mut Context,
        redeemer: &str,
        st_amount: u128,
        chain_id: &str,
        receiver: &str,
    ) -> Result<u128, UnbondingError> {
        let zone = state::host_zone(ctx.store(), chain_id)?;
        let native_amount = zone.redemption_rate.mul_floor(st_amount)?;
        if native_amount == 0 {
            return Err(UnbondingError::Validation(format!(
                "{} {} redeems to nothing",
                st_amount,
                zone.liquid_denom()
            )));
        }

        // Undelegations not yet acknowledged are still counted in total_delegated
        let queued: u128 = state::all_epoch_unbonding_records(ctx.store())?
            .iter()
            .filter_map(|r| r.unbonding(chain_id))
            .filter(|u| {
                u.status == UnbondingStatus::UnbondingQueue
                    || (u.status == UnbondingStatus::UnbondingInProgress && u.completion_time == 0)
            })
            .map(|u| u.native_amount)
            .sum();
        let available = zone.total_delegated.saturating_sub(queued);
        if native_amount > available {
            return Err(UnbondingError::InsufficientUnbondable {
                chain_id: chain_id.to_string(),
                requested: native_amount,
                available,
            });
        }

        let day = state::epoch_tracker(ctx.store(), EpochId::Day)?;
        let mut record = state::epoch_unbonding_record(ctx.store(), day.epoch_number)?;
        let unbonding =
            record
                .unbonding_mut(chain_id)
                .ok_or_else(|| UnbondingError::MissingUnbonding {
                    chain_id: chain_id.to_string(),
                    epoch: day.epoch_number,
                })?;

        self.bank.send(
            ctx,
            redeemer,
            &self.config.deposit_address,
            &Coin::new(zone.liquid_denom(), st_amount),
        )?;

        unbonding.native_amount = unbonding.native_amount.saturating_add(native_amount);
        unbonding.st_amount = unbonding.st_amount.saturating_add(st_amount);
        EPOCH_UNBONDING_RECORDS.save(ctx.store_mut(), day.epoch_number, &record)?;

        let id = UserRedemptionRecord::record_id(chain_id, day.epoch_number, receiver);
        let mut user_record = match USER_REDEMPTION_RECORDS.may_load(ctx.store(), &id)? {
            Some(existing) => existing,
            None => UserRedemptionRecord {
                id: id.clone(),
                redeemer: redeemer.to_string(),
                receiver: receiver.to_string(),
                native_amount: 0,
                st_amount: 0,
                denom: zone.host_denom.clone(),
                host_zone_id: chain_id.to_string(),
                epoch_number: day.epoch_number,
            },
        };
        user_record.native_amount = user_record.native_amount.saturating_add(native_amount);
        user_record.st_amount = user_record.st_amount.saturating_add(st_amount);
        USER_REDEMPTION_RECORDS.save(ctx.store_mut(), &id, &user_record)?;

        ctx.emit(Event::RedeemStake {
            height: ctx.block_height(),
            chain_id: chain_id.to_string(),
            redeemer: redeemer.to_string(),
            receiver: receiver.to_string(),
            st_amount,
            native_amount,
            epoch_number: day.epoch_number,
        });
        info!(
            chain_id,
            redeemer,
            st_amount,
            native_amount,
            epoch = day.epoch_number,
            "Redemption queued"
        );
        Ok(native_amount)
    }

    /// Pay out a matured redemption from the deposit account
    pub fn claim_undelegated_tokens(
        &self,
        ctx: &mut Context,
        receiver: &str,
        chain_id: &str,
        epoch: u64,
    ) -> Result<u128, UnbondingError> {
        ctx.atomic(|ctx| {
            let id = UserRedemptionRecord::record_id(chain_id, epoch, receiver);
            let user_record = USER_REDEMPTION_RECORDS
                .may_load(ctx.store(), &id)?
                .ok_or_else(|| state::StateError::UserRedemptionRecordNotFound(id.clone()))?;
            let zone = state::host_zone(ctx.store(), chain_id)?;
            let mut record = state::epoch_unbonding_record(ctx.store(), epoch)?;
            let unbonding =
                record
                    .unbonding_mut(chain_id)
                    .ok_or_else(|| UnbondingError::MissingUnbonding {
                        chain_id: chain_id.to_string(),
                        epoch,
                    })?;
            if unbonding.status != UnbondingStatus::Claimable {
                return Err(UnbondingError::NotClaimable {
                    chain_id: chain_id.to_string(),
                    epoch,
                });
            }

            self.bank.send(
                ctx,
                &self.config.deposit_address,
                receiver,
                &Coin::new(zone.ibc_denom.as_str(), user_record.native_amount),
            )?;
            USER_REDEMPTION_RECORDS.remove(ctx.store_mut(), &id);

            unbonding.claimed_native_amount = unbonding
                .claimed_native_amount
                .saturating_add(user_record.native_amount);
            let outstanding = state::values(&USER_REDEMPTION_RECORDS, ctx.store())?
                .iter()
                .any(|r| r.host_zone_id == chain_id && r.epoch_number == epoch);
            if !outstanding {
                unbonding.transition(epoch, UnbondingStatus::Claimed)?;
            }
            EPOCH_UNBONDING_RECORDS.save(ctx.store_mut(), epoch, &record)?;

            ctx.emit(Event::UndelegatedTokensClaimed {
                height: ctx.block_height(),
                chain_id: chain_id.to_string(),
                receiver: receiver.to_string(),
                native_amount: user_record.native_amount,
                epoch_number: epoch,
            });
            info!(
                chain_id,
                receiver,
                epoch,
                native_amount = user_record.native_amount,
                "Claimed undelegated tokens"
            );
            Ok(user_record.native_amount)
        })
    }
}
