//! Validator rebalancing
//!
//! Redelegates stake from validators above their weight target to the ones
//! below it. Delegations are only updated once the host zone acknowledges
//! the redelegations.

use crate::callbacks::ica::IcaCallback;
use crate::core::context::Context;
use crate::core::time::EpochId;
use crate::delegation::allocation::{rebalance_moves, Redelegation};
use crate::delegation::DepositError;
use crate::ibc::messages::{AckResponse, Coin, IcaMsg};
use crate::models::event::Event;
use crate::models::host_zone::{HostZone, IcaAccountType};
use crate::models::state;
use crate::orchestrator::engine::Orchestrator;
use tracing::{error, info, warn};

impl Orchestrator {
    pub fn rebalance_all_host_zones(&mut self, ctx: &mut Context) -> Result<(), DepositError> {
        let params = state::params(ctx.store())?;
        let max_moves = params.max_redelegations_per_rebalance as usize;
        for zone in state::active_host_zones(ctx.store())? {
            if let Err(err) = ctx.atomic(|ctx| self.rebalance_host_zone(ctx, &zone, max_moves)) {
                error!(chain_id = %zone.chain_id, error = %err, "Failed to rebalance host zone");
            }
        }
        Ok(())
    }

    fn rebalance_host_zone(
        &mut self,
        ctx: &mut Context,
        zone: &HostZone,
        max_moves: usize,
    ) -> Result<(), DepositError> {
        let redelegations = rebalance_moves(&zone.validators, max_moves)?;
        if redelegations.is_empty() {
            return Ok(());
        }
        let delegation = state::ica_account(zone, IcaAccountType::Delegation)?;
        let msgs = redelegations
            .iter()
            .map(|r| IcaMsg::Redelegate {
                delegator_address: delegation.address.clone(),
                src_validator_address: r.src_validator_address.clone(),
                dst_validator_address: r.dst_validator_address.clone(),
                amount: Coin::new(zone.host_denom.as_str(), r.amount),
            })
            .collect();
        let timeout = self.ica_timeout(ctx, EpochId::Main)?;
        self.submit_ica_tx(
            ctx,
            &delegation,
            msgs,
            timeout,
            Some(IcaCallback::Rebalance {
                chain_id: zone.chain_id.clone(),
                redelegations: redelegations.clone(),
            }),
        )?;
        info!(
            chain_id = %zone.chain_id,
            num_redelegations = redelegations.len(),
            "Submitted rebalance"
        );
        Ok(())
    }

    pub(crate) fn rebalance_callback(
        &mut self,
        ctx: &mut Context,
        chain_id: &str,
        redelegations: &[Redelegation],
        ack: &AckResponse,
    ) -> Result<(), DepositError> {
        if !ack.is_success() {
            warn!(
                chain_id,
                reason = %ack.failure_reason().unwrap_or_default(),
                "Rebalance failed, delegations unchanged"
            );
            return Ok(());
        }

        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        for redelegation in redelegations {
            let src = zone
                .validator_mut(&redelegation.src_validator_address)
                .ok_or_else(|| DepositError::UnknownValidator {
                    chain_id: chain_id.to_string(),
                    address: redelegation.src_validator_address.clone(),
                })?;
            src.delegation = src.delegation.checked_sub(redelegation.amount).ok_or_else(|| {
                DepositError::RedelegationOverdraw {
                    address: redelegation.src_validator_address.clone(),
                    amount: redelegation.amount,
                }
            })?;
            let dst = zone
                .validator_mut(&redelegation.dst_validator_address)
                .ok_or_else(|| DepositError::UnknownValidator {
                    chain_id: chain_id.to_string(),
                    address: redelegation.dst_validator_address.clone(),
                })?;
            dst.delegation = dst.delegation.saturating_add(redelegation.amount);
        }
        state::save_host_zone(ctx.store_mut(), &zone)?;

        let amount: u128 = redelegations.iter().map(|r| r.amount).sum();
        ctx.emit(Event::Rebalanced {
            height: ctx.block_height(),
            chain_id: chain_id.to_string(),
            num_redelegations: redelegations.len(),
            amount,
        });
        info!(chain_id, amount, "Rebalance acknowledged");
        Ok(())
    }
}
