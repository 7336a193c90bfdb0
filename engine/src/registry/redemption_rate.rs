//! Redemption rate safety engine
//!
//! The redemption rate is native tokens per liquid token:
//!
//! ```text
//! rate = (total delegated + native held in deposit records) / liquid supply
//! ```
//!
//! Every candidate rate is checked against two tiers of bounds:
//!
//! - **Outer bounds** (admin set, defaulting to the params thresholds): a
//!   breach is an alert that needs admin attention
//! - **Inner bounds** (tighter, clamped inside the outer ones): a breach
//!   halts further stake/unstake flow on the zone while redemptions and
//!   claims keep working
//!
//! # Critical Invariants
//!
//! 1. A rate outside the inner bounds is never stored
//! 2. A zone with zero liquid supply keeps its current rate

use crate::core::context::Context;
use crate::core::decimal::{ratio, Decimal, DecimalExt};
use crate::core::params::Params;
use crate::models::event::Event;
use crate::models::host_zone::HostZone;
use crate::models::state::{self, DEPOSIT_RECORDS};
use crate::orchestrator::engine::Orchestrator;
use crate::registry::RegistryError;
use tracing::{error, info, warn};

/// Inclusive `[min, max]` range for the redemption rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl SafetyBounds {
    pub fn contains(&self, rate: Decimal) -> bool {
        rate >= self.min && rate <= self.max
    }
}

/// Result of checking a candidate rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsCheck {
    Within,
    /// Zone halted, rate kept
    OutsideInner,
    /// Zone halted, rate kept, alert raised
    OutsideOuter,
}

/// Outer bounds: zone overrides when set, params thresholds otherwise
pub fn outer_bounds(zone: &HostZone, params: &Params) -> SafetyBounds {
    let min = if zone.min_redemption_rate.is_positive() {
        zone.min_redemption_rate
    } else {
        params.default_min_redemption_rate()
    };
    let max = if zone.max_redemption_rate.is_positive() {
        zone.max_redemption_rate
    } else {
        params.default_max_redemption_rate()
    };
    SafetyBounds { min, max }
}

/// Inner bounds, clamped to lie within the outer bounds
pub fn inner_bounds(zone: &HostZone, params: &Params) -> SafetyBounds {
    let outer = outer_bounds(zone, params);
    let min = if zone.min_inner_redemption_rate.is_positive() {
        zone.min_inner_redemption_rate.max(outer.min)
    } else {
        outer.min
    };
    let max = if zone.max_inner_redemption_rate.is_positive() {
        zone.max_inner_redemption_rate.min(outer.max)
    } else {
        outer.max
    };
    SafetyBounds { min, max }
}

fn validate_bounds(min: Decimal, max: Decimal) -> Result<(), RegistryError> {
    if !min.is_positive() || !max.is_positive() || min > max {
        return Err(RegistryError::InvalidBounds { min, max });
    }
    Ok(())
}

/// Check `candidate` against the zone's bounds, storing it only if it
/// lies within the inner bounds
pub fn apply_safety_bounds(
    ctx: &mut Context,
    zone: &mut HostZone,
    candidate: Decimal,
    params: &Params,
) -> BoundsCheck {
    let outer = outer_bounds(zone, params);
    let inner = inner_bounds(zone, params);

    if inner.contains(candidate) {
        let old_rate = zone.redemption_rate;
        zone.redemption_rate = candidate;
        ctx.emit(Event::RedemptionRateUpdated {
            height: ctx.block_height(),
            chain_id: zone.chain_id.clone(),
            old_rate,
            new_rate: candidate,
        });
        return BoundsCheck::Within;
    }

    zone.halted = true;
    warn!(
        chain_id = %zone.chain_id,
        candidate = %candidate,
        min = %inner.min,
        max = %inner.max,
        "Redemption rate outside inner bounds, halting host zone"
    );
    ctx.emit(Event::HostZoneHalted {
        height: ctx.block_height(),
        chain_id: zone.chain_id.clone(),
        candidate_rate: candidate,
        min: inner.min,
        max: inner.max,
    });

    if outer.contains(candidate) {
        return BoundsCheck::OutsideInner;
    }
    error!(
        chain_id = %zone.chain_id,
        candidate = %candidate,
        min = %outer.min,
        max = %outer.max,
        "Redemption rate outside outer bounds"
    );
    ctx.emit(Event::RedemptionRateAlert {
        height: ctx.block_height(),
        chain_id: zone.chain_id.clone(),
        candidate_rate: candidate,
        min: outer.min,
        max: outer.max,
    });
    BoundsCheck::OutsideOuter
}

impl Orchestrator {
    /// Candidate rate for a zone; `None` while no liquid tokens exist
    pub fn compute_redemption_rate(
        &self,
        ctx: &Context,
        zone: &HostZone,
    ) -> Result<Option<Decimal>, RegistryError> {
        let supply = self.bank.supply(ctx, &zone.liquid_denom())?;
        if supply == 0 {
            return Ok(None);
        }
        let undelegated: u128 = state::values(&DEPOSIT_RECORDS, ctx.store())?
            .iter()
            .filter(|r| r.host_zone_id == zone.chain_id)
            .map(|r| r.amount)
            .sum();
        let native = zone.total_delegated.saturating_add(undelegated);
        Ok(Some(ratio(native, supply)?))
    }

    /// Recompute and bounds-check the rate of one zone
    pub fn update_redemption_rate(
        &self,
        ctx: &mut Context,
        chain_id: &str,
    ) -> Result<BoundsCheck, RegistryError> {
        let params = state::params(ctx.store())?;
        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        let candidate = match self.compute_redemption_rate(ctx, &zone)? {
            Some(rate) => rate,
            None => return Ok(BoundsCheck::Within),
        };
        let check = apply_safety_bounds(ctx, &mut zone, candidate, &params);
        state::save_host_zone(ctx.store_mut(), &zone)?;
        Ok(check)
    }

    /// Update every non-halted zone; a failing zone does not stop the rest
    pub fn update_redemption_rates(&self, ctx: &mut Context) -> Result<(), RegistryError> {
        for zone in state::active_host_zones(ctx.store())? {
            let chain_id = zone.chain_id.clone();
            if let Err(err) = ctx.atomic(|ctx| self.update_redemption_rate(ctx, &chain_id)) {
                error!(chain_id = %chain_id, error = %err, "Failed to update redemption rate");
            }
        }
        Ok(())
    }

    pub fn set_inner_safety_bounds(
        &self,
        ctx: &mut Context,
        sender: &str,
        chain_id: &str,
        min: Decimal,
        max: Decimal,
    ) -> Result<(), RegistryError> {
        if !self.is_authority(sender) {
            return Err(RegistryError::Unauthorized(sender.to_string()));
        }
        validate_bounds(min, max)?;
        let params = state::params(ctx.store())?;
        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        let outer = outer_bounds(&zone, &params);
        if min < outer.min || max > outer.max {
            return Err(RegistryError::InvalidBounds { min, max });
        }
        zone.min_inner_redemption_rate = min;
        zone.max_inner_redemption_rate = max;
        state::save_host_zone(ctx.store_mut(), &zone)?;
        info!(chain_id, min = %min, max = %max, "Set inner redemption rate bounds");
        Ok(())
    }

    pub fn set_outer_safety_bounds(
        &self,
        ctx: &mut Context,
        sender: &str,
        chain_id: &str,
        min: Decimal,
        max: Decimal,
    ) -> Result<(), RegistryError> {
        if !self.is_authority(sender) {
            return Err(RegistryError::Unauthorized(sender.to_string()));
        }
        validate_bounds(min, max)?;
        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        zone.min_redemption_rate = min;
        zone.max_redemption_rate = max;
        state::save_host_zone(ctx.store_mut(), &zone)?;
        info!(chain_id, min = %min, max = %max, "Set outer redemption rate bounds");
        Ok(())
    }
}
