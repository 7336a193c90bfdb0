//! Validator allocation
//!
//! Pure functions deciding how an amount is spread over a validator set.
//! Targets are proportional to weight; delegation fills the validators
//! furthest below target, undelegation drains the ones furthest above it,
//! and rebalancing pairs the two.
//!
//! # Critical Invariants
//!
//! 1. **Exact sums**: splits always add up to exactly the requested amount
//! 2. **No overdraw**: an undelegation split never exceeds the validator's
//!    current delegation
//! 3. **Determinism**: ties are broken by validator address

use crate::core::decimal::{ratio, DecimalError, DecimalExt};
use crate::models::host_zone::Validator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("No validator carries a positive weight")]
    NoWeightedValidators,

    #[error("Cannot undelegate {requested}, only {available} delegated")]
    InsufficientDelegation { requested: u128, available: u128 },

    #[error(transparent)]
    Decimal(#[from] DecimalError),
}

/// Amount sent to (or taken from) one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDelegation {
    pub validator_address: String,
    pub amount: u128,
}

/// One redelegation between two validators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redelegation {
    pub src_validator_address: String,
    pub dst_validator_address: String,
    pub amount: u128,
}

/// Weight-proportional target delegation for each validator given `total`
pub fn delegation_targets(
    validators: &[Validator],
    total: u128,
) -> Result<BTreeMap<String, u128>, AllocationError> {
    let total_weight: u128 = validators.iter().map(|v| v.weight as u128).sum();
    if total_weight == 0 {
        return Err(AllocationError::NoWeightedValidators);
    }
    let mut targets = BTreeMap::new();
    for validator in validators {
        let share = ratio(validator.weight as u128, total_weight)?;
        targets.insert(validator.address.clone(), share.mul_floor(total)?);
    }
    Ok(targets)
}

fn current_total(validators: &[Validator]) -> u128 {
    validators.iter().map(|v| v.delegation).sum()
}

/// Split `amount` of new stake across the validators below target
///
/// # Example
/// ```
/// use stakeibc_engine::delegation::allocation::allocate_delegation;
/// use stakeibc_engine::models::Validator;
///
/// let mut heavy = Validator::new("a", "val_a", 3);
/// heavy.delegation = 0;
/// let mut light = Validator::new("b", "val_b", 1);
/// light.delegation = 100;
///
/// // Target for 200 total is 150/50, so everything goes to `val_a`
/// let splits = allocate_delegation(&[heavy, light], 100).unwrap();
/// assert_eq!(splits.len(), 1);
/// assert_eq!(splits[0].validator_address, "val_a");
/// assert_eq!(splits[0].amount, 100);
/// ```
pub fn allocate_delegation(
    validators: &[Validator],
    amount: u128,
) -> Result<Vec<SplitDelegation>, AllocationError> {
    if amount == 0 {
        return Ok(Vec::new());
    }
    let new_total = current_total(validators).saturating_add(amount);
    let targets = delegation_targets(validators, new_total)?;

    let mut deficits: Vec<(String, u128)> = validators
        .iter()
        .filter(|v| v.weight > 0)
        .map(|v| {
            let target = targets.get(&v.address).copied().unwrap_or(0);
            (v.address.clone(), target.saturating_sub(v.delegation))
        })
        .collect();
    let total_deficit: u128 = deficits.iter().map(|(_, d)| *d).sum();

    // Rounding in the targets can leave no deficit at all; fall back to
    // pure weights in that case
    if total_deficit == 0 {
        deficits = validators
            .iter()
            .filter(|v| v.weight > 0)
            .map(|v| (v.address.clone(), v.weight as u128))
            .collect();
    }
    let total_deficit: u128 = deficits.iter().map(|(_, d)| *d).sum();
    deficits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut shares: Vec<(String, u128, u128)> = Vec::with_capacity(deficits.len());
    let mut allocated = 0u128;
    for (address, deficit) in deficits {
        let share = ratio(deficit, total_deficit)?
            .mul_floor(amount)?
            .min(amount - allocated);
        allocated += share;
        shares.push((address, share, deficit));
    }

    // Hand the rounding remainder to the largest deficits first
    let mut remainder = amount - allocated;
    for (_, share, deficit) in shares.iter_mut() {
        if remainder == 0 {
            break;
        }
        let room = deficit.saturating_sub(*share).max(1).min(remainder);
        *share += room;
        remainder -= room;
    }
    if remainder > 0 {
        if let Some((_, share, _)) = shares.first_mut() {
            *share += remainder;
        }
    }

    Ok(shares
        .into_iter()
        .filter(|(_, share, _)| *share > 0)
        .map(|(validator_address, amount, _)| SplitDelegation {
            validator_address,
            amount,
        })
        .collect())
}

/// Split an undelegation of `amount`, draining the validators furthest
/// above their post-unbond target first
pub fn allocate_undelegation(
    validators: &[Validator],
    amount: u128,
) -> Result<Vec<SplitDelegation>, AllocationError> {
    let available = current_total(validators);
    if amount > available {
        return Err(AllocationError::InsufficientDelegation {
            requested: amount,
            available,
        });
    }
    if amount == 0 {
        return Ok(Vec::new());
    }

    let targets = match delegation_targets(validators, available - amount) {
        Ok(targets) => targets,
        // No weights left: everything is excess
        Err(AllocationError::NoWeightedValidators) => BTreeMap::new(),
        Err(err) => return Err(err),
    };

    let mut excess: Vec<(&Validator, u128)> = validators
        .iter()
        .map(|v| {
            let target = targets.get(&v.address).copied().unwrap_or(0);
            (v, v.delegation.saturating_sub(target))
        })
        .collect();
    excess.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.address.cmp(&b.0.address)));

    let mut taken: BTreeMap<&str, u128> = BTreeMap::new();
    let mut remaining = amount;
    for (validator, over) in &excess {
        if remaining == 0 {
            break;
        }
        let take = (*over).min(remaining);
        if take > 0 {
            *taken.entry(validator.address.as_str()).or_default() += take;
            remaining -= take;
        }
    }
    // Target rounding can leave a few units; take them from the largest
    // remaining delegations
    if remaining > 0 {
        let mut by_delegation: Vec<&Validator> = validators.iter().collect();
        by_delegation.sort_by(|a, b| {
            b.delegation
                .cmp(&a.delegation)
                .then_with(|| a.address.cmp(&b.address))
        });
        for validator in by_delegation {
            if remaining == 0 {
                break;
            }
            let already = taken.get(validator.address.as_str()).copied().unwrap_or(0);
            let take = validator.delegation.saturating_sub(already).min(remaining);
            if take > 0 {
                *taken.entry(validator.address.as_str()).or_default() += take;
                remaining -= take;
            }
        }
    }

    // Preserve the excess ordering in the output
    Ok(excess
        .iter()
        .filter_map(|(v, _)| {
            taken.get(v.address.as_str()).map(|amount| SplitDelegation {
                validator_address: v.address.clone(),
                amount: *amount,
            })
        })
        .collect())
}

/// Redelegations moving stake from surplus to deficit validators, largest
/// imbalance first, at most `max_moves` of them
pub fn rebalance_moves(
    validators: &[Validator],
    max_moves: usize,
) -> Result<Vec<Redelegation>, AllocationError> {
    let total = current_total(validators);
    if total == 0 {
        return Ok(Vec::new());
    }
    let targets = delegation_targets(validators, total)?;

    let mut surplus: Vec<(String, u128)> = Vec::new();
    let mut deficit: Vec<(String, u128)> = Vec::new();
    for validator in validators {
        let target = targets.get(&validator.address).copied().unwrap_or(0);
        if validator.delegation > target {
            surplus.push((validator.address.clone(), validator.delegation - target));
        } else if target > validator.delegation {
            deficit.push((validator.address.clone(), target - validator.delegation));
        }
    }
    let by_size = |a: &(String, u128), b: &(String, u128)| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0));
    surplus.sort_by(by_size);
    deficit.sort_by(by_size);

    let mut moves = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < surplus.len() && j < deficit.len() && moves.len() < max_moves {
        let amount = surplus[i].1.min(deficit[j].1);
        moves.push(Redelegation {
            src_validator_address: surplus[i].0.clone(),
            dst_validator_address: deficit[j].0.clone(),
            amount,
        });
        surplus[i].1 -= amount;
        deficit[j].1 -= amount;
        if surplus[i].1 == 0 {
            i += 1;
        }
        if deficit[j].1 == 0 {
            j += 1;
        }
    }
    Ok(moves)
}
