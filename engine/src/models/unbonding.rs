//! Unbonding record models
//!
//! One `EpochUnbondingRecord` exists per day epoch and holds one
//! `HostZoneUnbonding` per host zone. Redemption requests made during that
//! day accumulate into it and each user's share is tracked by a
//! `UserRedemptionRecord`.
//!
//! ```text
//! UnbondingQueue → UnbondingInProgress → (ack, period elapsed) Unbonded
//!                ← (timeout/error)
//! Unbonded → (sweep ack) Claimable → (all users paid) Claimed
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnbondingStatus {
    UnbondingQueue,
    UnbondingInProgress,
    Unbonded,
    Claimable,
    Claimed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnbondingRecordError {
    #[error("Unbonding for {chain_id} in epoch {epoch} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        chain_id: String,
        epoch: u64,
        from: UnbondingStatus,
        to: UnbondingStatus,
    },
}

/// Redemptions for one host zone within one day epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostZoneUnbonding {
    pub host_zone_id: String,
    pub native_amount: u128,
    /// Liquid tokens escrowed for this batch, burned once undelegation is acked
    pub st_amount: u128,
    pub denom: String,
    pub status: UnbondingStatus,
    /// Unix nanos at which the remote undelegation matures; 0 until acked
    pub completion_time: u64,
    pub claimed_native_amount: u128,
    /// A balance query or sweep transfer is in flight
    pub sweep_pending: bool,
    pub failed_attempts: u32,
}

impl HostZoneUnbonding {
    pub fn new(host_zone_id: &str, denom: &str) -> Self {
        Self {
            host_zone_id: host_zone_id.to_string(),
            native_amount: 0,
            st_amount: 0,
            denom: denom.to_string(),
            status: UnbondingStatus::UnbondingQueue,
            completion_time: 0,
            claimed_native_amount: 0,
            sweep_pending: false,
            failed_attempts: 0,
        }
    }

    /// Nothing left to do for this unbonding
    pub fn is_finished(&self) -> bool {
        self.status == UnbondingStatus::Claimed
            || (self.native_amount == 0 && self.status == UnbondingStatus::UnbondingQueue)
    }

    pub fn transition(&mut self, epoch: u64, to: UnbondingStatus) -> Result<(), UnbondingRecordError> {
        use UnbondingStatus::*;
        let allowed = matches!(
            (self.status, to),
            (UnbondingQueue, UnbondingInProgress)
                | (UnbondingInProgress, UnbondingQueue)
                | (UnbondingInProgress, Unbonded)
                | (Unbonded, Claimable)
                | (Claimable, Claimed)
        );
        if !allowed {
            return Err(UnbondingRecordError::InvalidTransition {
                chain_id: self.host_zone_id.clone(),
                epoch,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochUnbondingRecord {
    pub epoch_number: u64,
    /// Unix nanos at which the record was created
    pub created_at: u64,
    pub host_zone_unbondings: Vec<HostZoneUnbonding>,
}

impl EpochUnbondingRecord {
    pub fn unbonding(&self, chain_id: &str) -> Option<&HostZoneUnbonding> {
        self.host_zone_unbondings
            .iter()
            .find(|u| u.host_zone_id == chain_id)
    }

    pub fn unbonding_mut(&mut self, chain_id: &str) -> Option<&mut HostZoneUnbonding> {
        self.host_zone_unbondings
            .iter_mut()
            .find(|u| u.host_zone_id == chain_id)
    }
}

/// One user's share of a `HostZoneUnbonding`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRedemptionRecord {
    pub id: String,
    pub redeemer: String,
    pub receiver: String,
    pub native_amount: u128,
    pub st_amount: u128,
    pub denom: String,
    pub host_zone_id: String,
    pub epoch_number: u64,
}

impl UserRedemptionRecord {
    pub fn record_id(chain_id: &str, epoch: u64, receiver: &str) -> String {
        format!("{}.{}.{}", chain_id, epoch, receiver)
    }
}
