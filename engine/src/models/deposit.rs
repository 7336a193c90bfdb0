//! Deposit record model
//!
//! A deposit record is one batch of native tokens moving from this chain
//! into delegations on a host zone:
//!
//! ```text
//! QueuedForTransfer → TransferInProgress → (ack) QueuedForDelegation
//!                   ← (timeout/error)
//! QueuedForDelegation → DelegationInProgress → (ack) deleted
//!                     ← (timeout/error)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle position of a deposit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    QueuedForTransfer,
    TransferInProgress,
    QueuedForDelegation,
    DelegationInProgress,
}

/// Where the funds of a record currently originate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositSource {
    /// User deposits held by the module on this chain
    Local,
    /// Reinvested rewards already sitting on the host delegation account
    WithdrawalAccount,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepositRecordError {
    #[error("Deposit record {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: u64,
        from: DepositStatus,
        to: DepositStatus,
    },
}

/// One batch of native tokens headed for delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub id: u64,
    pub host_zone_id: String,
    pub amount: u128,
    pub denom: String,
    pub status: DepositStatus,
    pub deposit_epoch_number: u64,
    pub source: DepositSource,
    /// Number of times a transfer or delegation for this record failed
    pub failed_attempts: u32,
}

impl DepositRecord {
    pub fn new(id: u64, host_zone_id: &str, denom: &str, epoch: u64) -> Self {
        Self {
            id,
            host_zone_id: host_zone_id.to_string(),
            amount: 0,
            denom: denom.to_string(),
            status: DepositStatus::QueuedForTransfer,
            deposit_epoch_number: epoch,
            source: DepositSource::Local,
            failed_attempts: 0,
        }
    }

    /// Move along the lifecycle, rejecting anything off the state machine
    ///
    /// # Example
    /// ```
    /// use stakeibc_engine::models::{DepositRecord, DepositStatus};
    ///
    /// let mut record = DepositRecord::new(1, "cosmoshub-4", "ibc/atom", 10);
    /// record.transition(DepositStatus::TransferInProgress).unwrap();
    /// assert!(record.transition(DepositStatus::DelegationInProgress).is_err());
    /// ```
    pub fn transition(&mut self, to: DepositStatus) -> Result<(), DepositRecordError> {
        use DepositStatus::*;
        let allowed = matches!(
            (self.status, to),
            (QueuedForTransfer, TransferInProgress)
                | (TransferInProgress, QueuedForDelegation)
                | (TransferInProgress, QueuedForTransfer)
                | (QueuedForDelegation, DelegationInProgress)
                | (DelegationInProgress, QueuedForDelegation)
        );
        if !allowed {
            return Err(DepositRecordError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
