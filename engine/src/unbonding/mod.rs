//! Unbonding pipeline
//!
//! - `redemptions`: user facing `redeem_stake` and `claim_undelegated_tokens`
//! - `pipeline`: day-epoch steps (initiate, sweep, cleanup, create) and
//!   their callbacks

pub mod pipeline;
pub mod redemptions;

use crate::callbacks::ledger::LedgerError;
use crate::core::decimal::DecimalError;
use crate::delegation::allocation::AllocationError;
use crate::ibc::transport::BankError;
use crate::models::state::StateError;
use crate::models::unbonding::UnbondingRecordError;
use crate::orchestrator::dispatch::DispatchError;
use crate::orchestrator::engine::ErrorClass;
use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnbondingError {
    #[error("Invalid redemption: {0}")]
    Validation(String),

    #[error("Cannot redeem {requested} on {chain_id}, only {available} unbondable")]
    InsufficientUnbondable {
        chain_id: String,
        requested: u128,
        available: u128,
    },

    #[error("No unbonding for {chain_id} in epoch {epoch}")]
    MissingUnbonding { chain_id: String, epoch: u64 },

    #[error("Unbonding for {chain_id} in epoch {epoch} is not claimable yet")]
    NotClaimable { chain_id: String, epoch: u64 },

    #[error("Undelegation of {amount} from {address} exceeds its delegation")]
    UndelegationOverdraw { address: String, amount: u128 },

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Record(#[from] UnbondingRecordError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StdError),

    #[error(transparent)]
    Decimal(#[from] DecimalError),

    #[error(transparent)]
    Bank(#[from] BankError),
}

impl UnbondingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            UnbondingError::Validation(_)
            | UnbondingError::InsufficientUnbondable { .. }
            | UnbondingError::NotClaimable { .. } => ErrorClass::Validation,
            UnbondingError::Bank(BankError::InsufficientFunds { .. }) => ErrorClass::Validation,
            UnbondingError::MissingUnbonding { .. } => ErrorClass::NotFound,
            UnbondingError::State(err) if err.is_not_found() => ErrorClass::NotFound,
            UnbondingError::Dispatch(_) => ErrorClass::TransportTerminal,
            _ => ErrorClass::InternalInvariant,
        }
    }
}
