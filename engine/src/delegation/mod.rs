//! Deposit and delegation pipeline
//!
//! - `allocation`: pure validator split arithmetic
//! - `deposits`: liquid staking, deposit records, transfer and delegation
//! - `rewards`: reward claims, withdrawal address, reinvestment, fee allocation
//! - `rebalance`: redelegation towards the weight targets
//! - `community_pool`: staking the host zone's community pool tokens

pub mod allocation;
pub mod community_pool;
pub mod deposits;
pub mod rebalance;
pub mod rewards;

pub use allocation::{AllocationError, Redelegation, SplitDelegation};

use crate::core::decimal::DecimalError;
use crate::ibc::transport::BankError;
use crate::models::deposit::DepositRecordError;
use crate::models::state::StateError;
use crate::orchestrator::dispatch::DispatchError;
use crate::orchestrator::engine::ErrorClass;
use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DepositError {
    #[error("Invalid deposit: {0}")]
    Validation(String),

    #[error("Host zone {0} is halted")]
    HostZoneHalted(String),

    #[error("Validator {address} not found on {chain_id}")]
    UnknownValidator { chain_id: String, address: String },

    #[error("Redelegation of {amount} from {address} exceeds its delegation")]
    RedelegationOverdraw { address: String, amount: u128 },

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Record(#[from] DepositRecordError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StdError),

    #[error(transparent)]
    Decimal(#[from] DecimalError),

    #[error(transparent)]
    Bank(#[from] BankError),
}

impl DepositError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DepositError::Validation(_) => ErrorClass::Validation,
            DepositError::Bank(BankError::InsufficientFunds { .. }) => ErrorClass::Validation,
            DepositError::HostZoneHalted(_) => ErrorClass::SafetyBound,
            DepositError::State(err) if err.is_not_found() => ErrorClass::NotFound,
            DepositError::Dispatch(_) => ErrorClass::TransportTerminal,
            _ => ErrorClass::InternalInvariant,
        }
    }
}
