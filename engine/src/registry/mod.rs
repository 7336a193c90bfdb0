//! Host zone registry and redemption rate safety engine
//!
//! - `host_zones`: registration, validator set administration, ICA account
//!   bookkeeping, resuming halted zones
//! - `redemption_rate`: rate computation and the two-tier safety bounds

pub mod host_zones;
pub mod redemption_rate;

pub use host_zones::RegisterHostZone;
pub use redemption_rate::{BoundsCheck, SafetyBounds};

use crate::callbacks::ledger::LedgerError;
use crate::core::decimal::{Decimal, DecimalError};
use crate::ibc::transport::BankError;
use crate::models::state::StateError;
use crate::orchestrator::engine::ErrorClass;
use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unauthorized sender: {0}")]
    Unauthorized(String),

    #[error("Invalid host zone: {0}")]
    InvalidHostZone(String),

    #[error("Host zone already registered: {0}")]
    HostZoneExists(String),

    #[error("Validator {address} already exists on {chain_id}")]
    ValidatorExists { chain_id: String, address: String },

    #[error("Validator {address} not found on {chain_id}")]
    ValidatorNotFound { chain_id: String, address: String },

    #[error("Validator {address} still has {delegation} delegated")]
    ValidatorHasDelegation { address: String, delegation: u128 },

    #[error("Validator {address} has a delegation change in flight")]
    ValidatorHasPendingOperation { address: String },

    #[error("Validator {address} holds {weight} of {total_weight} weight, above the {cap_percent}% cap")]
    WeightAboveCap {
        address: String,
        weight: u64,
        total_weight: u64,
        cap_percent: u64,
    },

    #[error("Invalid safety bounds: min {min}, max {max}")]
    InvalidBounds { min: Decimal, max: Decimal },

    #[error("Host zone {0} is not halted")]
    HostZoneNotHalted(String),

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

impl RegistryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RegistryError::State(err) if err.is_not_found() => ErrorClass::NotFound,
            RegistryError::ValidatorNotFound { .. } => ErrorClass::NotFound,
            RegistryError::InvalidBounds { .. } => ErrorClass::SafetyBound,
            RegistryError::State(_)
            | RegistryError::Ledger(_)
            | RegistryError::Store(_)
            | RegistryError::Decimal(_)
            | RegistryError::Bank(_) => ErrorClass::InternalInvariant,
            _ => ErrorClass::Validation,
        }
    }
}
