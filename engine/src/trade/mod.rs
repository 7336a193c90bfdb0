//! Trade route engine
//!
//! Converts reward tokens harvested on a host zone into its host denom:
//!
//! ```text
//! host withdrawal ICA ──hop 1──► reward zone ICA ──hop 2──► trade zone ICA
//!                                                              │ swap
//! host withdrawal ICA ◄────────────────hop 3───────────────────┘
//! ```
//!
//! - `routes`: route administration
//! - `transfers`: hops 1 and 2, driven by a balance query every main epoch
//! - `swap`: price refresh, the bounded swap and hop 3

pub mod routes;
pub mod swap;
pub mod transfers;

pub use routes::{CreateTradeRoute, TradeConfigUpdate};
pub use swap::{check_swap_output, min_swap_output};

use crate::core::decimal::{Decimal, DecimalError};
use crate::models::state::StateError;
use crate::orchestrator::dispatch::DispatchError;
use crate::orchestrator::engine::ErrorClass;
use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Unauthorized sender: {0}")]
    Unauthorized(String),

    #[error("Invalid trade route: {0}")]
    InvalidRoute(String),

    #[error("Trade route already exists: {0}")]
    RouteExists(String),

    #[error("Invalid max swap loss rate: {0}")]
    InvalidLossRate(Decimal),

    #[error("Swap price of {route_key} is stale: updated at {updated_at}, now {now}")]
    StalePrice {
        route_key: String,
        updated_at: u64,
        now: u64,
    },

    #[error("Swap on {route_key} returned {actual_output}, below the minimum {min_output}")]
    ExcessiveSwapLoss {
        route_key: String,
        min_output: u128,
        actual_output: u128,
    },

    #[error("Swap acknowledgement for {0} carries no output amount")]
    MissingSwapOutput(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StdError),

    #[error(transparent)]
    Decimal(#[from] DecimalError),
}

impl TradeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TradeError::Unauthorized(_)
            | TradeError::InvalidRoute(_)
            | TradeError::RouteExists(_)
            | TradeError::InvalidLossRate(_) => ErrorClass::Validation,
            TradeError::StalePrice { .. } | TradeError::ExcessiveSwapLoss { .. } => {
                ErrorClass::SafetyBound
            }
            TradeError::State(err) if err.is_not_found() => ErrorClass::NotFound,
            TradeError::Dispatch(_) => ErrorClass::TransportTerminal,
            _ => ErrorClass::InternalInvariant,
        }
    }
}
