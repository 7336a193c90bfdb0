//! Liquid Staking Engine - Rust Core
//!
//! Cross-chain liquid staking coordination: deposits are turned into a
//! liquid staked token by delegating on remote host zones through
//! interchain accounts, observed through interchain queries.
//!
//! # Architecture
//!
//! - **core**: Fixed-point math, epochs, params, the transition context
//! - **models**: Domain types (HostZone, records, TradeRoute, Event)
//! - **ibc**: Consumed transports, wire messages, in-memory doubles
//! - **callbacks**: Pending-operation ledgers for ICA and ICQ
//! - **registry**: Host zone registry and redemption rate safety engine
//! - **delegation**: Deposit/delegation pipeline, rewards, rebalancing
//! - **unbonding**: Redemptions, undelegation, sweep, claims
//! - **trade**: Reward token trade routes
//! - **orchestrator**: Epoch scheduler, dispatch, genesis, queries
//!
//! # Critical Invariants
//!
//! 1. All token amounts are u128 base units; rates are 18-decimal `cosmwasm_std::Decimal`
//! 2. Every remote effect has exactly one ledger entry, resolved at most once
//! 3. A redemption rate outside the inner safety bounds is never stored

// Module declarations
pub mod callbacks;
pub mod core;
pub mod delegation;
pub mod ibc;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod trade;
pub mod unbonding;

// Re-exports for convenience
pub use crate::core::{Context, Decimal, DecimalError, DecimalExt, EpochId, EpochInfo, EpochTracker, Params, ParamsError};
pub use models::{
    event::{Event, EventLog},
    host_zone::{HostZone, IcaAccountType, Validator},
};
pub use orchestrator::{
    DispatchError, EngineConfig, EpochHooks, ErrorClass, GenesisError, GenesisState,
    MultiEpochHooks, MultiStakeHooks, Orchestrator, StakeError, StakeHooks, Transports,
    MODULE_NAME,
};
