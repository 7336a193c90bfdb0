//! Orchestrator - coordination of every pipeline
//!
//! See `engine.rs` for construction and `hooks.rs` for the epoch scheduler.

pub mod dispatch;
pub mod engine;
pub mod genesis;
pub mod hooks;
pub mod queries;

// Re-export main types for convenience
pub use dispatch::DispatchError;
pub use engine::{
    EngineConfig, ErrorClass, Orchestrator, StakeError, Transports, MODULE_NAME, QUERY_MODULE_NAME,
};
pub use hooks::{EpochHooks, MultiEpochHooks, MultiStakeHooks, StakeHooks};
pub use queries::{AddressUnbonding, PendingCallbacks};

// Re-export genesis types
pub use genesis::{params_hash, validate_genesis, GenesisError, GenesisState};
