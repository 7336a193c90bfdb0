//! Domain models for the liquid staking engine

pub mod deposit;
pub mod event;
pub mod host_zone;
pub mod state;
pub mod trade_route;
pub mod unbonding;

// Re-exports
pub use deposit::{DepositRecord, DepositRecordError, DepositSource, DepositStatus};
pub use event::{Event, EventLog};
pub use host_zone::{ica_owner, liquid_denom, HostZone, IcaAccount, IcaAccountType, Validator};
pub use state::StateError;
pub use trade_route::{route_key, TradeConfig, TradeRoute};
pub use unbonding::{
    EpochUnbondingRecord, HostZoneUnbonding, UnbondingRecordError, UnbondingStatus,
    UserRedemptionRecord,
};
