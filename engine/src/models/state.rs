//! Engine state collections
//!
//! `cw_storage_plus` collections over the store plus the lookups every
//! pipeline shares.
//!
//! # Critical Invariants
//!
//! 1. **One record per key**: chain id, epoch number, record id, route key
//! 2. **No orphan records**: every deposit/unbonding record names a
//!    registered host zone
//! 3. **Monotonic ids**: deposit record ids are never reused

use crate::core::params::Params;
use crate::core::time::{EpochId, EpochTracker};
use crate::models::deposit::DepositRecord;
use crate::models::host_zone::{HostZone, IcaAccount, IcaAccountType};
use crate::models::trade_route::TradeRoute;
use crate::models::unbonding::{EpochUnbondingRecord, UserRedemptionRecord};
use cosmwasm_std::{Order, StdError, StdResult, Storage};
use cw_storage_plus::{Item, Map, PrimaryKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub const PARAMS: Item<Params> = Item::new("params");
pub const HOST_ZONES: Map<&str, HostZone> = Map::new("host_zone");
pub const EPOCH_TRACKERS: Map<&str, EpochTracker> = Map::new("epoch_tracker");
pub const DEPOSIT_RECORDS: Map<u64, DepositRecord> = Map::new("deposit_record");
pub const DEPOSIT_RECORD_COUNT: Item<u64> = Item::new("deposit_record_count");
pub const EPOCH_UNBONDING_RECORDS: Map<u64, EpochUnbondingRecord> =
    Map::new("epoch_unbonding_record");
pub const USER_REDEMPTION_RECORDS: Map<&str, UserRedemptionRecord> =
    Map::new("user_redemption_record");
pub const TRADE_ROUTES: Map<&str, TradeRoute> = Map::new("trade_route");

/// Every value of `map` in ascending key order
pub fn values<'a, K, T>(map: &Map<'a, K, T>, store: &dyn Storage) -> StdResult<Vec<T>>
where
    K: PrimaryKey<'a>,
    T: Serialize + DeserializeOwned + 'static,
{
    map.range_raw(store, None, None, Order::Ascending)
        .map(|item| item.map(|(_, value)| value))
        .collect()
}

/// Lookup failures shared by all pipelines
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StdError),

    #[error("Host zone not found: {0}")]
    HostZoneNotFound(String),

    #[error("Epoch tracker not found: {0}")]
    EpochTrackerNotFound(String),

    #[error("Deposit record not found: {0}")]
    DepositRecordNotFound(u64),

    #[error("Epoch unbonding record not found: {0}")]
    EpochUnbondingRecordNotFound(u64),

    #[error("User redemption record not found: {0}")]
    UserRedemptionRecordNotFound(String),

    #[error("Trade route not found: {0}")]
    TradeRouteNotFound(String),

    #[error("Host zone {chain_id} has no {account_type} account")]
    MissingAccount {
        chain_id: String,
        account_type: IcaAccountType,
    },

    #[error("Params not initialized")]
    ParamsMissing,
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        !matches!(self, StateError::Store(_))
    }
}

pub fn params(store: &dyn Storage) -> Result<Params, StateError> {
    PARAMS.may_load(store)?.ok_or(StateError::ParamsMissing)
}

pub fn host_zone(store: &dyn Storage, chain_id: &str) -> Result<HostZone, StateError> {
    HOST_ZONES
        .may_load(store, chain_id)?
        .ok_or_else(|| StateError::HostZoneNotFound(chain_id.to_string()))
}

pub fn save_host_zone(store: &mut dyn Storage, zone: &HostZone) -> Result<(), StateError> {
    HOST_ZONES.save(store, &zone.chain_id, zone)?;
    Ok(())
}

/// Interchain account of the given role, required to exist
pub fn ica_account(zone: &HostZone, account_type: IcaAccountType) -> Result<IcaAccount, StateError> {
    zone.account(account_type)
        .cloned()
        .ok_or_else(|| StateError::MissingAccount {
            chain_id: zone.chain_id.clone(),
            account_type,
        })
}

/// Registered zone whose native denom is `host_denom`
pub fn host_zone_by_denom(store: &dyn Storage, host_denom: &str) -> Result<HostZone, StateError> {
    all_host_zones(store)?
        .into_iter()
        .find(|z| z.host_denom == host_denom)
        .ok_or_else(|| StateError::HostZoneNotFound(host_denom.to_string()))
}

pub fn all_host_zones(store: &dyn Storage) -> Result<Vec<HostZone>, StateError> {
    Ok(values(&HOST_ZONES, store)?)
}

/// Host zones whose stake/unstake flow is not halted
pub fn active_host_zones(store: &dyn Storage) -> Result<Vec<HostZone>, StateError> {
    Ok(all_host_zones(store)?
        .into_iter()
        .filter(|z| !z.halted)
        .collect())
}

pub fn epoch_tracker(store: &dyn Storage, epoch: EpochId) -> Result<EpochTracker, StateError> {
    EPOCH_TRACKERS
        .may_load(store, epoch.as_str())?
        .ok_or_else(|| StateError::EpochTrackerNotFound(epoch.as_str().to_string()))
}

pub fn deposit_record(store: &dyn Storage, id: u64) -> Result<DepositRecord, StateError> {
    DEPOSIT_RECORDS
        .may_load(store, id)?
        .ok_or(StateError::DepositRecordNotFound(id))
}

pub fn all_deposit_records(store: &dyn Storage) -> Result<Vec<DepositRecord>, StateError> {
    Ok(values(&DEPOSIT_RECORDS, store)?)
}

/// Allocate the next deposit record id
pub fn next_deposit_record_id(store: &mut dyn Storage) -> Result<u64, StateError> {
    let next = DEPOSIT_RECORD_COUNT.may_load(store)?.unwrap_or(0);
    DEPOSIT_RECORD_COUNT.save(store, &(next + 1))?;
    Ok(next)
}

pub fn epoch_unbonding_record(
    store: &dyn Storage,
    epoch: u64,
) -> Result<EpochUnbondingRecord, StateError> {
    EPOCH_UNBONDING_RECORDS
        .may_load(store, epoch)?
        .ok_or(StateError::EpochUnbondingRecordNotFound(epoch))
}

pub fn all_epoch_unbonding_records(
    store: &dyn Storage,
) -> Result<Vec<EpochUnbondingRecord>, StateError> {
    Ok(values(&EPOCH_UNBONDING_RECORDS, store)?)
}

pub fn trade_route(store: &dyn Storage, key: &str) -> Result<TradeRoute, StateError> {
    TRADE_ROUTES
        .may_load(store, key)?
        .ok_or_else(|| StateError::TradeRouteNotFound(key.to_string()))
}
