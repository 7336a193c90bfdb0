//! Genesis - Export/Import Engine State
//!
//! Serializes every collection the engine owns, both callback ledgers
//! included, so a chain can be restarted from an exported snapshot with
//! in-flight packets and queries still resolvable.
//!
//! # Critical Invariants
//!
//! - **Params matching**: a snapshot is only imported when its params hash
//!   matches the params it carries
//! - **No orphans**: every record and route names a host zone in the snapshot
//! - **Monotonic ids**: the deposit record counter is above every record id
//! - **Empty target**: import only runs against a store without params

use crate::callbacks::ica::{IcaCallback, ICA_CALLBACKS};
use crate::callbacks::ledger::{LedgerEntry, LedgerError};
use crate::callbacks::query::{QueryCallback, QUERY_CALLBACKS};
use crate::core::context::Context;
use crate::core::params::{Params, ParamsError};
use crate::core::time::EpochTracker;
use crate::ibc::messages::PacketId;
use crate::models::deposit::DepositRecord;
use crate::models::host_zone::HostZone;
use crate::models::state::{
    self, StateError, DEPOSIT_RECORDS, DEPOSIT_RECORD_COUNT, EPOCH_TRACKERS,
    EPOCH_UNBONDING_RECORDS, HOST_ZONES, PARAMS, TRADE_ROUTES, USER_REDEMPTION_RECORDS,
};
use crate::models::trade_route::TradeRoute;
use crate::models::unbonding::{EpochUnbondingRecord, UserRedemptionRecord};
use crate::orchestrator::engine::{Orchestrator, StakeError};
use cosmwasm_std::StdError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("Params hash mismatch: expected {expected}, got {actual}")]
    ParamsHashMismatch { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid genesis state: {0}")]
    Invalid(String),

    #[error("Engine state already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StdError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisState {
    pub params: Params,

    /// SHA256 of the canonical params JSON (for validation)
    pub params_hash: String,

    pub host_zones: Vec<HostZone>,
    pub epoch_trackers: Vec<EpochTracker>,
    pub deposit_records: Vec<DepositRecord>,

    /// Next deposit record id
    pub deposit_record_count: u64,

    pub epoch_unbonding_records: Vec<EpochUnbondingRecord>,
    pub user_redemption_records: Vec<UserRedemptionRecord>,
    pub trade_routes: Vec<TradeRoute>,

    /// Pending ICA callbacks, keyed by packet
    pub ica_callbacks: Vec<LedgerEntry<PacketId, IcaCallback>>,

    /// Pending ICQ callbacks, keyed by query id
    pub query_callbacks: Vec<LedgerEntry<String, QueryCallback>>,
}

impl GenesisState {
    /// Empty state around `params`
    pub fn new(params: Params) -> Result<Self, GenesisError> {
        let params_hash = params_hash(&params)?;
        Ok(Self {
            params,
            params_hash,
            host_zones: Vec::new(),
            epoch_trackers: Vec::new(),
            deposit_records: Vec::new(),
            deposit_record_count: 0,
            epoch_unbonding_records: Vec::new(),
            user_redemption_records: Vec::new(),
            trade_routes: Vec::new(),
            ica_callbacks: Vec::new(),
            query_callbacks: Vec::new(),
        })
    }

    pub fn to_json(&self) -> Result<String, GenesisError> {
        serde_json::to_string(self).map_err(|e| GenesisError::Serialization(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, GenesisError> {
        serde_json::from_str(raw).map_err(|e| GenesisError::Serialization(e.to_string()))
    }
}

// ============================================================================
// Params Hashing
// ============================================================================

/// Deterministic SHA256 of the params
///
/// Object keys are sorted before hashing so the digest depends only on the
/// values.
///
/// # Example
/// ```
/// use stakeibc_engine::orchestrator::genesis::params_hash;
/// use stakeibc_engine::Params;
///
/// let a = params_hash(&Params::default()).unwrap();
/// let b = params_hash(&Params { deposit_interval: 2, ..Params::default() }).unwrap();
/// assert_eq!(a.len(), 64);
/// assert_ne!(a, b);
/// ```
pub fn params_hash(params: &Params) -> Result<String, GenesisError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value =
        serde_json::to_value(params).map_err(|e| GenesisError::Serialization(e.to_string()))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| GenesisError::Serialization(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validate snapshot integrity
///
/// Checks, in order: params hash and params, unique host zones, record
/// referential integrity, the deposit id counter, route ownership.
pub fn validate_genesis(genesis: &GenesisState) -> Result<(), GenesisError> {
    // 1. Params
    let actual = params_hash(&genesis.params)?;
    if actual != genesis.params_hash {
        return Err(GenesisError::ParamsHashMismatch {
            expected: genesis.params_hash.clone(),
            actual,
        });
    }
    genesis.params.validate()?;

    // 2. Host zones
    let mut chain_ids = BTreeSet::new();
    for zone in &genesis.host_zones {
        if !chain_ids.insert(zone.chain_id.as_str()) {
            return Err(GenesisError::Invalid(format!(
                "duplicate host zone {}",
                zone.chain_id
            )));
        }
    }
    let require_zone = |chain_id: &str, what: &str| {
        if chain_ids.contains(chain_id) {
            Ok(())
        } else {
            Err(GenesisError::Invalid(format!(
                "{} references unknown host zone {}",
                what, chain_id
            )))
        }
    };

    // 3. Deposit records
    let mut record_ids = BTreeSet::new();
    for record in &genesis.deposit_records {
        require_zone(&record.host_zone_id, &format!("deposit record {}", record.id))?;
        if !record_ids.insert(record.id) {
            return Err(GenesisError::Invalid(format!(
                "duplicate deposit record {}",
                record.id
            )));
        }
        if record.id >= genesis.deposit_record_count {
            return Err(GenesisError::Invalid(format!(
                "deposit record {} not below counter {}",
                record.id, genesis.deposit_record_count
            )));
        }
    }

    // 4. Unbonding records
    let mut epochs = BTreeSet::new();
    for record in &genesis.epoch_unbonding_records {
        if !epochs.insert(record.epoch_number) {
            return Err(GenesisError::Invalid(format!(
                "duplicate epoch unbonding record {}",
                record.epoch_number
            )));
        }
        for unbonding in &record.host_zone_unbondings {
            require_zone(
                &unbonding.host_zone_id,
                &format!("epoch unbonding record {}", record.epoch_number),
            )?;
        }
    }
    for record in &genesis.user_redemption_records {
        require_zone(&record.host_zone_id, &format!("user redemption record {}", record.id))?;
        let expected =
            UserRedemptionRecord::record_id(&record.host_zone_id, record.epoch_number, &record.receiver);
        if record.id != expected {
            return Err(GenesisError::Invalid(format!(
                "user redemption record {} should be keyed {}",
                record.id, expected
            )));
        }
    }

    // 5. Trade routes
    for route in &genesis.trade_routes {
        if !genesis
            .host_zones
            .iter()
            .any(|z| z.host_denom == route.host_denom_on_host_zone)
        {
            return Err(GenesisError::Invalid(format!(
                "trade route {} has no host zone",
                route.key()
            )));
        }
    }

    Ok(())
}

// ============================================================================
// Export / Import
// ============================================================================

impl Orchestrator {
    pub fn export_genesis(&self, ctx: &Context) -> Result<GenesisState, StakeError> {
        let params = state::params(ctx.store())?;
        let params_hash = params_hash(&params)?;
        Ok(GenesisState {
            params,
            params_hash,
            host_zones: state::values(&HOST_ZONES, ctx.store())?,
            epoch_trackers: state::values(&EPOCH_TRACKERS, ctx.store())?,
            deposit_records: state::values(&DEPOSIT_RECORDS, ctx.store())?,
            deposit_record_count: DEPOSIT_RECORD_COUNT.may_load(ctx.store())?.unwrap_or(0),
            epoch_unbonding_records: state::values(&EPOCH_UNBONDING_RECORDS, ctx.store())?,
            user_redemption_records: state::values(&USER_REDEMPTION_RECORDS, ctx.store())?,
            trade_routes: state::values(&TRADE_ROUTES, ctx.store())?,
            ica_callbacks: ICA_CALLBACKS.entries(ctx)?,
            query_callbacks: QUERY_CALLBACKS.entries(ctx)?,
        })
    }

    /// Validate `genesis` and write it into an empty store in one transition
    pub fn init_genesis(&self, ctx: &mut Context, genesis: GenesisState) -> Result<(), StakeError> {
        validate_genesis(&genesis)?;
        if PARAMS.may_load(ctx.store())?.is_some() {
            return Err(GenesisError::AlreadyInitialized.into());
        }
        ctx.atomic(|ctx| write_genesis(ctx, &genesis))?;
        info!(
            host_zones = genesis.host_zones.len(),
            deposit_records = genesis.deposit_records.len(),
            pending_ica = genesis.ica_callbacks.len(),
            pending_icq = genesis.query_callbacks.len(),
            "Imported genesis state"
        );
        Ok(())
    }
}

fn write_genesis(ctx: &mut Context, genesis: &GenesisState) -> Result<(), GenesisError> {
    PARAMS.save(ctx.store_mut(), &genesis.params)?;
    for zone in &genesis.host_zones {
        state::save_host_zone(ctx.store_mut(), zone)?;
    }
    for tracker in &genesis.epoch_trackers {
        EPOCH_TRACKERS.save(ctx.store_mut(), &tracker.epoch_identifier, tracker)?;
    }
    for record in &genesis.deposit_records {
        DEPOSIT_RECORDS.save(ctx.store_mut(), record.id, record)?;
    }
    DEPOSIT_RECORD_COUNT.save(ctx.store_mut(), &genesis.deposit_record_count)?;
    for record in &genesis.epoch_unbonding_records {
        EPOCH_UNBONDING_RECORDS.save(ctx.store_mut(), record.epoch_number, record)?;
    }
    for record in &genesis.user_redemption_records {
        USER_REDEMPTION_RECORDS.save(ctx.store_mut(), &record.id, record)?;
    }
    for route in &genesis.trade_routes {
        TRADE_ROUTES.save(ctx.store_mut(), &route.key(), route)?;
    }
    for entry in &genesis.ica_callbacks {
        ICA_CALLBACKS.restore(ctx, entry)?;
    }
    for entry in &genesis.query_callbacks {
        QUERY_CALLBACKS.restore(ctx, entry)?;
    }
    Ok(())
}
