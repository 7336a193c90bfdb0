//! Read-only queries for clients

use crate::callbacks::ica::{IcaCallback, ICA_CALLBACKS};
use crate::callbacks::ledger::LedgerEntry;
use crate::callbacks::query::{QueryCallback, QUERY_CALLBACKS};
use crate::core::context::Context;
use crate::ibc::messages::PacketId;
use crate::models::deposit::DepositRecord;
use crate::models::host_zone::HostZone;
use crate::models::state::{self, USER_REDEMPTION_RECORDS};
use crate::models::unbonding::{EpochUnbondingRecord, UnbondingStatus};
use crate::orchestrator::engine::{Orchestrator, StakeError};
use serde::Serialize;

/// One pending redemption owed to an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressUnbonding {
    pub address: String,
    pub receiver: String,
    pub host_zone_id: String,
    pub epoch_number: u64,
    pub native_amount: u128,
    pub denom: String,
    pub status: UnbondingStatus,
    /// Unix nanos; zero until the host zone acknowledged the undelegation
    pub completion_time: u64,
}

/// Snapshot of both callback ledgers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PendingCallbacks {
    pub ica: Vec<LedgerEntry<PacketId, IcaCallback>>,
    pub icq: Vec<LedgerEntry<String, QueryCallback>>,
}

impl PendingCallbacks {
    pub fn len(&self) -> usize {
        self.ica.len() + self.icq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Orchestrator {
    pub fn host_zone(&self, ctx: &Context, chain_id: &str) -> Result<HostZone, StakeError> {
        Ok(state::host_zone(ctx.store(), chain_id)?)
    }

    pub fn host_zones(&self, ctx: &Context) -> Result<Vec<HostZone>, StakeError> {
        Ok(state::all_host_zones(ctx.store())?)
    }

    /// Unclaimed redemptions where `address` is the redeemer or the receiver
    pub fn address_unbondings(
        &self,
        ctx: &Context,
        address: &str,
    ) -> Result<Vec<AddressUnbonding>, StakeError> {
        let mut unbondings = Vec::new();
        for record in state::values(&USER_REDEMPTION_RECORDS, ctx.store())? {
            if record.redeemer != address && record.receiver != address {
                continue;
            }
            let epoch_record = state::epoch_unbonding_record(ctx.store(), record.epoch_number)?;
            let (status, completion_time) = epoch_record
                .unbonding(&record.host_zone_id)
                .map(|u| (u.status, u.completion_time))
                .unwrap_or((UnbondingStatus::UnbondingQueue, 0));
            unbondings.push(AddressUnbonding {
                address: address.to_string(),
                receiver: record.receiver,
                host_zone_id: record.host_zone_id,
                epoch_number: record.epoch_number,
                native_amount: record.native_amount,
                denom: record.denom,
                status,
                completion_time,
            });
        }
        Ok(unbondings)
    }

    pub fn deposit_records(
        &self,
        ctx: &Context,
        chain_id: &str,
    ) -> Result<Vec<DepositRecord>, StakeError> {
        Ok(state::all_deposit_records(ctx.store())?
            .into_iter()
            .filter(|r| r.host_zone_id == chain_id)
            .collect())
    }

    pub fn epoch_unbonding_records(
        &self,
        ctx: &Context,
    ) -> Result<Vec<EpochUnbondingRecord>, StakeError> {
        Ok(state::all_epoch_unbonding_records(ctx.store())?)
    }

    pub fn pending_callbacks(&self, ctx: &Context) -> Result<PendingCallbacks, StakeError> {
        Ok(PendingCallbacks {
            ica: ICA_CALLBACKS.entries(ctx)?,
            icq: QUERY_CALLBACKS.entries(ctx)?,
        })
    }
}
