//! Host zone administration

use crate::callbacks::ica::ICA_CALLBACKS;
use crate::core::context::Context;
use crate::core::decimal::{Decimal, DecimalExt};
use crate::core::time::EpochId;
use crate::models::deposit::DepositRecord;
use crate::models::event::Event;
use crate::models::host_zone::{HostZone, IcaAccount, IcaAccountType, Validator};
use crate::models::state::{self, DEPOSIT_RECORDS, EPOCH_UNBONDING_RECORDS, HOST_ZONES};
use crate::models::unbonding::HostZoneUnbonding;
use crate::orchestrator::engine::Orchestrator;
use crate::registry::RegistryError;
use tracing::info;

/// Registration request for a new host zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterHostZone {
    pub chain_id: String,
    pub bech32_prefix: String,
    pub connection_id: String,
    pub transfer_channel_id: String,
    pub host_denom: String,
    pub ibc_denom: String,
    pub unbonding_period_secs: u64,
    pub validators: Vec<Validator>,
    /// Zero falls back to the params default
    pub min_redemption_rate: Decimal,
    pub max_redemption_rate: Decimal,
}

fn invalid(reason: impl Into<String>) -> RegistryError {
    RegistryError::InvalidHostZone(reason.into())
}

/// Below this many validators the weight cap is not enforced
pub const MIN_VALIDATORS_FOR_WEIGHT_CAP: usize = 10;

/// Reject a validator set in which one validator holds more than
/// `cap_percent` of the total weight
pub fn check_weight_cap(zone: &HostZone, cap_percent: u64) -> Result<(), RegistryError> {
    if zone.validators.len() < MIN_VALIDATORS_FOR_WEIGHT_CAP {
        return Ok(());
    }
    let total_weight = zone.total_weight();
    let limit = u128::from(total_weight) * u128::from(cap_percent);
    match zone
        .validators
        .iter()
        .find(|v| u128::from(v.weight) * 100 > limit)
    {
        Some(v) => Err(RegistryError::WeightAboveCap {
            address: v.address.clone(),
            weight: v.weight,
            total_weight,
            cap_percent,
        }),
        None => Ok(()),
    }
}

impl RegisterHostZone {
    fn validate(&self) -> Result<(), RegistryError> {
        if self.chain_id.is_empty() || self.chain_id.contains(char::is_whitespace) {
            return Err(invalid("chain id must be non-empty without whitespace"));
        }
        if self.bech32_prefix.is_empty()
            || !self
                .bech32_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(invalid("bech32 prefix must be lowercase alphanumeric"));
        }
        if !self.connection_id.starts_with("connection-") {
            return Err(invalid("connection id must look like connection-N"));
        }
        if !self.transfer_channel_id.starts_with("channel-") {
            return Err(invalid("transfer channel id must look like channel-N"));
        }
        if self.host_denom.is_empty() || self.ibc_denom.is_empty() {
            return Err(invalid("host and ibc denoms must be set"));
        }
        if self.unbonding_period_secs == 0 {
            return Err(invalid("unbonding period must be positive"));
        }
        if self.min_redemption_rate.is_positive()
            && self.max_redemption_rate.is_positive()
            && self.min_redemption_rate > self.max_redemption_rate
        {
            return Err(RegistryError::InvalidBounds {
                min: self.min_redemption_rate,
                max: self.max_redemption_rate,
            });
        }
        Ok(())
    }
}

impl Orchestrator {
    /// Register a host zone and open its first deposit and unbonding slots
    pub fn register_host_zone(
        &self,
        ctx: &mut Context,
        sender: &str,
        msg: RegisterHostZone,
    ) -> Result<HostZone, RegistryError> {
        if !self.is_authority(sender) {
            return Err(RegistryError::Unauthorized(sender.to_string()));
        }
        msg.validate()?;
        if HOST_ZONES.has(ctx.store(), &msg.chain_id) {
            return Err(RegistryError::HostZoneExists(msg.chain_id));
        }
        for existing in state::all_host_zones(ctx.store())? {
            if existing.host_denom == msg.host_denom || existing.ibc_denom == msg.ibc_denom {
                return Err(invalid(format!(
                    "denom {} already served by {}",
                    msg.host_denom, existing.chain_id
                )));
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for validator in &msg.validators {
            if !seen.insert(validator.address.as_str()) {
                return Err(RegistryError::ValidatorExists {
                    chain_id: msg.chain_id.clone(),
                    address: validator.address.clone(),
                });
            }
        }

        let zone = HostZone {
            chain_id: msg.chain_id,
            bech32_prefix: msg.bech32_prefix,
            connection_id: msg.connection_id,
            transfer_channel_id: msg.transfer_channel_id,
            host_denom: msg.host_denom,
            ibc_denom: msg.ibc_denom,
            unbonding_period_secs: msg.unbonding_period_secs,
            validators: msg
                .validators
                .into_iter()
                .map(|mut v| {
                    v.delegation = 0;
                    v
                })
                .collect(),
            total_delegated: 0,
            redemption_rate: Decimal::one(),
            min_redemption_rate: msg.min_redemption_rate,
            max_redemption_rate: msg.max_redemption_rate,
            min_inner_redemption_rate: msg.min_redemption_rate,
            max_inner_redemption_rate: msg.max_redemption_rate,
            halted: false,
            accounts: Vec::new(),
        };

        let main = state::epoch_tracker(ctx.store(), EpochId::Main)?;
        let record_id = state::next_deposit_record_id(ctx.store_mut())?;
        let record = DepositRecord::new(record_id, &zone.chain_id, &zone.ibc_denom, main.epoch_number);
        DEPOSIT_RECORDS.save(ctx.store_mut(), record_id, &record)?;

        let day = state::epoch_tracker(ctx.store(), EpochId::Day)?;
        let mut unbonding_record = state::epoch_unbonding_record(ctx.store(), day.epoch_number)?;
        unbonding_record
            .host_zone_unbondings
            .push(HostZoneUnbonding::new(&zone.chain_id, &zone.host_denom));
        EPOCH_UNBONDING_RECORDS.save(ctx.store_mut(), day.epoch_number, &unbonding_record)?;

        state::save_host_zone(ctx.store_mut(), &zone)?;
        info!(chain_id = %zone.chain_id, denom = %zone.host_denom, "Registered host zone");
        Ok(zone)
    }

    /// Record the address reported by an ICA channel handshake
    pub fn on_ica_channel_opened(
        &self,
        ctx: &mut Context,
        chain_id: &str,
        account_type: IcaAccountType,
        address: &str,
    ) -> Result<(), RegistryError> {
        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        if !zone.is_host_address(address) {
            return Err(invalid(format!(
                "{} is not a {} address",
                address, zone.bech32_prefix
            )));
        }
        let account = IcaAccount {
            chain_id: zone.chain_id.clone(),
            account_type,
            connection_id: zone.connection_id.clone(),
            address: address.to_string(),
        };
        info!(chain_id, account = %account_type, address, "ICA channel opened");
        zone.set_account(account);
        state::save_host_zone(ctx.store_mut(), &zone)?;
        Ok(())
    }

    pub fn add_validators(
        &self,
        ctx: &mut Context,
        sender: &str,
        chain_id: &str,
        validators: Vec<Validator>,
    ) -> Result<(), RegistryError> {
        if !self.is_authority(sender) {
            return Err(RegistryError::Unauthorized(sender.to_string()));
        }
        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        for mut validator in validators {
            if zone.validator(&validator.address).is_some() {
                return Err(RegistryError::ValidatorExists {
                    chain_id: chain_id.to_string(),
                    address: validator.address,
                });
            }
            validator.delegation = 0;
            zone.validators.push(validator);
        }
        check_weight_cap(&zone, state::params(ctx.store())?.validator_weight_cap)?;
        state::save_host_zone(ctx.store_mut(), &zone)?;
        Ok(())
    }

    pub fn change_validator_weight(
        &self,
        ctx: &mut Context,
        sender: &str,
        chain_id: &str,
        address: &str,
        weight: u64,
    ) -> Result<(), RegistryError> {
        if !self.is_authority(sender) {
            return Err(RegistryError::Unauthorized(sender.to_string()));
        }
        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        let validator =
            zone.validator_mut(address)
                .ok_or_else(|| RegistryError::ValidatorNotFound {
                    chain_id: chain_id.to_string(),
                    address: address.to_string(),
                })?;
        validator.weight = weight;
        check_weight_cap(&zone, state::params(ctx.store())?.validator_weight_cap)?;
        state::save_host_zone(ctx.store_mut(), &zone)?;
        Ok(())
    }

    /// Remove a validator; only allowed once nothing is delegated to it
    pub fn remove_validator(
        &self,
        ctx: &mut Context,
        sender: &str,
        chain_id: &str,
        address: &str,
    ) -> Result<(), RegistryError> {
        if !self.is_authority(sender) {
            return Err(RegistryError::Unauthorized(sender.to_string()));
        }
        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        let validator = zone
            .validator(address)
            .ok_or_else(|| RegistryError::ValidatorNotFound {
                chain_id: chain_id.to_string(),
                address: address.to_string(),
            })?;
        if validator.delegation > 0 {
            return Err(RegistryError::ValidatorHasDelegation {
                address: address.to_string(),
                delegation: validator.delegation,
            });
        }
        let in_flight = ICA_CALLBACKS
            .entries(ctx)?
            .iter()
            .any(|entry| entry.args.names_validator(chain_id, address));
        if in_flight {
            return Err(RegistryError::ValidatorHasPendingOperation {
                address: address.to_string(),
            });
        }
        zone.validators.retain(|v| v.address != address);
        state::save_host_zone(ctx.store_mut(), &zone)?;
        Ok(())
    }

    /// Clear the halt flag after admin review
    pub fn resume_host_zone(
        &self,
        ctx: &mut Context,
        sender: &str,
        chain_id: &str,
    ) -> Result<(), RegistryError> {
        if !self.is_authority(sender) {
            return Err(RegistryError::Unauthorized(sender.to_string()));
        }
        let mut zone = state::host_zone(ctx.store(), chain_id)?;
        if !zone.halted {
            return Err(RegistryError::HostZoneNotHalted(chain_id.to_string()));
        }
        zone.halted = false;
        state::save_host_zone(ctx.store_mut(), &zone)?;
        ctx.emit(Event::HostZoneResumed {
            height: ctx.block_height(),
            chain_id: chain_id.to_string(),
        });
        info!(chain_id, "Resumed host zone");
        Ok(())
    }
}
