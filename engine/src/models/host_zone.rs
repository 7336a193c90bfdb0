//! Host zone model
//!
//! A host zone is a counterparty chain on which native tokens are actually
//! delegated. It carries the connection identifiers, denoms, the validator
//! set, the interchain accounts the engine controls there, and the
//! redemption rate with its two tiers of safety bounds.
//!
//! CRITICAL: All token amounts are u128 base units

use crate::core::decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an interchain account on a host zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcaAccountType {
    Delegation,
    Fee,
    Withdrawal,
    Redemption,
    CommunityPoolDeposit,
    CommunityPoolReturn,
    ConverterUnwind,
    ConverterTrade,
}

impl IcaAccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcaAccountType::Delegation => "DELEGATION",
            IcaAccountType::Fee => "FEE",
            IcaAccountType::Withdrawal => "WITHDRAWAL",
            IcaAccountType::Redemption => "REDEMPTION",
            IcaAccountType::CommunityPoolDeposit => "COMMUNITY_POOL_DEPOSIT",
            IcaAccountType::CommunityPoolReturn => "COMMUNITY_POOL_RETURN",
            IcaAccountType::ConverterUnwind => "CONVERTER_UNWIND",
            IcaAccountType::ConverterTrade => "CONVERTER_TRADE",
        }
    }
}

impl fmt::Display for IcaAccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An interchain account controlled from this chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcaAccount {
    pub chain_id: String,
    pub account_type: IcaAccountType,
    pub connection_id: String,
    pub address: String,
}

impl IcaAccount {
    /// Controller-side owner string, unique per (chain, role)
    pub fn owner(&self) -> String {
        ica_owner(&self.chain_id, self.account_type)
    }
}

pub fn ica_owner(chain_id: &str, account_type: IcaAccountType) -> String {
    format!("{}.{}", chain_id, account_type.as_str())
}

/// A validator on the host zone and our stake with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub name: String,
    pub address: String,
    /// Relative target weight; zero means "unbond everything from here"
    pub weight: u64,
    pub delegation: u128,
}

impl Validator {
    pub fn new(name: impl Into<String>, address: impl Into<String>, weight: u64) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            weight,
            delegation: 0,
        }
    }
}

/// Per-counterparty-chain configuration and staking state
///
/// # Invariants
///
/// - Inner bounds, when set, lie within the outer bounds
/// - `total_delegated` equals the sum of validator delegations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostZone {
    pub chain_id: String,
    pub bech32_prefix: String,
    pub connection_id: String,
    pub transfer_channel_id: String,
    pub host_denom: String,
    /// Host denom as seen on this chain (ibc/...)
    pub ibc_denom: String,
    pub unbonding_period_secs: u64,
    pub validators: Vec<Validator>,
    pub total_delegated: u128,
    pub redemption_rate: Decimal,
    /// Admin-set outer bounds; zero falls back to the params default
    pub min_redemption_rate: Decimal,
    pub max_redemption_rate: Decimal,
    pub min_inner_redemption_rate: Decimal,
    pub max_inner_redemption_rate: Decimal,
    /// Further delegation/undelegation is suspended while set
    pub halted: bool,
    /// At most one account per role
    pub accounts: Vec<IcaAccount>,
}

impl HostZone {
    /// Liquid staked denom minted against this zone
    pub fn liquid_denom(&self) -> String {
        liquid_denom(&self.host_denom)
    }

    pub fn account(&self, account_type: IcaAccountType) -> Option<&IcaAccount> {
        self.accounts.iter().find(|a| a.account_type == account_type)
    }

    /// Register `account`, replacing any account with the same role
    pub fn set_account(&mut self, account: IcaAccount) {
        self.accounts.retain(|a| a.account_type != account.account_type);
        self.accounts.push(account);
    }

    pub fn validator(&self, address: &str) -> Option<&Validator> {
        self.validators.iter().find(|v| v.address == address)
    }

    pub fn validator_mut(&mut self, address: &str) -> Option<&mut Validator> {
        self.validators.iter_mut().find(|v| v.address == address)
    }

    pub fn total_weight(&self) -> u64 {
        self.validators.iter().map(|v| v.weight).sum()
    }

    /// Whether `address` carries this zone's bech32 prefix
    pub fn is_host_address(&self, address: &str) -> bool {
        address
            .strip_prefix(self.bech32_prefix.as_str())
            .map_or(false, |rest| rest.starts_with('1') && rest.len() > 1)
    }
}

pub fn liquid_denom(host_denom: &str) -> String {
    format!("st{}", host_denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_format() {
        assert_eq!(
            ica_owner("cosmoshub-4", IcaAccountType::Delegation),
            "cosmoshub-4.DELEGATION"
        );
    }

    #[test]
    fn test_liquid_denom() {
        assert_eq!(liquid_denom("uatom"), "stuatom");
    }

    #[test]
    fn test_set_account_replaces_same_role() {
        let account = |account_type, address: &str| IcaAccount {
            chain_id: "c".to_string(),
            account_type,
            connection_id: "connection-0".to_string(),
            address: address.to_string(),
        };
        let mut zone: HostZone = serde_json::from_value(serde_json::json!({
            "chain_id": "c",
            "bech32_prefix": "cosmos",
            "connection_id": "connection-0",
            "transfer_channel_id": "channel-0",
            "host_denom": "uatom",
            "ibc_denom": "ibc/uatom",
            "unbonding_period_secs": 0,
            "validators": [],
            "total_delegated": 0,
            "redemption_rate": "1",
            "min_redemption_rate": "0",
            "max_redemption_rate": "0",
            "min_inner_redemption_rate": "0",
            "max_inner_redemption_rate": "0",
            "halted": false,
            "accounts": []
        }))
        .unwrap();

        zone.set_account(account(IcaAccountType::Withdrawal, "cosmos1old"));
        zone.set_account(account(IcaAccountType::Delegation, "cosmos1d"));
        zone.set_account(account(IcaAccountType::Withdrawal, "cosmos1new"));

        assert_eq!(zone.accounts.len(), 2);
        assert_eq!(
            zone.account(IcaAccountType::Withdrawal).unwrap().address,
            "cosmos1new"
        );
        assert!(zone.account(IcaAccountType::Redemption).is_none());
    }
}
