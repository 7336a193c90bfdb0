//! Module parameters
//!
//! Cadence intervals are counted in main epochs, not blocks. Percentages are
//! whole numbers (`90` means 0.9) so the parameter set stays integer-only.

use crate::core::decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TEN_MINUTES_NANOS: u64 = 600_000_000_000;
const ONE_HOUR_NANOS: u64 = 6 * TEN_MINUTES_NANOS;

/// Errors produced by parameter validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("{name} must be positive")]
    NotPositive { name: &'static str },

    #[error("{name} must be at most {max}, got {value}")]
    TooLarge {
        name: &'static str,
        value: u64,
        max: u64,
    },

    #[error("{name} must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        value: u64,
        min: u64,
    },

    #[error("default min redemption threshold {min} must be below max {max}")]
    InvertedThresholds { min: u64, max: u64 },

    #[error("Invalid params json: {0}")]
    Json(String),
}

/// Engine-wide configuration, stored in state and updatable by the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub deposit_interval: u64,
    pub delegate_interval: u64,
    pub reinvest_interval: u64,
    pub redemption_rate_interval: u64,
    /// Share of harvested rewards kept as protocol fee
    pub fee_rate_percent: u64,
    /// ICA timeouts leave `epoch_duration / buffer_size` before the next boundary
    pub buffer_size: u64,
    pub ibc_transfer_timeout_nanos: u64,
    pub default_min_redemption_rate_threshold: u64,
    pub default_max_redemption_rate_threshold: u64,
    pub max_stake_ica_calls_per_epoch: u64,
    /// Main epochs per calendar day; rebalancing runs once per this many
    pub epochs_per_day: u64,
    pub swap_price_freshness_secs: u64,
    pub query_ttl_nanos: u64,
    pub max_redelegations_per_rebalance: u64,
    /// Largest share of a zone's total weight one validator may hold, in percent
    pub validator_weight_cap: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            deposit_interval: 1,
            delegate_interval: 1,
            reinvest_interval: 1,
            redemption_rate_interval: 1,
            fee_rate_percent: 10,
            buffer_size: 5,
            ibc_transfer_timeout_nanos: 3 * TEN_MINUTES_NANOS,
            default_min_redemption_rate_threshold: 90,
            default_max_redemption_rate_threshold: 150,
            max_stake_ica_calls_per_epoch: 100,
            epochs_per_day: 4,
            swap_price_freshness_secs: 6 * 60 * 60,
            query_ttl_nanos: ONE_HOUR_NANOS,
            max_redelegations_per_rebalance: 10,
            validator_weight_cap: 10,
        }
    }
}

fn positive(name: &'static str, value: u64) -> Result<(), ParamsError> {
    if value == 0 {
        return Err(ParamsError::NotPositive { name });
    }
    Ok(())
}

impl Params {
    /// Parse params from JSON; missing fields fall back to defaults
    ///
    /// # Example
    /// ```
    /// use stakeibc_engine::Params;
    ///
    /// let params = Params::from_json(r#"{"deposit_interval": 2}"#).unwrap();
    /// assert_eq!(params.deposit_interval, 2);
    /// assert_eq!(params.delegate_interval, 1);
    /// assert!(Params::from_json(r#"{"fee_rate_percent": 101}"#).is_err());
    /// ```
    pub fn from_json(raw: &str) -> Result<Self, ParamsError> {
        let params: Params =
            serde_json::from_str(raw).map_err(|e| ParamsError::Json(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        positive("deposit_interval", self.deposit_interval)?;
        positive("delegate_interval", self.delegate_interval)?;
        positive("reinvest_interval", self.reinvest_interval)?;
        positive("redemption_rate_interval", self.redemption_rate_interval)?;
        positive("buffer_size", self.buffer_size)?;
        positive("max_stake_ica_calls_per_epoch", self.max_stake_ica_calls_per_epoch)?;
        positive("epochs_per_day", self.epochs_per_day)?;
        positive("swap_price_freshness_secs", self.swap_price_freshness_secs)?;
        positive("query_ttl_nanos", self.query_ttl_nanos)?;
        positive("validator_weight_cap", self.validator_weight_cap)?;

        if self.fee_rate_percent > 100 {
            return Err(ParamsError::TooLarge {
                name: "fee_rate_percent",
                value: self.fee_rate_percent,
                max: 100,
            });
        }
        if self.validator_weight_cap > 100 {
            return Err(ParamsError::TooLarge {
                name: "validator_weight_cap",
                value: self.validator_weight_cap,
                max: 100,
            });
        }
        if self.ibc_transfer_timeout_nanos < TEN_MINUTES_NANOS {
            return Err(ParamsError::TooSmall {
                name: "ibc_transfer_timeout_nanos",
                value: self.ibc_transfer_timeout_nanos,
                min: TEN_MINUTES_NANOS,
            });
        }
        if self.ibc_transfer_timeout_nanos > ONE_HOUR_NANOS {
            return Err(ParamsError::TooLarge {
                name: "ibc_transfer_timeout_nanos",
                value: self.ibc_transfer_timeout_nanos,
                max: ONE_HOUR_NANOS,
            });
        }
        if self.default_min_redemption_rate_threshold < 75 {
            return Err(ParamsError::TooSmall {
                name: "default_min_redemption_rate_threshold",
                value: self.default_min_redemption_rate_threshold,
                min: 75,
            });
        }
        if self.default_max_redemption_rate_threshold > 1000 {
            return Err(ParamsError::TooLarge {
                name: "default_max_redemption_rate_threshold",
                value: self.default_max_redemption_rate_threshold,
                max: 1000,
            });
        }
        if self.default_min_redemption_rate_threshold >= self.default_max_redemption_rate_threshold {
            return Err(ParamsError::InvertedThresholds {
                min: self.default_min_redemption_rate_threshold,
                max: self.default_max_redemption_rate_threshold,
            });
        }
        Ok(())
    }

    pub fn default_min_redemption_rate(&self) -> Decimal {
        Decimal::percent(self.default_min_redemption_rate_threshold)
    }

    pub fn default_max_redemption_rate(&self) -> Decimal {
        Decimal::percent(self.default_max_redemption_rate_threshold)
    }
}
