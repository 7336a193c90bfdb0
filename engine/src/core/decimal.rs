//! Fixed-point helpers for exchange rates, prices and loss tolerances
//!
//! Token amounts are always integer base units (`u128`). Anything that is a
//! ratio between two amounts is a `cosmwasm_std::Decimal` (18 fractional
//! digits). This module adds the floor-rounded conversions the engine
//! needs between the two.
//!
//! CRITICAL: rates never touch floating point, so every node computes the
//! exact same redemption rate from the same store.

pub use cosmwasm_std::Decimal;

use cosmwasm_std::{CheckedFromRatioError, CheckedMultiplyRatioError, OverflowError, Uint128};
use thiserror::Error;

/// Errors produced by decimal arithmetic
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecimalError {
    #[error("Division by zero")]
    DivideByZero,

    #[error("Decimal arithmetic overflow")]
    Overflow,
}

impl From<CheckedFromRatioError> for DecimalError {
    fn from(err: CheckedFromRatioError) -> Self {
        match err {
            CheckedFromRatioError::DivideByZero => DecimalError::DivideByZero,
            CheckedFromRatioError::Overflow => DecimalError::Overflow,
        }
    }
}

impl From<CheckedMultiplyRatioError> for DecimalError {
    fn from(err: CheckedMultiplyRatioError) -> Self {
        match err {
            CheckedMultiplyRatioError::DivideByZero => DecimalError::DivideByZero,
            CheckedMultiplyRatioError::Overflow => DecimalError::Overflow,
        }
    }
}

impl From<OverflowError> for DecimalError {
    fn from(_: OverflowError) -> Self {
        DecimalError::Overflow
    }
}

/// `numerator / denominator`, truncated to 18 digits
///
/// # Example
/// ```
/// use stakeibc_engine::core::decimal::{ratio, DecimalExt};
///
/// let rate = ratio(3, 2).unwrap();
/// assert_eq!(rate.to_string(), "1.5");
/// assert_eq!(rate.mul_floor(100).unwrap(), 150);
/// ```
pub fn ratio(numerator: u128, denominator: u128) -> Result<Decimal, DecimalError> {
    Ok(Decimal::checked_from_ratio(numerator, denominator)?)
}

/// Integer-amount arithmetic on a rate
pub trait DecimalExt {
    /// `amount * self`, rounded down
    fn mul_floor(&self, amount: u128) -> Result<u128, DecimalError>;

    /// `amount / self`, rounded down
    fn div_floor(&self, amount: u128) -> Result<u128, DecimalError>;

    fn is_positive(&self) -> bool;
}

impl DecimalExt for Decimal {
    fn mul_floor(&self, amount: u128) -> Result<u128, DecimalError> {
        let scaled = Uint128::new(amount)
            .checked_multiply_ratio(self.atomics(), Decimal::one().atomics())?;
        Ok(scaled.u128())
    }

    fn div_floor(&self, amount: u128) -> Result<u128, DecimalError> {
        let scaled = Uint128::new(amount)
            .checked_multiply_ratio(Decimal::one().atomics(), self.atomics())?;
        Ok(scaled.u128())
    }

    fn is_positive(&self) -> bool {
        !self.is_zero()
    }
}
