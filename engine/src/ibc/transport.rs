//! Consumed interfaces
//!
//! The engine never talks to a network directly. Packet relaying, query
//! relaying, token accounting and rate limiting are all behind these traits
//! so that the same pipelines run against a live chain or the in-memory
//! doubles in [`super::mock`].

use crate::core::context::Context;
use crate::ibc::messages::{Coin, IcaMsg, PacketId};
use cosmwasm_std::{StdError, Uint128};
use cw_storage_plus::Map;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("ICA submission rejected: {0}")]
    IcaRejected(String),

    #[error("Transfer rejected: {0}")]
    TransferRejected(String),

    #[error("Query submission rejected: {0}")]
    QueryRejected(String),

    #[error("Rate limit exceeded on {channel_id} for {denom}: {amount}")]
    RateLimited {
        channel_id: String,
        denom: String,
        amount: u128,
    },
}

#[derive(Debug, Error)]
pub enum BankError {
    #[error("Insufficient {denom} balance on {address}: need {required}, have {available}")]
    InsufficientFunds {
        address: String,
        denom: String,
        required: u128,
        available: u128,
    },

    #[error("Supply overflow for {0}")]
    SupplyOverflow(String),

    #[error(transparent)]
    Store(#[from] StdError),
}

/// Interchain account and ICS-20 packet submission
pub trait IbcTransport {
    /// Submit `msgs` for execution by the account `owner` controls over
    /// `connection_id`. `timeout` is absolute unix nanos.
    fn submit_ica_tx(
        &mut self,
        connection_id: &str,
        owner: &str,
        msgs: Vec<IcaMsg>,
        timeout: u64,
    ) -> Result<PacketId, TransportError>;

    /// Local ICS-20 transfer out of this chain
    fn send_transfer(
        &mut self,
        channel_id: &str,
        sender: &str,
        receiver: &str,
        token: Coin,
        timeout: u64,
    ) -> Result<PacketId, TransportError>;
}

/// Interchain query submission; returns the query id
pub trait QueryTransport {
    fn submit_query(
        &mut self,
        connection_id: &str,
        path: &str,
        request: Vec<u8>,
        timeout: u64,
    ) -> Result<String, TransportError>;
}

/// Token primitive over local balances
///
/// Operations receive the transition's `Context`, so implementations that
/// keep balances in the store roll back together with the transition.
pub trait Bank {
    fn balance(&self, ctx: &Context, address: &str, denom: &str) -> Result<u128, BankError>;

    fn supply(&self, ctx: &Context, denom: &str) -> Result<u128, BankError>;

    fn send(&self, ctx: &mut Context, from: &str, to: &str, coin: &Coin) -> Result<(), BankError>;

    fn mint(&self, ctx: &mut Context, to: &str, coin: &Coin) -> Result<(), BankError>;

    fn burn(&self, ctx: &mut Context, from: &str, coin: &Coin) -> Result<(), BankError>;
}

/// Allow/deny check run before every outbound cross-chain transfer
pub trait RateLimitGuard {
    fn check_transfer(
        &self,
        channel_id: &str,
        denom: &str,
        amount: u128,
    ) -> Result<(), TransportError>;
}

/// Balances keyed by (address, denom)
const BALANCES: Map<(&str, &str), Uint128> = Map::new("bank_balance");
const SUPPLY: Map<&str, Uint128> = Map::new("bank_supply");

/// Local account holding tokens of this chain while they are away on `channel_id`
pub fn escrow_address(channel_id: &str) -> String {
    format!("transfer/{}", channel_id)
}

/// [`Bank`] keeping balances and supply inside the engine store
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreBank;

impl StoreBank {
    fn load_balance(ctx: &Context, address: &str, denom: &str) -> Result<Uint128, BankError> {
        Ok(BALANCES
            .may_load(ctx.store(), (address, denom))?
            .unwrap_or_default())
    }

    fn load_supply(ctx: &Context, denom: &str) -> Result<Uint128, BankError> {
        Ok(SUPPLY.may_load(ctx.store(), denom)?.unwrap_or_default())
    }

    fn add(ctx: &mut Context, address: &str, coin: &Coin) -> Result<(), BankError> {
        let updated = Self::load_balance(ctx, address, &coin.denom)?
            .checked_add(Uint128::new(coin.amount))
            .map_err(|_| BankError::SupplyOverflow(coin.denom.clone()))?;
        BALANCES.save(ctx.store_mut(), (address, coin.denom.as_str()), &updated)?;
        Ok(())
    }

    fn subtract(ctx: &mut Context, address: &str, coin: &Coin) -> Result<(), BankError> {
        let current = Self::load_balance(ctx, address, &coin.denom)?;
        let updated = current
            .checked_sub(Uint128::new(coin.amount))
            .map_err(|_| BankError::InsufficientFunds {
                address: address.to_string(),
                denom: coin.denom.clone(),
                required: coin.amount,
                available: current.u128(),
            })?;
        let key = (address, coin.denom.as_str());
        if updated.is_zero() {
            BALANCES.remove(ctx.store_mut(), key);
        } else {
            BALANCES.save(ctx.store_mut(), key, &updated)?;
        }
        Ok(())
    }
}

impl Bank for StoreBank {
    fn balance(&self, ctx: &Context, address: &str, denom: &str) -> Result<u128, BankError> {
        Ok(Self::load_balance(ctx, address, denom)?.u128())
    }

    fn supply(&self, ctx: &Context, denom: &str) -> Result<u128, BankError> {
        Ok(Self::load_supply(ctx, denom)?.u128())
    }

    fn send(&self, ctx: &mut Context, from: &str, to: &str, coin: &Coin) -> Result<(), BankError> {
        Self::subtract(ctx, from, coin)?;
        Self::add(ctx, to, coin)
    }

    fn mint(&self, ctx: &mut Context, to: &str, coin: &Coin) -> Result<(), BankError> {
        let supply = Self::load_supply(ctx, &coin.denom)?
            .checked_add(Uint128::new(coin.amount))
            .map_err(|_| BankError::SupplyOverflow(coin.denom.clone()))?;
        SUPPLY.save(ctx.store_mut(), &coin.denom, &supply)?;
        Self::add(ctx, to, coin)
    }

    fn burn(&self, ctx: &mut Context, from: &str, coin: &Coin) -> Result<(), BankError> {
        Self::subtract(ctx, from, coin)?;
        let supply = Self::load_supply(ctx, &coin.denom)?;
        SUPPLY.save(
            ctx.store_mut(),
            &coin.denom,
            &supply.saturating_sub(Uint128::new(coin.amount)),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_send_burn() {
        let mut ctx = Context::in_memory();
        let bank = StoreBank;
        let coin = Coin::new("stuatom", 100);

        bank.mint(&mut ctx, "alice", &coin).unwrap();
        bank.send(&mut ctx, "alice", "bob", &Coin::new("stuatom", 40))
            .unwrap();
        bank.burn(&mut ctx, "bob", &Coin::new("stuatom", 15)).unwrap();

        assert_eq!(bank.balance(&ctx, "alice", "stuatom").unwrap(), 60);
        assert_eq!(bank.balance(&ctx, "bob", "stuatom").unwrap(), 25);
        assert_eq!(bank.supply(&ctx, "stuatom").unwrap(), 85);
    }

    #[test]
    fn test_overdraw_rejected() {
        let mut ctx = Context::in_memory();
        let bank = StoreBank;
        let err = bank
            .send(&mut ctx, "alice", "bob", &Coin::new("uatom", 1))
            .unwrap_err();
        assert!(matches!(err, BankError::InsufficientFunds { available: 0, .. }));
    }

    #[test]
    fn test_balances_roll_back_with_context() {
        let mut ctx = Context::in_memory();
        let bank = StoreBank;
        let result: Result<(), BankError> = ctx.atomic(|ctx| {
            bank.mint(ctx, "alice", &Coin::new("uatom", 5))?;
            bank.burn(ctx, "alice", &Coin::new("uatom", 6))
        });
        assert!(result.is_err());
        assert_eq!(bank.supply(&ctx, "uatom").unwrap(), 0);
    }

    #[test]
    fn test_balance_keys_do_not_collide_across_separators() {
        let mut ctx = Context::in_memory();
        let bank = StoreBank;
        bank.mint(&mut ctx, "transfer/channel-0", &Coin::new("uatom", 7))
            .unwrap();
        assert_eq!(bank.balance(&ctx, "transfer", "channel-0/uatom").unwrap(), 0);
        assert_eq!(bank.balance(&ctx, "transfer/channel-0", "uatom").unwrap(), 7);
    }
}
