//! Pending-operation ledger
//!
//! Every remote-effecting submission writes one entry keyed by its transport
//! identifier (packet id for ICA, query id for ICQ). The entry names the
//! callback to run when the transport delivers a terminal result.
//!
//! # Critical Invariants
//!
//! 1. **At most one entry per key**: a second registration is rejected
//! 2. **At-most-once resolution**: the entry is deleted before its callback
//!    runs and stays deleted even if the callback fails
//! 3. **Unknown keys are benign**: resolving a key without an entry is a
//!    successful no-op (duplicate or unsolicited delivery)

use crate::core::context::Context;
use crate::models::state;
use cosmwasm_std::StdError;
use cw_storage_plus::{Map, PrimaryKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Callback already registered for {key}")]
    DuplicateCallback { key: String },

    #[error("Callback id {0} registered by more than one module")]
    DuplicateCallbackId(String),

    #[error(transparent)]
    Store(#[from] StdError),
}

/// Transport identifier usable as a ledger key
pub trait LedgerKey {
    /// Ordered byte encoding, unique per key
    fn storage_key(&self) -> Vec<u8>;
}

impl LedgerKey for u64 {
    fn storage_key(&self) -> Vec<u8> {
        self.joined_key()
    }
}

impl LedgerKey for String {
    fn storage_key(&self) -> Vec<u8> {
        self.as_str().joined_key()
    }
}

/// A closed set of callbacks with typed arguments
pub trait CallbackKind: Clone + Serialize + DeserializeOwned {
    /// Stable identifier used for routing and diagnostics
    fn callback_id(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry<K, C> {
    pub key: K,
    pub callback_id: String,
    pub args: C,
    /// Block height of registration
    pub registered_at: u64,
}

/// Ledger of pending callbacks keyed by `K`
pub struct CallbackLedger<K, C> {
    entries: Map<'static, Vec<u8>, LedgerEntry<K, C>>,
}

impl<K, C> CallbackLedger<K, C>
where
    K: LedgerKey + Display + Clone + Serialize + DeserializeOwned + 'static,
    C: CallbackKind + 'static,
{
    pub const fn new(namespace: &'static str) -> Self {
        Self {
            entries: Map::new(namespace),
        }
    }

    /// Record a pending callback for `key`
    pub fn register(&self, ctx: &mut Context, key: &K, args: C) -> Result<(), LedgerError> {
        if self.is_pending(ctx, key) {
            return Err(LedgerError::DuplicateCallback {
                key: key.to_string(),
            });
        }
        let entry = LedgerEntry {
            key: key.clone(),
            callback_id: args.callback_id().to_string(),
            args,
            registered_at: ctx.block_height(),
        };
        self.entries.save(ctx.store_mut(), key.storage_key(), &entry)?;
        debug!(key = %key, callback_id = entry.callback_id.as_str(), "Registered callback");
        Ok(())
    }

    pub fn get(&self, ctx: &Context, key: &K) -> Result<Option<LedgerEntry<K, C>>, LedgerError> {
        Ok(self.entries.may_load(ctx.store(), key.storage_key())?)
    }

    pub fn is_pending(&self, ctx: &Context, key: &K) -> bool {
        self.entries.has(ctx.store(), key.storage_key())
    }

    /// All pending entries in key order
    pub fn entries(&self, ctx: &Context) -> Result<Vec<LedgerEntry<K, C>>, LedgerError> {
        Ok(state::values(&self.entries, ctx.store())?)
    }

    /// Restore an exported entry verbatim
    pub fn restore(&self, ctx: &mut Context, entry: &LedgerEntry<K, C>) -> Result<(), LedgerError> {
        if self.is_pending(ctx, &entry.key) {
            return Err(LedgerError::DuplicateCallback {
                key: entry.key.to_string(),
            });
        }
        self.entries
            .save(ctx.store_mut(), entry.key.storage_key(), entry)?;
        Ok(())
    }

    /// Consume the entry for `key` and run `handler` on its arguments.
    ///
    /// Returns `Ok(false)` when no entry exists. The deletion is kept even
    /// when `handler` fails; the handler's writes are rolled back and its
    /// error is returned.
    pub fn resolve<E, F>(&self, ctx: &mut Context, key: &K, handler: F) -> Result<bool, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut Context, LedgerEntry<K, C>) -> Result<(), E>,
    {
        let entry = match self.get(ctx, key)? {
            Some(entry) => entry,
            None => {
                debug!(key = %key, "No pending callback, ignoring delivery");
                return Ok(false);
            }
        };
        self.entries.remove(ctx.store_mut(), key.storage_key());

        let callback_id = entry.callback_id.clone();
        match ctx.atomic(|ctx| handler(ctx, entry)) {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(key = %key, callback_id = callback_id.as_str(), "Callback failed after resolution");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping(u32);

    impl CallbackKind for Ping {
        fn callback_id(&self) -> &'static str {
            "ping"
        }
    }

    const LEDGER: CallbackLedger<u64, Ping> = CallbackLedger::new("ping_callback");

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut ctx = Context::in_memory();
        LEDGER.register(&mut ctx, &1, Ping(1)).unwrap();
        let err = LEDGER.register(&mut ctx, &1, Ping(2)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateCallback { .. }));
        assert_eq!(LEDGER.get(&ctx, &1).unwrap().unwrap().args, Ping(1));
    }

    #[test]
    fn test_missing_key_is_noop() {
        let mut ctx = Context::in_memory();
        let ran = LEDGER
            .resolve::<LedgerError, _>(&mut ctx, &9, |_, _| panic!("must not run"))
            .unwrap();
        assert!(!ran);
    }

    #[test]
    fn test_entry_deleted_even_when_handler_fails() {
        let mut ctx = Context::in_memory();
        LEDGER.register(&mut ctx, &3, Ping(3)).unwrap();
        let result = LEDGER.resolve(&mut ctx, &3, |_, _| {
            Err(LedgerError::DuplicateCallbackId("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(!LEDGER.is_pending(&ctx, &3));
    }
}
