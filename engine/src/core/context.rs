//! Execution context for one state transition
//!
//! A `Context` is the explicit handle every operation receives: the store,
//! the current block header fields and the event sink. There is no global
//! state, so two contexts never interfere.
//!
//! Persistence is any `cosmwasm_std::Storage`; collections on top of it are
//! `cw_storage_plus` maps and items.

use crate::core::time::NANOS_PER_SECOND;
use crate::models::event::{Event, EventLog};
use cosmwasm_std::{MemoryStorage, Order, Storage};

/// Store, block header and events for the current block
pub struct Context {
    store: Box<dyn Storage>,
    block_height: u64,
    /// Unix time in nanos
    block_time: u64,
    events: EventLog,
}

impl Context {
    pub fn new(store: Box<dyn Storage>, block_height: u64, block_time: u64) -> Self {
        Self {
            store,
            block_height,
            block_time,
            events: EventLog::new(),
        }
    }

    /// Fresh in-memory context at height 1, time 0
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()), 1, 0)
    }

    pub fn store(&self) -> &dyn Storage {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn Storage {
        self.store.as_mut()
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn block_time(&self) -> u64 {
        self.block_time
    }

    pub fn block_time_secs(&self) -> u64 {
        self.block_time / NANOS_PER_SECOND
    }

    /// Move to a new block
    pub fn set_block(&mut self, height: u64, time: u64) {
        self.block_height = height;
        self.block_time = time;
    }

    pub fn emit(&mut self, event: Event) {
        self.events.log(event);
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    /// Run `f` as one atomic transition: on error the store and the event
    /// log are restored to their state before the call.
    pub fn atomic<T, E>(&mut self, f: impl FnOnce(&mut Context) -> Result<T, E>) -> Result<T, E> {
        let saved = snapshot(self.store.as_ref());
        let events_len = self.events.len();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                restore(self.store.as_mut(), &saved);
                self.events.truncate(events_len);
                Err(err)
            }
        }
    }
}

/// Copy of every entry in `store`
fn snapshot(store: &dyn Storage) -> MemoryStorage {
    let mut copy = MemoryStorage::new();
    for (key, value) in store.range(None, None, Order::Ascending) {
        copy.set(&key, &value);
    }
    copy
}

/// Make `store` hold exactly the entries of `saved`
fn restore(store: &mut dyn Storage, saved: &MemoryStorage) {
    let current: Vec<Vec<u8>> = store
        .range(None, None, Order::Ascending)
        .map(|(key, _)| key)
        .collect();
    for key in current {
        if saved.get(&key).is_none() {
            store.remove(&key);
        }
    }
    for (key, value) in saved.range(None, None, Order::Ascending) {
        store.set(&key, &value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_storage_plus::Map;

    const FLAGS: Map<&str, bool> = Map::new("flags");

    #[test]
    fn test_atomic_rolls_back_on_error() {
        let mut ctx = Context::in_memory();
        let result: Result<(), &str> = ctx.atomic(|ctx| {
            FLAGS.save(ctx.store_mut(), "a", &true).unwrap();
            ctx.emit(Event::HostZoneResumed {
                height: 1,
                chain_id: "x".to_string(),
            });
            Err("boom")
        });
        assert!(result.is_err());
        assert!(!FLAGS.has(ctx.store(), "a"));
        assert!(ctx.events().is_empty());
    }

    #[test]
    fn test_atomic_keeps_writes_on_success() {
        let mut ctx = Context::in_memory();
        let result: Result<(), &str> = ctx.atomic(|ctx| {
            FLAGS.save(ctx.store_mut(), "a", &true).unwrap();
            Ok(())
        });
        assert!(result.is_ok());
        assert!(FLAGS.has(ctx.store(), "a"));
    }

    #[test]
    fn test_rollback_restores_overwritten_and_removed_keys() {
        let mut ctx = Context::in_memory();
        FLAGS.save(ctx.store_mut(), "kept", &true).unwrap();
        FLAGS.save(ctx.store_mut(), "flipped", &true).unwrap();

        let result: Result<(), &str> = ctx.atomic(|ctx| {
            FLAGS.remove(ctx.store_mut(), "kept");
            FLAGS.save(ctx.store_mut(), "flipped", &false).unwrap();
            Err("boom")
        });

        assert!(result.is_err());
        assert_eq!(FLAGS.may_load(ctx.store(), "kept").unwrap(), Some(true));
        assert_eq!(FLAGS.may_load(ctx.store(), "flipped").unwrap(), Some(true));
    }
}
