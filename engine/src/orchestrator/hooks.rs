//! Epoch scheduler and cross-module hooks
//!
//! The external epochs module calls [`EpochHooks::before_epoch_start`] once
//! per boundary. The orchestrator's implementation updates the tracker for
//! that cadence and fans out to the pipelines:
//!
//! ```text
//! day        → initiate unbondings → sweep → cleanup → create record
//! main_epoch → claim rewards → deposit records → withdrawal address
//!              → redemption rates* → transfer* → stake* → reinvest*
//!              → rebalance (once per day) → community pool → trade routes
//! mint       → allocate fees
//!                                          * gated by their own interval
//! ```
//!
//! # Critical Invariants
//!
//! 1. **Step isolation**: every step runs in its own atomic transition; a
//!    failing step is rolled back and logged, later steps still run
//! 2. **Tracker first**: the tracker is updated before any step, so ICA
//!    timeouts are derived from the epoch being started

use crate::core::context::Context;
use crate::core::time::{EpochId, EpochInfo, EpochTracker};
use crate::models::event::Event;
use crate::models::state::{self, EPOCH_TRACKERS};
use crate::orchestrator::engine::{Orchestrator, StakeError};
use tracing::{debug, error, info};

// ============================================================================
// Hook traits
// ============================================================================

/// Listener for epoch boundaries
pub trait EpochHooks {
    fn before_epoch_start(&mut self, ctx: &mut Context, info: &EpochInfo) -> Result<(), StakeError>;

    fn after_epoch_end(&mut self, ctx: &mut Context, info: &EpochInfo) -> Result<(), StakeError>;
}

/// Listener notified after every successful liquid stake
pub trait StakeHooks {
    fn after_liquid_stake(&self, ctx: &mut Context, staker: &str, chain_id: &str, st_amount: u128);
}

/// Fans one epoch signal out to an ordered list of listeners
///
/// A listener's error is logged and does not stop the ones after it.
#[derive(Default)]
pub struct MultiEpochHooks {
    hooks: Vec<Box<dyn EpochHooks>>,
}

impl MultiEpochHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hooks(hooks: Vec<Box<dyn EpochHooks>>) -> Self {
        Self { hooks }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl EpochHooks for MultiEpochHooks {
    fn before_epoch_start(&mut self, ctx: &mut Context, info: &EpochInfo) -> Result<(), StakeError> {
        for hook in &mut self.hooks {
            if let Err(err) = hook.before_epoch_start(ctx, info) {
                error!(epoch = %info.identifier, error = %err, "Epoch hook failed");
            }
        }
        Ok(())
    }

    fn after_epoch_end(&mut self, ctx: &mut Context, info: &EpochInfo) -> Result<(), StakeError> {
        for hook in &mut self.hooks {
            if let Err(err) = hook.after_epoch_end(ctx, info) {
                error!(epoch = %info.identifier, error = %err, "Epoch hook failed");
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MultiStakeHooks {
    hooks: Vec<Box<dyn StakeHooks>>,
}

impl MultiStakeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hooks(hooks: Vec<Box<dyn StakeHooks>>) -> Self {
        Self { hooks }
    }
}

impl StakeHooks for MultiStakeHooks {
    fn after_liquid_stake(&self, ctx: &mut Context, staker: &str, chain_id: &str, st_amount: u128) {
        for hook in &self.hooks {
            hook.after_liquid_stake(ctx, staker, chain_id, st_amount);
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

impl Orchestrator {
    /// Run one scheduler step in its own transition, logging its failure
    fn run_step<F>(&mut self, ctx: &mut Context, step: &'static str, epoch: u64, f: F)
    where
        F: FnOnce(&mut Orchestrator, &mut Context) -> Result<(), StakeError>,
    {
        if let Err(err) = ctx.atomic(|ctx| f(self, ctx)) {
            error!(step, epoch, class = ?err.class(), error = %err, "Epoch step failed");
        }
    }

    fn run_day_epoch(&mut self, ctx: &mut Context, epoch: u64) {
        self.run_step(ctx, "initiate_unbondings", epoch, |o, ctx| {
            Ok(o.initiate_all_host_zone_unbondings(ctx, epoch)?)
        });
        self.run_step(ctx, "sweep_unbonded_tokens", epoch, |o, ctx| {
            Ok(o.sweep_all_unbonded_tokens(ctx)?)
        });
        self.run_step(ctx, "cleanup_unbonding_records", epoch, |o, ctx| {
            Ok(o.cleanup_epoch_unbonding_records(ctx, epoch)?)
        });
        self.run_step(ctx, "create_unbonding_record", epoch, |o, ctx| {
            Ok(o.create_epoch_unbonding_record(ctx, epoch)?)
        });
    }

    fn run_main_epoch(&mut self, ctx: &mut Context, epoch: u64) -> Result<(), StakeError> {
        let params = state::params(ctx.store())?;

        self.run_step(ctx, "claim_staking_rewards", epoch, |o, ctx| {
            Ok(o.claim_accrued_staking_rewards(ctx)?)
        });
        self.run_step(ctx, "create_deposit_records", epoch, |o, ctx| {
            Ok(o.create_deposit_records_for_epoch(ctx, epoch)?)
        });
        self.run_step(ctx, "set_withdrawal_address", epoch, |o, ctx| {
            Ok(o.set_withdrawal_address(ctx)?)
        });
        if epoch % params.redemption_rate_interval == 0 {
            self.run_step(ctx, "update_redemption_rates", epoch, |o, ctx| {
                Ok(o.update_redemption_rates(ctx)?)
            });
        }
        if epoch % params.deposit_interval == 0 {
            self.run_step(ctx, "transfer_deposits", epoch, |o, ctx| {
                Ok(o.transfer_existing_deposits(ctx, epoch)?)
            });
        }
        if epoch % params.delegate_interval == 0 {
            self.run_step(ctx, "stake_deposits", epoch, |o, ctx| {
                Ok(o.stake_existing_deposits(ctx, epoch)?)
            });
        }
        if epoch % params.reinvest_interval == 0 {
            self.run_step(ctx, "reinvest_rewards", epoch, |o, ctx| {
                Ok(o.reinvest_rewards(ctx)?)
            });
        }
        if epoch % params.epochs_per_day == 0 {
            self.run_step(ctx, "rebalance", epoch, |o, ctx| {
                Ok(o.rebalance_all_host_zones(ctx)?)
            });
        }
        self.run_step(ctx, "community_pool", epoch, |o, ctx| {
            Ok(o.process_all_community_pool_tokens(ctx)?)
        });
        self.run_step(ctx, "transfer_reward_tokens", epoch, |o, ctx| {
            Ok(o.transfer_all_reward_tokens(ctx)?)
        });
        self.run_step(ctx, "update_trade_prices", epoch, |o, ctx| {
            Ok(o.update_all_trade_route_prices(ctx)?)
        });
        self.run_step(ctx, "swap_reward_tokens", epoch, |o, ctx| {
            Ok(o.swap_all_reward_tokens(ctx)?)
        });
        Ok(())
    }

    /// Current tracker for a cadence
    pub fn epoch_tracker(&self, ctx: &Context, epoch: EpochId) -> Result<EpochTracker, StakeError> {
        Ok(state::epoch_tracker(ctx.store(), epoch)?)
    }
}

impl EpochHooks for Orchestrator {
    fn before_epoch_start(&mut self, ctx: &mut Context, info: &EpochInfo) -> Result<(), StakeError> {
        let epoch_id = match EpochId::parse(&info.identifier) {
            Some(id) => id,
            None => {
                debug!(identifier = %info.identifier, "Ignoring unknown epoch");
                return Ok(());
            }
        };
        let epoch = info.current_epoch;
        EPOCH_TRACKERS.save(ctx.store_mut(), epoch_id.as_str(), &EpochTracker::from_info(info))?;
        ctx.emit(Event::EpochStarted {
            height: ctx.block_height(),
            identifier: info.identifier.clone(),
            epoch_number: epoch,
        });
        info!(identifier = %info.identifier, epoch, "Epoch started");

        match epoch_id {
            EpochId::Day => self.run_day_epoch(ctx, epoch),
            EpochId::Main => self.run_main_epoch(ctx, epoch)?,
            EpochId::Mint => self.run_step(ctx, "allocate_rewards", epoch, |o, ctx| {
                Ok(o.allocate_host_zone_rewards(ctx)?)
            }),
        }
        Ok(())
    }

    fn after_epoch_end(&mut self, _ctx: &mut Context, info: &EpochInfo) -> Result<(), StakeError> {
        debug!(identifier = %info.identifier, epoch = info.current_epoch, "Epoch ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        seen: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl EpochHooks for Recorder {
        fn before_epoch_start(&mut self, _ctx: &mut Context, info: &EpochInfo) -> Result<(), StakeError> {
            self.seen
                .borrow_mut()
                .push(format!("{}:{}", self.name, info.current_epoch));
            if self.fail {
                return Err(StakeError::InvalidConfig("boom".to_string()));
            }
            Ok(())
        }

        fn after_epoch_end(&mut self, _ctx: &mut Context, _info: &EpochInfo) -> Result<(), StakeError> {
            Ok(())
        }
    }

    #[test]
    fn test_multi_hooks_run_in_order_past_failures() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = MultiEpochHooks::from_hooks(vec![
            Box::new(Recorder {
                name: "a",
                seen: seen.clone(),
                fail: true,
            }),
            Box::new(Recorder {
                name: "b",
                seen: seen.clone(),
                fail: false,
            }),
        ]);
        let mut ctx = Context::in_memory();
        let info = EpochInfo::new(EpochId::Day, 3, 0, 100);

        assert!(hooks.before_epoch_start(&mut ctx, &info).is_ok());
        assert_eq!(*seen.borrow(), vec!["a:3".to_string(), "b:3".to_string()]);
        assert_eq!(hooks.len(), 2);
    }
}
