//! Epoch scheduler scenarios
//!
//! Step order, interval gating, isolation of failing steps, and the work
//! driven off the day, main and mint cadences.

mod common;

use common::*;
use stakeibc_engine::ibc::mock::PacketPayload;
use stakeibc_engine::ibc::IcaMsg;
use stakeibc_engine::models::{DepositSource, DepositStatus, IcaAccountType};
use stakeibc_engine::orchestrator::StakeHooks;
use stakeibc_engine::{Context, EpochHooks, EpochId, EpochInfo, Params};
use std::cell::RefCell;
use std::rc::Rc;

fn position_of(h: &Harness, event_type: &str) -> Option<usize> {
    h.ctx
        .events()
        .events()
        .iter()
        .position(|e| e.event_type() == event_type)
}

// =============================================================================
// Main epoch
// =============================================================================

#[test]
fn test_rates_update_before_deposits_move() {
    let mut h = Harness::new();
    h.orchestrator
        .liquid_stake(&mut h.ctx, USER, 1000, HOST_DENOM)
        .unwrap();
    h.advance_main();

    let rate = position_of(&h, "RedemptionRateUpdated").unwrap();
    let transfer = position_of(&h, "DepositTransferSubmitted").unwrap();
    assert!(rate < transfer);
}

#[test]
fn test_deposit_interval_gates_transfers() {
    let params = Params {
        deposit_interval: 3,
        ..Params::default()
    };
    let mut h = Harness::with_params(params);
    h.orchestrator
        .liquid_stake(&mut h.ctx, USER, 1000, HOST_DENOM)
        .unwrap();

    h.advance_main();
    assert_eq!(h.event_count("DepositTransferSubmitted"), 0);

    h.advance_main();
    assert_eq!(h.event_count("DepositTransferSubmitted"), 1);
}

#[test]
fn test_failing_step_does_not_stop_later_steps() {
    let mut h = Harness::new();
    h.rate_limits.set_quota(TRANSFER_CHANNEL, 500);
    h.orchestrator
        .liquid_stake(&mut h.ctx, USER, 1000, HOST_DENOM)
        .unwrap();
    let queries_before = h.queries.submitted().len();

    h.advance_main();

    let record = h
        .deposit_records()
        .into_iter()
        .find(|r| r.amount > 0)
        .unwrap();
    assert_eq!(record.status, DepositStatus::QueuedForTransfer);
    assert_eq!(h.balance(&h.deposit_address(), IBC_DENOM), 1000);
    assert_eq!(h.event_count("DepositTransferSubmitted"), 0);

    // Reinvest still queried the withdrawal account
    assert!(h.queries.submitted().len() > queries_before);
    h.last_balance_query(&host_address("withdrawal"));
}

#[test]
fn test_ica_timeout_leaves_buffer_before_next_epoch() {
    let mut h = Harness::new();
    h.orchestrator
        .liquid_stake(&mut h.ctx, USER, 1000, HOST_DENOM)
        .unwrap();
    h.advance_main();
    let transfer = h.last_transfer();
    h.ack_ok(&transfer);
    h.advance_main();

    let tracker = h
        .orchestrator
        .epoch_tracker(&h.ctx, EpochId::Main)
        .unwrap();
    assert_eq!(tracker.epoch_number, h.main_epoch);

    let delegation = h.last_ica_with(|m| matches!(m, IcaMsg::Delegate { .. }));
    let buffer = MAIN_EPOCH_NANOS / Params::default().buffer_size;
    assert_eq!(delegation.timeout, tracker.next_epoch_start_time - buffer);
    assert!(delegation.timeout > h.ctx.block_time());
}

#[test]
fn test_reinvest_creates_record_and_collects_fee() {
    let mut h = Harness::new();
    h.stake_and_delegate(1000);

    let query = h.last_balance_query(&host_address("withdrawal"));
    h.respond_balance(&query, 1000).unwrap();
    let send = h.last_ica_with(|m| matches!(m, IcaMsg::Send { .. }));
    match &send.msgs()[0] {
        IcaMsg::Send {
            from_address,
            to_address,
            amount,
        } => {
            assert_eq!(from_address, &host_address("withdrawal"));
            assert_eq!(to_address, &host_address("delegation"));
            assert_eq!(amount.amount, 1000);
        }
        other => panic!("expected a send, got {:?}", other),
    }
    h.ack_ok(&send);

    let record = h
        .deposit_records()
        .into_iter()
        .find(|r| r.source == DepositSource::WithdrawalAccount)
        .unwrap();
    assert_eq!(record.amount, 1000);
    assert_eq!(record.status, DepositStatus::QueuedForDelegation);

    let collector = h.orchestrator.config().reward_collector_address.clone();
    assert_eq!(h.balance(&collector, ST_DENOM), 100);
    assert_eq!(h.event_count("RewardsReinvested"), 1);
}

#[test]
fn test_rebalance_runs_once_per_day() {
    let mut h = Harness::new();
    h.stake_and_delegate(1000);
    h.orchestrator
        .change_validator_weight(&mut h.ctx, AUTHORITY, CHAIN_ID, VALIDATOR_B, 0)
        .unwrap();
    let sent_before = h.ibc.sent().len();

    // Main epoch 4 is the first multiple of epochs_per_day
    h.advance_main();
    assert_eq!(h.main_epoch, 4);
    assert!(h.ibc.sent().len() > sent_before);

    let packet = h.last_ica_with(|m| matches!(m, IcaMsg::Redelegate { .. }));
    match &packet.msgs()[0] {
        IcaMsg::Redelegate {
            src_validator_address,
            dst_validator_address,
            amount,
            ..
        } => {
            assert_eq!(src_validator_address, VALIDATOR_B);
            assert_eq!(dst_validator_address, VALIDATOR_A);
            assert_eq!(amount.amount, 500);
        }
        other => panic!("expected a redelegation, got {:?}", other),
    }
    h.ack_ok(&packet);

    let zone = h.zone();
    assert_eq!(zone.validator(VALIDATOR_A).unwrap().delegation, 1000);
    assert_eq!(zone.validator(VALIDATOR_B).unwrap().delegation, 0);
    assert_eq!(zone.total_delegated, 1000);
    assert_eq!(h.event_count("Rebalanced"), 1);

    // Nothing left to move on the next day boundary
    let redelegations = |h: &Harness| {
        h.ica_packets_of(IcaAccountType::Delegation)
            .iter()
            .filter(|p| p.msgs().iter().any(|m| matches!(m, IcaMsg::Redelegate { .. })))
            .count()
    };
    for _ in 0..4 {
        h.advance_main();
    }
    assert_eq!(redelegations(&h), 1);
}

#[test]
fn test_community_pool_tokens_staked_and_returned() {
    let mut h = Harness::new();
    for (account_type, name) in [
        (IcaAccountType::CommunityPoolDeposit, "cpdeposit"),
        (IcaAccountType::CommunityPoolReturn, "cpreturn"),
    ] {
        h.orchestrator
            .on_ica_channel_opened(&mut h.ctx, CHAIN_ID, account_type, &host_address(name))
            .unwrap();
    }

    h.advance_main();
    let query = h.last_balance_query(&host_address("cpdeposit"));
    h.respond_balance(&query, 200).unwrap();

    let packet = h.last_ica_with(|m| matches!(m, IcaMsg::Transfer { .. }));
    match &packet.msgs()[0] {
        IcaMsg::Transfer {
            sender,
            receiver,
            token,
            ..
        } => {
            assert_eq!(sender, &host_address("cpdeposit"));
            assert_eq!(receiver, &h.orchestrator.config().community_pool_holding_address);
            assert_eq!(token.amount, 200);
        }
        other => panic!("expected a transfer, got {:?}", other),
    }
    h.ack_ok(&packet);

    assert_eq!(h.event_count("CommunityPoolStaked"), 1);
    let returned = h.last_transfer();
    match &returned.payload {
        PacketPayload::Transfer {
            receiver, token, ..
        } => {
            assert_eq!(receiver, &host_address("cpreturn"));
            assert_eq!(token.denom, ST_DENOM);
            assert_eq!(token.amount, 200);
        }
        other => panic!("expected a transfer, got {:?}", other),
    }
    let holding = h.orchestrator.config().community_pool_holding_address.clone();
    assert_eq!(h.balance(&holding, ST_DENOM), 0);
    assert_eq!(h.balance(&holding, IBC_DENOM), 0);
}

#[test]
fn test_community_pool_skipped_without_deposit_account() {
    let mut h = Harness::new();
    h.advance_main();
    assert!(h
        .queries
        .submitted()
        .iter()
        .all(|q| !String::from_utf8_lossy(&q.request).contains("cpdeposit")));
}

// =============================================================================
// Mint epoch and hooks
// =============================================================================

#[test]
fn test_mint_epoch_allocates_fees() {
    let mut h = Harness::new();
    let collector = h.orchestrator.config().reward_collector_address.clone();
    let recipient = h.orchestrator.config().fee_recipient_address.clone();
    h.mint(&collector, ST_DENOM, 250);

    h.start_epoch(EpochId::Mint, 1, DAY_NANOS);

    assert_eq!(h.balance(&collector, ST_DENOM), 0);
    assert_eq!(h.balance(&recipient, ST_DENOM), 250);
    assert_eq!(h.event_count("RewardsAllocated"), 1);
}

struct StakeRecorder {
    seen: Rc<RefCell<Vec<(String, String, u128)>>>,
}

impl StakeHooks for StakeRecorder {
    fn after_liquid_stake(&self, _ctx: &mut Context, staker: &str, chain_id: &str, st_amount: u128) {
        self.seen
            .borrow_mut()
            .push((staker.to_string(), chain_id.to_string(), st_amount));
    }
}

#[test]
fn test_stake_hooks_notified() {
    let mut h = Harness::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    h.orchestrator.set_stake_hooks(vec![Box::new(StakeRecorder {
        seen: seen.clone(),
    })]);

    h.orchestrator
        .liquid_stake(&mut h.ctx, USER, 1000, HOST_DENOM)
        .unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![(USER.to_string(), CHAIN_ID.to_string(), 1000)]
    );

    // A rejected stake notifies nobody
    let _ = h
        .orchestrator
        .liquid_stake(&mut h.ctx, USER, 0, HOST_DENOM);
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn test_unknown_epoch_identifier_ignored() {
    let mut h = Harness::new();
    let started = h.event_count("EpochStarted");
    let info = EpochInfo {
        identifier: "week".to_string(),
        current_epoch: 1,
        current_epoch_start_time: h.ctx.block_time(),
        duration: 7 * DAY_NANOS,
    };

    h.orchestrator
        .before_epoch_start(&mut h.ctx, &info)
        .unwrap();
    assert_eq!(h.event_count("EpochStarted"), started);
}
