//! Unbonding pipeline scenarios
//!
//! redeem → undelegate → mature → sweep → claim → prune, plus the paths that
//! put an unbonding back in the queue or defer its sweep.

mod common;

use common::*;
use stakeibc_engine::core::NANOS_PER_SECOND;
use stakeibc_engine::ibc::mock::SentPacket;
use stakeibc_engine::ibc::{AckResponse, Bank, Coin, IcaMsg, MsgResponse};
use stakeibc_engine::models::UnbondingStatus;
use stakeibc_engine::orchestrator::ErrorClass;

const UNBONDING_NANOS: u64 = UNBONDING_PERIOD_SECS * NANOS_PER_SECOND;

/// Two redemptions in day epoch 1: 400 for `USER`, 100 for `OTHER_USER`
fn redeemed_harness() -> Harness {
    let mut h = Harness::new();
    h.stake_and_delegate(1000);
    h.bank
        .send(&mut h.ctx, USER, OTHER_USER, &Coin::new(ST_DENOM, 100))
        .unwrap();

    h.orchestrator
        .redeem_stake(&mut h.ctx, USER, 400, CHAIN_ID, USER)
        .unwrap();
    h.orchestrator
        .redeem_stake(&mut h.ctx, OTHER_USER, 100, CHAIN_ID, OTHER_USER)
        .unwrap();
    h
}

fn undelegation_packet(h: &Harness) -> SentPacket {
    h.last_ica_with(|m| matches!(m, IcaMsg::Undelegate { .. }))
}

fn ack_undelegation(h: &mut Harness, packet: &SentPacket, completion_time: u64) {
    let responses = vec![MsgResponse::Undelegate { completion_time }; packet.msgs().len()];
    h.ack(packet, AckResponse::Success(responses)).unwrap();
}

fn redemption_queries(h: &Harness) -> usize {
    let redemption = host_address("redemption");
    h.queries
        .submitted()
        .iter()
        .filter(|q| {
            serde_json::from_slice::<stakeibc_engine::ibc::BalanceQuery>(&q.request)
                .map(|r| r.address == redemption)
                .unwrap_or(false)
        })
        .count()
}

// =============================================================================
// Redemption requests
// =============================================================================

#[test]
fn test_redemptions_accumulate_into_day_record() {
    let h = redeemed_harness();

    let unbonding = h.unbonding(1);
    assert_eq!(unbonding.status, UnbondingStatus::UnbondingQueue);
    assert_eq!(unbonding.native_amount, 500);
    assert_eq!(unbonding.st_amount, 500);
    assert_eq!(h.balance(&h.deposit_address(), ST_DENOM), 500);

    let mine = h.orchestrator.address_unbondings(&h.ctx, USER).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].native_amount, 400);
    assert_eq!(mine[0].epoch_number, 1);

    // Conservation: user shares add up to the zone's unbonding
    let owed: u128 = [USER, OTHER_USER]
        .iter()
        .flat_map(|a| h.orchestrator.address_unbondings(&h.ctx, a).unwrap())
        .map(|u| u.native_amount)
        .sum();
    assert_eq!(owed, unbonding.native_amount);
}

#[test]
fn test_redeem_beyond_unbondable_rejected() {
    let mut h = redeemed_harness();
    // 500 already queued out of 1000 delegated
    let err = h
        .orchestrator
        .redeem_stake(&mut h.ctx, USER, 501, CHAIN_ID, USER)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    assert_eq!(h.unbonding(1).native_amount, 500);
}

#[test]
fn test_redeem_validation() {
    let mut h = redeemed_harness();
    assert!(h
        .orchestrator
        .redeem_stake(&mut h.ctx, USER, 0, CHAIN_ID, USER)
        .is_err());
    assert!(h
        .orchestrator
        .redeem_stake(&mut h.ctx, USER, 10, CHAIN_ID, "")
        .is_err());
    let err = h
        .orchestrator
        .redeem_stake(&mut h.ctx, USER, 10, "osmosis-1", USER)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}

// =============================================================================
// Full lifecycle
// =============================================================================

#[test]
fn test_full_unbonding_lifecycle() {
    let mut h = redeemed_harness();

    h.advance_day();
    let packet = undelegation_packet(&h);
    let undelegated: u128 = packet
        .msgs()
        .iter()
        .map(|m| match m {
            IcaMsg::Undelegate { amount, .. } => amount.amount,
            _ => 0,
        })
        .sum();
    assert_eq!(undelegated, 500);
    assert_eq!(h.unbonding(1).status, UnbondingStatus::UnbondingInProgress);

    let completion_time = h.ctx.block_time() + UNBONDING_NANOS;
    ack_undelegation(&mut h, &packet, completion_time);

    let unbonding = h.unbonding(1);
    assert_eq!(unbonding.completion_time, completion_time);
    assert_eq!(h.zone().total_delegated, 500);
    assert_eq!(h.supply(ST_DENOM), 500);
    assert_eq!(h.balance(&h.deposit_address(), ST_DENOM), 0);

    // Not claimable before the sweep
    let err = h
        .orchestrator
        .claim_undelegated_tokens(&mut h.ctx, USER, CHAIN_ID, 1)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);

    h.advance_time(UNBONDING_NANOS);
    h.advance_day();
    assert_eq!(h.unbonding(1).status, UnbondingStatus::Unbonded);
    assert!(h.unbonding(1).sweep_pending);

    let query = h.last_balance_query(&host_address("redemption"));
    h.respond_balance(&query, 500).unwrap();
    let sweep = h.last_ica_with(|m| matches!(m, IcaMsg::Transfer { .. }));
    match &sweep.msgs()[0] {
        IcaMsg::Transfer {
            sender,
            receiver,
            token,
            ..
        } => {
            assert_eq!(sender, &host_address("redemption"));
            assert_eq!(receiver, &h.deposit_address());
            assert_eq!(token.amount, 500);
        }
        other => panic!("expected a transfer, got {:?}", other),
    }

    h.ack_ok(&sweep);
    assert_eq!(h.unbonding(1).status, UnbondingStatus::Claimable);
    assert_eq!(h.balance(&h.deposit_address(), IBC_DENOM), 500);

    let paid = h
        .orchestrator
        .claim_undelegated_tokens(&mut h.ctx, USER, CHAIN_ID, 1)
        .unwrap();
    assert_eq!(paid, 400);
    assert_eq!(h.unbonding(1).status, UnbondingStatus::Claimable);
    assert_eq!(h.balance(USER, IBC_DENOM), USER_FUNDS - 1000 + 400);

    h.orchestrator
        .claim_undelegated_tokens(&mut h.ctx, OTHER_USER, CHAIN_ID, 1)
        .unwrap();
    assert_eq!(h.unbonding(1).status, UnbondingStatus::Claimed);
    assert_eq!(h.unbonding(1).claimed_native_amount, 500);
    assert_eq!(h.balance(&h.deposit_address(), IBC_DENOM), 0);

    // A second claim finds no record
    let err = h
        .orchestrator
        .claim_undelegated_tokens(&mut h.ctx, USER, CHAIN_ID, 1)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);

    h.advance_day();
    let remaining = h.orchestrator.epoch_unbonding_records(&h.ctx).unwrap();
    assert!(remaining.iter().all(|r| r.epoch_number != 1));
    assert!(h.event_count("EpochUnbondingRecordPruned") >= 1);
}

#[test]
fn test_undelegation_timeout_requeues() {
    let mut h = redeemed_harness();
    h.advance_day();
    let packet = undelegation_packet(&h);

    h.timeout(&packet);

    let unbonding = h.unbonding(1);
    assert_eq!(unbonding.status, UnbondingStatus::UnbondingQueue);
    assert_eq!(unbonding.failed_attempts, 1);
    assert_eq!(unbonding.native_amount, 500);
    assert_eq!(h.zone().total_delegated, 1000);
    assert_eq!(h.balance(&h.deposit_address(), ST_DENOM), 500);
    assert_eq!(h.event_count("UnbondingReverted"), 1);

    h.advance_day();
    let retry = undelegation_packet(&h);
    assert_ne!(retry.packet_id, packet.packet_id);
    assert_eq!(h.unbonding(1).status, UnbondingStatus::UnbondingInProgress);
}

#[test]
fn test_short_redemption_balance_defers_sweep() {
    let mut h = redeemed_harness();
    h.advance_day();
    let packet = undelegation_packet(&h);
    let completion_time = h.ctx.block_time() + UNBONDING_NANOS;
    ack_undelegation(&mut h, &packet, completion_time);

    h.advance_time(UNBONDING_NANOS);
    h.advance_day();
    let queries_before = redemption_queries(&h);
    let sent_before = h.ibc.sent().len();

    let query = h.last_balance_query(&host_address("redemption"));
    h.respond_balance(&query, 499).unwrap();

    assert_eq!(h.ibc.sent().len(), sent_before);
    let unbonding = h.unbonding(1);
    assert_eq!(unbonding.status, UnbondingStatus::Unbonded);
    assert!(!unbonding.sweep_pending);

    h.advance_day();
    assert_eq!(redemption_queries(&h), queries_before + 1);
}

#[test]
fn test_failed_sweep_retries_next_day() {
    let mut h = redeemed_harness();
    h.advance_day();
    let packet = undelegation_packet(&h);
    let completion_time = h.ctx.block_time() + UNBONDING_NANOS;
    ack_undelegation(&mut h, &packet, completion_time);
    h.advance_time(UNBONDING_NANOS);
    h.advance_day();

    let query = h.last_balance_query(&host_address("redemption"));
    h.respond_balance(&query, 500).unwrap();
    let sweep = h.last_ica_with(|m| matches!(m, IcaMsg::Transfer { .. }));
    h.timeout(&sweep);

    assert_eq!(h.unbonding(1).status, UnbondingStatus::Unbonded);
    assert_eq!(h.balance(&h.deposit_address(), IBC_DENOM), 0);
    assert_eq!(h.event_count("SweepFailed"), 1);

    let queries_before = redemption_queries(&h);
    h.advance_day();
    assert_eq!(redemption_queries(&h), queries_before + 1);

    let query = h.last_balance_query(&host_address("redemption"));
    h.respond_balance(&query, 500).unwrap();
    let retry = h.last_ica_with(|m| matches!(m, IcaMsg::Transfer { .. }));
    assert_ne!(retry.packet_id, sweep.packet_id);
    h.ack_ok(&retry);
    assert_eq!(h.unbonding(1).status, UnbondingStatus::Claimable);
    assert_eq!(h.balance(&h.deposit_address(), IBC_DENOM), 500);
}

#[test]
fn test_rejected_sweep_transfer_retries_next_day() {
    let mut h = redeemed_harness();
    h.advance_day();
    let packet = undelegation_packet(&h);
    let completion_time = h.ctx.block_time() + UNBONDING_NANOS;
    ack_undelegation(&mut h, &packet, completion_time);
    h.advance_time(UNBONDING_NANOS);
    h.advance_day();

    // The balance callback fails when the transfer is refused
    let sent_before = h.ibc.sent().len();
    let query = h.last_balance_query(&host_address("redemption"));
    h.ibc.reject_next("channel closed");
    let _ = h.respond_balance(&query, 500);
    assert_eq!(h.ibc.sent().len(), sent_before);
    assert_eq!(h.unbonding(1).status, UnbondingStatus::Unbonded);

    let queries_before = redemption_queries(&h);
    h.advance_day();
    assert_eq!(redemption_queries(&h), queries_before + 1);
    assert!(h.unbonding(1).sweep_pending);

    let query = h.last_balance_query(&host_address("redemption"));
    h.respond_balance(&query, 500).unwrap();
    let sweep = h.last_ica_with(|m| matches!(m, IcaMsg::Transfer { .. }));
    h.ack_ok(&sweep);
    assert_eq!(h.unbonding(1).status, UnbondingStatus::Claimable);
    assert_eq!(h.balance(&h.deposit_address(), IBC_DENOM), 500);

    // No further sweep once the tokens are home
    let queries_after = redemption_queries(&h);
    h.advance_day();
    assert_eq!(redemption_queries(&h), queries_after);
}

#[test]
fn test_pending_sweep_query_not_repeated() {
    let mut h = redeemed_harness();
    h.advance_day();
    let packet = undelegation_packet(&h);
    let completion_time = h.ctx.block_time() + UNBONDING_NANOS;
    ack_undelegation(&mut h, &packet, completion_time);
    h.advance_time(UNBONDING_NANOS);
    h.advance_day();

    let queries_before = redemption_queries(&h);
    h.advance_day();
    assert_eq!(redemption_queries(&h), queries_before);
}
