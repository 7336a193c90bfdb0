//! Redemption rate computation and the two-tier safety bounds

mod common;

use common::*;
use stakeibc_engine::ibc::IcaMsg;
use stakeibc_engine::models::{DepositSource, DepositStatus};
use stakeibc_engine::orchestrator::ErrorClass;
use stakeibc_engine::registry::BoundsCheck;
use stakeibc_engine::{Decimal, Params};

fn no_fee_harness() -> Harness {
    let params = Params {
        fee_rate_percent: 0,
        ..Params::default()
    };
    Harness::with_params(params)
}

/// Deliver `amount` of rewards from the withdrawal account back into a
/// queued deposit record
fn reinvest(h: &mut Harness, amount: u128) {
    let query = h.last_balance_query(&host_address("withdrawal"));
    h.respond_balance(&query, amount).unwrap();
    let send = h.last_ica_with(|m| matches!(m, IcaMsg::Send { .. }));
    h.ack_ok(&send);
}

#[test]
fn test_rate_without_supply_keeps_current() {
    let mut h = Harness::new();
    let check = h
        .orchestrator
        .update_redemption_rate(&mut h.ctx, CHAIN_ID)
        .unwrap();
    assert_eq!(check, BoundsCheck::Within);
    assert_eq!(h.zone().redemption_rate, Decimal::one());
    assert_eq!(h.event_count("RedemptionRateUpdated"), 0);
}

#[test]
fn test_rate_counts_pending_deposits() {
    let mut h = no_fee_harness();
    h.stake_and_delegate(1000);
    reinvest(&mut h, 100);

    let record = h
        .deposit_records()
        .into_iter()
        .find(|r| r.source == DepositSource::WithdrawalAccount)
        .unwrap();
    assert_eq!(record.status, DepositStatus::QueuedForDelegation);
    assert_eq!(record.amount, 100);

    let zone = h.zone();
    let candidate = h
        .orchestrator
        .compute_redemption_rate(&h.ctx, &zone)
        .unwrap()
        .unwrap();
    assert_eq!(candidate, Decimal::from_ratio(1100u128, 1000u128));

    let check = h
        .orchestrator
        .update_redemption_rate(&mut h.ctx, CHAIN_ID)
        .unwrap();
    assert_eq!(check, BoundsCheck::Within);
    assert_eq!(h.zone().redemption_rate, candidate);

    // New stake now mints fewer liquid tokens per native token
    let st = h
        .orchestrator
        .liquid_stake(&mut h.ctx, USER, 1100, HOST_DENOM)
        .unwrap();
    assert_eq!(st, 1000);
}

#[test]
fn test_inner_bound_breach_halts_zone() {
    let mut h = no_fee_harness();
    h.stake_and_delegate(1000);
    h.orchestrator
        .set_inner_safety_bounds(&mut h.ctx, AUTHORITY, CHAIN_ID, Decimal::percent(90), Decimal::percent(110))
        .unwrap();

    reinvest(&mut h, 500);
    let check = h
        .orchestrator
        .update_redemption_rate(&mut h.ctx, CHAIN_ID)
        .unwrap();

    assert_eq!(check, BoundsCheck::OutsideInner);
    let zone = h.zone();
    assert!(zone.halted);
    assert_eq!(zone.redemption_rate, Decimal::one());
    assert_eq!(h.event_count("HostZoneHalted"), 1);
    assert_eq!(h.event_count("RedemptionRateAlert"), 0);

    let err = h
        .orchestrator
        .liquid_stake(&mut h.ctx, USER, 100, HOST_DENOM)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::SafetyBound);
}

#[test]
fn test_outer_bound_breach_alerts() {
    let mut h = no_fee_harness();
    h.stake_and_delegate(1000);

    reinvest(&mut h, 1000);
    let check = h
        .orchestrator
        .update_redemption_rate(&mut h.ctx, CHAIN_ID)
        .unwrap();

    assert_eq!(check, BoundsCheck::OutsideOuter);
    assert!(h.zone().halted);
    assert_eq!(h.zone().redemption_rate, Decimal::one());
    assert_eq!(h.event_count("RedemptionRateAlert"), 1);
}

#[test]
fn test_halted_zone_still_redeems_but_stops_deposits() {
    let mut h = no_fee_harness();
    h.stake_and_delegate(1000);
    h.orchestrator
        .set_inner_safety_bounds(&mut h.ctx, AUTHORITY, CHAIN_ID, Decimal::percent(90), Decimal::percent(110))
        .unwrap();
    reinvest(&mut h, 500);

    // The scheduler's rate update halts the zone before the stake step
    h.advance_main();
    assert!(h.zone().halted);
    let reinvested = h
        .deposit_records()
        .into_iter()
        .find(|r| r.source == DepositSource::WithdrawalAccount)
        .unwrap();
    assert_eq!(reinvested.status, DepositStatus::QueuedForDelegation);

    let native = h
        .orchestrator
        .redeem_stake(&mut h.ctx, USER, 100, CHAIN_ID, USER)
        .unwrap();
    assert_eq!(native, 100);
}

#[test]
fn test_resume_host_zone() {
    let mut h = no_fee_harness();
    h.stake_and_delegate(1000);
    reinvest(&mut h, 1000);
    h.orchestrator
        .update_redemption_rate(&mut h.ctx, CHAIN_ID)
        .unwrap();
    assert!(h.zone().halted);

    let err = h
        .orchestrator
        .resume_host_zone(&mut h.ctx, USER, CHAIN_ID)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    assert!(h.zone().halted);

    h.orchestrator
        .resume_host_zone(&mut h.ctx, AUTHORITY, CHAIN_ID)
        .unwrap();
    assert!(!h.zone().halted);
    assert_eq!(h.event_count("HostZoneResumed"), 1);

    assert!(h
        .orchestrator
        .resume_host_zone(&mut h.ctx, AUTHORITY, CHAIN_ID)
        .is_err());
}

#[test]
fn test_bounds_administration() {
    let mut h = Harness::new();

    let err = h
        .orchestrator
        .set_outer_safety_bounds(&mut h.ctx, USER, CHAIN_ID, Decimal::percent(80), Decimal::percent(200))
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);

    // Inner bounds must sit within the outer ones
    let err = h
        .orchestrator
        .set_inner_safety_bounds(&mut h.ctx, AUTHORITY, CHAIN_ID, Decimal::percent(50), Decimal::percent(110))
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::SafetyBound);

    h.orchestrator
        .set_outer_safety_bounds(&mut h.ctx, AUTHORITY, CHAIN_ID, Decimal::percent(50), Decimal::percent(200))
        .unwrap();
    h.orchestrator
        .set_inner_safety_bounds(&mut h.ctx, AUTHORITY, CHAIN_ID, Decimal::percent(50), Decimal::percent(110))
        .unwrap();

    let zone = h.zone();
    assert_eq!(zone.min_redemption_rate, Decimal::percent(50));
    assert_eq!(zone.max_inner_redemption_rate, Decimal::percent(110));
}
