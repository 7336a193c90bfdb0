//! Callback ledger delivery guarantees
//!
//! At-most-once resolution, benign unknown keys, and failing callbacks that
//! still consume their entry, both on a bare ledger and through the
//! orchestrator's inbound entry points.

mod common;

use common::*;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use stakeibc_engine::callbacks::{CallbackKind, CallbackLedger, LedgerError};
use stakeibc_engine::ibc::{AckResponse, PacketId};
use stakeibc_engine::models::DepositStatus;
use stakeibc_engine::Context;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Tally {
    Count { tag: u32 },
    Fail,
}

impl CallbackKind for Tally {
    fn callback_id(&self) -> &'static str {
        match self {
            Tally::Count { .. } => "count",
            Tally::Fail => "fail",
        }
    }
}

const TALLIES: CallbackLedger<u64, Tally> = CallbackLedger::new("tally_callback");

fn run(ctx: &mut Context, key: u64, calls: &mut Vec<u32>) -> Result<bool, LedgerError> {
    TALLIES.resolve(ctx, &key, |_, entry| match entry.args {
        Tally::Count { tag } => {
            calls.push(tag);
            Ok(())
        }
        Tally::Fail => Err(LedgerError::DuplicateCallbackId("fail".to_string())),
    })
}

// =============================================================================
// Bare ledger
// =============================================================================

#[test]
fn test_entry_records_callback_id_and_height() {
    let mut ctx = Context::in_memory();
    ctx.set_block(42, 0);
    TALLIES.register(&mut ctx, &1, Tally::Count { tag: 1 }).unwrap();

    let entry = TALLIES.get(&ctx, &1).unwrap().unwrap();
    assert_eq!(entry.callback_id, "count");
    assert_eq!(entry.registered_at, 42);
    assert_eq!(TALLIES.entries(&ctx).unwrap().len(), 1);
}

#[test]
fn test_handler_writes_rolled_back_on_failure() {
    let mut ctx = Context::in_memory();
    TALLIES.register(&mut ctx, &1, Tally::Fail).unwrap();
    let result: Result<bool, LedgerError> = TALLIES.resolve(&mut ctx, &1, |ctx, _| {
        TALLIES.register(ctx, &2, Tally::Count { tag: 2 })?;
        Err(LedgerError::DuplicateCallbackId("fail".to_string()))
    });

    assert!(result.is_err());
    assert!(!TALLIES.is_pending(&ctx, &1));
    assert!(!TALLIES.is_pending(&ctx, &2));
}

#[test]
fn test_restore_rejects_existing_key() {
    let mut ctx = Context::in_memory();
    TALLIES.register(&mut ctx, &5, Tally::Count { tag: 5 }).unwrap();
    let entry = TALLIES.get(&ctx, &5).unwrap().unwrap();
    assert!(TALLIES.restore(&mut ctx, &entry).is_err());

    let mut fresh = Context::in_memory();
    TALLIES.restore(&mut fresh, &entry).unwrap();
    assert_eq!(TALLIES.get(&fresh, &5).unwrap(), Some(entry));
}

proptest! {
    /// Every registration runs its callback at most once, whatever order
    /// deliveries arrive in and however often they are repeated
    #[test]
    fn prop_at_most_once_delivery(
        ops in prop::collection::vec((any::<bool>(), 0u64..8, any::<bool>()), 1..60)
    ) {
        let mut ctx = Context::in_memory();
        let mut pending: BTreeMap<u64, Tally> = BTreeMap::new();
        let mut calls = Vec::new();
        let mut expected_calls = Vec::new();
        let mut next_tag = 0u32;

        for (is_register, key, fails) in ops {
            if is_register {
                let tally = if fails {
                    Tally::Fail
                } else {
                    next_tag += 1;
                    Tally::Count { tag: next_tag }
                };
                let result = TALLIES.register(&mut ctx, &key, tally.clone());
                if pending.contains_key(&key) {
                    prop_assert!(result.is_err());
                } else {
                    prop_assert!(result.is_ok());
                    pending.insert(key, tally);
                }
            } else {
                let result = run(&mut ctx, key, &mut calls);
                match pending.remove(&key) {
                    None => prop_assert_eq!(result.ok(), Some(false)),
                    Some(Tally::Fail) => prop_assert!(result.is_err()),
                    Some(Tally::Count { tag }) => {
                        prop_assert_eq!(result.ok(), Some(true));
                        expected_calls.push(tag);
                    }
                }
                prop_assert!(!TALLIES.is_pending(&ctx, &key));
            }
        }

        prop_assert_eq!(calls, expected_calls);
        prop_assert_eq!(TALLIES.entries(&ctx).unwrap().len(), pending.len());
    }
}

// =============================================================================
// Orchestrator entry points
// =============================================================================

#[test]
fn test_unknown_packet_is_noop() {
    let mut h = Harness::new();
    let events_before = h.ctx.events().len();
    let stray = PacketId {
        port_id: "transfer".to_string(),
        channel_id: TRANSFER_CHANNEL.to_string(),
        sequence: 9_999,
    };

    h.orchestrator
        .on_acknowledgement(&mut h.ctx, &stray, AckResponse::Success(vec![]))
        .unwrap();
    h.orchestrator.on_timeout(&mut h.ctx, &stray).unwrap();
    h.orchestrator
        .on_query_response(&mut h.ctx, "no-such-query", b"{}")
        .unwrap();
    h.orchestrator
        .on_query_timeout(&mut h.ctx, "no-such-query")
        .unwrap();

    assert_eq!(h.ctx.events().len(), events_before);
}

#[test]
fn test_each_submission_registers_one_entry() {
    let mut h = Harness::new();
    h.orchestrator
        .liquid_stake(&mut h.ctx, USER, 1000, HOST_DENOM)
        .unwrap();
    h.advance_main();
    let transfer = h.last_transfer();

    let pending = h.orchestrator.pending_callbacks(&h.ctx).unwrap();
    let matching: Vec<_> = pending
        .ica
        .iter()
        .filter(|e| e.key == transfer.packet_id)
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].callback_id, "deposit_transfer");

    h.ack_ok(&transfer);
    let pending = h.orchestrator.pending_callbacks(&h.ctx).unwrap();
    assert!(pending.ica.iter().all(|e| e.key != transfer.packet_id));
}

#[test]
fn test_redelivery_after_timeout_is_ignored() {
    let mut h = Harness::new();
    h.orchestrator
        .liquid_stake(&mut h.ctx, USER, 1000, HOST_DENOM)
        .unwrap();
    h.advance_main();
    let transfer = h.last_transfer();

    h.timeout(&transfer);
    // A late success for the same packet must not advance the record
    h.ack_ok(&transfer);

    let record = h
        .deposit_records()
        .into_iter()
        .find(|r| r.amount > 0)
        .unwrap();
    assert_eq!(record.status, DepositStatus::QueuedForTransfer);
    assert_eq!(record.failed_attempts, 1);
}

#[test]
fn test_malformed_query_response_consumes_entry() {
    let mut h = Harness::new();
    h.stake_and_delegate(1000);
    let query = h.last_balance_query(&host_address("withdrawal"));

    let err = h
        .orchestrator
        .on_query_response(&mut h.ctx, &query.query_id, b"not json")
        .unwrap_err();
    assert_eq!(err.class(), stakeibc_engine::orchestrator::ErrorClass::Validation);
    assert_eq!(h.event_count("CallbackFailed"), 1);

    let pending = h.orchestrator.pending_callbacks(&h.ctx).unwrap();
    assert!(pending.icq.iter().all(|e| e.key != query.query_id));
}

#[test]
fn test_registry_routes_every_callback_kind() {
    let h = Harness::new();
    let registry = h.orchestrator.callback_registry();
    for id in stakeibc_engine::callbacks::ICA_CALLBACK_IDS {
        assert_eq!(registry.module_for(id), Some("stakeibc"));
    }
    for id in stakeibc_engine::callbacks::QUERY_CALLBACK_IDS {
        assert_eq!(registry.module_for(id), Some("stakeibc_icq"));
    }
}
