//! Event logging for auditing and alerting.
//!
//! Every significant state transition appends an `Event` to the context's
//! `EventLog`. Events are the observable surface of asynchronous failures:
//! a stuck record shows up as a failure event, never as a transaction error.
//!
//! # Event Types
//!
//! - **Stake flow**: liquid stake, redeem, claim
//! - **Deposit pipeline**: transfer and delegation submissions and outcomes
//! - **Unbonding pipeline**: undelegation, sweep, cleanup
//! - **Safety**: redemption-rate updates, halts, outer-bound alerts
//! - **Trade**: hops, swaps, price refresh, loss alerts
//! - **Callbacks**: callback failures after ledger resolution

use crate::core::decimal::Decimal;

/// Engine event capturing a state change.
///
/// All events carry the block height for temporal ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EpochStarted {
        height: u64,
        identifier: String,
        epoch_number: u64,
    },

    LiquidStake {
        height: u64,
        chain_id: String,
        staker: String,
        native_amount: u128,
        st_amount: u128,
    },

    RedeemStake {
        height: u64,
        chain_id: String,
        redeemer: String,
        receiver: String,
        st_amount: u128,
        native_amount: u128,
        epoch_number: u64,
    },

    UndelegatedTokensClaimed {
        height: u64,
        chain_id: String,
        receiver: String,
        native_amount: u128,
        epoch_number: u64,
    },

    DepositTransferSubmitted {
        height: u64,
        chain_id: String,
        record_id: u64,
        amount: u128,
    },

    DepositTransferred {
        height: u64,
        chain_id: String,
        record_id: u64,
    },

    DelegationSubmitted {
        height: u64,
        chain_id: String,
        record_id: u64,
        amount: u128,
    },

    DelegationCompleted {
        height: u64,
        chain_id: String,
        record_id: u64,
        amount: u128,
    },

    /// A deposit step was reverted to its retryable state
    DepositStepReverted {
        height: u64,
        chain_id: String,
        record_id: u64,
        failed_attempts: u32,
        reason: String,
    },

    RedemptionRateUpdated {
        height: u64,
        chain_id: String,
        old_rate: Decimal,
        new_rate: Decimal,
    },

    /// Candidate rate left the inner bounds; stake/unstake flow halted
    HostZoneHalted {
        height: u64,
        chain_id: String,
        candidate_rate: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Candidate rate left the outer bounds; needs admin attention
    RedemptionRateAlert {
        height: u64,
        chain_id: String,
        candidate_rate: Decimal,
        min: Decimal,
        max: Decimal,
    },

    HostZoneResumed {
        height: u64,
        chain_id: String,
    },

    UnbondingInitiated {
        height: u64,
        chain_id: String,
        native_amount: u128,
        epoch_numbers: Vec<u64>,
    },

    UndelegationAcknowledged {
        height: u64,
        chain_id: String,
        native_amount: u128,
        completion_time: u64,
    },

    UnbondingReverted {
        height: u64,
        chain_id: String,
        epoch_numbers: Vec<u64>,
        reason: String,
    },

    UnbondedTokensSwept {
        height: u64,
        chain_id: String,
        native_amount: u128,
        epoch_numbers: Vec<u64>,
    },

    SweepFailed {
        height: u64,
        chain_id: String,
        epoch_numbers: Vec<u64>,
        reason: String,
    },

    EpochUnbondingRecordPruned {
        height: u64,
        epoch_number: u64,
    },

    RewardsReinvested {
        height: u64,
        chain_id: String,
        native_amount: u128,
        fee_st_amount: u128,
    },

    Rebalanced {
        height: u64,
        chain_id: String,
        num_redelegations: usize,
        amount: u128,
    },

    CommunityPoolStaked {
        height: u64,
        chain_id: String,
        native_amount: u128,
        st_amount: u128,
    },

    RewardsAllocated {
        height: u64,
        denom: String,
        amount: u128,
    },

    TradeHopCompleted {
        height: u64,
        route_key: String,
        hop: String,
        amount: u128,
    },

    TradePriceUpdated {
        height: u64,
        route_key: String,
        price: Decimal,
    },

    SwapSubmitted {
        height: u64,
        route_key: String,
        input_amount: u128,
        min_output: u128,
    },

    SwapCompleted {
        height: u64,
        route_key: String,
        input_amount: u128,
        output_amount: u128,
    },

    /// Swap output fell below the loss bound; funds left on the trade account
    SwapLossExceeded {
        height: u64,
        route_key: String,
        min_output: u128,
        actual_output: u128,
    },

    CallbackFailed {
        height: u64,
        callback_id: String,
        key: String,
        error: String,
    },
}

impl Event {
    /// Block height at which this event occurred
    pub fn height(&self) -> u64 {
        match self {
            Event::EpochStarted { height, .. }
            | Event::LiquidStake { height, .. }
            | Event::RedeemStake { height, .. }
            | Event::UndelegatedTokensClaimed { height, .. }
            | Event::DepositTransferSubmitted { height, .. }
            | Event::DepositTransferred { height, .. }
            | Event::DelegationSubmitted { height, .. }
            | Event::DelegationCompleted { height, .. }
            | Event::DepositStepReverted { height, .. }
            | Event::RedemptionRateUpdated { height, .. }
            | Event::HostZoneHalted { height, .. }
            | Event::RedemptionRateAlert { height, .. }
            | Event::HostZoneResumed { height, .. }
            | Event::UnbondingInitiated { height, .. }
            | Event::UndelegationAcknowledged { height, .. }
            | Event::UnbondingReverted { height, .. }
            | Event::UnbondedTokensSwept { height, .. }
            | Event::SweepFailed { height, .. }
            | Event::EpochUnbondingRecordPruned { height, .. }
            | Event::RewardsReinvested { height, .. }
            | Event::Rebalanced { height, .. }
            | Event::CommunityPoolStaked { height, .. }
            | Event::RewardsAllocated { height, .. }
            | Event::TradeHopCompleted { height, .. }
            | Event::TradePriceUpdated { height, .. }
            | Event::SwapSubmitted { height, .. }
            | Event::SwapCompleted { height, .. }
            | Event::SwapLossExceeded { height, .. }
            | Event::CallbackFailed { height, .. } => *height,
        }
    }

    /// Short name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::EpochStarted { .. } => "EpochStarted",
            Event::LiquidStake { .. } => "LiquidStake",
            Event::RedeemStake { .. } => "RedeemStake",
            Event::UndelegatedTokensClaimed { .. } => "UndelegatedTokensClaimed",
            Event::DepositTransferSubmitted { .. } => "DepositTransferSubmitted",
            Event::DepositTransferred { .. } => "DepositTransferred",
            Event::DelegationSubmitted { .. } => "DelegationSubmitted",
            Event::DelegationCompleted { .. } => "DelegationCompleted",
            Event::DepositStepReverted { .. } => "DepositStepReverted",
            Event::RedemptionRateUpdated { .. } => "RedemptionRateUpdated",
            Event::HostZoneHalted { .. } => "HostZoneHalted",
            Event::RedemptionRateAlert { .. } => "RedemptionRateAlert",
            Event::HostZoneResumed { .. } => "HostZoneResumed",
            Event::UnbondingInitiated { .. } => "UnbondingInitiated",
            Event::UndelegationAcknowledged { .. } => "UndelegationAcknowledged",
            Event::UnbondingReverted { .. } => "UnbondingReverted",
            Event::UnbondedTokensSwept { .. } => "UnbondedTokensSwept",
            Event::SweepFailed { .. } => "SweepFailed",
            Event::EpochUnbondingRecordPruned { .. } => "EpochUnbondingRecordPruned",
            Event::RewardsReinvested { .. } => "RewardsReinvested",
            Event::Rebalanced { .. } => "Rebalanced",
            Event::CommunityPoolStaked { .. } => "CommunityPoolStaked",
            Event::RewardsAllocated { .. } => "RewardsAllocated",
            Event::TradeHopCompleted { .. } => "TradeHopCompleted",
            Event::TradePriceUpdated { .. } => "TradePriceUpdated",
            Event::SwapSubmitted { .. } => "SwapSubmitted",
            Event::SwapCompleted { .. } => "SwapCompleted",
            Event::SwapLossExceeded { .. } => "SwapLossExceeded",
            Event::CallbackFailed { .. } => "CallbackFailed",
        }
    }

    /// Host zone the event concerns, if any
    pub fn chain_id(&self) -> Option<&str> {
        match self {
            Event::LiquidStake { chain_id, .. }
            | Event::RedeemStake { chain_id, .. }
            | Event::UndelegatedTokensClaimed { chain_id, .. }
            | Event::DepositTransferSubmitted { chain_id, .. }
            | Event::DepositTransferred { chain_id, .. }
            | Event::DelegationSubmitted { chain_id, .. }
            | Event::DelegationCompleted { chain_id, .. }
            | Event::DepositStepReverted { chain_id, .. }
            | Event::RedemptionRateUpdated { chain_id, .. }
            | Event::HostZoneHalted { chain_id, .. }
            | Event::RedemptionRateAlert { chain_id, .. }
            | Event::HostZoneResumed { chain_id, .. }
            | Event::UnbondingInitiated { chain_id, .. }
            | Event::UndelegationAcknowledged { chain_id, .. }
            | Event::UnbondingReverted { chain_id, .. }
            | Event::UnbondedTokensSwept { chain_id, .. }
            | Event::SweepFailed { chain_id, .. }
            | Event::RewardsReinvested { chain_id, .. }
            | Event::Rebalanced { chain_id, .. }
            | Event::CommunityPoolStaked { chain_id, .. } => Some(chain_id),
            _ => None,
        }
    }
}

/// Ordered log of events
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Drop events logged after position `len` (rollback of a failed step)
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_chain(&self, chain_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.chain_id() == Some(chain_id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters() {
        let mut log = EventLog::new();
        log.log(Event::HostZoneResumed {
            height: 3,
            chain_id: "cosmoshub-4".to_string(),
        });
        log.log(Event::RewardsAllocated {
            height: 4,
            denom: "statom".to_string(),
            amount: 10,
        });

        assert_eq!(log.events_of_type("HostZoneResumed").len(), 1);
        assert_eq!(log.events_for_chain("cosmoshub-4").len(), 1);
        assert_eq!(log.events()[1].height(), 4);

        log.truncate(1);
        assert_eq!(log.len(), 1);
    }
}
