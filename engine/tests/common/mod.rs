//! Shared fixtures for the scenario tests
//!
//! `Harness` owns one orchestrator wired to the in-memory transport doubles,
//! keeps observer handles on those doubles, and registers one host zone
//! with its interchain accounts opened and a funded user.

#![allow(dead_code)]

use stakeibc_engine::core::NANOS_PER_SECOND;
use stakeibc_engine::ibc::mock::{
    MockIbcTransport, MockQueryTransport, PacketPayload, SentPacket, StaticRateLimits,
    SubmittedQuery,
};
use stakeibc_engine::ibc::{
    AckResponse, Bank, BalanceQuery, BalanceResponse, Coin, IcaMsg, MsgResponse,
    SpotPriceResponse, StoreBank,
};
use stakeibc_engine::models::{
    ica_owner, DepositRecord, HostZone, HostZoneUnbonding, IcaAccountType, Validator,
};
use stakeibc_engine::orchestrator::{EngineConfig, Orchestrator, StakeError, Transports};
use stakeibc_engine::registry::RegisterHostZone;
use stakeibc_engine::{Context, Decimal, EpochHooks, EpochId, EpochInfo, Params};

pub const AUTHORITY: &str = "gov";
pub const USER: &str = "stride1user";
pub const OTHER_USER: &str = "stride1other";

pub const CHAIN_ID: &str = "cosmoshub-4";
pub const HOST_DENOM: &str = "uatom";
pub const IBC_DENOM: &str = "ibc/uatom";
pub const ST_DENOM: &str = "stuatom";
pub const TRANSFER_CHANNEL: &str = "channel-0";

pub const VALIDATOR_A: &str = "cosmosvaloper1a";
pub const VALIDATOR_B: &str = "cosmosvaloper1b";

pub const USER_FUNDS: u128 = 1_000_000;

pub const DAY_NANOS: u64 = 86_400 * NANOS_PER_SECOND;
pub const MAIN_EPOCH_NANOS: u64 = DAY_NANOS / 4;
pub const GENESIS_TIME: u64 = 1_000 * NANOS_PER_SECOND;
pub const UNBONDING_PERIOD_SECS: u64 = 21 * 86_400;

/// Route `tracing` output to the test writer; `RUST_LOG` filters it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Orchestrator plus observer handles on its transport doubles
pub fn build_orchestrator() -> (Orchestrator, MockIbcTransport, MockQueryTransport, StaticRateLimits) {
    let ibc = MockIbcTransport::new();
    let queries = MockQueryTransport::new();
    let rate_limits = StaticRateLimits::new();
    let transports = Transports {
        ibc: Box::new(ibc.clone()),
        queries: Box::new(queries.clone()),
        bank: Box::new(StoreBank),
        rate_limits: Box::new(rate_limits.clone()),
    };
    let orchestrator = Orchestrator::new(EngineConfig::default(), transports).unwrap();
    (orchestrator, ibc, queries, rate_limits)
}

pub fn host_address(name: &str) -> String {
    format!("cosmos1{}", name)
}

pub struct Harness {
    pub ctx: Context,
    pub orchestrator: Orchestrator,
    pub ibc: MockIbcTransport,
    pub queries: MockQueryTransport,
    pub rate_limits: StaticRateLimits,
    pub bank: StoreBank,
    pub day_epoch: u64,
    pub main_epoch: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_params(Params::default())
    }

    /// Initialized engine at day 1 / main epoch 1 with one registered zone
    pub fn with_params(params: Params) -> Self {
        let mut harness = Self::bare(params);
        harness.register_zone();
        harness
    }

    /// Initialized engine with epochs started but no host zone
    pub fn bare(params: Params) -> Self {
        init_tracing();
        let (orchestrator, ibc, queries, rate_limits) = build_orchestrator();
        let mut ctx = Context::in_memory();
        ctx.set_block(1, GENESIS_TIME);
        orchestrator.initialize(&mut ctx, params).unwrap();

        let mut harness = Self {
            ctx,
            orchestrator,
            ibc,
            queries,
            rate_limits,
            bank: StoreBank,
            day_epoch: 1,
            main_epoch: 1,
        };
        harness.start_epoch(EpochId::Day, 1, DAY_NANOS);
        harness.start_epoch(EpochId::Main, 1, MAIN_EPOCH_NANOS);
        harness
    }

    pub fn register_zone(&mut self) {
        let msg = RegisterHostZone {
            chain_id: CHAIN_ID.to_string(),
            bech32_prefix: "cosmos".to_string(),
            connection_id: "connection-0".to_string(),
            transfer_channel_id: TRANSFER_CHANNEL.to_string(),
            host_denom: HOST_DENOM.to_string(),
            ibc_denom: IBC_DENOM.to_string(),
            unbonding_period_secs: UNBONDING_PERIOD_SECS,
            validators: vec![
                Validator::new("val-a", VALIDATOR_A, 50),
                Validator::new("val-b", VALIDATOR_B, 50),
            ],
            min_redemption_rate: Decimal::zero(),
            max_redemption_rate: Decimal::zero(),
        };
        self.orchestrator
            .register_host_zone(&mut self.ctx, AUTHORITY, msg)
            .unwrap();

        for (account_type, name) in [
            (IcaAccountType::Delegation, "delegation"),
            (IcaAccountType::Fee, "fee"),
            (IcaAccountType::Withdrawal, "withdrawal"),
            (IcaAccountType::Redemption, "redemption"),
        ] {
            self.orchestrator
                .on_ica_channel_opened(&mut self.ctx, CHAIN_ID, account_type, &host_address(name))
                .unwrap();
        }
        self.mint(USER, IBC_DENOM, USER_FUNDS);
    }

    // ========================================================================
    // Clock
    // ========================================================================

    pub fn start_epoch(&mut self, id: EpochId, number: u64, duration: u64) {
        let info = EpochInfo::new(id, number, self.ctx.block_time(), duration);
        self.orchestrator
            .before_epoch_start(&mut self.ctx, &info)
            .unwrap();
    }

    pub fn advance_time(&mut self, nanos: u64) {
        let height = self.ctx.block_height() + 1;
        let time = self.ctx.block_time() + nanos;
        self.ctx.set_block(height, time);
    }

    pub fn advance_main(&mut self) {
        self.main_epoch += 1;
        self.advance_time(MAIN_EPOCH_NANOS);
        self.start_epoch(EpochId::Main, self.main_epoch, MAIN_EPOCH_NANOS);
    }

    pub fn advance_day(&mut self) {
        self.day_epoch += 1;
        self.advance_time(DAY_NANOS);
        self.start_epoch(EpochId::Day, self.day_epoch, DAY_NANOS);
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn balance(&self, address: &str, denom: &str) -> u128 {
        self.bank.balance(&self.ctx, address, denom).unwrap()
    }

    pub fn supply(&self, denom: &str) -> u128 {
        self.bank.supply(&self.ctx, denom).unwrap()
    }

    pub fn mint(&mut self, address: &str, denom: &str, amount: u128) {
        self.bank
            .mint(&mut self.ctx, address, &Coin::new(denom, amount))
            .unwrap();
    }

    pub fn deposit_address(&self) -> String {
        self.orchestrator.config().deposit_address.clone()
    }

    pub fn zone(&self) -> HostZone {
        self.orchestrator.host_zone(&self.ctx, CHAIN_ID).unwrap()
    }

    pub fn deposit_records(&self) -> Vec<DepositRecord> {
        self.orchestrator.deposit_records(&self.ctx, CHAIN_ID).unwrap()
    }

    pub fn deposit_record(&self, id: u64) -> Option<DepositRecord> {
        self.deposit_records().into_iter().find(|r| r.id == id)
    }

    pub fn unbonding(&self, epoch: u64) -> HostZoneUnbonding {
        self.orchestrator
            .epoch_unbonding_records(&self.ctx)
            .unwrap()
            .into_iter()
            .find(|r| r.epoch_number == epoch)
            .and_then(|r| r.unbonding(CHAIN_ID).cloned())
            .unwrap()
    }

    pub fn event_count(&self, event_type: &str) -> usize {
        self.ctx.events().events_of_type(event_type).len()
    }

    // ========================================================================
    // Packets
    // ========================================================================

    /// Most recent ICS-20 transfer sent from this chain
    pub fn last_transfer(&self) -> SentPacket {
        self.ibc
            .sent()
            .into_iter()
            .rev()
            .find(|p| matches!(p.payload, PacketPayload::Transfer { .. }))
            .unwrap()
    }

    /// Most recent ICA packet carrying a message accepted by `pred`
    pub fn last_ica_with(&self, pred: impl Fn(&IcaMsg) -> bool) -> SentPacket {
        self.ibc
            .sent()
            .into_iter()
            .rev()
            .find(|p| p.msgs().iter().any(&pred))
            .unwrap()
    }

    pub fn ica_packets_of(&self, account_type: IcaAccountType) -> Vec<SentPacket> {
        self.ibc.sent_by_owner(&ica_owner(CHAIN_ID, account_type))
    }

    pub fn ack(&mut self, packet: &SentPacket, ack: AckResponse) -> Result<(), StakeError> {
        self.orchestrator
            .on_acknowledgement(&mut self.ctx, &packet.packet_id, ack)
    }

    /// Successful acknowledgement with one empty response per message
    pub fn ack_ok(&mut self, packet: &SentPacket) {
        let responses = vec![MsgResponse::Empty; packet.msgs().len()];
        self.ack(packet, AckResponse::Success(responses)).unwrap();
    }

    pub fn timeout(&mut self, packet: &SentPacket) {
        self.orchestrator
            .on_timeout(&mut self.ctx, &packet.packet_id)
            .unwrap();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Most recent balance query against `address`
    pub fn last_balance_query(&self, address: &str) -> SubmittedQuery {
        self.queries
            .submitted()
            .into_iter()
            .rev()
            .find(|q| {
                serde_json::from_slice::<BalanceQuery>(&q.request)
                    .map(|r| r.address == address)
                    .unwrap_or(false)
            })
            .unwrap()
    }

    pub fn respond_balance(&mut self, query: &SubmittedQuery, amount: u128) -> Result<(), StakeError> {
        let bytes = serde_json::to_vec(&BalanceResponse { amount }).unwrap();
        self.orchestrator
            .on_query_response(&mut self.ctx, &query.query_id, &bytes)
    }

    pub fn respond_price(&mut self, query: &SubmittedQuery, price: Decimal) -> Result<(), StakeError> {
        let bytes = serde_json::to_vec(&SpotPriceResponse { price }).unwrap();
        self.orchestrator
            .on_query_response(&mut self.ctx, &query.query_id, &bytes)
    }

    // ========================================================================
    // Flows
    // ========================================================================

    /// Liquid stake `amount` for `USER` and drive it through transfer and
    /// delegation; returns the liquid tokens minted
    pub fn stake_and_delegate(&mut self, amount: u128) -> u128 {
        let st_amount = self
            .orchestrator
            .liquid_stake(&mut self.ctx, USER, amount, HOST_DENOM)
            .unwrap();

        self.advance_main();
        let transfer = self.last_transfer();
        self.ack_ok(&transfer);

        self.advance_main();
        let delegation = self.last_ica_with(|m| matches!(m, IcaMsg::Delegate { .. }));
        self.ack_ok(&delegation);
        st_amount
    }
}
