//! Orchestrator Engine
//!
//! Owns everything the pipelines need besides the store: the consumed
//! transports, the callback routing table, the stake hooks and the module
//! addresses. State lives in the `Context`, so one orchestrator can drive
//! any number of independent stores.
//!
//! # Architecture
//!
//! ```text
//! external epochs module ──► before_epoch_start ──► pipelines ──► ICA / ICQ dispatch
//!                                                                    │
//! relayer ──► on_acknowledgement / on_timeout / on_query_response ◄──┘
//!                     │
//!                     └──► callback ledger ──► pipeline callback
//! ```
//!
//! Synchronous entry points (`liquid_stake`, `redeem_stake`, admin messages)
//! return errors to the caller. Asynchronous entry points log callback
//! failures and never abort the block.
//!
//! # Example
//!
//! ```rust
//! use stakeibc_engine::core::Context;
//! use stakeibc_engine::ibc::mock::{MockIbcTransport, MockQueryTransport, StaticRateLimits};
//! use stakeibc_engine::ibc::StoreBank;
//! use stakeibc_engine::orchestrator::{EngineConfig, Orchestrator, Transports};
//! use stakeibc_engine::Params;
//!
//! let mut ctx = Context::in_memory();
//! let transports = Transports {
//!     ibc: Box::new(MockIbcTransport::new()),
//!     queries: Box::new(MockQueryTransport::new()),
//!     bank: Box::new(StoreBank),
//!     rate_limits: Box::new(StaticRateLimits::new()),
//! };
//! let orchestrator = Orchestrator::new(EngineConfig::default(), transports).unwrap();
//! orchestrator.initialize(&mut ctx, Params::default()).unwrap();
//! assert!(orchestrator.host_zones(&ctx).unwrap().is_empty());
//! ```

use crate::callbacks::ica::ICA_CALLBACK_IDS;
use crate::callbacks::ledger::LedgerError;
use crate::callbacks::query::QUERY_CALLBACK_IDS;
use crate::callbacks::registry::{CallbackRegistry, ModuleCallbacks};
use crate::core::context::Context;
use crate::core::params::{Params, ParamsError};
use crate::delegation::DepositError;
use crate::ibc::transport::{Bank, IbcTransport, QueryTransport, RateLimitGuard};
use crate::models::state::{self, StateError, PARAMS};
use crate::orchestrator::genesis::GenesisError;
use crate::orchestrator::hooks::{MultiStakeHooks, StakeHooks};
use crate::registry::RegistryError;
use cosmwasm_std::StdError;
use crate::trade::TradeError;
use crate::unbonding::UnbondingError;
use thiserror::Error;
use tracing::info;

/// Module name under which the engine's callbacks are routed
pub const MODULE_NAME: &str = "stakeibc";

/// Module name of the interchain query callbacks
pub const QUERY_MODULE_NAME: &str = "stakeibc_icq";

// ============================================================================
// Configuration Types
// ============================================================================

/// Addresses and authority of the engine on the local chain
///
/// # Fields
///
/// * `authority` - Only sender allowed to run admin messages
/// * `deposit_address` - Module account holding deposits and swept redemptions
/// * `reward_collector_address` - Receives the liquid fee share of rewards
/// * `fee_recipient_address` - Receives collected fees every mint epoch
/// * `community_pool_holding_address` - Receives community pool tokens before
///   they are staked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub authority: String,
    pub deposit_address: String,
    pub reward_collector_address: String,
    pub fee_recipient_address: String,
    pub community_pool_holding_address: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            authority: "gov".to_string(),
            deposit_address: "stakeibc_deposit".to_string(),
            reward_collector_address: "stakeibc_reward_collector".to_string(),
            fee_recipient_address: "stakeibc_fee_recipient".to_string(),
            community_pool_holding_address: "stakeibc_community_pool".to_string(),
        }
    }
}

/// Consumed interfaces handed to the orchestrator at construction
pub struct Transports {
    pub ibc: Box<dyn IbcTransport>,
    pub queries: Box<dyn QueryTransport>,
    pub bank: Box<dyn Bank>,
    pub rate_limits: Box<dyn RateLimitGuard>,
}

// ============================================================================
// Errors
// ============================================================================

/// Taxonomy class of an engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input, rejected synchronously
    Validation,
    /// Unknown reference, rejected synchronously
    NotFound,
    /// Rate or swap loss outside tolerance
    SafetyBound,
    /// Error acknowledgement or timeout from a remote chain
    TransportTerminal,
    /// Broken bookkeeping; logged, never aborts block processing
    InternalInvariant,
}

#[derive(Debug, Error)]
pub enum StakeError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unauthorized sender: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StdError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Deposit(#[from] DepositError),

    #[error(transparent)]
    Unbonding(#[from] UnbondingError),

    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    Genesis(#[from] GenesisError),

    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: &'static str, reason: String },
}

impl StakeError {
    /// Map the error onto the engine's error taxonomy
    pub fn class(&self) -> ErrorClass {
        match self {
            StakeError::InvalidConfig(_)
            | StakeError::Unauthorized(_)
            | StakeError::Params(_)
            | StakeError::MalformedPayload { .. } => ErrorClass::Validation,
            StakeError::State(err) if err.is_not_found() => ErrorClass::NotFound,
            StakeError::State(_) | StakeError::Store(_) | StakeError::Ledger(_) => {
                ErrorClass::InternalInvariant
            }
            StakeError::Registry(err) => err.class(),
            StakeError::Deposit(err) => err.class(),
            StakeError::Unbonding(err) => err.class(),
            StakeError::Trade(err) => err.class(),
            StakeError::Genesis(_) => ErrorClass::Validation,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Coordinator of every liquid staking pipeline
pub struct Orchestrator {
    pub(crate) config: EngineConfig,
    pub(crate) ibc: Box<dyn IbcTransport>,
    pub(crate) queries: Box<dyn QueryTransport>,
    pub(crate) bank: Box<dyn Bank>,
    pub(crate) rate_limits: Box<dyn RateLimitGuard>,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) stake_hooks: MultiStakeHooks,
}

impl Orchestrator {
    /// Build an orchestrator and register its callback routes
    pub fn new(config: EngineConfig, transports: Transports) -> Result<Self, StakeError> {
        Self::validate_config(&config)?;

        let mut callbacks = CallbackRegistry::new();
        callbacks.set_callback_handlers(&[
            ModuleCallbacks::new(MODULE_NAME, &ICA_CALLBACK_IDS),
            ModuleCallbacks::new(QUERY_MODULE_NAME, &QUERY_CALLBACK_IDS),
        ])?;

        Ok(Self {
            config,
            ibc: transports.ibc,
            queries: transports.queries,
            bank: transports.bank,
            rate_limits: transports.rate_limits,
            callbacks,
            stake_hooks: MultiStakeHooks::new(),
        })
    }

    fn validate_config(config: &EngineConfig) -> Result<(), StakeError> {
        let addresses = [
            ("authority", &config.authority),
            ("deposit_address", &config.deposit_address),
            ("reward_collector_address", &config.reward_collector_address),
            ("fee_recipient_address", &config.fee_recipient_address),
            (
                "community_pool_holding_address",
                &config.community_pool_holding_address,
            ),
        ];
        for (name, value) in addresses {
            if value.trim().is_empty() {
                return Err(StakeError::InvalidConfig(format!("{} must be set", name)));
            }
        }
        if config.deposit_address == config.reward_collector_address {
            return Err(StakeError::InvalidConfig(
                "deposit and reward collector addresses must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Store validated params; called once at chain start
    pub fn initialize(&self, ctx: &mut Context, params: Params) -> Result<(), StakeError> {
        params.validate()?;
        PARAMS.save(ctx.store_mut(), &params)?;
        info!(
            deposit_interval = params.deposit_interval,
            delegate_interval = params.delegate_interval,
            "Initialized liquid staking engine"
        );
        Ok(())
    }

    /// Governance update of the params
    pub fn update_params(
        &self,
        ctx: &mut Context,
        sender: &str,
        params: Params,
    ) -> Result<(), StakeError> {
        if !self.is_authority(sender) {
            return Err(StakeError::Unauthorized(sender.to_string()));
        }
        self.initialize(ctx, params)
    }

    /// Add listeners notified after every liquid stake
    ///
    /// Set after construction because the listening modules are usually
    /// built from the orchestrator's own outputs.
    pub fn set_stake_hooks(&mut self, hooks: Vec<Box<dyn StakeHooks>>) {
        self.stake_hooks = MultiStakeHooks::from_hooks(hooks);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn callback_registry(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn params(&self, ctx: &Context) -> Result<Params, StateError> {
        state::params(ctx.store())
    }

    pub(crate) fn is_authority(&self, sender: &str) -> bool {
        sender == self.config.authority
    }
}
