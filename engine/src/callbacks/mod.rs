//! Callback ledgers for in-flight ICA transactions and interchain queries
//!
//! - `ledger`: generic keyed ledger with at-most-once resolution
//! - `ica`: ICA callback union and its ledger keyed by packet id
//! - `query`: ICQ callback union and its ledger keyed by query id
//! - `registry`: boot-time routing of callback ids to modules

pub mod ica;
pub mod ledger;
pub mod query;
pub mod registry;

pub use ica::{IcaCallback, TradeHop, ICA_CALLBACKS, ICA_CALLBACK_IDS};
pub use ledger::{CallbackKind, CallbackLedger, LedgerEntry, LedgerError, LedgerKey};
pub use query::{QueryCallback, QUERY_CALLBACKS, QUERY_CALLBACK_IDS};
pub use registry::{CallbackRegistry, ModuleCallbacks};
