//! Cross-chain plumbing consumed by the engine
//!
//! - `messages`: ICA messages, acknowledgements, packet ids, query records
//! - `transport`: the consumed traits (`IbcTransport`, `QueryTransport`,
//!   `Bank`, `RateLimitGuard`) and the store-backed `StoreBank`
//! - `mock`: in-memory transport doubles driven explicitly by tests

pub mod messages;
pub mod mock;
pub mod transport;

pub use messages::{
    AckResponse, BalanceQuery, BalanceResponse, Coin, IcaMsg, MsgResponse, PacketId, QueryResult,
    SpotPriceQuery, SpotPriceResponse, BANK_BALANCE_PATH, SPOT_PRICE_PATH,
};
pub use transport::{
    escrow_address, Bank, BankError, IbcTransport, QueryTransport, RateLimitGuard, StoreBank,
    TransportError,
};
