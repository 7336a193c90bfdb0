//! Core primitives: fixed-point math, epochs, params and the execution context

pub mod context;
pub mod decimal;
pub mod params;
pub mod time;

pub use context::Context;
pub use decimal::{Decimal, DecimalError, DecimalExt};
pub use params::{Params, ParamsError};
pub use time::{EpochId, EpochInfo, EpochTracker, NANOS_PER_SECOND};
