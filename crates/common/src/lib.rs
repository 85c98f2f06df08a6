//! Modular common utilities shared across Ledgerlink crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `runtime`: blocking retry/poll executor, clock and sleeper seams,
//!   cancellation flags
//! - `test-utils`: everything in `runtime`, plus the deterministic
//!   [`resilience::MockClock`] re-exported under [`testing`]

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(all(feature = "runtime", any(feature = "test-utils", test)))]
pub mod testing;

#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, CancelFlag, Clock, MockClock, PollExecutor, PollOutcome, RetryConfig,
    RetryConfigBuilder, RetryError, RetryResult, Sleeper, SystemClock,
};
