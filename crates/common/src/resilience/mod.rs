//! Resilience patterns for blocking callers
//!
//! This module provides the **generic, reusable** pieces the token refresh
//! flow builds on:
//! - **Poll executor**: bounded polling with fixed, linear or exponential
//!   backoff ([`retry`])
//! - **Clock and sleeper seams**: time is read and waited on through traits so
//!   tests can substitute [`MockClock`] and run timeouts instantly
//!   ([`clock`])
//! - **Cancellation**: a cloneable flag checked between polling rounds
//!   ([`cancel`])
//!
//! Everything here is synchronous. Callers that share state across OS
//! processes block the calling thread while waiting, which is the only
//! suspension point in the client.

pub mod cancel;
pub mod clock;
pub mod retry;

pub use cancel::CancelFlag;
pub use clock::{Clock, MockClock, Sleeper, SystemClock};
pub use retry::{
    BackoffStrategy, PollExecutor, PollOutcome, RetryConfig, RetryConfigBuilder, RetryError,
    RetryResult,
};
