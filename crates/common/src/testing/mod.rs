//! Testing utilities and helpers
//!
//! - **[`assertions`]**: assertion macros shared by the client's test suites
//! - [`MockClock`]: deterministic clock and sleeper for expiry and polling
//!   tests
//!
//! ```rust
//! use std::time::Duration;
//!
//! use ledgerlink_common::{MockClock, Sleeper};
//!
//! let clock = MockClock::at_epoch_secs(1_700_000_000);
//! clock.sleep(Duration::from_secs(2));
//! assert_eq!(clock.sleep_count(), 1);
//! ```

pub mod assertions;

pub use crate::resilience::{CancelFlag, MockClock};
