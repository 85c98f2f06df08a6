//! In-memory port implementations for tests
//!
//! - [`InMemoryTokenStore`]: token store with load/save counters and hooks
//! - [`InMemoryLockClient`]: lock clients sharing one registry, standing in
//!   for separate processes
//! - [`MockTokenExchanger`]: token endpoint that treats refresh tokens as
//!   single-use
//! - [`RecordingListener`]: records lifecycle hook invocations

pub mod mocks;

pub use mocks::{
    InMemoryLockClient, InMemoryTokenStore, ListenerEvent, MockTokenExchanger, RecordingListener,
};
