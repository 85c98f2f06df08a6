//! # Ledgerlink Domain
//!
//! Data model and error taxonomy for the Ledgerlink accounting API client.
//!
//! This crate contains:
//! - OAuth data types (`Credentials`, `TokenState`, `TokenResponse`)
//! - API data types (`Division`, `EntityRecord`, `Page`, `Cursor`,
//!   `RateLimits`)
//! - Client configuration structures
//! - The `LedgerError` taxonomy and `Result` alias
//!
//! ## Architecture
//! - No dependencies on other Ledgerlink crates
//! - No I/O; everything here is plain data

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
