//! # Ledgerlink Infrastructure
//!
//! Infrastructure implementations of the core ports and the public
//! [`Connection`] client.
//!
//! This crate contains:
//! - File-backed token store and cross-process refresh lock
//! - Blocking HTTP client and token endpoint exchanger
//! - Request orchestration, division scoping and pagination
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `ledgerlink-core`
//! - Contains all "impure" code (filesystem, network)

pub mod auth;
pub mod config;
pub mod connection;
pub mod errors;
pub mod http;
pub mod observability;
pub mod resources;

// Re-export commonly used items
pub use auth::{FileLockClient, FileTokenStore, HttpTokenExchanger};
pub use connection::{Connection, ConnectionBuilder};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder, HttpResponse};
pub use observability::init_tracing;
pub use resources::ResourceClient;
