//! Domain types and models

pub mod api;
pub mod auth;

pub use api::{Cursor, Division, EntityRecord, Method, Page, RateLimits};
pub use auth::{Credentials, TokenResponse, TokenState};
