//! Blocking HTTP transport

mod client;

pub use client::{HttpClient, HttpClientBuilder, HttpResponse};
