//! Shared building blocks for the edge services: tracing setup, the uniform
//! JSON error envelope and the admin HTTP server.

pub mod types;
pub mod utils;
pub mod admin_http;
