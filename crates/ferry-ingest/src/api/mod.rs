//! GraphQL API client module
//!
//! HTTP transport for the remote batch-mutation API.

pub mod client;
pub mod types;

pub use client::GraphQlClient;
pub use types::*;
