//! Ferry Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the Ferry workspace members.
//!
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **ND-JSON**: gzip-compressed newline-delimited JSON files ([`ndjson`])
//! - **Errors**: the [`CommonError`] type returned by the codec
//!
//! # Example
//!
//! ```no_run
//! use ferry_common::ndjson;
//! use serde_json::Value;
//!
//! fn count_lines(path: &str) -> ferry_common::Result<usize> {
//!     let rows: Option<Vec<Value>> = ndjson::read_gz(path)?;
//!     Ok(rows.map(|r| r.len()).unwrap_or(0))
//! }
//! ```

pub mod error;
pub mod logging;
pub mod ndjson;

pub use error::{CommonError, Result};
