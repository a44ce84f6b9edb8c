//! Ferry Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams records out of a JSON or ND-JSON file and writes them to a
//! GraphQL batch-mutation API as upserts, with a checkpoint that makes
//! re-runs skip everything already imported.
//!
//! # Pipeline
//!
//! - [`source`]: local file or HTTP byte stream
//! - [`normalize`]: framing and validation into [`NormalizedRecord`]s
//! - [`dedup`]: drops keys already imported
//! - [`mutation`] and [`batch`]: aliased upsert fragments, cut into batches
//! - [`dispatch`]: bounded-concurrency submission with retry
//! - [`ledger`]: the persisted checkpoint
//! - [`events`]: progress events for whoever is listening
//!
//! # Example
//!
//! ```no_run
//! use ferry_ingest::api::GraphQlClient;
//! use ferry_ingest::{events, ImportConfig, ImportPipeline};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = "http://localhost:4000/graphql".parse()?;
//!     let client = GraphQlClient::new(endpoint, Duration::from_secs(300))?;
//!     let source = ferry_ingest::source::open_source("./export.json")?;
//!
//!     let (tx, _rx) = events::channel();
//!     let pipeline = ImportPipeline::new(ImportConfig::default(), Arc::new(client), tx);
//!     let summary = pipeline.run(source.as_ref()).await?;
//!     println!("{} imported", summary.records_written);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod batch;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod ledger;
pub mod mutation;
pub mod normalize;
pub mod pipeline;
pub mod source;
pub mod types;

pub use batch::{BatchDocument, BatchEntry, Batcher};
pub use config::ImportConfig;
pub use dispatch::{MutationSink, RetryPolicy};
pub use error::{DispatchError, FailedBatch, ImportError, LedgerError, RecordError, SourceError};
pub use events::{EventSender, ImportEvent, ImportPhase};
pub use ledger::Ledger;
pub use normalize::RecordFormat;
pub use pipeline::{ImportPipeline, ImportSummary};
pub use types::{ApiResult, ExternalId, LedgerKey, NormalizedRecord, TypeName};
