//! Import pipeline configuration
//!
//! Defaults suit a typical API; every knob can be set through the builder or
//! overridden from the environment:
//!
//! - `FERRY_BATCH_SIZE`: records per batch (raised to at least 50)
//! - `FERRY_CONCURRENCY`: batches in flight (at least 1)
//! - `FERRY_MAX_RETRIES`: retries after the first attempt
//! - `FERRY_CHANNEL_CAPACITY`: records buffered between reader and planner

use crate::batch::MIN_BATCH_SIZE;
use crate::dispatch::RetryPolicy;
use crate::error::ConfigError;
use crate::ledger::DEFAULT_CHECKPOINT_PATH;
use crate::normalize::RecordFormat;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_BATCH_SIZE: usize = MIN_BATCH_SIZE;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Requested batch size; the batcher raises it to [`MIN_BATCH_SIZE`]
    pub batch_size: usize,

    /// Maximum batches in flight
    pub concurrency: usize,

    pub retry: RetryPolicy,

    /// Capacity of the record channel between reader and planner
    pub channel_capacity: usize,

    pub checkpoint_path: PathBuf,

    /// Input layout; inferred from the source location when unset
    pub format: Option<RecordFormat>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            format: None,
        }
    }
}

impl ImportConfig {
    pub fn builder() -> ImportConfigBuilder {
        ImportConfigBuilder::default()
    }

    /// Batch size actually used
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(MIN_BATCH_SIZE)
    }

    /// Defaults with `FERRY_*` overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overlay `FERRY_*` environment variables on this configuration.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = var("FERRY_BATCH_SIZE") {
            self.batch_size = parse_setting("FERRY_BATCH_SIZE", &value)?;
        }
        if let Some(value) = var("FERRY_CONCURRENCY") {
            self.concurrency = parse_setting::<usize>("FERRY_CONCURRENCY", &value)?.max(1);
        }
        if let Some(value) = var("FERRY_MAX_RETRIES") {
            let retries: u32 = parse_setting("FERRY_MAX_RETRIES", &value)?;
            self.retry.max_attempts = retries.saturating_add(1);
        }
        if let Some(value) = var("FERRY_CHANNEL_CAPACITY") {
            self.channel_capacity = parse_setting::<usize>("FERRY_CHANNEL_CAPACITY", &value)?.max(1);
        }
        Ok(self)
    }
}

fn parse_setting<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        name: name.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Builder for ImportConfig
#[derive(Default)]
pub struct ImportConfigBuilder {
    config: ImportConfig,
}

impl ImportConfigBuilder {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Values below 1 are raised to 1.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Retries after the first attempt
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_attempts = retries.saturating_add(1);
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.checkpoint_path = path.into();
        self
    }

    pub fn format(mut self, format: RecordFormat) -> Self {
        self.config.format = Some(format);
        self
    }

    pub fn build(self) -> ImportConfig {
        self.config
    }
}
