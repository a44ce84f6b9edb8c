//! Configuration management for Ferry CLI
//!
//! Connection settings come from the environment (after `.env` is loaded);
//! command-line flags override them.

use crate::error::{CliError, Result};
use ferry_ingest::api::client::DEFAULT_API_TIMEOUT_SECS;
use ferry_ingest::ledger::DEFAULT_CHECKPOINT_PATH;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// GraphQL endpoint (FERRY_ENDPOINT)
    pub endpoint: Option<String>,

    /// Bearer token (FERRY_TOKEN)
    pub token: Option<String>,

    /// Per-request timeout (FERRY_API_TIMEOUT_SECS)
    pub api_timeout: Duration,

    /// Checkpoint file (FERRY_CHECKPOINT)
    pub checkpoint_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
        }
    }
}

impl Config {
    /// Load config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        config.endpoint = non_empty("FERRY_ENDPOINT");
        config.token = non_empty("FERRY_TOKEN");

        if let Some(path) = non_empty("FERRY_CHECKPOINT") {
            config.checkpoint_path = PathBuf::from(path);
        }

        if let Some(secs) = non_empty("FERRY_API_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                CliError::config(format!("FERRY_API_TIMEOUT_SECS must be seconds, got '{}'", secs))
            })?;
            config.api_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Checkpoint path, preferring an explicit flag
    pub fn checkpoint(&self, flag: Option<&PathBuf>) -> PathBuf {
        flag.cloned().unwrap_or_else(|| self.checkpoint_path.clone())
    }

    /// Resolve the endpoint URL, preferring an explicit flag
    pub fn endpoint_url(&self, flag: Option<&str>) -> Result<Url> {
        let raw = flag
            .or(self.endpoint.as_deref())
            .ok_or_else(|| CliError::config("no API endpoint; pass --endpoint or set FERRY_ENDPOINT"))?;
        Url::parse(raw).map_err(|e| CliError::config(format!("invalid endpoint '{}': {}", raw, e)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from(&[]).unwrap();
        assert!(config.endpoint.is_none());
        assert_eq!(config.api_timeout, Duration::from_secs(300));
        assert_eq!(config.checkpoint_path, PathBuf::from(".migrationstate"));
    }

    #[test]
    fn test_config_from_env() {
        let config = from(&[
            ("FERRY_ENDPOINT", "http://example.com/graphql"),
            ("FERRY_TOKEN", "abc"),
            ("FERRY_CHECKPOINT", "/tmp/state"),
            ("FERRY_API_TIMEOUT_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.api_timeout, Duration::from_secs(30));
        assert_eq!(config.checkpoint(None), PathBuf::from("/tmp/state"));
        assert_eq!(
            config.endpoint_url(None).unwrap().as_str(),
            "http://example.com/graphql"
        );
    }

    #[test]
    fn test_flags_win() {
        let config = from(&[("FERRY_ENDPOINT", "http://env/graphql")]).unwrap();
        let url = config.endpoint_url(Some("http://flag/graphql")).unwrap();
        assert_eq!(url.host_str(), Some("flag"));
        let path = PathBuf::from("other");
        assert_eq!(config.checkpoint(Some(&path)), path);
    }

    #[test]
    fn test_missing_or_bad_endpoint() {
        let config = from(&[("FERRY_ENDPOINT", "   ")]).unwrap();
        assert!(config.endpoint_url(None).is_err());
        assert!(config.endpoint_url(Some("not a url")).is_err());
        assert!(from(&[("FERRY_API_TIMEOUT_SECS", "soon")]).is_err());
    }
}
