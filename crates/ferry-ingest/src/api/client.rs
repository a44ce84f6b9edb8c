//! HTTP client for the batch-mutation API

use crate::api::types::{GraphQlRequest, GraphQlResponse};
use crate::batch::BatchDocument;
use crate::dispatch::MutationSink;
use crate::error::DispatchError;
use crate::types::ApiResult;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default timeout for API requests in seconds.
/// The CLI reads an override from FERRY_API_TIMEOUT_SECS.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Longest error body kept in a [`DispatchError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Posts batch documents to a GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl GraphQlClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            token: None,
        })
    }

    /// Authenticate every request with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MutationSink for GraphQlClient {
    async fn send(&self, batch: &BatchDocument) -> Result<Vec<ApiResult>, DispatchError> {
        let body = GraphQlRequest {
            query: &batch.document,
            variables: &batch.variables,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(batch = batch.sequence, status = status.as_u16(), "API responded");

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GraphQlResponse = response.json().await?;
        payload.into_results()
    }
}
