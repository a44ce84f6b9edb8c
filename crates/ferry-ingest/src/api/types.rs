//! GraphQL request and response types

use crate::error::DispatchError;
use crate::types::ApiResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: &'a Map<String, Value>,
}

/// Standard GraphQL response envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlErrorEntry {
    #[serde(default)]
    pub message: String,
}

impl GraphQlResponse {
    /// Unpack per-alias results.
    ///
    /// `data` may map aliases to results or list them; `null` entries are
    /// skipped. Any reported error fails the whole batch.
    pub fn into_results(self) -> Result<Vec<ApiResult>, DispatchError> {
        if !self.errors.is_empty() {
            return Err(DispatchError::GraphQl(
                self.errors.into_iter().map(|e| e.message).collect(),
            ));
        }

        let entries: Vec<(String, Value)> = match self.data {
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            Some(Value::Null) | None => {
                return Err(DispatchError::InvalidResponse(
                    "response carries no data".to_string(),
                ))
            }
            Some(other) => {
                return Err(DispatchError::InvalidResponse(format!(
                    "unexpected data payload: {}",
                    other
                )))
            }
        };

        entries
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(alias, value)| {
                serde_json::from_value(value).map_err(|e| {
                    DispatchError::InvalidResponse(format!("result for '{}': {}", alias, e))
                })
            })
            .collect()
    }
}
