//! Core record and result types shared by the pipeline stages

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A GraphQL type name, validated against `[_A-Za-z][_0-9A-Za-z]*`.
///
/// Type names are spliced into mutation document text (`updateOrCreateUser`,
/// `CreateUser!`), so nothing else may get through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    pub fn parse(name: &str) -> Result<Self, String> {
        let mut chars = name.chars();
        let valid_head = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic());
        if valid_head && chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) {
            Ok(Self(name.to_string()))
        } else {
            Err(format!("'{}' is not a valid type name", name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied external identifier (`oldId`), canonicalised to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    /// Accepts a non-empty JSON string or any JSON number.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) if !s.is_empty() => Ok(Self(s.clone())),
            Value::String(_) => Err("oldId is empty".to_string()),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(format!("oldId must be a string or number, got {}", kind(other))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExternalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ExternalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ExternalId::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// One logical entity read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub type_name: TypeName,
    pub old_id: ExternalId,
    /// Full record body, `oldId` included. Sent as the mutation variable.
    pub fields: Map<String, Value>,
}

impl NormalizedRecord {
    /// Validate a decoded JSON value as a record of `type_name`.
    pub fn from_value(type_name: &str, value: Value) -> Result<Self, String> {
        let type_name = TypeName::parse(type_name)?;
        let fields = match value {
            Value::Object(fields) => fields,
            other => return Err(format!("record must be an object, got {}", kind(&other))),
        };
        let old_id = match fields.get("oldId") {
            Some(value) => ExternalId::from_value(value)?,
            None => return Err("record has no oldId".to_string()),
        };

        Ok(Self {
            type_name,
            old_id,
            fields,
        })
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            type_name: self.type_name.as_str().to_string(),
            old_id: self.old_id.clone(),
        }
    }
}

/// Dedup identity of a record: `(typeName, oldId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub type_name: String,
    pub old_id: ExternalId,
}

impl LedgerKey {
    pub fn new(type_name: impl Into<String>, old_id: impl Into<ExternalId>) -> Self {
        Self {
            type_name: type_name.into(),
            old_id: old_id.into(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.type_name, self.old_id)
    }
}

/// One record echoed back by the API after a batch completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResult {
    #[serde(rename = "type")]
    pub type_name: String,
    /// Identifier assigned by the API
    pub id: String,
    #[serde(rename = "oldId")]
    pub old_id: ExternalId,
}

impl ApiResult {
    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            type_name: self.type_name.clone(),
            old_id: self.old_id.clone(),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
