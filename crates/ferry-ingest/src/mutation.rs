//! Mutation builder
//!
//! Each record becomes one aliased upsert fragment. The record body only
//! ever travels as the typed variable `obj{i}`; document text holds nothing
//! but validated names and the alias counter.

use crate::types::{ExternalId, NormalizedRecord, TypeName};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct MutationFragment {
    /// `mut{i}`
    pub alias: String,
    pub type_name: TypeName,
    pub old_id: ExternalId,
    pub text: String,
    /// `obj{i}`
    pub variable_name: String,
    pub variable_value: Value,
}

/// Owns the alias counter for one run.
#[derive(Debug, Default)]
pub struct MutationBuilder {
    next_index: u64,
}

impl MutationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, record: NormalizedRecord) -> MutationFragment {
        let index = self.next_index;
        self.next_index += 1;

        let alias = format!("mut{}", index);
        let variable_name = format!("obj{}", index);
        let text = format!(
            "{alias}: updateOrCreate{type_name}(update: {{ id: \"\" }}, create: ${variable_name}) {{ type: __typename oldId id }}",
            alias = alias,
            type_name = record.type_name,
            variable_name = variable_name,
        );

        MutationFragment {
            alias,
            type_name: record.type_name,
            old_id: record.old_id,
            text,
            variable_name,
            variable_value: Value::Object(record.fields),
        }
    }

    /// Number of fragments built so far
    pub fn issued(&self) -> u64 {
        self.next_index
    }
}
