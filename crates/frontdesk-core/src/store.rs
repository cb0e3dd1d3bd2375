//! Record Store interface — the generic CRUD collaborator the coordinator consumes.
//!
//! Records travel as JSON objects so that any backend (SQLite, a REST
//! service, an in-memory map) can implement the trait without knowing the
//! coordinator's types. Typed conversion happens at the call site via
//! [`from_record`].

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FrontDeskError, Result};

/// Entity collections known to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patient,
    Token,
    Task,
    SuggestedTask,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::Token => "token",
            EntityKind::Task => "task",
            EntityKind::SuggestedTask => "suggested_task",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-equality filter applied by [`RecordStore::list`].
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition on a top-level field.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

/// Generic create/update/delete/list/get storage.
///
/// Contract shared by all implementations:
/// - `create` fills `id` (UUID v4) and `created_at` when absent and sets `version = 1`.
/// - `update` merges `fields` into the record, never touches `id`, `created_at`
///   or `version` from the patch, and bumps `version`. A mismatching
///   `expected_version` fails with `Conflict`.
/// - `get`, `update` and `delete` of an unknown id fail with `NotFound`.
/// - `list` preserves insertion order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, kind: EntityKind, fields: Value) -> Result<Value>;

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        fields: Value,
        expected_version: Option<u64>,
    ) -> Result<Value>;

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()>;

    async fn list(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Value>>;

    async fn get(&self, kind: EntityKind, id: &str) -> Result<Value>;
}

/// Fields a store owns; patches may not overwrite them.
pub const PROTECTED_FIELDS: [&str; 3] = ["id", "created_at", "version"];

/// Decode a store record into a typed entity.
pub fn from_record<T: DeserializeOwned>(record: Value) -> Result<T> {
    Ok(serde_json::from_value(record)?)
}

/// Decode a batch of store records.
pub fn from_records<T: DeserializeOwned>(records: Vec<Value>) -> Result<Vec<T>> {
    records.into_iter().map(from_record).collect()
}

/// Stamp store-owned fields on a fresh record: `id` (UUID v4) and
/// `created_at` when absent, `version = 1` always.
pub fn prepare_new_record(kind: EntityKind, fields: Value) -> Result<Value> {
    let Value::Object(mut map) = fields else {
        return Err(FrontDeskError::Validation(format!(
            "{kind} record must be a JSON object"
        )));
    };
    let has_id = map
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        map.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
    }
    if !map.contains_key("created_at") {
        map.insert("created_at".into(), Value::String(Utc::now().to_rfc3339()));
    }
    map.insert("version".into(), Value::from(1u64));
    Ok(Value::Object(map))
}

pub fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

pub fn record_version(record: &Value) -> u64 {
    record.get("version").and_then(Value::as_u64).unwrap_or(0)
}

/// Shallow-merge `patch` into `record`, skipping protected fields.
pub fn merge_fields(record: &mut Value, patch: &Value) {
    let (Some(target), Some(source)) = (record.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (key, value) in source {
        if PROTECTED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}
