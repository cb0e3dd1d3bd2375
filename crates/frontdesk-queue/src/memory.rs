//! In-memory record store — zero setup, used for tests and `:memory:` deployments
//! that do not need SQLite.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use frontdesk_core::error::{FrontDeskError, Result};
use frontdesk_core::store::{
    EntityKind, Filter, RecordStore, merge_fields, prepare_new_record, record_id, record_version,
};

/// Records kept per kind in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<EntityKind, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, kind: EntityKind) -> usize {
        self.records.read().await.get(&kind).map_or(0, Vec::len)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, kind: EntityKind, fields: Value) -> Result<Value> {
        let record = prepare_new_record(kind, fields)?;
        let mut records = self.records.write().await;
        let bucket = records.entry(kind).or_default();
        let id = record_id(&record).unwrap_or_default();
        if bucket.iter().any(|r| record_id(r) == Some(id)) {
            return Err(FrontDeskError::Validation(format!("{kind} '{id}' already exists")));
        }
        bucket.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        fields: Value,
        expected_version: Option<u64>,
    ) -> Result<Value> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&kind)
            .and_then(|bucket| bucket.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or_else(|| FrontDeskError::not_found(kind, id))?;

        let found = record_version(record);
        if let Some(expected) = expected_version
            && expected != found
        {
            return Err(FrontDeskError::Conflict {
                kind,
                id: id.to_string(),
                expected,
                found,
            });
        }

        merge_fields(record, &fields);
        record["version"] = Value::from(found + 1);
        Ok(record.clone())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let bucket = records
            .get_mut(&kind)
            .ok_or_else(|| FrontDeskError::not_found(kind, id))?;
        let before = bucket.len();
        bucket.retain(|r| record_id(r) != Some(id));
        if bucket.len() == before {
            return Err(FrontDeskError::not_found(kind, id));
        }
        Ok(())
    }

    async fn list(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Value>> {
        let records = self.records.read().await;
        Ok(records
            .get(&kind)
            .map(|bucket| bucket.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, kind: EntityKind, id: &str) -> Result<Value> {
        let records = self.records.read().await;
        records
            .get(&kind)
            .and_then(|bucket| bucket.iter().find(|r| record_id(r) == Some(id)))
            .cloned()
            .ok_or_else(|| FrontDeskError::not_found(kind, id))
    }
}
