//! Test doubles shared by the queue crate's unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use frontdesk_core::error::{FrontDeskError, Result};
use frontdesk_core::store::{EntityKind, Filter, RecordStore};
use frontdesk_core::traits::{Delivery, NotifyChannel};

use crate::memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Deliver,
    Simulate,
    Fail,
}

/// Channel that records every send attempt.
pub struct RecordingChannel {
    mode: Mutex<ChannelMode>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn new(mode: ChannelMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: ChannelMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, address: &str, message: &str) -> Result<Delivery> {
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), message.to_string()));
        match *self.mode.lock().unwrap() {
            ChannelMode::Deliver => Ok(Delivery::delivered()),
            ChannelMode::Simulate => Ok(Delivery::simulated()),
            ChannelMode::Fail => Err(FrontDeskError::Channel("provider rejected".into())),
        }
    }
}

/// MemoryStore wrapper with switchable failures, latency and stale reads.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    /// Fail every task `create` with a transient error.
    pub fail_create_task: AtomicBool,
    /// Fail task creation only for these assignees.
    pub reject_assignees: Mutex<HashSet<String>>,
    pub fail_update: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Reads hide `acknowledged_at`, as a lagging replica would.
    pub stale_reads: AtomicBool,
    pub update_delay_ms: AtomicU64,
    pub list_delay_ms: AtomicU64,
    pub update_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_assignee(&self, assignee: &str) {
        self.reject_assignees
            .lock()
            .unwrap()
            .insert(assignee.to_string());
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

fn transient(op: &str) -> FrontDeskError {
    FrontDeskError::TransientStore(format!("{op} timed out"))
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn create(&self, kind: EntityKind, fields: Value) -> Result<Value> {
        if kind == EntityKind::Task {
            if self.fail_create_task.load(Ordering::SeqCst) {
                return Err(transient("create"));
            }
            let assignee = fields
                .get("assigned_to")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if self.reject_assignees.lock().unwrap().contains(assignee) {
                return Err(transient("create"));
            }
        }
        self.inner.create(kind, fields).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        fields: Value,
        expected_version: Option<u64>,
    ) -> Result<Value> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.update_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(transient("update"));
        }
        self.inner.update(kind, id, fields, expected_version).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(transient("delete"));
        }
        self.inner.delete(kind, id).await
    }

    async fn list(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Value>> {
        let delay = self.list_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(transient("list"));
        }
        let mut records = self.inner.list(kind, filter).await?;
        if self.stale_reads.load(Ordering::SeqCst) {
            for record in &mut records {
                record["acknowledged_at"] = Value::Null;
            }
        }
        Ok(records)
    }

    async fn get(&self, kind: EntityKind, id: &str) -> Result<Value> {
        self.inner.get(kind, id).await
    }
}

pub async fn seed_patient(store: &dyn RecordStore, id: &str, phone: Option<&str>) {
    store
        .create(
            EntityKind::Patient,
            json!({"id": id, "name": format!("Patient {id}"), "phone": phone}),
        )
        .await
        .unwrap();
}
