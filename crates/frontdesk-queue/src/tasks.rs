//! Task Assignment Store & Dispatcher — staff-to-staff tasks with fan-out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use frontdesk_core::error::{FrontDeskError, Result};
use frontdesk_core::store::{EntityKind, Filter, RecordStore, from_record, from_records};
use frontdesk_core::types::{Task, TaskKind, TaskStatus};

use crate::events::{ChangeEvent, ChangeNotifier};

/// Completed tasks older than this drop out of the visible list.
pub const RETENTION_WINDOW_HOURS: i64 = 24;

/// Task fields shared by every recipient of one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub assigned_by: String,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub visit_id: Option<String>,
}

#[derive(Debug)]
pub struct RecipientFailure {
    pub recipient: String,
    pub error: FrontDeskError,
}

/// Outcome of a fan-out: partial success is reported, never hidden.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub created: Vec<Task>,
    pub failed: Vec<RecipientFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_total_failure(&self) -> bool {
        self.created.is_empty() && !self.failed.is_empty()
    }
}

/// Creates, lists and acknowledges tasks.
#[derive(Clone)]
pub struct TaskDispatcher {
    store: Arc<dyn RecordStore>,
    events: ChangeNotifier,
}

impl TaskDispatcher {
    pub fn new(store: Arc<dyn RecordStore>, events: ChangeNotifier) -> Self {
        Self { store, events }
    }

    /// One independent task per distinct recipient, each starting `pending`.
    pub async fn create_tasks(&self, task: NewTask, recipients: &[String]) -> Result<BatchReport> {
        if task.title.trim().is_empty() {
            return Err(FrontDeskError::Validation("task title is required".into()));
        }
        let mut targets: Vec<&str> = Vec::new();
        for r in recipients.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
            if !targets.contains(&r) {
                targets.push(r);
            }
        }
        if targets.is_empty() {
            return Err(FrontDeskError::Validation(
                "at least one recipient is required".into(),
            ));
        }

        let mut report = BatchReport::default();
        for recipient in targets {
            let fields = json!({
                "title": task.title.trim(),
                "description": task.description,
                "type": task.kind,
                "assigned_by": task.assigned_by,
                "assigned_to": recipient,
                "status": TaskStatus::Pending,
                "attachment_url": task.attachment_url,
                "visit_id": task.visit_id,
                "acknowledged_at": null,
            });
            match self.store.create(EntityKind::Task, fields).await {
                Ok(record) => report.created.push(from_record(record)?),
                Err(error) => {
                    tracing::warn!("⚠️ Task '{}' for {recipient} not created: {error}", task.title);
                    report.failed.push(RecipientFailure {
                        recipient: recipient.to_string(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            "📋 Task '{}' from {}: {} created, {} failed",
            task.title,
            task.assigned_by,
            report.created.len(),
            report.failed.len()
        );
        if !report.created.is_empty() {
            self.events.publish(ChangeEvent::TasksCreated {
                assignees: report.created.iter().map(|t| t.assigned_to.clone()).collect(),
            });
        }
        Ok(report)
    }

    /// Every task for one assignee, both statuses, store order.
    pub async fn list_tasks_for(&self, assignee: &str) -> Result<Vec<Task>> {
        let records = self
            .store
            .list(EntityKind::Task, &Filter::all().eq("assigned_to", assignee))
            .await?;
        from_records(records)
    }

    /// Every task in the store.
    pub async fn list_all(&self) -> Result<Vec<Task>> {
        from_records(self.store.list(EntityKind::Task, &Filter::all()).await?)
    }

    pub async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<Task> {
        let record = self
            .store
            .update(EntityKind::Task, task_id, json!({ "status": status }), None)
            .await?;
        let task: Task = from_record(record)?;
        tracing::info!("✅ Task {} → {}", task.id, task.status);
        self.events.publish(ChangeEvent::TaskUpdated {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    /// Stamp `acknowledged_at`. A vanished task stays `NotFound`; any other
    /// store failure becomes `Acknowledge` and is not retried here.
    pub async fn acknowledge(&self, task_id: &str) -> Result<Task> {
        let fields = json!({ "acknowledged_at": Utc::now() });
        let record = match self.store.update(EntityKind::Task, task_id, fields, None).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => {
                return Err(FrontDeskError::Acknowledge {
                    task_id: task_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let task: Task = from_record(record)?;
        self.events.publish(ChangeEvent::TaskUpdated {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    /// The newest pending task the assignee has not acknowledged yet.
    pub async fn newest_unacknowledged(&self, assignee: &str) -> Result<Option<Task>> {
        let tasks = self.list_tasks_for(assignee).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending && t.acknowledged_at.is_none())
            .max_by_key(|t| t.created_at))
    }
}

/// Retention filter: a task is hidden only when it is completed AND at least
/// [`RETENTION_WINDOW_HOURS`] old. Pending tasks never age out.
pub fn visible_tasks(tasks: Vec<Task>, now: DateTime<Utc>) -> Vec<Task> {
    let window = Duration::hours(RETENTION_WINDOW_HOURS);
    tasks
        .into_iter()
        .filter(|t| !(t.status == TaskStatus::Completed && now - t.created_at >= window))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::testing::FlakyStore;
    use std::sync::atomic::Ordering;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.into(),
            description: Some("room 3".into()),
            kind: TaskKind::Task,
            assigned_by: "Dr. Rao".into(),
            ..NewTask::default()
        }
    }

    fn recipients(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn task_at(id: &str, status: TaskStatus, created_at: DateTime<Utc>) -> Task {
        Task {
            id: id.into(),
            title: "t".into(),
            description: None,
            kind: TaskKind::Task,
            assigned_by: "a".into(),
            assigned_to: "b".into(),
            status,
            created_at,
            attachment_url: None,
            visit_id: None,
            acknowledged_at: None,
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_fan_out_one_task_per_recipient() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = TaskDispatcher::new(store.clone(), ChangeNotifier::default());

        let report = dispatcher
            .create_tasks(new_task("Prepare report"), &recipients(&["A", "B", "A", " "]))
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.created.len(), 2);
        assert!(report.created.iter().all(|t| t.status == TaskStatus::Pending));
        assert_ne!(report.created[0].id, report.created[1].id);

        // Completing one recipient's copy leaves the other alone.
        dispatcher.set_status(&report.created[0].id, TaskStatus::Completed).await.unwrap();
        let b = dispatcher.list_tasks_for("B").await.unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let dispatcher = TaskDispatcher::new(Arc::new(MemoryStore::new()), ChangeNotifier::default());
        let err = dispatcher.create_tasks(new_task("x"), &[]).await.unwrap_err();
        assert!(matches!(err, FrontDeskError::Validation(_)));
        let err = dispatcher
            .create_tasks(new_task("  "), &recipients(&["A"]))
            .await
            .unwrap_err();
        assert!(matches!(err, FrontDeskError::Validation(_)));
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let store = FlakyStore::new();
        store.reject_assignee("B");
        let dispatcher = TaskDispatcher::new(store.clone(), ChangeNotifier::default());

        let report = dispatcher
            .create_tasks(new_task("Call lab"), &recipients(&["A", "B", "C"]))
            .await
            .unwrap();
        assert!(!report.is_complete());
        assert!(!report.is_total_failure());
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].recipient, "B");
        assert!(report.failed[0].error.is_retriable());
    }

    #[tokio::test]
    async fn test_total_failure() {
        let store = FlakyStore::new();
        store.fail_create_task.store(true, Ordering::SeqCst);
        let dispatcher = TaskDispatcher::new(store, ChangeNotifier::default());
        let report = dispatcher
            .create_tasks(new_task("Call lab"), &recipients(&["A"]))
            .await
            .unwrap();
        assert!(report.is_total_failure());
    }

    #[test]
    fn test_retention_window() {
        let now = Utc::now();
        let tasks = vec![
            task_at("old-done", TaskStatus::Completed, now - Duration::hours(25)),
            task_at("fresh-done", TaskStatus::Completed, now - Duration::hours(23)),
            task_at("old-pending", TaskStatus::Pending, now - Duration::hours(100)),
            task_at("edge-done", TaskStatus::Completed, now - Duration::hours(24)),
        ];
        let ids: Vec<String> = visible_tasks(tasks, now).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["fresh-done", "old-pending"]);
    }

    #[tokio::test]
    async fn test_newest_unacknowledged_skips_acknowledged() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = TaskDispatcher::new(store.clone(), ChangeNotifier::default());
        let base = Utc::now() - Duration::minutes(10);
        for (i, id) in ["t1", "t2", "t3"].iter().enumerate() {
            store
                .create(
                    EntityKind::Task,
                    json!({
                        "id": id, "title": id, "assigned_by": "a", "assigned_to": "rec",
                        "status": "pending",
                        "created_at": base + Duration::minutes(i as i64),
                    }),
                )
                .await
                .unwrap();
        }

        let newest = dispatcher.newest_unacknowledged("rec").await.unwrap().unwrap();
        assert_eq!(newest.id, "t3");

        let acked = dispatcher.acknowledge("t3").await.unwrap();
        assert!(acked.acknowledged_at.is_some());
        let newest = dispatcher.newest_unacknowledged("rec").await.unwrap().unwrap();
        assert_eq!(newest.id, "t2");

        dispatcher.set_status("t2", TaskStatus::Completed).await.unwrap();
        let newest = dispatcher.newest_unacknowledged("rec").await.unwrap().unwrap();
        assert_eq!(newest.id, "t1");
        assert!(dispatcher.newest_unacknowledged("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acknowledge_errors() {
        let store = FlakyStore::new();
        let dispatcher = TaskDispatcher::new(store.clone(), ChangeNotifier::default());
        assert!(dispatcher.acknowledge("missing").await.unwrap_err().is_not_found());

        store.fail_update.store(true, Ordering::SeqCst);
        let err = dispatcher.acknowledge("missing").await.unwrap_err();
        assert!(matches!(err, FrontDeskError::Acknowledge { ref task_id, .. } if task_id == "missing"));
    }
}
