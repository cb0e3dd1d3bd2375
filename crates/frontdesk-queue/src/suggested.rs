//! Suggested Task Expiry Manager — time-limited task proposals.
//!
//! Expiry is advisory: nothing deletes an expired suggestion automatically.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use frontdesk_core::error::{FrontDeskError, Result};
use frontdesk_core::store::{EntityKind, Filter, RecordStore, from_record, from_records};
use frontdesk_core::types::{SuggestedTask, TaskKind};

use crate::events::{ChangeEvent, ChangeNotifier};
use crate::tasks::{BatchReport, NewTask, TaskDispatcher};

/// Default lifetime of a new suggestion.
pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSuggestion {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub visit_id: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
}

/// Result of promoting a suggestion into real tasks.
#[derive(Debug)]
pub struct Promotion {
    pub report: BatchReport,
    /// True only when every recipient got a task and the suggestion is gone.
    pub suggestion_removed: bool,
}

pub struct SuggestionManager {
    store: Arc<dyn RecordStore>,
    dispatcher: TaskDispatcher,
    events: ChangeNotifier,
    assigned_by: String,
}

impl SuggestionManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        dispatcher: TaskDispatcher,
        events: ChangeNotifier,
        assigned_by: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            events,
            assigned_by: assigned_by.into(),
        }
    }

    /// Every suggestion, expired ones included.
    pub async fn list_suggested(&self) -> Result<Vec<SuggestedTask>> {
        from_records(self.store.list(EntityKind::SuggestedTask, &Filter::all()).await?)
    }

    pub async fn get(&self, id: &str) -> Result<SuggestedTask> {
        from_record(self.store.get(EntityKind::SuggestedTask, id).await?)
    }

    pub async fn create(&self, new: NewSuggestion, ttl_hours: i64) -> Result<SuggestedTask> {
        if new.title.trim().is_empty() {
            return Err(FrontDeskError::Validation("suggestion title is required".into()));
        }
        let expires_at = expiry_from_now(ttl_hours)?;
        let record = self
            .store
            .create(
                EntityKind::SuggestedTask,
                json!({
                    "title": new.title.trim(),
                    "description": new.description,
                    "type": new.kind,
                    "visit_id": new.visit_id,
                    "attachment_url": new.attachment_url,
                    "expires_at": expires_at,
                }),
            )
            .await?;
        let suggestion: SuggestedTask = from_record(record)?;
        tracing::info!("💡 Suggestion '{}' expires at {}", suggestion.title, suggestion.expires_at);
        self.events.publish(ChangeEvent::SuggestionsChanged);
        Ok(suggestion)
    }

    /// Reset expiry to `now + hours`. Not additive: extending twice by 24h
    /// leaves roughly 24h remaining.
    pub async fn extend(&self, id: &str, hours: i64) -> Result<SuggestedTask> {
        let expires_at = expiry_from_now(hours)?;
        self.write_expiry(id, expires_at).await
    }

    /// Set an explicit expiry. Must lie in the future.
    pub async fn set_expiry(&self, id: &str, at: DateTime<Utc>) -> Result<SuggestedTask> {
        if at <= Utc::now() {
            return Err(FrontDeskError::Validation(
                "expires_at must be in the future".into(),
            ));
        }
        self.write_expiry(id, at).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(EntityKind::SuggestedTask, id).await?;
        tracing::info!("🗑️ Suggestion {id} deleted");
        self.events.publish(ChangeEvent::SuggestionsChanged);
        Ok(())
    }

    /// Turn a suggestion into one task per recipient.
    ///
    /// The suggestion is deleted only when every recipient succeeded. When
    /// nothing was created the first failure is returned and the suggestion
    /// stays, so the user can retry the whole promotion.
    pub async fn promote(
        &self,
        suggestion: &SuggestedTask,
        recipients: &[String],
        assigned_by: Option<&str>,
    ) -> Result<Promotion> {
        let task = NewTask {
            title: suggestion.title.clone(),
            description: Some(suggestion.description.clone()).filter(|d| !d.is_empty()),
            kind: suggestion.kind,
            assigned_by: assigned_by
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(&self.assigned_by)
                .to_string(),
            attachment_url: suggestion.attachment_url.clone(),
            visit_id: suggestion.visit_id.clone(),
        };

        // Claim the suggestion at the version the caller read. A concurrent
        // promote or edit bumps it, so only one promote ever dispatches.
        self.store
            .update(
                EntityKind::SuggestedTask,
                &suggestion.id,
                json!({ "promotion_started_at": Utc::now() }),
                Some(suggestion.version),
            )
            .await
            .inspect_err(|e| {
                tracing::info!("Suggestion {} not promoted: {e}", suggestion.id);
            })?;

        let mut report = self.dispatcher.create_tasks(task, recipients).await?;
        if report.is_total_failure() {
            tracing::warn!("⚠️ Promotion of suggestion {} failed; suggestion kept", suggestion.id);
            return match report.failed.drain(..).next() {
                Some(first) => Err(first.error),
                None => Err(FrontDeskError::Store("promotion created nothing".into())),
            };
        }
        if !report.is_complete() {
            tracing::warn!(
                "⚠️ Suggestion {} partially promoted ({} of {}); suggestion kept",
                suggestion.id,
                report.created.len(),
                report.created.len() + report.failed.len()
            );
            return Ok(Promotion {
                report,
                suggestion_removed: false,
            });
        }

        match self.store.delete(EntityKind::SuggestedTask, &suggestion.id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::info!("Suggestion {} was already removed", suggestion.id);
            }
            Err(e) => return Err(e),
        }
        tracing::info!(
            "🚀 Suggestion '{}' promoted to {} task(s)",
            suggestion.title,
            report.created.len()
        );
        self.events.publish(ChangeEvent::SuggestionsChanged);
        Ok(Promotion {
            report,
            suggestion_removed: true,
        })
    }

    async fn write_expiry(&self, id: &str, at: DateTime<Utc>) -> Result<SuggestedTask> {
        let record = self
            .store
            .update(EntityKind::SuggestedTask, id, json!({ "expires_at": at }), None)
            .await?;
        let suggestion: SuggestedTask = from_record(record)?;
        tracing::info!("⏳ Suggestion {} now expires at {}", suggestion.id, suggestion.expires_at);
        self.events.publish(ChangeEvent::SuggestionsChanged);
        Ok(suggestion)
    }
}

fn expiry_from_now(hours: i64) -> Result<DateTime<Utc>> {
    if hours <= 0 {
        return Err(FrontDeskError::Validation(format!(
            "hours must be positive, got {hours}"
        )));
    }
    Duration::try_hours(hours)
        .and_then(|d| Utc::now().checked_add_signed(d))
        .ok_or_else(|| FrontDeskError::Validation(format!("hours out of range: {hours}")))
}
