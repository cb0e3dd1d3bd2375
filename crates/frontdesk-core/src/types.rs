//! Domain records — the core data model for queue tokens and staff tasks.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Patient reference, owned by the external record CRUD. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    /// Contact address (phone number) for chat notifications.
    #[serde(default)]
    pub phone: Option<String>,
}

impl Patient {
    /// The stored contact address. A value without any digit is no address.
    pub fn contact(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|p| p.chars().any(|c| c.is_ascii_digit()))
    }
}

/// Token status. Any transition is allowed; manual correction must stay possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    #[default]
    Waiting,
    InProgress,
    Completed,
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenStatus::Waiting => write!(f, "waiting"),
            TokenStatus::InProgress => write!(f, "in_progress"),
            TokenStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One patient's place in a single day's service queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub patient_id: String,
    /// Unique within `date`; not necessarily contiguous.
    pub token_number: u32,
    /// Queue partition key.
    pub date: NaiveDate,
    #[serde(default)]
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Task,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A unit of work assigned by one staff member to exactly one other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    pub assigned_by: String,
    pub assigned_to: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub visit_id: Option<String>,
    /// Set once the assignee accepted or queued the popup for this task.
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl Task {
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            kind: self.kind,
            assigned_by: self.assigned_by.clone(),
            created_at: self.created_at,
            attachment_url: self.attachment_url.clone(),
            visit_id: self.visit_id.clone(),
        }
    }
}

/// What the poller hands to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub assigned_by: String,
    pub created_at: DateTime<Utc>,
    pub attachment_url: Option<String>,
    pub visit_id: Option<String>,
}

/// An unassigned, time-limited task proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub visit_id: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl SuggestedTask {
    /// Expiry is advisory: an expired suggestion stays until deleted.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
