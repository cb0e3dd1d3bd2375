//! Error taxonomy shared by every FrontDesk crate.

use crate::store::EntityKind;

/// All errors surfaced by the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum FrontDeskError {
    /// A required field is missing or malformed. Not retriable as-is.
    #[error("validation error: {0}")]
    Validation(String),

    /// The target record is already gone. Callers refresh their view.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    /// The notification target has no stored contact address.
    #[error("no contact address for patient '{0}'")]
    NoContact(String),

    /// Network or store hiccup; safe to retry.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    /// Acknowledgment write failed; the user must retry explicitly.
    #[error("acknowledge failed for task '{task_id}': {reason}")]
    Acknowledge { task_id: String, reason: String },

    /// Stale write rejected by optimistic versioning.
    #[error("version conflict on {kind} '{id}': expected v{expected}, found v{found}")]
    Conflict {
        kind: EntityKind,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("channel error: {0}")]
    Channel(String),

    #[error("config error: {0}")]
    Config(String),

    /// Permanent store failure (schema, decoding, lock poisoning).
    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FrontDeskError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Only transient store failures may be retried without user input.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// Stable machine-readable tag, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::NoContact(_) => "no_contact",
            Self::TransientStore(_) => "transient_store",
            Self::Acknowledge { .. } => "acknowledge",
            Self::Conflict { .. } => "conflict",
            Self::Channel(_) => "channel",
            Self::Config(_) => "config",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, FrontDeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retriable() {
        assert!(FrontDeskError::TransientStore("timeout".into()).is_retriable());
        assert!(!FrontDeskError::Validation("x".into()).is_retriable());
        assert!(!FrontDeskError::not_found(EntityKind::Task, "t1").is_retriable());
    }

    #[test]
    fn test_not_found_message() {
        let err = FrontDeskError::not_found(EntityKind::SuggestedTask, "s-9");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "suggested_task 's-9' not found");
        assert_eq!(err.kind(), "not_found");
    }
}
