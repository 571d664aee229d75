use std::time::Duration;

use thiserror::Error;

use crate::model::RecordId;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Detail reported when a create reuses an id the backend already holds.
pub const ALREADY_EXISTS: &str = "Existing entity.";
/// Detail reported when an update or delete targets a missing id.
pub const NOT_FOUND: &str = "Entity not found.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request superseded by a newer one")]
    Aborted,
    #[error("record {id} not found")]
    NotFound {
        id: RecordId,
        detail: Option<String>,
    },
    #[error("request rejected{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Rejected { detail: Option<String> },
    #[error("invalid request: {detail}")]
    Invalid { detail: String },
    #[error("backend unavailable: {0}")]
    Backend(String),
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl GatewayError {
    pub fn not_found(id: &RecordId) -> Self {
        GatewayError::NotFound {
            id: id.clone(),
            detail: None,
        }
    }

    /// Not-found as reported by a backend, carrying [`NOT_FOUND`] as detail.
    pub fn missing(id: &RecordId) -> Self {
        GatewayError::NotFound {
            id: id.clone(),
            detail: Some(NOT_FOUND.to_string()),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        GatewayError::Rejected {
            detail: Some(detail.into()),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        GatewayError::Invalid {
            detail: detail.into(),
        }
    }

    /// Human-readable detail supplied by the backend (or a local validation).
    pub fn detail(&self) -> Option<&str> {
        match self {
            GatewayError::NotFound { detail, .. } | GatewayError::Rejected { detail } => {
                detail.as_deref()
            }
            GatewayError::Invalid { detail } => Some(detail),
            _ => None,
        }
    }

    /// Timed out or superseded.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Aborted)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_) | GatewayError::Aborted | GatewayError::Backend(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Operation {
    Fetch,
    Create,
    Update,
    ToggleFavorite,
    Delete,
    Save,
    Open,
}

impl Operation {
    pub fn fallback_message(self, noun: &str, noun_plural: &str) -> String {
        match self {
            Operation::Fetch => format!("Failed to load {noun_plural}."),
            Operation::Create => format!("Failed to create {noun}."),
            Operation::Update | Operation::Save => format!("Failed to save {noun}."),
            Operation::ToggleFavorite => "Failed to update favorite.".to_string(),
            Operation::Delete => format!("Failed to delete {noun}."),
            Operation::Open => format!("Failed to open {noun}."),
        }
    }
}

/// A failed mutation, after local state has been reverted or reconciled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct MutationError {
    pub operation: Operation,
    pub message: String,
    #[source]
    pub source: GatewayError,
}

impl MutationError {
    /// Prefers the backend detail, falling back to a per-operation message.
    pub fn new(operation: Operation, noun: &str, noun_plural: &str, source: GatewayError) -> Self {
        let message = source
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| operation.fallback_message(noun, noun_plural));
        Self {
            operation,
            message,
            source,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }

    pub fn is_interrupted(&self) -> bool {
        self.source.is_interrupted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_prefers_backend_detail() {
        let err = MutationError::new(
            Operation::Save,
            "entry",
            "entries",
            GatewayError::rejected("Journal quota reached."),
        );
        assert_eq!(err.message, "Journal quota reached.");
        assert_eq!(err.to_string(), "Journal quota reached.");
    }

    #[test]
    fn message_falls_back_per_operation() {
        let save = MutationError::new(
            Operation::Save,
            "entry",
            "entries",
            GatewayError::Backend("connection reset".into()),
        );
        assert_eq!(save.message, "Failed to save entry.");

        let fetch = MutationError::new(
            Operation::Fetch,
            "letter",
            "letters",
            GatewayError::Timeout(Duration::from_secs(30)),
        );
        assert_eq!(fetch.message, "Failed to load letters.");
        assert!(fetch.is_timeout());
        assert!(fetch.is_interrupted());
    }

    #[test]
    fn rejected_display_includes_optional_detail() {
        assert_eq!(
            GatewayError::Rejected { detail: None }.to_string(),
            "request rejected"
        );
        assert_eq!(
            GatewayError::rejected("Existing entity.").to_string(),
            "request rejected: Existing entity."
        );
        assert!(!GatewayError::rejected("x").is_retryable());
        assert!(GatewayError::Aborted.is_retryable());
    }
}
