//! Ledger row types.

use serde::{Deserialize, Serialize};

/// Lifecycle of one (name, idempotency_key) unit of work.
///
/// `∅ → processing → success (terminal)` or `processing → failure`, where a
/// `failure` row may re-enter `processing` on an explicit retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Success,
    Failure,
}

impl TaskStatus {
    /// Stable string form used in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn from_db(s: &str) -> crate::Result<Self> {
        match s {
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(crate::Error::corrupt_status(other)),
        }
    }
}

/// One ledger entry. `updated_at_ms` advances on every status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRun {
    pub id: String,
    pub name: String,
    pub idempotency_key: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_roundtrip() {
        for status in [
            TaskStatus::Processing,
            TaskStatus::Success,
            TaskStatus::Failure,
        ] {
            assert_eq!(TaskStatus::from_db(status.as_str()).unwrap(), status);
        }
        assert!(TaskStatus::from_db("done").is_err());
    }

    #[test]
    fn test_task_run_serializes_status_lowercase() {
        let run = TaskRun {
            id: "r1".into(),
            name: "daily_scraper".into(),
            idempotency_key: "2024-01-01".into(),
            status: TaskStatus::Success,
            last_error: None,
            created_at_ms: 1000,
            updated_at_ms: 2000,
        };
        let v = serde_json::to_value(&run).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["idempotencyKey"], "2024-01-01");
        assert!(v.get("lastError").is_none());
    }
}
