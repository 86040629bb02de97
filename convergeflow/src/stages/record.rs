//! Per-stage execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a setup stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Stage committed its effects.
    Completed,
    /// Stage was not run in the active environment.
    Skipped,
    /// Stage failed.
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What happened to one stage during setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// 1-based position in declaration order.
    pub index: usize,
    /// Stage status.
    pub status: StageStatus,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
    /// Error message if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    /// Creates a completed record.
    #[must_use]
    pub fn completed(name: impl Into<String>, index: usize, started_at: DateTime<Utc>) -> Self {
        Self::finish(name, index, StageStatus::Completed, started_at, None)
    }

    /// Creates a skipped record.
    #[must_use]
    pub fn skipped(name: impl Into<String>, index: usize) -> Self {
        Self::finish(name, index, StageStatus::Skipped, Utc::now(), None)
    }

    /// Creates a failed record.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        index: usize,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self::finish(name, index, StageStatus::Failed, started_at, Some(error.into()))
    }

    fn finish(
        name: impl Into<String>,
        index: usize,
        status: StageStatus,
        started_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            status,
            started_at,
            ended_at: Utc::now(),
            error,
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_record() {
        let started = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let record = StageRecord::completed("galley", 1, started);

        assert_eq!(record.status, StageStatus::Completed);
        assert!(record.error.is_none());
        assert!(record.duration_ms() >= 5);
    }

    #[test]
    fn test_failed_record_serialization() {
        let record = StageRecord::failed("pilot", 3, Utc::now(), "crashloop");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["status"], serde_json::json!("failed"));
        assert_eq!(json["error"], serde_json::json!("crashloop"));
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
    }
}
