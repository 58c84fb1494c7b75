//! Bookkeeping for tracked units of user-visible work

use serde::{Deserialize, Serialize};

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Started,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Started => "started",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Started)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(OperationStatus::Started),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            other => Err(crate::Error::Other(format!(
                "Unknown operation status: {}",
                other
            ))),
        }
    }
}

/// One in-flight or finished unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: String,
    pub status: OperationStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Start time in epoch milliseconds
    pub start_time: i64,
    /// Time the operation completed or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl Operation {
    pub fn started(
        id: impl Into<String>,
        op_type: impl Into<String>,
        description: impl Into<String>,
        metadata: Option<serde_json::Value>,
        start_time: i64,
    ) -> Self {
        Self {
            id: id.into(),
            op_type: op_type.into(),
            status: OperationStatus::Started,
            description: description.into(),
            metadata,
            error: None,
            start_time,
            end_time: None,
        }
    }

    /// Mark completed; returns false if the operation already finished
    pub fn complete(&mut self, now: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = OperationStatus::Completed;
        self.end_time = Some(now);
        true
    }

    /// Mark failed with `error`; returns false if the operation already finished
    pub fn fail(&mut self, error: impl Into<String>, now: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = OperationStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_exactly_once() {
        let mut op = Operation::started("import-1", "import", "Import repo", None, 10);
        assert!(op.complete(20));
        assert!(!op.fail("late failure", 30));
        assert_eq!(op.status, OperationStatus::Completed);
        assert_eq!(op.end_time, Some(20));
        assert!(op.error.is_none());
    }

    #[test]
    fn test_fail_records_error() {
        let mut op = Operation::started("import-2", "import", "Import repo", None, 10);
        assert!(op.fail("clone failed", 15));
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.error.as_deref(), Some("clone failed"));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            OperationStatus::Started,
            OperationStatus::Completed,
            OperationStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OperationStatus>().unwrap(), status);
        }
        assert!("paused".parse::<OperationStatus>().is_err());
    }
}
