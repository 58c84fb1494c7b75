//! Persisted records of live temporary mirrors

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One live mirror repository awaiting cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempRepoRecord {
    /// Source repository name
    pub original_repo: String,
    /// Generated mirror name
    pub temp_repo: String,
    /// Creation time in epoch milliseconds
    pub created_at: i64,
    /// Account owning both the source and the mirror
    pub owner: String,
    /// Branch that was mirrored
    pub branch: String,
}

impl TempRepoRecord {
    /// Age of the record at `now_millis`
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.created_at
    }

    /// A record is expired once it is strictly older than `max_age_millis`
    pub fn is_expired(&self, now_millis: i64, max_age_millis: i64) -> bool {
        self.age_millis(now_millis) > max_age_millis
    }
}

/// Decode the stored list, treating anything that is not an array as empty
///
/// Array elements that do not decode as records are dropped.
pub fn records_from_value(value: Option<serde_json::Value>) -> Vec<TempRepoRecord> {
    match value {
        None => Vec::new(),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Dropping malformed temp repo record");
                    None
                }
            })
            .collect(),
        Some(other) => {
            warn!(kind = value_kind(&other), "Stored temp repo list is not an array, treating as empty");
            Vec::new()
        }
    }
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Generate a mirror name: `temp-<original>-<YYYYMMDD>-<6 hex>`
pub fn temp_repo_name(original: &str, now_millis: i64) -> String {
    let date = Utc
        .timestamp_millis_opt(now_millis)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y%m%d");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("temp-{}-{}-{}", original, date, &suffix[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(created_at: i64) -> TempRepoRecord {
        TempRepoRecord {
            original_repo: "secret".to_string(),
            temp_repo: "temp-secret-20250101-abcdef".to_string(),
            created_at,
            owner: "octo".to_string(),
            branch: "main".to_string(),
        }
    }

    #[test]
    fn test_expiry_is_strict() {
        let r = record(1_000);
        assert!(!r.is_expired(61_000, 60_000));
        assert!(r.is_expired(61_001, 60_000));
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(record(5)).unwrap();
        assert_eq!(value["originalRepo"], "secret");
        assert_eq!(value["tempRepo"], "temp-secret-20250101-abcdef");
        assert_eq!(value["createdAt"], 5);
    }

    #[test]
    fn test_non_array_is_empty() {
        assert!(records_from_value(None).is_empty());
        assert!(records_from_value(Some(json!({"not": "a list"}))).is_empty());
        assert!(records_from_value(Some(json!("garbage"))).is_empty());
    }

    #[test]
    fn test_malformed_elements_dropped() {
        let value = json!([
            serde_json::to_value(record(1)).unwrap(),
            {"tempRepo": 42},
        ]);
        let records = records_from_value(Some(value));
        assert_eq!(records, vec![record(1)]);
    }

    #[test]
    fn test_temp_repo_name_format() {
        // 2024-03-05T00:00:00Z
        let name = temp_repo_name("my-project", 1_709_596_800_000);
        assert!(name.starts_with("temp-my-project-20240305-"));
        let suffix = name.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_temp_repo_names_unique() {
        let a = temp_repo_name("p", 0);
        let b = temp_repo_name("p", 0);
        assert_ne!(a, b);
    }
}
