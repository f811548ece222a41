// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Argo CD `Application` model (subset)
//!
//! Only the fields the reconciler reads are modelled; everything else in the
//! custom resource is ignored on decode.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    #[serde(default)]
    pub revision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub sync: Option<SyncOperation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationState {
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub phase: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub revision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default)]
    pub health: HealthStatus,
    #[serde(default)]
    pub sync: SyncStatus,
    #[serde(default)]
    pub operation_state: Option<OperationState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub operation: Option<Operation>,
    #[serde(default)]
    pub status: ApplicationStatus,
}

impl Application {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Git revision the application was last synced to: the pending
    /// operation's revision, falling back to the last completed operation.
    pub fn git_hash(&self) -> Option<&str> {
        let pending = self
            .operation
            .as_ref()
            .and_then(|op| op.sync.as_ref())
            .map(|sync| sync.revision.as_str())
            .filter(|rev| !rev.is_empty());
        pending.or_else(|| {
            self.status
                .operation_state
                .as_ref()
                .and_then(|state| state.operation.sync.as_ref())
                .map(|sync| sync.revision.as_str())
                .filter(|rev| !rev.is_empty())
        })
    }
}

/// Payload of `APPLICATION-STATUS-UPDATE` and `APPLICATION-STATUS-DELETE`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDetail {
    #[serde(default)]
    pub application: Option<Application>,
    #[serde(default)]
    pub status_time: Option<DateTime<Utc>>,
}

impl ApplicationDetail {
    /// Status time of the delta, `now` when the producer sent a zero time.
    /// Producers written against Go encode "no time" as `0001-01-01T00:00:00Z`.
    pub fn effective_status_time(&self) -> DateTime<Utc> {
        match self.status_time {
            Some(t) if t.year() > 1 => t,
            _ => Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_hash_prefers_pending_operation() {
        let json = serde_json::json!({
            "metadata": {"name": "app-env"},
            "operation": {"sync": {"revision": "abc"}},
            "status": {"operationState": {"operation": {"sync": {"revision": "def"}}}}
        });
        let app: Application = serde_json::from_value(json).unwrap();
        assert_eq!(app.git_hash(), Some("abc"));
    }

    #[test]
    fn test_git_hash_falls_back_to_operation_state() {
        let json = serde_json::json!({
            "metadata": {"name": "app-env"},
            "status": {"operationState": {"operation": {"sync": {"revision": "def"}}}}
        });
        let app: Application = serde_json::from_value(json).unwrap();
        assert_eq!(app.git_hash(), Some("def"));
    }

    #[test]
    fn test_zero_status_time_becomes_now() {
        let detail: ApplicationDetail = serde_json::from_value(serde_json::json!({
            "application": {"metadata": {"name": "a"}},
            "statusTime": "0001-01-01T00:00:00Z"
        }))
        .unwrap();
        let before = Utc::now();
        assert!(detail.effective_status_time() >= before);
    }
}
