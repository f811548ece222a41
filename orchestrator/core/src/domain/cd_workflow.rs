// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CD Workflow Aggregate
//!
//! One `CdWorkflow` row is created per (pipeline, artifact) pair of a bulk
//! deployment. The row is the unit of truth for its enqueue/dequeue status.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Bulk-trigger rows and their status lifecycle
//!
//! # Status lifecycle
//!
//! ```text
//! REQUEST_ACCEPTED ──publish ok──▶ ENQUEUED ──dequeue, latest──▶ WF_STARTED
//!        │                            │  │
//!        └──publish failed──▶ QUE_ERROR  ├──superseded──▶ DROPPED_STALE
//!                                        ├──latest-check failed──▶ DEQUE_ERROR
//!                                        └──dispatch failed──▶ TRIGGER_ERROR
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User id used for all transitions driven by the fabric itself.
pub const SYSTEM_USER_ID: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    #[serde(rename = "REQUEST_ACCEPTED")]
    RequestAccepted,
    #[serde(rename = "ENQUEUED")]
    Enqueued,
    #[serde(rename = "QUE_ERROR")]
    QueError,
    #[serde(rename = "WF_STARTED")]
    WfStarted,
    #[serde(rename = "DROPPED_STALE")]
    DroppedStale,
    #[serde(rename = "DEQUE_ERROR")]
    DequeError,
    #[serde(rename = "TRIGGER_ERROR")]
    TriggerError,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::RequestAccepted => "REQUEST_ACCEPTED",
            WorkflowStatus::Enqueued => "ENQUEUED",
            WorkflowStatus::QueError => "QUE_ERROR",
            WorkflowStatus::WfStarted => "WF_STARTED",
            WorkflowStatus::DroppedStale => "DROPPED_STALE",
            WorkflowStatus::DequeError => "DEQUE_ERROR",
            WorkflowStatus::TriggerError => "TRIGGER_ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REQUEST_ACCEPTED" => Some(WorkflowStatus::RequestAccepted),
            "ENQUEUED" => Some(WorkflowStatus::Enqueued),
            "QUE_ERROR" => Some(WorkflowStatus::QueError),
            "WF_STARTED" => Some(WorkflowStatus::WfStarted),
            "DROPPED_STALE" => Some(WorkflowStatus::DroppedStale),
            "DEQUE_ERROR" => Some(WorkflowStatus::DequeError),
            "TRIGGER_ERROR" => Some(WorkflowStatus::TriggerError),
            _ => None,
        }
    }

    /// Rows in these states still compete for "latest" on their pipeline.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::RequestAccepted | WorkflowStatus::Enqueued | WorkflowStatus::WfStarted
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted bulk-trigger row. Also the `BULK-DEPLOY` wire payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdWorkflow {
    pub id: i64,
    pub ci_artifact_id: i64,
    pub pipeline_id: i64,
    pub workflow_status: WorkflowStatus,
    pub created_by: i32,
    pub created_on: DateTime<Utc>,
    pub updated_by: i32,
    pub updated_on: DateTime<Utc>,
}

impl CdWorkflow {
    /// New unsaved row (`id == 0`) for a bulk request, stamped with the
    /// batch timestamp shared by every row of the same bulk action.
    pub fn accepted(request: &BulkTriggerRequest, user_id: i32, batch_time: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            ci_artifact_id: request.ci_artifact_id,
            pipeline_id: request.pipeline_id,
            workflow_status: WorkflowStatus::RequestAccepted,
            created_by: user_id,
            created_on: batch_time,
            updated_by: user_id,
            updated_on: batch_time,
        }
    }

    pub fn transition(&mut self, status: WorkflowStatus, user_id: i32) {
        self.workflow_status = status;
        self.updated_by = user_id;
        self.updated_on = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTriggerRequest {
    pub ci_artifact_id: i64,
    pub pipeline_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&WorkflowStatus::DroppedStale).unwrap();
        assert_eq!(json, "\"DROPPED_STALE\"");
        assert_eq!(WorkflowStatus::parse("QUE_ERROR"), Some(WorkflowStatus::QueError));
        assert_eq!(WorkflowStatus::parse("bogus"), None);
    }

    #[test]
    fn test_in_flight_states() {
        assert!(WorkflowStatus::Enqueued.is_in_flight());
        assert!(WorkflowStatus::WfStarted.is_in_flight());
        assert!(!WorkflowStatus::DroppedStale.is_in_flight());
        assert!(!WorkflowStatus::QueError.is_in_flight());
    }

    #[test]
    fn test_accepted_row_shares_batch_time() {
        let now = Utc::now();
        let a = CdWorkflow::accepted(&BulkTriggerRequest { ci_artifact_id: 1, pipeline_id: 2 }, 7, now);
        let b = CdWorkflow::accepted(&BulkTriggerRequest { ci_artifact_id: 3, pipeline_id: 4 }, 7, now);
        assert_eq!(a.created_on, b.created_on);
        assert_eq!(a.workflow_status, WorkflowStatus::RequestAccepted);
        assert_eq!(a.created_by, 7);
    }
}
