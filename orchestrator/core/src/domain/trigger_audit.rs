// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow trigger audit snapshots
//!
//! A snapshot freezes the exact workflow request a runner was started with so
//! that a failed run can be replayed. The request is stored as
//! `gzip(json(encrypt(request)))`; secrets never reach the table in clear.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_SCHEMA_VERSION: &str = "V1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditWorkflowType {
    #[serde(rename = "CI")]
    Ci,
    #[serde(rename = "PRE_CD")]
    PreCd,
    #[serde(rename = "POST_CD")]
    PostCd,
}

impl AuditWorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditWorkflowType::Ci => "CI",
            AuditWorkflowType::PreCd => "PRE_CD",
            AuditWorkflowType::PostCd => "POST_CD",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CI" => Some(AuditWorkflowType::Ci),
            "PRE_CD" => Some(AuditWorkflowType::PreCd),
            "POST_CD" => Some(AuditWorkflowType::PostCd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    #[default]
    #[serde(rename = "MANUAL")]
    Manual,
    #[serde(rename = "AUTO")]
    Auto,
    #[serde(rename = "WEBHOOK")]
    Webhook,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "MANUAL",
            TriggerType::Auto => "AUTO",
            TriggerType::Webhook => "WEBHOOK",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "AUTO" => TriggerType::Auto,
            "WEBHOOK" => TriggerType::Webhook,
            _ => TriggerType::Manual,
        }
    }
}

/// Persisted snapshot. `workflow_request` holds the compressed, encrypted
/// request bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfigSnapshot {
    pub id: i64,
    pub workflow_id: i64,
    pub workflow_type: AuditWorkflowType,
    pub pipeline_id: i64,
    pub app_id: i64,
    pub environment_id: Option<i64>,
    pub artifact_id: Option<i64>,
    pub trigger_type: TriggerType,
    pub triggered_by: i32,
    pub trigger_metadata: serde_json::Value,
    pub workflow_request: Vec<u8>,
    pub schema_version: String,
    pub created_by: i32,
    pub created_on: DateTime<Utc>,
}

/// Input for the three save operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAuditRequest {
    pub workflow_id: i64,
    pub pipeline_id: i64,
    pub app_id: i64,
    #[serde(default)]
    pub environment_id: Option<i64>,
    #[serde(default)]
    pub artifact_id: Option<i64>,
    #[serde(default)]
    pub trigger_type: Option<TriggerType>,
    pub triggered_by: i32,
    #[serde(default)]
    pub trigger_metadata: Option<serde_json::Value>,
    pub workflow_request: serde_json::Value,
}

/// Snapshot with its request decrypted for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAuditRecord {
    pub id: i64,
    pub workflow_id: i64,
    pub workflow_type: AuditWorkflowType,
    pub pipeline_id: i64,
    pub app_id: i64,
    pub environment_id: Option<i64>,
    pub artifact_id: Option<i64>,
    pub trigger_type: TriggerType,
    pub triggered_by: i32,
    pub trigger_metadata: serde_json::Value,
    pub workflow_request: serde_json::Value,
    pub schema_version: String,
    pub created_on: DateTime<Utc>,
}

/// Summary row for history listings (no request payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAuditSummary {
    pub id: i64,
    pub workflow_id: i64,
    pub workflow_type: AuditWorkflowType,
    pub trigger_type: TriggerType,
    pub triggered_by: i32,
    pub created_on: DateTime<Utc>,
}

impl From<&WorkflowConfigSnapshot> for TriggerAuditSummary {
    fn from(s: &WorkflowConfigSnapshot) -> Self {
        Self {
            id: s.id,
            workflow_id: s.workflow_id,
            workflow_type: s.workflow_type,
            trigger_type: s.trigger_type,
            triggered_by: s.triggered_by,
            created_on: s.created_on,
        }
    }
}
