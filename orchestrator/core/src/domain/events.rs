// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Wire payloads of the workflow event topics.
//!
//! Every topic carries JSON. Field names follow the producers (camelCase,
//! except the git-sensor material which is emitted with Go field names).
//! Unknown fields are ignored and missing fields take their defaults so that
//! older producers keep working.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registry artifacts pushed by plugin steps, keyed by registry.
pub type PluginRegistryArtifactDetails = HashMap<String, Vec<String>>;

/// `CD-STAGE-COMPLETE`: a PRE or POST stage runner finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CdStageCompleteEvent {
    pub workflow_id: i64,
    pub workflow_runner_id: i64,
    pub cd_pipeline_id: i64,
    pub triggered_by: i32,
    pub artifact_location: String,
    pub pipeline_name: String,
    pub plugin_registry_artifact_details: PluginRegistryArtifactDetails,
    pub plugin_artifact_stage: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StopStartRequestType {
    Start,
    Stop,
}

/// `BULK-HIBERNATE`: one app of a deployment group to start or stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentGroupAppWithEnv {
    pub environment_id: i64,
    pub deployment_group_id: i64,
    pub app_id: i64,
    #[serde(default)]
    pub active: bool,
    pub user_id: i32,
    pub request_type: StopStartRequestType,
}

/// Deployment group with its member apps, as loaded by the caller of a bulk
/// hibernate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentGroup {
    pub id: i64,
    pub environment_id: i64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub app_ids: Vec<i64>,
}

/// Request handed to the deployed-app service for hibernation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAppRequest {
    pub app_id: i64,
    pub environment_id: i64,
    pub user_id: i32,
    pub request_type: StopStartRequestType,
    pub reference_id: Option<String>,
}

/// `ARGO-PIPELINE-STATUS-UPDATE`. `pipeline_id` is a CD pipeline id unless
/// `is_app_store_application` is set, in which case
/// `installed_app_version_id` identifies the installation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgoPipelineStatusSyncEvent {
    pub pipeline_id: i64,
    pub installed_app_version_id: i64,
    pub user_id: i32,
    pub is_app_store_application: bool,
}

/// Node of an Argo workflow status report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowNodeStatus {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub phase: String,
    pub message: String,
}

/// `CI-WORKFLOW-STATUS-UPDATE` / `CD-WORKFLOW-STATUS-UPDATE`: Argo workflow
/// status as reported by the workflow controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStatusReport {
    pub phase: String,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub nodes: std::collections::BTreeMap<String, WorkflowNodeStatus>,
}

impl WorkflowStatusReport {
    /// Name of the workflow the report belongs to (the root node name).
    pub fn workflow_name(&self) -> &str {
        self.nodes
            .values()
            .next()
            .map(|node| node.name.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookData {
    pub id: i64,
    pub event_action_type: String,
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CiProjectDetail {
    pub git_repository: String,
    pub material_name: String,
    pub source_type: String,
    pub source_value: String,
    pub commit_hash: String,
    pub message: String,
    pub author: String,
    pub commit_time: Option<DateTime<Utc>>,
    pub webhook_data: Option<WebhookData>,
}

pub const SOURCE_TYPE_BRANCH_FIXED: &str = "SOURCE_TYPE_BRANCH_FIXED";
pub const SOURCE_TYPE_WEBHOOK: &str = "WEBHOOK";

/// `CI-COMPLETE`: legacy CI runner completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CiCompleteEvent {
    pub ci_project_details: Vec<CiProjectDetail>,
    pub docker_image: String,
    pub digest: String,
    pub pipeline_id: i64,
    pub workflow_id: Option<i64>,
    pub triggered_by: i32,
    pub pipeline_name: String,
    pub data_source: String,
    pub material_type: String,
    pub failure_reason: String,
    pub is_artifact_uploaded: bool,
    pub app_name: String,
    pub plugin_registry_artifact_details: PluginRegistryArtifactDetails,
    pub plugin_artifact_stage: String,
}

/// Artifact registration request derived from a CI completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CiArtifactWebhookRequest {
    pub image: String,
    pub image_digest: String,
    pub material_info: serde_json::Value,
    pub data_source: String,
    pub pipeline_name: String,
    pub workflow_id: Option<i64>,
    pub user_id: i32,
    pub is_artifact_uploaded: bool,
    pub failure_reason: String,
    pub plugin_registry_artifact_details: PluginRegistryArtifactDetails,
    pub plugin_artifact_stage: String,
}

/// Commit as reported by the git sensor (Go field names on the wire).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GitCommit {
    pub commit: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub message: String,
    pub changes: Vec<String>,
}

/// `NEW-CI-MATERIAL`: the git sensor saw a new commit for a CI material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CiPipelineMaterial {
    pub id: i64,
    pub git_material_id: i64,
    #[serde(rename = "Type")]
    pub material_type: String,
    pub value: String,
    pub active: bool,
    pub git_commit: GitCommit,
    pub git_tag: String,
}

/// Automatic CI trigger built from a git-sensor material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCiTriggerRequest {
    pub ci_pipeline_material: CiPipelineMaterial,
    pub triggered_by: i32,
}

/// `CHART-SCAN`: chart installation whose images must be scanned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallAppVersionDto {
    pub installed_app_id: i64,
    pub installed_app_version_id: i64,
    pub app_name: String,
    pub environment_id: i64,
    pub cluster_id: i64,
    pub namespace: String,
    pub app_store_version: i64,
    pub values_override_yaml: String,
    pub user_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_app_version_history_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Operation statuses of an app-store deployment.
pub mod appstore_deploy_status {
    pub const DEPLOY_INIT: &str = "DEPLOY_INIT";
    pub const ENQUEUED: &str = "ENQUEUED";
    pub const QUE_ERROR: &str = "QUE_ERROR";

    /// Versions still waiting for the queue have their operation status
    /// rewritten after a publish attempt.
    pub fn awaits_queue(status: Option<&str>) -> bool {
        matches!(status, Some(DEPLOY_INIT) | Some(ENQUEUED) | Some(QUE_ERROR))
    }
}

/// `APPSTORE-BULK-DEPLOY`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployPayload {
    pub installed_app_version_id: i64,
    pub installed_app_version_history_id: i64,
}

/// `CD-BULK-DEPLOY-TRIGGER`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCdDeployEvent {
    pub pipeline_id: i64,
    pub app_id: i64,
    pub artifact_id: i64,
    pub user_id: i32,
}

/// `WEBHOOK-EVENT`: a validated inbound git webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub git_host_id: i64,
    pub event_type: String,
    pub request_payload_json: String,
}

/// `CD-PIPELINE-DELETE-EVENT`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CdPipelineDeleteEvent {
    pub pipeline_id: i64,
    pub triggered_by: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_sensor_material_uses_go_field_names() {
        let raw = r#"{"Id":4,"GitMaterialId":2,"Type":"SOURCE_TYPE_BRANCH_FIXED","Value":"main","Active":true,
                      "GitCommit":{"Commit":"abc123","Author":"dev","Message":"fix"}}"#;
        let material: CiPipelineMaterial = serde_json::from_str(raw).unwrap();
        assert_eq!(material.id, 4);
        assert_eq!(material.material_type, "SOURCE_TYPE_BRANCH_FIXED");
        assert_eq!(material.git_commit.commit, "abc123");
    }

    #[test]
    fn test_cd_stage_complete_tolerates_missing_fields() {
        let event: CdStageCompleteEvent =
            serde_json::from_str(r#"{"workflowRunnerId": 9, "unknown": true}"#).unwrap();
        assert_eq!(event.workflow_runner_id, 9);
        assert!(event.plugin_registry_artifact_details.is_empty());
    }

    #[test]
    fn test_hibernate_request_type_wire_form() {
        let raw = r#"{"environmentId":1,"deploymentGroupId":2,"appId":3,"userId":4,"requestType":"STOP"}"#;
        let payload: DeploymentGroupAppWithEnv = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.request_type, StopStartRequestType::Stop);
    }
}
