// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Collaborator Ports
//!
//! The fabric routes events; the actual work (triggering stages, moving
//! deployment timelines, deleting apps, scanning images) belongs to services
//! that live outside this crate. Each is consumed through one of the traits
//! below. `infrastructure::delivery_gateway` provides an HTTP adapter for all
//! of them, `infrastructure::kubernetes_secrets` provides the [`SecretStore`].
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Anti-corruption boundary towards the delivery platform

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::argo::Application;
use crate::domain::events::{
    CdStageCompleteEvent, CiArtifactWebhookRequest, GitCiTriggerRequest, InstallAppVersionDto,
    PluginRegistryArtifactDetails, StopAppRequest, WorkflowStatusReport,
};
use crate::domain::pipeline::{CdWorkflowRunner, CiArtifact, InstalledApp, Pipeline};

/// Correlates downstream work with the bus message that caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    pub reference_id: Option<String>,
}

impl TriggerContext {
    pub fn from_message(msg_id: &str) -> Self {
        Self {
            reference_id: Some(msg_id.to_string()),
        }
    }
}

/// Errors reported by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Pipeline override written when a deployment was rendered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineOverride {
    pub id: i64,
    pub pipeline_id: i64,
    pub ci_artifact_id: i64,
    pub cd_workflow_id: i64,
}

/// Result of folding an Argo application delta into deployment status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentStatusOutcome {
    pub is_succeeded: bool,
    pub pipeline_override: Option<PipelineOverride>,
}

/// Opaque Argo CD session obtained by impersonating the service account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcdContext {
    pub token: String,
}

/// Request to remove a chart installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledAppDeleteRequest {
    pub installed_app_id: i64,
    pub app_id: i64,
    pub app_name: String,
    pub environment_id: i64,
    pub force_delete: bool,
    pub non_cascade_delete: bool,
    pub user_id: i32,
}

impl InstalledAppDeleteRequest {
    pub fn for_argo_removal(app: &InstalledApp, user_id: i32) -> Self {
        Self {
            installed_app_id: app.id,
            app_id: app.app_id,
            app_name: app.app_name.clone(),
            environment_id: app.environment_id,
            force_delete: false,
            non_cascade_delete: false,
            user_id,
        }
    }
}

/// Stage-level notification for PRE/POST runners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageNotification {
    Success,
    Fail,
}

/// CD stage dispatch (the workflow DAG executor).
#[async_trait]
pub trait CdTriggerService: Send + Sync {
    async fn handle_pre_stage_success_event(
        &self,
        ctx: &TriggerContext,
        event: &CdStageCompleteEvent,
    ) -> Result<(), CollaboratorError>;

    async fn handle_post_stage_success_event(
        &self,
        ctx: &TriggerContext,
        cd_workflow_id: i64,
        pipeline_id: i64,
        triggered_by: i32,
        plugin_artifacts: &PluginRegistryArtifactDetails,
    ) -> Result<(), CollaboratorError>;

    /// Dispatch the deploy stage for one dequeued bulk row.
    async fn trigger_stage_for_bulk(
        &self,
        ctx: &TriggerContext,
        pipeline: &Pipeline,
        artifact: &CiArtifact,
        cd_workflow_id: i64,
        triggered_by: i32,
    ) -> Result<(), CollaboratorError>;

    async fn handle_deployment_success_event(
        &self,
        ctx: &TriggerContext,
        pipeline_override: &PipelineOverride,
    ) -> Result<(), CollaboratorError>;
}

/// CD runner status bookkeeping driven by runner status reports.
#[async_trait]
pub trait CdWorkflowStatusService: Send + Sync {
    /// Returns the runner id and the persisted status.
    async fn update_cd_workflow(
        &self,
        report: &WorkflowStatusReport,
    ) -> Result<(i64, String), CollaboratorError>;

    async fn deactivate_image_reservation_paths(
        &self,
        reservation_ids: &[i64],
    ) -> Result<(), CollaboratorError>;

    async fn check_if_retrigger_required(
        &self,
        runner: &CdWorkflowRunner,
    ) -> Result<bool, CollaboratorError>;

    async fn handle_cd_stage_retrigger(
        &self,
        runner: &CdWorkflowRunner,
    ) -> Result<(), CollaboratorError>;
}

/// CI handler.
#[async_trait]
pub trait CiEventHandler: Send + Sync {
    async fn check_and_retrigger_ci(
        &self,
        report: &WorkflowStatusReport,
    ) -> Result<(), CollaboratorError>;

    /// Returns the CI workflow id.
    async fn update_ci_workflow(&self, report: &WorkflowStatusReport) -> Result<i64, CollaboratorError>;

    /// Returns the id of the saved artifact.
    async fn handle_ci_success_event(
        &self,
        ctx: &TriggerContext,
        pipeline_id: i64,
        request: &CiArtifactWebhookRequest,
    ) -> Result<i64, CollaboratorError>;

    async fn handle_ci_step_failed_event(
        &self,
        pipeline_id: i64,
        request: &CiArtifactWebhookRequest,
    ) -> Result<(), CollaboratorError>;

    async fn handle_ci_webhook_trigger(&self, request: &GitCiTriggerRequest) -> Result<(), CollaboratorError>;
}

/// Deployment timeline and status.
#[async_trait]
pub trait DeploymentStatusService: Send + Sync {
    /// `CollaboratorError::NotFound` means the application is not a Devtron
    /// chart deployment.
    async fn update_deployment_status_and_check_is_succeeded(
        &self,
        app: &Application,
        status_time: DateTime<Utc>,
        is_app_store: bool,
    ) -> Result<DeploymentStatusOutcome, CollaboratorError>;

    async fn sync_pipeline_status(&self, pipeline: &Pipeline, user_id: i32) -> Result<(), CollaboratorError>;

    async fn sync_installed_app_status(
        &self,
        installed_app: &InstalledApp,
        installed_app_version_id: i64,
        user_id: i32,
    ) -> Result<(), CollaboratorError>;
}

/// Chart installations.
#[async_trait]
pub trait InstalledAppService: Send + Sync {
    async fn update_installed_app_version_status(&self, app: &Application) -> Result<(), CollaboratorError>;

    async fn delete_installed_app(&self, request: &InstalledAppDeleteRequest) -> Result<(), CollaboratorError>;

    async fn perform_deploy_stage(
        &self,
        installed_app_version_id: i64,
        installed_app_version_history_id: i64,
        user_id: i32,
    ) -> Result<(), CollaboratorError>;

    async fn update_deploy_operation_status(
        &self,
        installed_app_version_id: i64,
        status: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Start/stop of deployed apps through Argo CD.
#[async_trait]
pub trait AppLifecycleService: Send + Sync {
    async fn build_acd_context(&self) -> Result<AcdContext, CollaboratorError>;

    async fn stop_start_app(&self, ctx: &AcdContext, request: &StopAppRequest) -> Result<(), CollaboratorError>;
}

/// Pipeline deletion.
#[async_trait]
pub trait PipelineDeletionService: Send + Sync {
    async fn delete_cd_pipeline(
        &self,
        pipeline: &Pipeline,
        force_delete: bool,
        cascade: bool,
        user_id: i32,
    ) -> Result<(), CollaboratorError>;

    async fn remove_release_context(&self, pipeline: &Pipeline) -> Result<(), CollaboratorError>;

    async fn delete_deployment_app(&self, pipeline: &Pipeline, user_id: i32) -> Result<(), CollaboratorError>;
}

/// Generic platform events (cron triggers).
#[async_trait]
pub trait EventService: Send + Sync {
    async fn handle_event(&self, event: &serde_json::Value) -> Result<(), CollaboratorError>;
}

/// Image scanning of chart installations.
#[async_trait]
pub trait ChartScanService: Send + Sync {
    /// Renders the chart and returns the referenced images.
    async fn extract_images(&self, dto: &InstallAppVersionDto) -> Result<Vec<String>, CollaboratorError>;

    /// Returns the scan history id.
    async fn create_scan_history(&self, dto: &InstallAppVersionDto, image: &str) -> Result<i64, CollaboratorError>;

    async fn enqueue_scan(&self, scan_history_id: i64, image: &str) -> Result<(), CollaboratorError>;
}

/// Notification writer.
#[async_trait]
pub trait NotificationClient: Send + Sync {
    async fn write_stage_notification(
        &self,
        runner: &CdWorkflowRunner,
        outcome: StageNotification,
    ) -> Result<(), CollaboratorError>;
}

/// Invalidated after an SSO connector changes.
#[async_trait]
pub trait OidcConfigListener: Send + Sync {
    async fn on_config_change(&self) -> Result<(), CollaboratorError>;
}

/// RBAC policy decision point.
pub trait Enforcer: Send + Sync {
    fn check(&self, subject: &str, resource: &str, action: &str, object: &str) -> bool;
}

/// Kubernetes `Secret` with decoded data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubernetesSecret {
    pub namespace: String,
    pub name: String,
    pub resource_version: Option<String>,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret {0} not found")]
    NotFound(String),

    #[error("resource version conflict on secret {0}")]
    Conflict(String),

    #[error("secret store transport error: {0}")]
    Transport(String),

    #[error("malformed secret: {0}")]
    Decode(String),
}

/// Optimistically versioned secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<KubernetesSecret, SecretStoreError>;

    /// Fails with [`SecretStoreError::Conflict`] when the stored
    /// `resource_version` moved since `secret` was read.
    async fn update_secret(&self, secret: &KubernetesSecret) -> Result<KubernetesSecret, SecretStoreError>;
}
