// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Delivery Gateway Client
//!
//! HTTP adapter implementing every collaborator port in
//! [`crate::domain::ports`] against the delivery platform's internal API.
//! Each port operation is one JSON `POST` under `/internal/fabric/`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Delegate pipeline work to the services that own it
//! - **Integration:** Workflow Event Processor / Argo Reconciler → delivery platform REST API
//!
//! # Error Mapping
//!
//! | Response | `CollaboratorError` |
//! |----------|---------------------|
//! | 404 | `NotFound` |
//! | other 4xx | `Rejected` |
//! | 5xx, timeout, connection failure | `Unavailable` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::domain::argo::Application;
use crate::domain::config::DeliveryGatewayConfig;
use crate::domain::events::{
    CdStageCompleteEvent, CiArtifactWebhookRequest, GitCiTriggerRequest, InstallAppVersionDto,
    PluginRegistryArtifactDetails, StopAppRequest, WorkflowStatusReport,
};
use crate::domain::pipeline::{CdWorkflowRunner, CiArtifact, InstalledApp, Pipeline};
use crate::domain::ports::{
    AcdContext, AppLifecycleService, CdTriggerService, CdWorkflowStatusService, ChartScanService,
    CiEventHandler, CollaboratorError, DeploymentStatusOutcome, DeploymentStatusService, EventService,
    InstalledAppDeleteRequest, InstalledAppService, NotificationClient, OidcConfigListener,
    PipelineDeletionService, PipelineOverride, StageNotification, TriggerContext,
};

const API_PREFIX: &str = "/internal/fabric";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdWorkflowUpdated {
    runner_id: i64,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetriggerRequired {
    required: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CiWorkflowUpdated {
    workflow_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactSaved {
    artifact_id: i64,
}

#[derive(Debug, Deserialize)]
struct ExtractedImages {
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanHistoryCreated {
    scan_history_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Traced<'a, T: Serialize> {
    reference_id: Option<&'a str>,
    #[serde(flatten)]
    payload: T,
}

/// HTTP client for the delivery platform.
#[derive(Clone)]
pub struct DeliveryGateway {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl DeliveryGateway {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &DeliveryGatewayConfig, token: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config.url.clone(), token))
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<reqwest::Response, CollaboratorError> {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.header("token", token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::debug!(url = %url, error = %e, "Delivery gateway request failed");
            CollaboratorError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = format!("{} {}: {}", status, path, body);
        Err(match status {
            StatusCode::NOT_FOUND => CollaboratorError::NotFound(detail),
            s if s.is_client_error() => CollaboratorError::Rejected(detail),
            _ => CollaboratorError::Unavailable(detail),
        })
    }

    async fn send(&self, path: &str, body: &impl Serialize) -> Result<(), CollaboratorError> {
        self.post(path, body).await.map(|_| ())
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, CollaboratorError> {
        self.post(path, body)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CollaboratorError::Rejected(format!("unreadable response from {}: {}", path, e)))
    }
}

fn traced<'a, T: Serialize>(ctx: &'a TriggerContext, payload: T) -> Traced<'a, T> {
    Traced {
        reference_id: ctx.reference_id.as_deref(),
        payload,
    }
}

#[async_trait]
impl CdTriggerService for DeliveryGateway {
    async fn handle_pre_stage_success_event(
        &self,
        ctx: &TriggerContext,
        event: &CdStageCompleteEvent,
    ) -> Result<(), CollaboratorError> {
        self.send("/cd-trigger/pre-stage-success", &traced(ctx, event)).await
    }

    async fn handle_post_stage_success_event(
        &self,
        ctx: &TriggerContext,
        cd_workflow_id: i64,
        pipeline_id: i64,
        triggered_by: i32,
        plugin_artifacts: &PluginRegistryArtifactDetails,
    ) -> Result<(), CollaboratorError> {
        let payload = json!({
            "cdWorkflowId": cd_workflow_id,
            "pipelineId": pipeline_id,
            "triggeredBy": triggered_by,
            "pluginRegistryArtifactDetails": plugin_artifacts,
        });
        self.send("/cd-trigger/post-stage-success", &traced(ctx, payload)).await
    }

    async fn trigger_stage_for_bulk(
        &self,
        ctx: &TriggerContext,
        pipeline: &Pipeline,
        artifact: &CiArtifact,
        cd_workflow_id: i64,
        triggered_by: i32,
    ) -> Result<(), CollaboratorError> {
        let payload = json!({
            "pipeline": pipeline,
            "artifact": artifact,
            "cdWorkflowId": cd_workflow_id,
            "triggeredBy": triggered_by,
        });
        self.send("/cd-trigger/bulk-stage", &traced(ctx, payload)).await
    }

    async fn handle_deployment_success_event(
        &self,
        ctx: &TriggerContext,
        pipeline_override: &PipelineOverride,
    ) -> Result<(), CollaboratorError> {
        self.send("/cd-trigger/deployment-success", &traced(ctx, pipeline_override)).await
    }
}

#[async_trait]
impl CdWorkflowStatusService for DeliveryGateway {
    async fn update_cd_workflow(&self, report: &WorkflowStatusReport) -> Result<(i64, String), CollaboratorError> {
        let updated: CdWorkflowUpdated = self.call("/cd-workflow/status", report).await?;
        Ok((updated.runner_id, updated.status))
    }

    async fn deactivate_image_reservation_paths(&self, reservation_ids: &[i64]) -> Result<(), CollaboratorError> {
        self.send("/cd-workflow/reservations/deactivate", &json!({ "ids": reservation_ids }))
            .await
    }

    async fn check_if_retrigger_required(&self, runner: &CdWorkflowRunner) -> Result<bool, CollaboratorError> {
        let answer: RetriggerRequired = self.call("/cd-workflow/retrigger-required", runner).await?;
        Ok(answer.required)
    }

    async fn handle_cd_stage_retrigger(&self, runner: &CdWorkflowRunner) -> Result<(), CollaboratorError> {
        self.send("/cd-workflow/retrigger", runner).await
    }
}

#[async_trait]
impl CiEventHandler for DeliveryGateway {
    async fn check_and_retrigger_ci(&self, report: &WorkflowStatusReport) -> Result<(), CollaboratorError> {
        self.send("/ci/retrigger", report).await
    }

    async fn update_ci_workflow(&self, report: &WorkflowStatusReport) -> Result<i64, CollaboratorError> {
        let updated: CiWorkflowUpdated = self.call("/ci/workflow-status", report).await?;
        Ok(updated.workflow_id)
    }

    async fn handle_ci_success_event(
        &self,
        ctx: &TriggerContext,
        pipeline_id: i64,
        request: &CiArtifactWebhookRequest,
    ) -> Result<i64, CollaboratorError> {
        let payload = json!({ "pipelineId": pipeline_id, "request": request });
        let saved: ArtifactSaved = self.call("/ci/success", &traced(ctx, payload)).await?;
        Ok(saved.artifact_id)
    }

    async fn handle_ci_step_failed_event(
        &self,
        pipeline_id: i64,
        request: &CiArtifactWebhookRequest,
    ) -> Result<(), CollaboratorError> {
        self.send("/ci/step-failed", &json!({ "pipelineId": pipeline_id, "request": request }))
            .await
    }

    async fn handle_ci_webhook_trigger(&self, request: &GitCiTriggerRequest) -> Result<(), CollaboratorError> {
        self.send("/ci/webhook-trigger", request).await
    }
}

#[async_trait]
impl DeploymentStatusService for DeliveryGateway {
    async fn update_deployment_status_and_check_is_succeeded(
        &self,
        app: &Application,
        status_time: DateTime<Utc>,
        is_app_store: bool,
    ) -> Result<DeploymentStatusOutcome, CollaboratorError> {
        let payload = json!({
            "application": app,
            "statusTime": status_time,
            "isAppStore": is_app_store,
        });
        self.call("/deployment-status/argo", &payload).await
    }

    async fn sync_pipeline_status(&self, pipeline: &Pipeline, user_id: i32) -> Result<(), CollaboratorError> {
        self.send(
            "/deployment-status/pipeline-sync",
            &json!({ "pipeline": pipeline, "userId": user_id }),
        )
        .await
    }

    async fn sync_installed_app_status(
        &self,
        installed_app: &InstalledApp,
        installed_app_version_id: i64,
        user_id: i32,
    ) -> Result<(), CollaboratorError> {
        let payload = json!({
            "installedApp": installed_app,
            "installedAppVersionId": installed_app_version_id,
            "userId": user_id,
        });
        self.send("/deployment-status/installed-app-sync", &payload).await
    }
}

#[async_trait]
impl InstalledAppService for DeliveryGateway {
    async fn update_installed_app_version_status(&self, app: &Application) -> Result<(), CollaboratorError> {
        self.send("/installed-app/version-status", app).await
    }

    async fn delete_installed_app(&self, request: &InstalledAppDeleteRequest) -> Result<(), CollaboratorError> {
        self.send("/installed-app/delete", request).await
    }

    async fn perform_deploy_stage(
        &self,
        installed_app_version_id: i64,
        installed_app_version_history_id: i64,
        user_id: i32,
    ) -> Result<(), CollaboratorError> {
        let payload = json!({
            "installedAppVersionId": installed_app_version_id,
            "installedAppVersionHistoryId": installed_app_version_history_id,
            "userId": user_id,
        });
        self.send("/installed-app/deploy", &payload).await
    }

    async fn update_deploy_operation_status(
        &self,
        installed_app_version_id: i64,
        status: &str,
    ) -> Result<(), CollaboratorError> {
        self.send(
            "/installed-app/deploy-status",
            &json!({ "installedAppVersionId": installed_app_version_id, "status": status }),
        )
        .await
    }
}

#[async_trait]
impl AppLifecycleService for DeliveryGateway {
    async fn build_acd_context(&self) -> Result<AcdContext, CollaboratorError> {
        self.call("/app/acd-context", &json!({})).await
    }

    async fn stop_start_app(&self, ctx: &AcdContext, request: &StopAppRequest) -> Result<(), CollaboratorError> {
        self.send("/app/stop-start", &json!({ "acdToken": ctx.token, "request": request }))
            .await
    }
}

#[async_trait]
impl PipelineDeletionService for DeliveryGateway {
    async fn delete_cd_pipeline(
        &self,
        pipeline: &Pipeline,
        force_delete: bool,
        cascade: bool,
        user_id: i32,
    ) -> Result<(), CollaboratorError> {
        let payload = json!({
            "pipeline": pipeline,
            "forceDelete": force_delete,
            "cascade": cascade,
            "userId": user_id,
        });
        self.send("/pipeline/delete", &payload).await
    }

    async fn remove_release_context(&self, pipeline: &Pipeline) -> Result<(), CollaboratorError> {
        self.send("/pipeline/release-context/remove", pipeline).await
    }

    async fn delete_deployment_app(&self, pipeline: &Pipeline, user_id: i32) -> Result<(), CollaboratorError> {
        self.send(
            "/pipeline/deployment-app/delete",
            &json!({ "pipeline": pipeline, "userId": user_id }),
        )
        .await
    }
}

#[async_trait]
impl EventService for DeliveryGateway {
    async fn handle_event(&self, event: &serde_json::Value) -> Result<(), CollaboratorError> {
        self.send("/events", event).await
    }
}

#[async_trait]
impl ChartScanService for DeliveryGateway {
    async fn extract_images(&self, dto: &InstallAppVersionDto) -> Result<Vec<String>, CollaboratorError> {
        let extracted: ExtractedImages = self.call("/chart-scan/images", dto).await?;
        Ok(extracted.images)
    }

    async fn create_scan_history(&self, dto: &InstallAppVersionDto, image: &str) -> Result<i64, CollaboratorError> {
        let created: ScanHistoryCreated = self
            .call("/chart-scan/history", &json!({ "installAppVersion": dto, "image": image }))
            .await?;
        Ok(created.scan_history_id)
    }

    async fn enqueue_scan(&self, scan_history_id: i64, image: &str) -> Result<(), CollaboratorError> {
        self.send(
            "/chart-scan/enqueue",
            &json!({ "scanHistoryId": scan_history_id, "image": image }),
        )
        .await
    }
}

#[async_trait]
impl NotificationClient for DeliveryGateway {
    async fn write_stage_notification(
        &self,
        runner: &CdWorkflowRunner,
        outcome: StageNotification,
    ) -> Result<(), CollaboratorError> {
        let outcome = match outcome {
            StageNotification::Success => "SUCCESS",
            StageNotification::Fail => "FAIL",
        };
        self.send("/notifications/stage", &json!({ "runner": runner, "outcome": outcome }))
            .await
    }
}

#[async_trait]
impl OidcConfigListener for DeliveryGateway {
    async fn on_config_change(&self) -> Result<(), CollaboratorError> {
        self.send("/oidc/config-change", &json!({})).await
    }
}
