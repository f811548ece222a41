// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Event Processor
//!
//! Consumer side of the CI/CD workflow topics. Each topic has a `handle_*`
//! method holding the business reaction and a `subscribe_*` method that
//! registers it on the bus together with its log line and validators.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Decode topic payloads and drive the collaborator
//!   ports in the right order
//! - **Collaborators:**
//!   - Domain: `CdWorkflow`, `CdWorkflowRunner`, wire payloads in
//!     `domain::events`
//!   - Infrastructure: `PubSubClient`, repositories
//!   - Ports: everything in [`Collaborators`]
//!
//! Handler failures map onto the bus contract: database errors are
//! transient and redelivered, undecodable payloads and rejected collaborator
//! calls are permanent and acked.

use chrono::SecondsFormat;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::collaborators::Collaborators;
use crate::application::repository_factory::Repositories;
use crate::domain::cd_workflow::{CdWorkflow, WorkflowStatus, SYSTEM_USER_ID};
use crate::domain::events::{
    ArgoPipelineStatusSyncEvent, CdPipelineDeleteEvent, CdStageCompleteEvent, CiArtifactWebhookRequest,
    CiCompleteEvent, CiPipelineMaterial, DeployPayload, DeploymentGroupAppWithEnv, GitCiTriggerRequest,
    InstallAppVersionDto, StopAppRequest, WorkflowStatusReport, SOURCE_TYPE_BRANCH_FIXED, SOURCE_TYPE_WEBHOOK,
};
use crate::domain::pipeline::{runner_status, WorkflowRunnerType, DATA_SOURCE_WEBHOOK};
use crate::domain::ports::{StageNotification, TriggerContext};
use crate::domain::repository::{
    CdWorkflowRepository, CdWorkflowRunnerRepository, CiArtifactRepository, InstalledAppRepository,
    PipelineRepository,
};
use crate::infrastructure::pubsub::{
    decoding_logger, topics, BusError, HandlerError, HandlerFuture, LogLine, MessageHandler, MessageValidator,
    PubSubClient, PubSubMsg,
};

pub struct WorkflowEventProcessor {
    bus: Arc<dyn PubSubClient>,
    collaborators: Collaborators,
    cd_workflows: Arc<dyn CdWorkflowRepository>,
    runners: Arc<dyn CdWorkflowRunnerRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    installed_apps: Arc<dyn InstalledAppRepository>,
    artifacts: Arc<dyn CiArtifactRepository>,
}

impl WorkflowEventProcessor {
    pub fn new(bus: Arc<dyn PubSubClient>, repositories: &Repositories, collaborators: Collaborators) -> Self {
        Self {
            bus,
            collaborators,
            cd_workflows: repositories.cd_workflows.clone(),
            runners: repositories.cd_workflow_runners.clone(),
            pipelines: repositories.pipelines.clone(),
            installed_apps: repositories.installed_apps.clone(),
            artifacts: repositories.ci_artifacts.clone(),
        }
    }

    fn handler<F>(self: &Arc<Self>, f: F) -> MessageHandler
    where
        F: Fn(Arc<Self>, PubSubMsg) -> HandlerFuture + Send + Sync + 'static,
    {
        let this = Arc::clone(self);
        Arc::new(move |msg| f(Arc::clone(&this), msg))
    }

    // ------------------------------------------------------------------
    // CD-STAGE-COMPLETE
    // ------------------------------------------------------------------

    pub async fn handle_cd_stage_complete(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let event: CdStageCompleteEvent = serde_json::from_slice(&msg.data)?;
        let runner = self.runners.find_by_id(event.workflow_runner_id).await?.ok_or_else(|| {
            HandlerError::Permanent(format!("cd workflow runner {} not found", event.workflow_runner_id))
        })?;

        if runner.status != runner_status::SUCCEEDED {
            debug!(runner_id = runner.id, status = %runner.status, "Marking stage runner succeeded");
            self.runners
                .update_status(runner.id, runner_status::SUCCEEDED, SYSTEM_USER_ID)
                .await?;
        }

        let ctx = TriggerContext::from_message(&msg.msg_id);
        match runner.workflow_type {
            WorkflowRunnerType::Pre => {
                self.collaborators
                    .cd_trigger
                    .handle_pre_stage_success_event(&ctx, &event)
                    .await?;
            }
            WorkflowRunnerType::Post => {
                self.collaborators
                    .cd_trigger
                    .handle_post_stage_success_event(
                        &ctx,
                        runner.cd_workflow_id,
                        event.cd_pipeline_id,
                        event.triggered_by,
                        &event.plugin_registry_artifact_details,
                    )
                    .await?;
            }
            WorkflowRunnerType::Deploy => {
                debug!(runner_id = runner.id, "Stage completion for a deploy runner, nothing to chain");
            }
        }
        Ok(())
    }

    pub async fn subscribe_cd_stage_complete_event(self: &Arc<Self>) -> Result<(), BusError> {
        let handler = self.handler(|this, msg| Box::pin(async move { this.handle_cd_stage_complete(&msg).await }));
        let logger = decoding_logger(|event: CdStageCompleteEvent| {
            LogLine::new("got message for cd stage completion")
                .field("workflowRunnerId", event.workflow_runner_id)
                .field("workflowId", event.workflow_id)
                .field("cdPipelineId", event.cd_pipeline_id)
        });
        let validators = vec![duplicate_trigger_validator(self.runners.clone())];
        self.bus
            .subscribe(topics::CD_STAGE_COMPLETE, handler, logger, validators)
            .await
    }

    // ------------------------------------------------------------------
    // BULK-DEPLOY
    // ------------------------------------------------------------------

    pub async fn handle_bulk_deploy(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let mut row: CdWorkflow = serde_json::from_slice(&msg.data)?;
        let status = self.dequeue_bulk_row(&row, &msg.msg_id).await;
        row.transition(status, SYSTEM_USER_ID);
        self.cd_workflows.update(&row).await?;
        info!(
            cd_workflow_id = row.id,
            pipeline_id = row.pipeline_id,
            status = %status,
            "Bulk deploy row processed"
        );
        Ok(())
    }

    /// Decides the terminal status of a dequeued bulk row, dispatching the
    /// deploy stage when the row is still the latest request of its pipeline.
    async fn dequeue_bulk_row(&self, row: &CdWorkflow, msg_id: &str) -> WorkflowStatus {
        match self.cd_workflows.exists_newer_in_flight(row.pipeline_id, row.id).await {
            Err(err) => {
                error!(cd_workflow_id = row.id, error = %err, "Failed to check whether bulk row is latest");
                return WorkflowStatus::DequeError;
            }
            Ok(true) => {
                info!(
                    cd_workflow_id = row.id,
                    pipeline_id = row.pipeline_id,
                    "Newer request exists for pipeline, dropping stale row"
                );
                return WorkflowStatus::DroppedStale;
            }
            Ok(false) => {}
        }

        let pipeline = match self.pipelines.find_by_id(row.pipeline_id).await {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                error!(pipeline_id = row.pipeline_id, "Pipeline of bulk row not found");
                return WorkflowStatus::TriggerError;
            }
            Err(err) => {
                error!(pipeline_id = row.pipeline_id, error = %err, "Failed to load pipeline of bulk row");
                return WorkflowStatus::TriggerError;
            }
        };

        let mut artifact = match self.artifacts.find_by_id(row.ci_artifact_id).await {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                error!(ci_artifact_id = row.ci_artifact_id, "Artifact of bulk row not found");
                return WorkflowStatus::TriggerError;
            }
            Err(err) => {
                error!(ci_artifact_id = row.ci_artifact_id, error = %err, "Failed to load artifact of bulk row");
                return WorkflowStatus::TriggerError;
            }
        };

        if artifact.is_migration_required() {
            match self.artifacts.update_data_source(artifact.id, DATA_SOURCE_WEBHOOK).await {
                Ok(()) => artifact.data_source = DATA_SOURCE_WEBHOOK.to_string(),
                Err(err) => warn!(ci_artifact_id = artifact.id, error = %err, "Failed to migrate artifact data source"),
            }
        }

        let ctx = TriggerContext::from_message(msg_id);
        match self
            .collaborators
            .cd_trigger
            .trigger_stage_for_bulk(&ctx, &pipeline, &artifact, row.id, row.created_by)
            .await
        {
            Ok(()) => WorkflowStatus::WfStarted,
            Err(err) => {
                error!(cd_workflow_id = row.id, pipeline_id = pipeline.id, error = %err, "Bulk deploy trigger failed");
                WorkflowStatus::TriggerError
            }
        }
    }

    pub async fn subscribe_trigger_bulk_action(self: &Arc<Self>) -> Result<(), BusError> {
        let handler = self.handler(|this, msg| Box::pin(async move { this.handle_bulk_deploy(&msg).await }));
        let logger = decoding_logger(|row: CdWorkflow| {
            LogLine::new("got message for bulk deploy")
                .field("cdWorkflowId", row.id)
                .field("pipelineId", row.pipeline_id)
                .field("ciArtifactId", row.ci_artifact_id)
        });
        self.bus
            .subscribe(topics::BULK_DEPLOY, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // BULK-HIBERNATE
    // ------------------------------------------------------------------

    pub async fn handle_bulk_hibernate(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let payload: DeploymentGroupAppWithEnv = serde_json::from_slice(&msg.data)?;
        let request = StopAppRequest {
            app_id: payload.app_id,
            environment_id: payload.environment_id,
            user_id: payload.user_id,
            request_type: payload.request_type,
            reference_id: Some(msg.msg_id.clone()),
        };

        let ctx = match self.collaborators.app_lifecycle.build_acd_context().await {
            Ok(ctx) => ctx,
            Err(err) => {
                error!(app_id = request.app_id, error = %err, "Failed to obtain Argo CD context for hibernation");
                return Ok(());
            }
        };
        self.collaborators.app_lifecycle.stop_start_app(&ctx, &request).await?;
        Ok(())
    }

    pub async fn subscribe_hibernate_bulk_action(self: &Arc<Self>) -> Result<(), BusError> {
        let handler = self.handler(|this, msg| Box::pin(async move { this.handle_bulk_hibernate(&msg).await }));
        let logger = decoding_logger(|payload: DeploymentGroupAppWithEnv| {
            LogLine::new("got message for bulk hibernate")
                .field("appId", payload.app_id)
                .field("environmentId", payload.environment_id)
                .field("deploymentGroupId", payload.deployment_group_id)
        });
        self.bus
            .subscribe(topics::BULK_HIBERNATE, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // CI-WORKFLOW-STATUS-UPDATE
    // ------------------------------------------------------------------

    pub async fn handle_ci_workflow_status_update(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let report: WorkflowStatusReport = serde_json::from_slice(&msg.data)?;
        if let Err(err) = self.collaborators.ci_handler.check_and_retrigger_ci(&report).await {
            error!(workflow = report.workflow_name(), error = %err, "Error in checking and re-triggering CI");
        }
        let ci_workflow_id = self.collaborators.ci_handler.update_ci_workflow(&report).await?;
        debug!(ci_workflow_id, phase = %report.phase, "CI workflow status updated");
        Ok(())
    }

    pub async fn subscribe_ci_workflow_status_update(self: &Arc<Self>) -> Result<(), BusError> {
        let handler =
            self.handler(|this, msg| Box::pin(async move { this.handle_ci_workflow_status_update(&msg).await }));
        let logger = decoding_logger(|report: WorkflowStatusReport| {
            LogLine::new("got message for ci workflow status update")
                .field("workflowName", report.workflow_name())
                .field("status", &report.phase)
                .field("message", &report.message)
        });
        self.bus
            .subscribe(topics::CI_WORKFLOW_STATUS_UPDATE, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // CD-WORKFLOW-STATUS-UPDATE
    // ------------------------------------------------------------------

    pub async fn handle_cd_workflow_status_update(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let report: WorkflowStatusReport = serde_json::from_slice(&msg.data)?;
        let status_service = &self.collaborators.cd_workflow_status;

        let (runner_id, status) = status_service.update_cd_workflow(&report).await?;
        let runner = self
            .runners
            .find_by_id(runner_id)
            .await?
            .ok_or_else(|| HandlerError::Permanent(format!("cd workflow runner {} not found", runner_id)))?;

        if runner_status::is_failure(&status) && !runner.image_path_reservation_ids.is_empty() {
            if let Err(err) = status_service
                .deactivate_image_reservation_paths(&runner.image_path_reservation_ids)
                .await
            {
                error!(runner_id, error = %err, "Failed to release image path reservations");
            }
        }

        if !runner_status::is_terminal(&status) {
            return Ok(());
        }

        match status_service.check_if_retrigger_required(&runner).await {
            Ok(true) => {
                if let Err(err) = status_service.handle_cd_stage_retrigger(&runner).await {
                    error!(runner_id, error = %err, "Failed to re-trigger CD stage");
                }
            }
            Ok(false) => {}
            Err(err) => error!(runner_id, error = %err, "Failed to evaluate CD stage re-trigger"),
        }

        if runner.workflow_type.is_stage() {
            let outcome = if status == runner_status::SUCCEEDED {
                StageNotification::Success
            } else {
                StageNotification::Fail
            };
            if let Err(err) = self
                .collaborators
                .notifications
                .write_stage_notification(&runner, outcome)
                .await
            {
                error!(runner_id, error = %err, "Failed to write stage notification");
            }
        }
        Ok(())
    }

    pub async fn subscribe_cd_workflow_status_update(self: &Arc<Self>) -> Result<(), BusError> {
        let handler =
            self.handler(|this, msg| Box::pin(async move { this.handle_cd_workflow_status_update(&msg).await }));
        let logger = decoding_logger(|report: WorkflowStatusReport| {
            LogLine::new("got message for cd workflow status")
                .field("workflowName", report.workflow_name())
                .field("status", &report.phase)
                .field("message", &report.message)
        });
        self.bus
            .subscribe(topics::CD_WORKFLOW_STATUS_UPDATE, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // CI-COMPLETE
    // ------------------------------------------------------------------

    pub async fn handle_ci_complete(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let event: CiCompleteEvent = serde_json::from_slice(&msg.data)?;
        let mut request = build_ci_artifact_request(&event);
        let ci_handler = &self.collaborators.ci_handler;

        if !event.failure_reason.is_empty() {
            request.failure_reason = event.failure_reason.clone();
            ci_handler
                .handle_ci_step_failed_event(event.pipeline_id, &request)
                .await?;
            return Ok(());
        }

        let ctx = TriggerContext::from_message(&msg.msg_id);
        let artifact_id = ci_handler
            .handle_ci_success_event(&ctx, event.pipeline_id, &request)
            .await?;
        debug!(artifact_id, ci_pipeline_id = event.pipeline_id, "CI artifact registered");
        Ok(())
    }

    pub async fn subscribe_ci_complete_event(self: &Arc<Self>) -> Result<(), BusError> {
        let handler = self.handler(|this, msg| Box::pin(async move { this.handle_ci_complete(&msg).await }));
        let logger = decoding_logger(|event: CiCompleteEvent| {
            LogLine::new("got message for ci-completion")
                .field("ciPipelineId", event.pipeline_id)
                .field(
                    "workflowId",
                    event.workflow_id.map(|id| id.to_string()).unwrap_or_default(),
                )
        });
        self.bus
            .subscribe(topics::CI_COMPLETE, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // ARGO-PIPELINE-STATUS-UPDATE
    // ------------------------------------------------------------------

    pub async fn handle_argo_pipeline_status_update(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let event: ArgoPipelineStatusSyncEvent = serde_json::from_slice(&msg.data)?;
        let status = &self.collaborators.deployment_status;

        if !event.is_app_store_application {
            let pipeline = self
                .pipelines
                .find_by_id(event.pipeline_id)
                .await?
                .ok_or_else(|| HandlerError::Permanent(format!("pipeline {} not found", event.pipeline_id)))?;
            status.sync_pipeline_status(&pipeline, event.user_id).await?;
        } else {
            let installed_app = self
                .installed_apps
                .find_by_version_id(event.installed_app_version_id)
                .await?
                .ok_or_else(|| {
                    HandlerError::Permanent(format!(
                        "installed app version {} not found",
                        event.installed_app_version_id
                    ))
                })?;
            status
                .sync_installed_app_status(&installed_app, event.installed_app_version_id, event.user_id)
                .await?;
        }
        Ok(())
    }

    pub async fn subscribe_argo_pipeline_status_update(self: &Arc<Self>) -> Result<(), BusError> {
        let handler =
            self.handler(|this, msg| Box::pin(async move { this.handle_argo_pipeline_status_update(&msg).await }));
        let logger = decoding_logger(|event: ArgoPipelineStatusSyncEvent| {
            LogLine::new("got message for argo pipeline status update")
                .field("pipelineId", event.pipeline_id)
                .field("installedAppVersionId", event.installed_app_version_id)
                .field("isAppStoreApplication", event.is_app_store_application)
        });
        self.bus
            .subscribe(topics::ARGO_PIPELINE_STATUS_UPDATE, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // NEW-CI-MATERIAL
    // ------------------------------------------------------------------

    pub async fn handle_new_ci_material(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let material: CiPipelineMaterial = serde_json::from_slice(&msg.data)?;
        let request = GitCiTriggerRequest {
            ci_pipeline_material: material,
            triggered_by: SYSTEM_USER_ID,
        };
        self.collaborators
            .ci_handler
            .handle_ci_webhook_trigger(&request)
            .await?;
        Ok(())
    }

    pub async fn subscribe_new_ci_material(self: &Arc<Self>) -> Result<(), BusError> {
        let handler = self.handler(|this, msg| Box::pin(async move { this.handle_new_ci_material(&msg).await }));
        let logger = decoding_logger(|material: CiPipelineMaterial| {
            LogLine::new("got message for new ci material")
                .field("ciPipelineMaterialId", material.id)
                .field("gitMaterialId", material.git_material_id)
                .field("commit", material.git_commit.commit)
        });
        self.bus
            .subscribe(topics::NEW_CI_MATERIAL, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // CRON_EVENTS
    // ------------------------------------------------------------------

    pub async fn handle_cron_event(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let event: Value = serde_json::from_slice(&msg.data)?;
        self.collaborators.events.handle_event(&event).await?;
        Ok(())
    }

    pub async fn subscribe_cron_events(self: &Arc<Self>) -> Result<(), BusError> {
        let handler = self.handler(|this, msg| Box::pin(async move { this.handle_cron_event(&msg).await }));
        let logger = decoding_logger(|event: Value| LogLine::new("got message for cron event").field("event", event));
        self.bus
            .subscribe(topics::CRON_EVENTS, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // CHART-SCAN
    // ------------------------------------------------------------------

    pub async fn handle_chart_scan(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let dto: InstallAppVersionDto = serde_json::from_slice(&msg.data)?;
        let scanner = &self.collaborators.chart_scan;
        let images = scanner.extract_images(&dto).await?;

        for image in &images {
            let history_id = match scanner.create_scan_history(&dto, image).await {
                Ok(id) => id,
                Err(err) => {
                    error!(image = %image, error = %err, "Failed to create scan history");
                    continue;
                }
            };
            if let Err(err) = scanner.enqueue_scan(history_id, image).await {
                error!(image = %image, scan_history_id = history_id, error = %err, "Failed to enqueue image scan");
            }
        }
        info!(
            installed_app_version_id = dto.installed_app_version_id,
            images = images.len(),
            "Chart images queued for scanning"
        );
        Ok(())
    }

    pub async fn subscribe_chart_scan(self: &Arc<Self>) -> Result<(), BusError> {
        let handler = self.handler(|this, msg| Box::pin(async move { this.handle_chart_scan(&msg).await }));
        let logger = decoding_logger(|dto: InstallAppVersionDto| {
            LogLine::new("got message for chart scan")
                .field("installedAppId", dto.installed_app_id)
                .field("installedAppVersionId", dto.installed_app_version_id)
        });
        self.bus
            .subscribe(topics::CHART_SCAN, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // APPSTORE-BULK-DEPLOY
    // ------------------------------------------------------------------

    pub async fn handle_app_store_bulk_deploy(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let payload: DeployPayload = serde_json::from_slice(&msg.data)?;
        self.collaborators
            .installed_apps
            .perform_deploy_stage(
                payload.installed_app_version_id,
                payload.installed_app_version_history_id,
                SYSTEM_USER_ID,
            )
            .await?;
        Ok(())
    }

    pub async fn subscribe_app_store_bulk_deploy(self: &Arc<Self>) -> Result<(), BusError> {
        let handler =
            self.handler(|this, msg| Box::pin(async move { this.handle_app_store_bulk_deploy(&msg).await }));
        let logger = decoding_logger(|payload: DeployPayload| {
            LogLine::new("got message for app store bulk deploy")
                .field("installedAppVersionId", payload.installed_app_version_id)
                .field("installedAppVersionHistoryId", payload.installed_app_version_history_id)
        });
        self.bus
            .subscribe(topics::APPSTORE_BULK_DEPLOY, handler, logger, Vec::new())
            .await
    }

    // ------------------------------------------------------------------
    // CD-PIPELINE-DELETE-EVENT
    // ------------------------------------------------------------------

    pub async fn handle_cd_pipeline_delete(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let event: CdPipelineDeleteEvent = serde_json::from_slice(&msg.data)?;
        let pipeline = self
            .pipelines
            .find_by_id_including_inactive(event.pipeline_id)
            .await?
            .ok_or_else(|| HandlerError::Permanent(format!("pipeline {} not found", event.pipeline_id)))?;

        if !pipeline.is_helm_or_argo() {
            return Ok(());
        }

        let deletion = &self.collaborators.pipeline_deletion;
        if let Err(err) = deletion.remove_release_context(&pipeline).await {
            error!(pipeline_id = pipeline.id, error = %err, "Failed to remove release context");
        }
        // the async delete may not have finished before the pipeline row went away
        if let Err(err) = deletion.delete_deployment_app(&pipeline, event.triggered_by).await {
            error!(pipeline_id = pipeline.id, error = %err, "Failed to delete deployment app");
        }
        Ok(())
    }

    pub async fn subscribe_cd_pipeline_delete_event(self: &Arc<Self>) -> Result<(), BusError> {
        let handler = self.handler(|this, msg| Box::pin(async move { this.handle_cd_pipeline_delete(&msg).await }));
        let logger = decoding_logger(|event: CdPipelineDeleteEvent| {
            LogLine::new("got message for cd pipeline deletion")
                .field("pipelineId", event.pipeline_id)
                .field("triggeredBy", event.triggered_by)
        });
        self.bus
            .subscribe(topics::CD_PIPELINE_DELETE_EVENT, handler, logger, Vec::new())
            .await
    }
}

/// Rejects redeliveries whose trigger already produced a runner.
pub(crate) fn duplicate_trigger_validator(runners: Arc<dyn CdWorkflowRunnerRepository>) -> MessageValidator {
    Arc::new(move |msg: &PubSubMsg| {
        let runners = runners.clone();
        let delivery = msg.delivery;
        let msg_id = msg.msg_id.clone();
        Box::pin(async move {
            if delivery <= 1 || msg_id.is_empty() {
                return true;
            }
            match runners.exists_by_reference_id(&msg_id).await {
                Ok(false) => true,
                Ok(true) => {
                    warn!(msg_id = %msg_id, delivery, "Trigger already processed, skipping redelivery");
                    false
                }
                Err(err) => {
                    warn!(msg_id = %msg_id, error = %err, "Could not check for duplicate trigger, skipping redelivery");
                    false
                }
            }
        })
    })
}

/// Artifact registration request for a CI completion. `material_info`
/// carries one entry per CI project in the git-material shape the artifact
/// service stores.
pub fn build_ci_artifact_request(event: &CiCompleteEvent) -> CiArtifactWebhookRequest {
    let material_info: Vec<Value> = event
        .ci_project_details
        .iter()
        .map(|project| {
            let branch = if project.source_type == SOURCE_TYPE_BRANCH_FIXED {
                project.source_value.as_str()
            } else {
                ""
            };
            let mut modification = Map::new();
            modification.insert("revision".into(), json!(project.commit_hash));
            modification.insert(
                "modified-time".into(),
                json!(project
                    .commit_time
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default()),
            );
            modification.insert("data".into(), json!({}));
            modification.insert("author".into(), json!(project.author));
            modification.insert("message".into(), json!(project.message));
            modification.insert("branch".into(), json!(branch));
            if project.source_type == SOURCE_TYPE_WEBHOOK {
                if let Some(webhook) = &project.webhook_data {
                    modification.insert(
                        "webhookData".into(),
                        json!({
                            "Id": webhook.id,
                            "EventActionType": webhook.event_action_type,
                            "Data": webhook.data,
                        }),
                    );
                }
            }

            json!({
                "material": {
                    "git-configuration": { "url": project.git_repository },
                    "type": event.material_type,
                },
                "changed": true,
                "modifications": [Value::Object(modification)],
            })
        })
        .collect();

    let user_id = if event.triggered_by == 0 {
        SYSTEM_USER_ID
    } else {
        event.triggered_by
    };
    let data_source = if event.data_source.is_empty() {
        DATA_SOURCE_WEBHOOK.to_string()
    } else {
        event.data_source.clone()
    };

    CiArtifactWebhookRequest {
        image: event.docker_image.clone(),
        image_digest: event.digest.clone(),
        material_info: Value::Array(material_info),
        data_source,
        pipeline_name: event.pipeline_name.clone(),
        workflow_id: event.workflow_id,
        user_id,
        is_artifact_uploaded: event.is_artifact_uploaded,
        failure_reason: String::new(),
        plugin_registry_artifact_details: event.plugin_registry_artifact_details.clone(),
        plugin_artifact_stage: event.plugin_artifact_stage.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{CiProjectDetail, WebhookData};
    use crate::domain::pipeline::CdWorkflowRunner;
    use crate::infrastructure::repositories::InMemoryCdWorkflowRunnerRepository;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn project(source_type: &str) -> CiProjectDetail {
        CiProjectDetail {
            git_repository: "https://github.com/org/repo.git".into(),
            material_name: "repo".into(),
            source_type: source_type.into(),
            source_value: "main".into(),
            commit_hash: "abc123".into(),
            message: "fix build".into(),
            author: "dev <dev@example.com>".into(),
            commit_time: Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()),
            webhook_data: Some(WebhookData {
                id: 7,
                event_action_type: "merged".into(),
                data: HashMap::from([("target".to_string(), "main".to_string())]),
            }),
        }
    }

    #[test]
    fn test_material_info_for_fixed_branch() {
        let event = CiCompleteEvent {
            ci_project_details: vec![project(SOURCE_TYPE_BRANCH_FIXED)],
            material_type: "git".into(),
            docker_image: "registry/app:abc123".into(),
            pipeline_id: 4,
            ..Default::default()
        };
        let request = build_ci_artifact_request(&event);

        let info = &request.material_info[0];
        assert_eq!(info["material"]["git-configuration"]["url"], "https://github.com/org/repo.git");
        assert_eq!(info["material"]["type"], "git");
        assert_eq!(info["changed"], true);
        let modification = &info["modifications"][0];
        assert_eq!(modification["revision"], "abc123");
        assert_eq!(modification["branch"], "main");
        assert_eq!(modification["modified-time"], "2026-03-01T10:00:00Z");
        assert!(modification.get("webhookData").is_none());
        assert!(modification.get("tag").is_none());
    }

    #[test]
    fn test_material_info_for_webhook_source() {
        let event = CiCompleteEvent {
            ci_project_details: vec![project(SOURCE_TYPE_WEBHOOK)],
            ..Default::default()
        };
        let request = build_ci_artifact_request(&event);
        let modification = &request.material_info[0]["modifications"][0];
        assert_eq!(modification["branch"], "");
        assert_eq!(modification["webhookData"]["Id"], 7);
        assert_eq!(modification["webhookData"]["EventActionType"], "merged");
        assert_eq!(modification["webhookData"]["Data"]["target"], "main");
    }

    #[test]
    fn test_defaults_for_user_and_data_source() {
        let request = build_ci_artifact_request(&CiCompleteEvent::default());
        assert_eq!(request.user_id, SYSTEM_USER_ID);
        assert_eq!(request.data_source, DATA_SOURCE_WEBHOOK);
        assert_eq!(request.material_info, Value::Array(vec![]));

        let request = build_ci_artifact_request(&CiCompleteEvent {
            triggered_by: 12,
            data_source: "CI-RUNNER".into(),
            ..Default::default()
        });
        assert_eq!(request.user_id, 12);
        assert_eq!(request.data_source, "CI-RUNNER");
    }

    fn msg(msg_id: &str, delivery: u32) -> PubSubMsg {
        PubSubMsg {
            data: b"{}".to_vec(),
            msg_id: msg_id.into(),
            delivery,
        }
    }

    #[tokio::test]
    async fn test_duplicate_trigger_validator() {
        let runners = Arc::new(InMemoryCdWorkflowRunnerRepository::new());
        runners.insert(CdWorkflowRunner {
            id: 1,
            cd_workflow_id: 1,
            pipeline_id: 1,
            app_id: 1,
            environment_id: 1,
            workflow_type: WorkflowRunnerType::Deploy,
            status: runner_status::RUNNING.into(),
            image_path_reservation_ids: vec![],
            reference_id: Some("msg-1".into()),
        });
        let validator = duplicate_trigger_validator(runners);

        // first delivery is never checked
        assert!(validator(&msg("msg-1", 1)).await);
        assert!(!validator(&msg("msg-1", 2)).await);
        assert!(validator(&msg("msg-2", 2)).await);
    }
}
