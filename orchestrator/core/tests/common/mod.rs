// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the integration tests: a recording stand-in for the
//! delivery platform and seeded in-memory repositories.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use fabric_core::application::{Collaborators, Repositories};
use fabric_core::domain::argo::Application;
use fabric_core::domain::events::{
    CdStageCompleteEvent, CiArtifactWebhookRequest, GitCiTriggerRequest, InstallAppVersionDto,
    PluginRegistryArtifactDetails, StopAppRequest, WorkflowStatusReport,
};
use fabric_core::domain::pipeline::{
    CdWorkflowRunner, CiArtifact, InstalledApp, Pipeline, WorkflowRunnerType, DEPLOYMENT_APP_TYPE_ARGO_CD,
};
use fabric_core::domain::ports::{
    AcdContext, AppLifecycleService, CdTriggerService, CdWorkflowStatusService, ChartScanService, CiEventHandler,
    CollaboratorError, DeploymentStatusOutcome, DeploymentStatusService, EventService, InstalledAppDeleteRequest,
    InstalledAppService, NotificationClient, OidcConfigListener, PipelineDeletionService, PipelineOverride,
    StageNotification, TriggerContext,
};
use fabric_core::infrastructure::repositories::{
    InMemoryCdWorkflowRepository, InMemoryCdWorkflowRunnerRepository, InMemoryCiArtifactRepository,
    InMemoryInstalledAppRepository, InMemoryPipelineRepository,
};

type ErrorFactory = fn(String) -> CollaboratorError;

/// Records every collaborator call as `"<method>:<detail>"`. Individual
/// methods can be told to fail.
#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, ErrorFactory>>,
    pub deployment_outcome: Mutex<DeploymentStatusOutcome>,
    pub cd_workflow_update: Mutex<(i64, String)>,
    pub retrigger_required: Mutex<bool>,
    pub chart_images: Mutex<Vec<String>>,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, method: &'static str, error: ErrorFactory) {
        self.failures.lock().insert(method, error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<String> {
        let prefix = format!("{}:", method);
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn called(&self, method: &str) -> bool {
        !self.calls_to(method).is_empty()
    }

    fn record(&self, method: &'static str, detail: impl Into<String>) -> Result<(), CollaboratorError> {
        self.calls.lock().push(format!("{}:{}", method, detail.into()));
        match self.failures.lock().get(method) {
            Some(error) => Err(error(format!("{} failed", method))),
            None => Ok(()),
        }
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            cd_trigger: self.clone(),
            cd_workflow_status: self.clone(),
            ci_handler: self.clone(),
            deployment_status: self.clone(),
            installed_apps: self.clone(),
            app_lifecycle: self.clone(),
            pipeline_deletion: self.clone(),
            events: self.clone(),
            chart_scan: self.clone(),
            notifications: self.clone(),
            oidc_listener: self.clone(),
        }
    }
}

fn reference(ctx: &TriggerContext) -> String {
    ctx.reference_id.clone().unwrap_or_default()
}

#[async_trait]
impl CdTriggerService for RecordingPlatform {
    async fn handle_pre_stage_success_event(
        &self,
        ctx: &TriggerContext,
        event: &CdStageCompleteEvent,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "handle_pre_stage_success_event",
            format!("runner={} ref={}", event.workflow_runner_id, reference(ctx)),
        )
    }

    async fn handle_post_stage_success_event(
        &self,
        ctx: &TriggerContext,
        cd_workflow_id: i64,
        pipeline_id: i64,
        triggered_by: i32,
        _plugin_artifacts: &PluginRegistryArtifactDetails,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "handle_post_stage_success_event",
            format!(
                "wf={} pipeline={} by={} ref={}",
                cd_workflow_id,
                pipeline_id,
                triggered_by,
                reference(ctx)
            ),
        )
    }

    async fn trigger_stage_for_bulk(
        &self,
        ctx: &TriggerContext,
        pipeline: &Pipeline,
        artifact: &CiArtifact,
        cd_workflow_id: i64,
        triggered_by: i32,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "trigger_stage_for_bulk",
            format!(
                "pipeline={} artifact={} source={} wf={} by={} ref={}",
                pipeline.id,
                artifact.id,
                artifact.data_source,
                cd_workflow_id,
                triggered_by,
                reference(ctx)
            ),
        )
    }

    async fn handle_deployment_success_event(
        &self,
        ctx: &TriggerContext,
        pipeline_override: &PipelineOverride,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "handle_deployment_success_event",
            format!("override={} ref={}", pipeline_override.id, reference(ctx)),
        )
    }
}

#[async_trait]
impl CdWorkflowStatusService for RecordingPlatform {
    async fn update_cd_workflow(&self, report: &WorkflowStatusReport) -> Result<(i64, String), CollaboratorError> {
        self.record("update_cd_workflow", report.phase.clone())?;
        Ok(self.cd_workflow_update.lock().clone())
    }

    async fn deactivate_image_reservation_paths(&self, reservation_ids: &[i64]) -> Result<(), CollaboratorError> {
        self.record("deactivate_image_reservation_paths", format!("{:?}", reservation_ids))
    }

    async fn check_if_retrigger_required(&self, runner: &CdWorkflowRunner) -> Result<bool, CollaboratorError> {
        self.record("check_if_retrigger_required", runner.id.to_string())?;
        Ok(*self.retrigger_required.lock())
    }

    async fn handle_cd_stage_retrigger(&self, runner: &CdWorkflowRunner) -> Result<(), CollaboratorError> {
        self.record("handle_cd_stage_retrigger", runner.id.to_string())
    }
}

#[async_trait]
impl CiEventHandler for RecordingPlatform {
    async fn check_and_retrigger_ci(&self, report: &WorkflowStatusReport) -> Result<(), CollaboratorError> {
        self.record("check_and_retrigger_ci", report.phase.clone())
    }

    async fn update_ci_workflow(&self, report: &WorkflowStatusReport) -> Result<i64, CollaboratorError> {
        self.record("update_ci_workflow", report.phase.clone())?;
        Ok(11)
    }

    async fn handle_ci_success_event(
        &self,
        ctx: &TriggerContext,
        pipeline_id: i64,
        request: &CiArtifactWebhookRequest,
    ) -> Result<i64, CollaboratorError> {
        self.record(
            "handle_ci_success_event",
            format!(
                "pipeline={} image={} source={} user={} ref={}",
                pipeline_id,
                request.image,
                request.data_source,
                request.user_id,
                reference(ctx)
            ),
        )?;
        Ok(99)
    }

    async fn handle_ci_step_failed_event(
        &self,
        pipeline_id: i64,
        request: &CiArtifactWebhookRequest,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "handle_ci_step_failed_event",
            format!("pipeline={} reason={}", pipeline_id, request.failure_reason),
        )
    }

    async fn handle_ci_webhook_trigger(&self, request: &GitCiTriggerRequest) -> Result<(), CollaboratorError> {
        self.record(
            "handle_ci_webhook_trigger",
            format!(
                "material={} by={}",
                request.ci_pipeline_material.id, request.triggered_by
            ),
        )
    }
}

#[async_trait]
impl DeploymentStatusService for RecordingPlatform {
    async fn update_deployment_status_and_check_is_succeeded(
        &self,
        app: &Application,
        _status_time: DateTime<Utc>,
        is_app_store: bool,
    ) -> Result<DeploymentStatusOutcome, CollaboratorError> {
        self.record(
            "update_deployment_status_and_check_is_succeeded",
            format!("app={} app_store={}", app.name(), is_app_store),
        )?;
        Ok(self.deployment_outcome.lock().clone())
    }

    async fn sync_pipeline_status(&self, pipeline: &Pipeline, user_id: i32) -> Result<(), CollaboratorError> {
        self.record("sync_pipeline_status", format!("pipeline={} user={}", pipeline.id, user_id))
    }

    async fn sync_installed_app_status(
        &self,
        installed_app: &InstalledApp,
        installed_app_version_id: i64,
        user_id: i32,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "sync_installed_app_status",
            format!(
                "app={} version={} user={}",
                installed_app.id, installed_app_version_id, user_id
            ),
        )
    }
}

#[async_trait]
impl InstalledAppService for RecordingPlatform {
    async fn update_installed_app_version_status(&self, app: &Application) -> Result<(), CollaboratorError> {
        self.record("update_installed_app_version_status", app.name().to_string())
    }

    async fn delete_installed_app(&self, request: &InstalledAppDeleteRequest) -> Result<(), CollaboratorError> {
        self.record(
            "delete_installed_app",
            format!("app={} user={}", request.installed_app_id, request.user_id),
        )
    }

    async fn perform_deploy_stage(
        &self,
        installed_app_version_id: i64,
        installed_app_version_history_id: i64,
        user_id: i32,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "perform_deploy_stage",
            format!(
                "version={} history={} user={}",
                installed_app_version_id, installed_app_version_history_id, user_id
            ),
        )
    }

    async fn update_deploy_operation_status(
        &self,
        installed_app_version_id: i64,
        status: &str,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "update_deploy_operation_status",
            format!("version={} status={}", installed_app_version_id, status),
        )
    }
}

#[async_trait]
impl AppLifecycleService for RecordingPlatform {
    async fn build_acd_context(&self) -> Result<AcdContext, CollaboratorError> {
        self.record("build_acd_context", "")?;
        Ok(AcdContext {
            token: "acd-token".into(),
        })
    }

    async fn stop_start_app(&self, ctx: &AcdContext, request: &StopAppRequest) -> Result<(), CollaboratorError> {
        self.record(
            "stop_start_app",
            format!(
                "app={} env={} token={} ref={}",
                request.app_id,
                request.environment_id,
                ctx.token,
                request.reference_id.clone().unwrap_or_default()
            ),
        )
    }
}

#[async_trait]
impl PipelineDeletionService for RecordingPlatform {
    async fn delete_cd_pipeline(
        &self,
        pipeline: &Pipeline,
        force_delete: bool,
        cascade: bool,
        user_id: i32,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "delete_cd_pipeline",
            format!(
                "pipeline={} force={} cascade={} user={}",
                pipeline.id, force_delete, cascade, user_id
            ),
        )
    }

    async fn remove_release_context(&self, pipeline: &Pipeline) -> Result<(), CollaboratorError> {
        self.record("remove_release_context", pipeline.id.to_string())
    }

    async fn delete_deployment_app(&self, pipeline: &Pipeline, user_id: i32) -> Result<(), CollaboratorError> {
        self.record("delete_deployment_app", format!("pipeline={} user={}", pipeline.id, user_id))
    }
}

#[async_trait]
impl EventService for RecordingPlatform {
    async fn handle_event(&self, event: &serde_json::Value) -> Result<(), CollaboratorError> {
        self.record("handle_event", event.to_string())
    }
}

#[async_trait]
impl ChartScanService for RecordingPlatform {
    async fn extract_images(&self, dto: &InstallAppVersionDto) -> Result<Vec<String>, CollaboratorError> {
        self.record("extract_images", dto.installed_app_version_id.to_string())?;
        Ok(self.chart_images.lock().clone())
    }

    async fn create_scan_history(&self, _dto: &InstallAppVersionDto, image: &str) -> Result<i64, CollaboratorError> {
        self.record("create_scan_history", image.to_string())?;
        Ok(image.len() as i64)
    }

    async fn enqueue_scan(&self, scan_history_id: i64, image: &str) -> Result<(), CollaboratorError> {
        self.record("enqueue_scan", format!("history={} image={}", scan_history_id, image))
    }
}

#[async_trait]
impl NotificationClient for RecordingPlatform {
    async fn write_stage_notification(
        &self,
        runner: &CdWorkflowRunner,
        outcome: StageNotification,
    ) -> Result<(), CollaboratorError> {
        self.record("write_stage_notification", format!("runner={} outcome={:?}", runner.id, outcome))
    }
}

#[async_trait]
impl OidcConfigListener for RecordingPlatform {
    async fn on_config_change(&self) -> Result<(), CollaboratorError> {
        self.record("on_config_change", "")
    }
}

/// In-memory repositories with typed handles for seeding.
pub struct Fixture {
    pub repositories: Repositories,
    pub cd_workflows: Arc<InMemoryCdWorkflowRepository>,
    pub runners: Arc<InMemoryCdWorkflowRunnerRepository>,
    pub pipelines: Arc<InMemoryPipelineRepository>,
    pub installed_apps: Arc<InMemoryInstalledAppRepository>,
    pub artifacts: Arc<InMemoryCiArtifactRepository>,
}

impl Fixture {
    pub fn new() -> Self {
        let cd_workflows = Arc::new(InMemoryCdWorkflowRepository::new());
        let runners = Arc::new(InMemoryCdWorkflowRunnerRepository::new());
        let pipelines = Arc::new(InMemoryPipelineRepository::new());
        let installed_apps = Arc::new(InMemoryInstalledAppRepository::new());
        let artifacts = Arc::new(InMemoryCiArtifactRepository::new());

        let mut repositories = Repositories::in_memory();
        repositories.cd_workflows = cd_workflows.clone();
        repositories.cd_workflow_runners = runners.clone();
        repositories.pipelines = pipelines.clone();
        repositories.installed_apps = installed_apps.clone();
        repositories.ci_artifacts = artifacts.clone();

        Self {
            repositories,
            cd_workflows,
            runners,
            pipelines,
            installed_apps,
            artifacts,
        }
    }
}

pub fn pipeline(id: i64, deployment_app_name: &str) -> Pipeline {
    Pipeline {
        id,
        app_id: 100 + id,
        environment_id: 1,
        name: format!("cd-{}", id),
        deployment_app_name: deployment_app_name.into(),
        deployment_app_type: DEPLOYMENT_APP_TYPE_ARGO_CD.into(),
        deleted: false,
        deployment_app_delete_request: false,
    }
}

pub fn installed_app(id: i64, git_ops_app_name: &str) -> InstalledApp {
    InstalledApp {
        id,
        app_id: 200 + id,
        environment_id: 2,
        app_name: "redis".into(),
        git_ops_app_name: git_ops_app_name.into(),
        deployment_app_type: DEPLOYMENT_APP_TYPE_ARGO_CD.into(),
        deployment_app_delete_request: false,
        active: true,
        installed_app_version_id: 300 + id,
    }
}

pub fn artifact(id: i64, data_source: &str) -> CiArtifact {
    CiArtifact {
        id,
        pipeline_id: 1,
        image: format!("registry/app:{}", id),
        image_digest: String::new(),
        data_source: data_source.into(),
    }
}

pub fn runner(id: i64, workflow_type: WorkflowRunnerType, status: &str) -> CdWorkflowRunner {
    CdWorkflowRunner {
        id,
        cd_workflow_id: 50,
        pipeline_id: 1,
        app_id: 101,
        environment_id: 1,
        workflow_type,
        status: status.into(),
        image_path_reservation_ids: vec![],
        reference_id: None,
    }
}
