// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Argo Status Reconciler
//!
//! Folds Argo CD application deltas into deployment state. An Argo
//! application is either a Devtron CD pipeline (matched by deployment app
//! name) or a chart installation (matched by its GitOps app name).
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Handle `APPLICATION-STATUS-UPDATE` and
//!   `APPLICATION-STATUS-DELETE`
//! - **Collaborators:**
//!   - Domain: `ApplicationDetail`, `Pipeline`, `InstalledApp`
//!   - Ports: `DeploymentStatusService`, `InstalledAppService`,
//!     `CdTriggerService`, `PipelineDeletionService`
//!
//! An installed app is only ever deleted after the user marked it for
//! deletion (`deployment_app_delete_request`).

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::collaborators::Collaborators;
use crate::application::repository_factory::Repositories;
use crate::application::workflow_event_processor::duplicate_trigger_validator;
use crate::domain::argo::{Application, ApplicationDetail};
use crate::domain::cd_workflow::SYSTEM_USER_ID;
use crate::domain::pipeline::{InstalledApp, Pipeline};
use crate::domain::ports::{CollaboratorError, InstalledAppDeleteRequest, TriggerContext};
use crate::domain::repository::{
    CdWorkflowRunnerRepository, InstalledAppRepository, PipelineRepository, RepositoryError,
};
use crate::infrastructure::pubsub::{
    decoding_logger, topics, BusError, HandlerError, LogLine, MessageHandler, PubSubClient, PubSubMsg,
};

/// What an Argo application name refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgoAppResolution {
    DevtronPipeline(Pipeline),
    InstalledApp(InstalledApp),
    None,
}

impl ArgoAppResolution {
    pub fn is_app_store(&self) -> bool {
        matches!(self, ArgoAppResolution::InstalledApp(_))
    }
}

pub struct ArgoStatusReconciler {
    bus: Arc<dyn PubSubClient>,
    collaborators: Collaborators,
    pipelines: Arc<dyn PipelineRepository>,
    installed_apps: Arc<dyn InstalledAppRepository>,
    runners: Arc<dyn CdWorkflowRunnerRepository>,
}

impl ArgoStatusReconciler {
    pub fn new(bus: Arc<dyn PubSubClient>, repositories: &Repositories, collaborators: Collaborators) -> Self {
        Self {
            bus,
            collaborators,
            pipelines: repositories.pipelines.clone(),
            installed_apps: repositories.installed_apps.clone(),
            runners: repositories.cd_workflow_runners.clone(),
        }
    }

    pub async fn resolve(&self, app_name: &str) -> Result<ArgoAppResolution, RepositoryError> {
        if let Some(pipeline) = self.pipelines.find_argo_pipeline_by_app_name(app_name).await? {
            return Ok(ArgoAppResolution::DevtronPipeline(pipeline));
        }
        debug!(app_name, "Argo app not found in pipelines, looking up installed apps");
        Ok(match self.installed_apps.find_by_git_ops_app_name(app_name).await? {
            Some(app) if app.id > 0 => ArgoAppResolution::InstalledApp(app),
            _ => ArgoAppResolution::None,
        })
    }

    pub async fn handle_status_update(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let detail: ApplicationDetail = serde_json::from_slice(&msg.data)?;
        let Some(app) = detail.application.as_ref() else {
            return Ok(());
        };
        let status_time = detail.effective_status_time();

        let resolution = self.resolve(app.name()).await?;
        if resolution == ArgoAppResolution::None {
            info!(app_name = app.name(), "Argo app is neither a pipeline nor an installed app, dropping");
            return Ok(());
        }

        let outcome = match self
            .collaborators
            .deployment_status
            .update_deployment_status_and_check_is_succeeded(app, status_time, resolution.is_app_store())
            .await
        {
            Ok(outcome) => outcome,
            Err(CollaboratorError::NotFound(reason)) => {
                debug!(app_name = app.name(), reason = %reason, "Not a chart deployment, updating installed app version");
                if let Err(err) = self
                    .collaborators
                    .installed_apps
                    .update_installed_app_version_status(app)
                    .await
                {
                    error!(app_name = app.name(), error = %err, "Installed app version status update failed");
                }
                return Ok(());
            }
            Err(err) => {
                error!(app_name = app.name(), error = %err, "Application status update failed");
                return Ok(());
            }
        };

        if outcome.is_succeeded {
            match outcome.pipeline_override {
                Some(pipeline_override) => {
                    let ctx = TriggerContext::from_message(&msg.msg_id);
                    self.collaborators
                        .cd_trigger
                        .handle_deployment_success_event(&ctx, &pipeline_override)
                        .await?;
                }
                None => warn!(app_name = app.name(), "Deployment succeeded without a pipeline override"),
            }
        }
        debug!(app_name = app.name(), "Application status update completed");
        Ok(())
    }

    pub async fn handle_status_delete(&self, msg: &PubSubMsg) -> Result<(), HandlerError> {
        let detail: ApplicationDetail = serde_json::from_slice(&msg.data)?;
        let Some(app) = detail.application.as_ref() else {
            return Ok(());
        };
        info!(
            app_name = app.name(),
            namespace = %app.metadata.namespace,
            "Argo delete event received"
        );

        match self.pipelines.find_argo_pipeline_by_app_name(app.name()).await? {
            Some(pipeline) => self.delete_devtron_app(app, &pipeline).await,
            None => self.delete_helm_app(app).await,
        }
    }

    async fn delete_devtron_app(&self, app: &Application, pipeline: &Pipeline) -> Result<(), HandlerError> {
        if pipeline.deleted {
            return Err(HandlerError::Permanent(format!(
                "invalid message, pipeline {} already deleted",
                pipeline.id
            )));
        }
        if !pipeline.deployment_app_delete_request {
            info!(app_name = app.name(), pipeline_id = pipeline.id, "Deployment delete not requested, keeping pipeline");
            return Ok(());
        }
        self.collaborators
            .pipeline_deletion
            .delete_cd_pipeline(pipeline, true, false, SYSTEM_USER_ID)
            .await?;
        info!(app_name = app.name(), pipeline_id = pipeline.id, "CD pipeline deleted after Argo app removal");
        Ok(())
    }

    /// Helm chart deployed through Argo CD, identified by the git hash of
    /// its last sync.
    async fn delete_helm_app(&self, app: &Application) -> Result<(), HandlerError> {
        let git_hash = app
            .git_hash()
            .ok_or_else(|| HandlerError::Permanent(format!("argo app {} has no sync revision", app.name())))?;
        let by_hash = self
            .installed_apps
            .find_by_git_hash(git_hash)
            .await?
            .ok_or_else(|| HandlerError::Permanent(format!("no installed app deployed git hash {}", git_hash)))?;
        let installed_app = self
            .installed_apps
            .find_by_id(by_hash.id)
            .await?
            .ok_or_else(|| HandlerError::Permanent(format!("installed app {} not found in database", by_hash.id)))?;

        if !installed_app.deployment_app_delete_request {
            info!(
                app_name = app.name(),
                installed_app_id = installed_app.id,
                "Deployment delete not requested, keeping installed app"
            );
            return Ok(());
        }

        let request = InstalledAppDeleteRequest::for_argo_removal(&installed_app, SYSTEM_USER_ID);
        self.collaborators
            .installed_apps
            .delete_installed_app(&request)
            .await?;
        info!(app_name = app.name(), installed_app_id = installed_app.id, "Installed app deleted after Argo app removal");
        Ok(())
    }

    fn handler(self: &Arc<Self>, delete: bool) -> MessageHandler {
        let this = Arc::clone(self);
        Arc::new(move |msg| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                if delete {
                    this.handle_status_delete(&msg).await
                } else {
                    this.handle_status_update(&msg).await
                }
            })
        })
    }

    pub async fn subscribe_argo_app_update(self: &Arc<Self>) -> Result<(), BusError> {
        let logger = decoding_logger(|detail: ApplicationDetail| {
            let name = detail.application.as_ref().map(|a| a.name().to_string()).unwrap_or_default();
            LogLine::new("got message for application status update").field("appName", name)
        });
        self.bus
            .subscribe(
                topics::APPLICATION_STATUS_UPDATE,
                self.handler(false),
                logger,
                vec![duplicate_trigger_validator(self.runners.clone())],
            )
            .await
    }

    pub async fn subscribe_argo_app_delete_status(self: &Arc<Self>) -> Result<(), BusError> {
        let logger = decoding_logger(|detail: ApplicationDetail| {
            let (name, namespace) = detail
                .application
                .as_ref()
                .map(|a| (a.name().to_string(), a.metadata.namespace.clone()))
                .unwrap_or_default();
            LogLine::new("got message for application status delete")
                .field("appName", name)
                .field("namespace", namespace)
        });
        self.bus
            .subscribe(topics::APPLICATION_STATUS_DELETE, self.handler(true), logger, Vec::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::DEPLOYMENT_APP_TYPE_ARGO_CD;
    use crate::infrastructure::pubsub::InMemoryPubSub;
    use crate::infrastructure::repositories::{InMemoryInstalledAppRepository, InMemoryPipelineRepository};
    use crate::infrastructure::DeliveryGateway;

    fn pipeline(id: i64, name: &str) -> Pipeline {
        Pipeline {
            id,
            app_id: 1,
            environment_id: 1,
            name: format!("cd-{}", id),
            deployment_app_name: name.into(),
            deployment_app_type: DEPLOYMENT_APP_TYPE_ARGO_CD.into(),
            deleted: false,
            deployment_app_delete_request: false,
        }
    }

    fn installed_app(id: i64, git_ops_name: &str) -> InstalledApp {
        InstalledApp {
            id,
            app_id: 20,
            environment_id: 2,
            app_name: "redis".into(),
            git_ops_app_name: git_ops_name.into(),
            deployment_app_type: DEPLOYMENT_APP_TYPE_ARGO_CD.into(),
            deployment_app_delete_request: false,
            active: true,
            installed_app_version_id: 30,
        }
    }

    fn reconciler(pipelines: Arc<InMemoryPipelineRepository>, apps: Arc<InMemoryInstalledAppRepository>) -> ArgoStatusReconciler {
        let mut repositories = Repositories::in_memory();
        repositories.pipelines = pipelines;
        repositories.installed_apps = apps;
        let gateway = Arc::new(DeliveryGateway::new("http://127.0.0.1:9", None));
        ArgoStatusReconciler::new(
            Arc::new(InMemoryPubSub::with_defaults()),
            &repositories,
            Collaborators::from_gateway(gateway),
        )
    }

    #[tokio::test]
    async fn test_resolution_prefers_pipeline() {
        let pipelines = Arc::new(InMemoryPipelineRepository::new());
        let apps = Arc::new(InMemoryInstalledAppRepository::new());
        pipelines.insert(pipeline(1, "app-dev"));
        apps.insert(installed_app(5, "app-dev"));
        apps.insert(installed_app(6, "redis-prod"));
        let reconciler = reconciler(pipelines, apps);

        assert!(matches!(
            reconciler.resolve("app-dev").await.unwrap(),
            ArgoAppResolution::DevtronPipeline(p) if p.id == 1
        ));
        let resolved = reconciler.resolve("redis-prod").await.unwrap();
        assert!(resolved.is_app_store());
        assert_eq!(reconciler.resolve("unknown").await.unwrap(), ArgoAppResolution::None);
    }
}
