// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Event Publisher
//!
//! Producer side of the fabric. Bulk operations are persisted first and then
//! fanned out one message per unit of work, so a consumer crash never loses a
//! request that was acknowledged to the user.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Persist bulk rows and publish topic payloads
//! - **Collaborators:**
//!   - Domain: `CdWorkflow`, wire payloads in `domain::events`
//!   - Infrastructure: `PubSubClient`, `CdWorkflowRepository`
//!   - Ports: `InstalledAppService` (app-store operation status)

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::cd_workflow::{BulkTriggerRequest, CdWorkflow, WorkflowStatus};
use crate::domain::events::{
    appstore_deploy_status, ArgoPipelineStatusSyncEvent, BulkCdDeployEvent, CdPipelineDeleteEvent, DeployPayload,
    DeploymentGroup, DeploymentGroupAppWithEnv, InstallAppVersionDto, StopStartRequestType, WebhookEvent,
};
use crate::domain::ports::InstalledAppService;
use crate::domain::repository::{CdWorkflowRepository, RepositoryError};
use crate::infrastructure::pubsub::{publish_json, topics, BusError, PubSubClient};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[async_trait]
pub trait WorkflowEventPublisher: Send + Sync {
    /// Saves one `REQUEST_ACCEPTED` row per request and publishes each to
    /// `BULK-DEPLOY`. Rows end `ENQUEUED` or `QUE_ERROR`.
    async fn trigger_bulk_deployment_async(
        &self,
        requests: &[BulkTriggerRequest],
        user_id: i32,
    ) -> Result<Vec<CdWorkflow>, PublishError>;

    /// One `BULK-HIBERNATE` message per app of the group. Per-app publish
    /// failures are logged; returns the number published.
    async fn trigger_bulk_hibernate_async(
        &self,
        group: &DeploymentGroup,
        request_type: StopStartRequestType,
        user_id: i32,
    ) -> Result<usize, PublishError>;

    async fn publish_bulk_trigger_topic_event(
        &self,
        pipeline_id: i64,
        app_id: i64,
        artifact_id: i64,
        user_id: i32,
    ) -> Result<(), PublishError>;

    async fn publish_argo_type_pipeline_sync_event(
        &self,
        pipeline_id: i64,
        installed_app_version_id: i64,
        user_id: i32,
        is_app_store_application: bool,
    ) -> Result<(), PublishError>;

    async fn publish_git_webhook_event(
        &self,
        git_host_id: i64,
        event_type: &str,
        request_json: &str,
    ) -> Result<(), PublishError>;

    async fn publish_chart_scan_event(&self, dto: &InstallAppVersionDto) -> Result<(), PublishError>;

    async fn publish_cd_pipeline_delete(&self, pipeline_id: i64, triggered_by: i32) -> Result<(), PublishError>;

    /// Publishes one `APPSTORE-BULK-DEPLOY` per version. Returns the publish
    /// error per installed app version id; an empty map means all succeeded.
    async fn publish_bulk_deploy_event(&self, versions: &[InstallAppVersionDto]) -> HashMap<i64, String>;
}

pub struct StandardWorkflowEventPublisher {
    bus: Arc<dyn PubSubClient>,
    cd_workflow_repository: Arc<dyn CdWorkflowRepository>,
    installed_app_service: Arc<dyn InstalledAppService>,
}

impl StandardWorkflowEventPublisher {
    pub fn new(
        bus: Arc<dyn PubSubClient>,
        cd_workflow_repository: Arc<dyn CdWorkflowRepository>,
        installed_app_service: Arc<dyn InstalledAppService>,
    ) -> Self {
        Self {
            bus,
            cd_workflow_repository,
            installed_app_service,
        }
    }
}

#[async_trait]
impl WorkflowEventPublisher for StandardWorkflowEventPublisher {
    async fn trigger_bulk_deployment_async(
        &self,
        requests: &[BulkTriggerRequest],
        user_id: i32,
    ) -> Result<Vec<CdWorkflow>, PublishError> {
        let batch_time = Utc::now();
        let rows: Vec<CdWorkflow> = requests
            .iter()
            .map(|request| CdWorkflow::accepted(request, user_id, batch_time))
            .collect();
        let mut saved = self.cd_workflow_repository.save_all(&rows).await.map_err(|e| {
            error!(error = %e, count = rows.len(), "Failed to save bulk deploy rows");
            e
        })?;

        for row in saved.iter_mut() {
            let status = match publish_json(self.bus.as_ref(), topics::BULK_DEPLOY, row).await {
                Ok(()) => WorkflowStatus::Enqueued,
                Err(e) => {
                    error!(cd_workflow_id = row.id, error = %e, "Failed to publish bulk deploy row");
                    WorkflowStatus::QueError
                }
            };
            // The consumer may already have moved the row past REQUEST_ACCEPTED.
            let mut next = row.clone();
            next.transition(status, user_id);
            match self
                .cd_workflow_repository
                .update_status_if(&next, WorkflowStatus::RequestAccepted)
                .await
            {
                Ok(true) => *row = next,
                Ok(false) => {
                    debug!(cd_workflow_id = row.id, "Bulk deploy row already advanced by consumer");
                    if let Ok(Some(current)) = self.cd_workflow_repository.find_by_id(row.id).await {
                        *row = current;
                    }
                }
                Err(e) => {
                    error!(cd_workflow_id = row.id, error = %e, "Failed to update bulk deploy row status");
                }
            }
        }

        info!(count = saved.len(), user_id, "Bulk deployment accepted");
        Ok(saved)
    }

    async fn trigger_bulk_hibernate_async(
        &self,
        group: &DeploymentGroup,
        request_type: StopStartRequestType,
        user_id: i32,
    ) -> Result<usize, PublishError> {
        let mut published = 0;
        for app_id in &group.app_ids {
            let payload = DeploymentGroupAppWithEnv {
                environment_id: group.environment_id,
                deployment_group_id: group.id,
                app_id: *app_id,
                active: group.active,
                user_id,
                request_type,
            };
            match publish_json(self.bus.as_ref(), topics::BULK_HIBERNATE, &payload).await {
                Ok(()) => published += 1,
                Err(e) => error!(
                    app_id,
                    deployment_group_id = group.id,
                    error = %e,
                    "Failed to publish app stop/start event"
                ),
            }
        }
        Ok(published)
    }

    async fn publish_bulk_trigger_topic_event(
        &self,
        pipeline_id: i64,
        app_id: i64,
        artifact_id: i64,
        user_id: i32,
    ) -> Result<(), PublishError> {
        let event = BulkCdDeployEvent {
            pipeline_id,
            app_id,
            artifact_id,
            user_id,
        };
        publish_json(self.bus.as_ref(), topics::CD_BULK_DEPLOY_TRIGGER, &event).await?;
        Ok(())
    }

    async fn publish_argo_type_pipeline_sync_event(
        &self,
        pipeline_id: i64,
        installed_app_version_id: i64,
        user_id: i32,
        is_app_store_application: bool,
    ) -> Result<(), PublishError> {
        let event = ArgoPipelineStatusSyncEvent {
            pipeline_id,
            installed_app_version_id,
            user_id,
            is_app_store_application,
        };
        publish_json(self.bus.as_ref(), topics::ARGO_PIPELINE_STATUS_UPDATE, &event).await?;
        Ok(())
    }

    async fn publish_git_webhook_event(
        &self,
        git_host_id: i64,
        event_type: &str,
        request_json: &str,
    ) -> Result<(), PublishError> {
        let event = WebhookEvent {
            git_host_id,
            event_type: event_type.to_string(),
            request_payload_json: request_json.to_string(),
        };
        publish_json(self.bus.as_ref(), topics::WEBHOOK_EVENT, &event).await?;
        Ok(())
    }

    async fn publish_chart_scan_event(&self, dto: &InstallAppVersionDto) -> Result<(), PublishError> {
        publish_json(self.bus.as_ref(), topics::CHART_SCAN, dto).await?;
        Ok(())
    }

    async fn publish_cd_pipeline_delete(&self, pipeline_id: i64, triggered_by: i32) -> Result<(), PublishError> {
        let event = CdPipelineDeleteEvent {
            pipeline_id,
            triggered_by,
        };
        publish_json(self.bus.as_ref(), topics::CD_PIPELINE_DELETE_EVENT, &event).await?;
        Ok(())
    }

    async fn publish_bulk_deploy_event(&self, versions: &[InstallAppVersionDto]) -> HashMap<i64, String> {
        let mut failures = HashMap::new();
        for version in versions {
            let payload = DeployPayload {
                installed_app_version_id: version.installed_app_version_id,
                installed_app_version_history_id: version.installed_app_version_history_id.unwrap_or_default(),
            };
            let result = publish_json(self.bus.as_ref(), topics::APPSTORE_BULK_DEPLOY, &payload).await;

            let status = match &result {
                Ok(()) => appstore_deploy_status::ENQUEUED,
                Err(_) => appstore_deploy_status::QUE_ERROR,
            };
            if let Err(e) = result {
                error!(
                    installed_app_version_id = version.installed_app_version_id,
                    error = %e,
                    "Failed to publish app store bulk deploy event"
                );
                failures.insert(version.installed_app_version_id, e.to_string());
            }

            if appstore_deploy_status::awaits_queue(version.status.as_deref()) {
                if let Err(e) = self
                    .installed_app_service
                    .update_deploy_operation_status(version.installed_app_version_id, status)
                    .await
                {
                    warn!(
                        installed_app_version_id = version.installed_app_version_id,
                        error = %e,
                        "Failed to update deploy operation status"
                    );
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::argo::Application;
    use crate::domain::ports::{CollaboratorError, InstalledAppDeleteRequest};
    use crate::infrastructure::pubsub::{InMemoryPubSub, MessageHandler, MessageLogger, MessageValidator};
    use crate::infrastructure::repositories::InMemoryCdWorkflowRepository;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingInstalledAppService {
        statuses: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl InstalledAppService for RecordingInstalledAppService {
        async fn update_installed_app_version_status(&self, _app: &Application) -> Result<(), CollaboratorError> {
            Ok(())
        }

        async fn delete_installed_app(&self, _request: &InstalledAppDeleteRequest) -> Result<(), CollaboratorError> {
            Ok(())
        }

        async fn perform_deploy_stage(&self, _v: i64, _h: i64, _user_id: i32) -> Result<(), CollaboratorError> {
            Ok(())
        }

        async fn update_deploy_operation_status(&self, id: i64, status: &str) -> Result<(), CollaboratorError> {
            self.statuses.lock().await.push((id, status.to_string()));
            Ok(())
        }
    }

    /// Bus that refuses every publish.
    struct ClosedBus;

    #[async_trait]
    impl PubSubClient for ClosedBus {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), BusError> {
            Err(BusError::Closed)
        }

        async fn subscribe(
            &self,
            _topic: &str,
            _handler: MessageHandler,
            _logger: MessageLogger,
            _validators: Vec<MessageValidator>,
        ) -> Result<(), BusError> {
            Err(BusError::Closed)
        }
    }

    fn requests() -> Vec<BulkTriggerRequest> {
        vec![
            BulkTriggerRequest { ci_artifact_id: 11, pipeline_id: 1 },
            BulkTriggerRequest { ci_artifact_id: 12, pipeline_id: 2 },
        ]
    }

    #[tokio::test]
    async fn test_bulk_deployment_enqueues_rows() {
        let bus = Arc::new(InMemoryPubSub::with_defaults());
        let repository = Arc::new(InMemoryCdWorkflowRepository::new());
        let publisher = StandardWorkflowEventPublisher::new(
            bus.clone(),
            repository.clone(),
            Arc::new(RecordingInstalledAppService::default()),
        );

        let rows = publisher.trigger_bulk_deployment_async(&requests(), 7).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].created_on, rows[1].created_on);
        for row in &rows {
            let stored = repository.find_by_id(row.id).await.unwrap().unwrap();
            assert_eq!(stored.workflow_status, WorkflowStatus::Enqueued);
            assert_eq!(stored.created_by, 7);
        }
        assert_eq!(bus.backlog_len(topics::BULK_DEPLOY), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_marks_que_error() {
        let repository = Arc::new(InMemoryCdWorkflowRepository::new());
        let publisher = StandardWorkflowEventPublisher::new(
            Arc::new(ClosedBus),
            repository.clone(),
            Arc::new(RecordingInstalledAppService::default()),
        );

        let rows = publisher.trigger_bulk_deployment_async(&requests(), 7).await.unwrap();
        for row in &rows {
            let stored = repository.find_by_id(row.id).await.unwrap().unwrap();
            assert_eq!(stored.workflow_status, WorkflowStatus::QueError);
        }
    }

    #[tokio::test]
    async fn test_bulk_deploy_event_reports_per_version_errors() {
        let installed = Arc::new(RecordingInstalledAppService::default());
        let publisher = StandardWorkflowEventPublisher::new(
            Arc::new(ClosedBus),
            Arc::new(InMemoryCdWorkflowRepository::new()),
            installed.clone(),
        );
        let versions = vec![
            InstallAppVersionDto {
                installed_app_version_id: 1,
                status: Some(appstore_deploy_status::DEPLOY_INIT.to_string()),
                ..Default::default()
            },
            InstallAppVersionDto {
                installed_app_version_id: 2,
                status: Some("DEPLOY_SUCCESS".to_string()),
                ..Default::default()
            },
        ];

        let failures = publisher.publish_bulk_deploy_event(&versions).await;
        assert_eq!(failures.len(), 2);
        assert_eq!(
            installed.statuses.lock().await.clone(),
            vec![(1, appstore_deploy_status::QUE_ERROR.to_string())]
        );
    }

    #[tokio::test]
    async fn test_hibernate_publishes_one_message_per_app() {
        let bus = Arc::new(InMemoryPubSub::with_defaults());
        let publisher = StandardWorkflowEventPublisher::new(
            bus.clone(),
            Arc::new(InMemoryCdWorkflowRepository::new()),
            Arc::new(RecordingInstalledAppService::default()),
        );
        let group = DeploymentGroup {
            id: 4,
            environment_id: 2,
            active: true,
            app_ids: vec![10, 11, 12],
        };
        let published = publisher
            .trigger_bulk_hibernate_async(&group, StopStartRequestType::Stop, 3)
            .await
            .unwrap();
        assert_eq!(published, 3);
        assert_eq!(bus.backlog_len(topics::BULK_HIBERNATE), 3);
    }
}
