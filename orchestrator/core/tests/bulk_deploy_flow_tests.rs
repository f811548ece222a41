// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bulk deployment from the publisher through the bus into the consumer, with
//! both sides writing the same `cd_workflow` row concurrently.

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use common::{artifact, pipeline, Fixture, RecordingPlatform};
use fabric_core::application::{StandardWorkflowEventPublisher, WorkflowEventProcessor, WorkflowEventPublisher};
use fabric_core::domain::cd_workflow::{BulkTriggerRequest, CdWorkflow, WorkflowStatus};
use fabric_core::domain::repository::{CdWorkflowRepository, RepositoryError};
use fabric_core::infrastructure::pubsub::InMemoryPubSub;
use fabric_core::infrastructure::repositories::InMemoryCdWorkflowRepository;

/// Delays the publisher's `ENQUEUED` write by one database round trip so the
/// consumer gets to the row first.
struct SlowEnqueueRepository {
    inner: Arc<InMemoryCdWorkflowRepository>,
}

#[async_trait]
impl CdWorkflowRepository for SlowEnqueueRepository {
    async fn save_all(&self, rows: &[CdWorkflow]) -> Result<Vec<CdWorkflow>, RepositoryError> {
        self.inner.save_all(rows).await
    }

    async fn update(&self, row: &CdWorkflow) -> Result<(), RepositoryError> {
        self.inner.update(row).await
    }

    async fn update_status_if(&self, row: &CdWorkflow, expected: WorkflowStatus) -> Result<bool, RepositoryError> {
        if row.workflow_status == WorkflowStatus::Enqueued {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.update_status_if(row, expected).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CdWorkflow>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn exists_newer_in_flight(&self, pipeline_id: i64, id: i64) -> Result<bool, RepositoryError> {
        self.inner.exists_newer_in_flight(pipeline_id, id).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatched_row_is_not_rolled_back_to_enqueued() {
    let mut fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));
    fixture.artifacts.insert(artifact(10, "CI-RUNNER"));
    let cd_workflows: Arc<dyn CdWorkflowRepository> = Arc::new(SlowEnqueueRepository {
        inner: fixture.cd_workflows.clone(),
    });
    fixture.repositories.cd_workflows = cd_workflows.clone();

    let bus = Arc::new(InMemoryPubSub::with_defaults());
    let processor = Arc::new(WorkflowEventProcessor::new(
        bus.clone(),
        &fixture.repositories,
        platform.collaborators(),
    ));
    processor.subscribe_trigger_bulk_action().await.unwrap();
    let publisher = StandardWorkflowEventPublisher::new(bus.clone(), cd_workflows, platform.clone());

    let rows = publisher
        .trigger_bulk_deployment_async(
            &[BulkTriggerRequest {
                ci_artifact_id: 10,
                pipeline_id: 1,
            }],
            7,
        )
        .await
        .unwrap();
    bus.close().await;

    assert_eq!(platform.calls_to("trigger_stage_for_bulk").len(), 1);
    let stored = fixture.cd_workflows.find_by_id(rows[0].id).await.unwrap().unwrap();
    assert_eq!(stored.workflow_status, WorkflowStatus::WfStarted);
}

#[tokio::test]
async fn test_undelivered_row_is_marked_enqueued() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let bus = Arc::new(InMemoryPubSub::with_defaults());
    let publisher = StandardWorkflowEventPublisher::new(bus.clone(), fixture.repositories.cd_workflows.clone(), platform);

    let rows = publisher
        .trigger_bulk_deployment_async(
            &[BulkTriggerRequest {
                ci_artifact_id: 10,
                pipeline_id: 1,
            }],
            7,
        )
        .await
        .unwrap();

    assert_eq!(rows[0].workflow_status, WorkflowStatus::Enqueued);
    let stored = fixture.cd_workflows.find_by_id(rows[0].id).await.unwrap().unwrap();
    assert_eq!(stored.workflow_status, WorkflowStatus::Enqueued);
    assert_eq!(stored.updated_by, 7);
}
