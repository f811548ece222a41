// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Handler behaviour of the CI/CD workflow consumers against in-memory
//! repositories and a recording delivery platform.

mod common;

use chrono::Utc;
use std::sync::Arc;

use common::{artifact, pipeline, runner, Fixture, RecordingPlatform};
use fabric_core::application::WorkflowEventProcessor;
use fabric_core::domain::cd_workflow::{BulkTriggerRequest, CdWorkflow, WorkflowStatus};
use fabric_core::domain::events::{
    CdPipelineDeleteEvent, CdStageCompleteEvent, CiCompleteEvent, DeployPayload, DeploymentGroupAppWithEnv,
    InstallAppVersionDto, StopStartRequestType, WorkflowStatusReport,
};
use fabric_core::domain::pipeline::{runner_status, WorkflowRunnerType, DEPLOYMENT_APP_TYPE_HELM};
use fabric_core::domain::ports::CollaboratorError;
use fabric_core::domain::repository::{CdWorkflowRepository, CdWorkflowRunnerRepository, CiArtifactRepository};
use fabric_core::infrastructure::pubsub::{HandlerError, InMemoryPubSub, PubSubMsg};

fn msg<T: serde::Serialize>(payload: &T) -> PubSubMsg {
    PubSubMsg {
        data: serde_json::to_vec(payload).unwrap(),
        msg_id: "msg-1".to_string(),
        delivery: 1,
    }
}

fn processor(fixture: &Fixture, platform: &Arc<RecordingPlatform>) -> WorkflowEventProcessor {
    WorkflowEventProcessor::new(
        Arc::new(InMemoryPubSub::with_defaults()),
        &fixture.repositories,
        platform.collaborators(),
    )
}

async fn accept_bulk_rows(fixture: &Fixture, pipeline_id: i64, artifact_ids: &[i64]) -> Vec<CdWorkflow> {
    let now = Utc::now();
    let rows: Vec<CdWorkflow> = artifact_ids
        .iter()
        .map(|ci_artifact_id| {
            CdWorkflow::accepted(
                &BulkTriggerRequest {
                    ci_artifact_id: *ci_artifact_id,
                    pipeline_id,
                },
                7,
                now,
            )
        })
        .collect();
    fixture.cd_workflows.save_all(&rows).await.unwrap()
}

async fn status_of(fixture: &Fixture, id: i64) -> WorkflowStatus {
    fixture
        .cd_workflows
        .find_by_id(id)
        .await
        .unwrap()
        .unwrap()
        .workflow_status
}

#[tokio::test]
async fn test_bulk_deploy_latest_row_starts_workflow() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));
    fixture.artifacts.insert(artifact(10, "CI-RUNNER"));
    let rows = accept_bulk_rows(&fixture, 1, &[10]).await;

    processor(&fixture, &platform)
        .handle_bulk_deploy(&msg(&rows[0]))
        .await
        .unwrap();

    assert_eq!(status_of(&fixture, rows[0].id).await, WorkflowStatus::WfStarted);
    let calls = platform.calls_to("trigger_stage_for_bulk");
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("pipeline=1 artifact=10"));
    assert!(calls[0].contains("by=7"));
    assert!(calls[0].contains("ref=msg-1"));
}

#[tokio::test]
async fn test_bulk_deploy_drops_superseded_row() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));
    fixture.artifacts.insert(artifact(10, "CI-RUNNER"));
    fixture.artifacts.insert(artifact(11, "CI-RUNNER"));
    let rows = accept_bulk_rows(&fixture, 1, &[10, 11]).await;

    processor(&fixture, &platform)
        .handle_bulk_deploy(&msg(&rows[0]))
        .await
        .unwrap();

    assert_eq!(status_of(&fixture, rows[0].id).await, WorkflowStatus::DroppedStale);
    assert!(!platform.called("trigger_stage_for_bulk"));
}

#[tokio::test]
async fn test_bulk_deploy_row_is_latest_again_once_newer_row_settles() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));
    fixture.artifacts.insert(artifact(10, "CI-RUNNER"));
    fixture.artifacts.insert(artifact(11, "CI-RUNNER"));
    let rows = accept_bulk_rows(&fixture, 1, &[10, 11]).await;

    let mut newer = rows[1].clone();
    newer.transition(WorkflowStatus::TriggerError, 1);
    fixture.cd_workflows.update(&newer).await.unwrap();

    processor(&fixture, &platform)
        .handle_bulk_deploy(&msg(&rows[0]))
        .await
        .unwrap();

    assert_eq!(status_of(&fixture, rows[0].id).await, WorkflowStatus::WfStarted);
}

#[tokio::test]
async fn test_bulk_deploy_trigger_failure_is_recorded_on_row() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    platform.fail("trigger_stage_for_bulk", CollaboratorError::Rejected);
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));
    fixture.artifacts.insert(artifact(10, "CI-RUNNER"));
    let rows = accept_bulk_rows(&fixture, 1, &[10]).await;

    processor(&fixture, &platform)
        .handle_bulk_deploy(&msg(&rows[0]))
        .await
        .unwrap();

    assert_eq!(status_of(&fixture, rows[0].id).await, WorkflowStatus::TriggerError);
}

#[tokio::test]
async fn test_bulk_deploy_missing_pipeline_is_trigger_error() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.artifacts.insert(artifact(10, "CI-RUNNER"));
    let rows = accept_bulk_rows(&fixture, 42, &[10]).await;

    processor(&fixture, &platform)
        .handle_bulk_deploy(&msg(&rows[0]))
        .await
        .unwrap();

    assert_eq!(status_of(&fixture, rows[0].id).await, WorkflowStatus::TriggerError);
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_bulk_deploy_migrates_deprecated_artifact_source() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));
    fixture.artifacts.insert(artifact(10, "ext"));
    let rows = accept_bulk_rows(&fixture, 1, &[10]).await;

    processor(&fixture, &platform)
        .handle_bulk_deploy(&msg(&rows[0]))
        .await
        .unwrap();

    let stored = fixture.artifacts.find_by_id(10).await.unwrap().unwrap();
    assert_eq!(stored.data_source, "EXTERNAL");
    assert!(platform.calls_to("trigger_stage_for_bulk")[0].contains("source=EXTERNAL"));
}

#[tokio::test]
async fn test_cd_stage_complete_pre_marks_runner_and_chains_deploy() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture
        .runners
        .insert(runner(5, WorkflowRunnerType::Pre, runner_status::RUNNING));

    let event = CdStageCompleteEvent {
        workflow_id: 50,
        workflow_runner_id: 5,
        cd_pipeline_id: 1,
        triggered_by: 3,
        ..Default::default()
    };
    processor(&fixture, &platform)
        .handle_cd_stage_complete(&msg(&event))
        .await
        .unwrap();

    let stored = fixture.runners.find_by_id(5).await.unwrap().unwrap();
    assert_eq!(stored.status, runner_status::SUCCEEDED);
    assert_eq!(
        platform.calls_to("handle_pre_stage_success_event"),
        vec!["handle_pre_stage_success_event:runner=5 ref=msg-1".to_string()]
    );
    assert!(!platform.called("handle_post_stage_success_event"));
}

#[tokio::test]
async fn test_cd_stage_complete_post_uses_runner_workflow() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture
        .runners
        .insert(runner(6, WorkflowRunnerType::Post, runner_status::SUCCEEDED));

    let event = CdStageCompleteEvent {
        workflow_runner_id: 6,
        cd_pipeline_id: 1,
        triggered_by: 3,
        ..Default::default()
    };
    processor(&fixture, &platform)
        .handle_cd_stage_complete(&msg(&event))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("handle_post_stage_success_event"),
        vec!["handle_post_stage_success_event:wf=50 pipeline=1 by=3 ref=msg-1".to_string()]
    );
}

#[tokio::test]
async fn test_cd_stage_complete_unknown_runner_is_permanent() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();

    let event = CdStageCompleteEvent {
        workflow_runner_id: 404,
        ..Default::default()
    };
    let result = processor(&fixture, &platform)
        .handle_cd_stage_complete(&msg(&event))
        .await;

    assert!(matches!(result, Err(HandlerError::Permanent(_))));
}

#[tokio::test]
async fn test_undecodable_payload_is_permanent() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let garbage = PubSubMsg {
        data: b"{not json".to_vec(),
        msg_id: "msg-1".into(),
        delivery: 1,
    };

    let result = processor(&fixture, &platform).handle_ci_complete(&garbage).await;

    assert!(matches!(result, Err(HandlerError::Permanent(_))));
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_ci_complete_success_registers_artifact_with_defaults() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let event = CiCompleteEvent {
        pipeline_id: 21,
        docker_image: "registry/app:abc".into(),
        triggered_by: 0,
        ..Default::default()
    };

    processor(&fixture, &platform)
        .handle_ci_complete(&msg(&event))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("handle_ci_success_event"),
        vec!["handle_ci_success_event:pipeline=21 image=registry/app:abc source=EXTERNAL user=1 ref=msg-1".to_string()]
    );
}

#[tokio::test]
async fn test_ci_complete_failure_reports_failed_step() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let event = CiCompleteEvent {
        pipeline_id: 21,
        failure_reason: "step 'scan' failed".into(),
        ..Default::default()
    };

    processor(&fixture, &platform)
        .handle_ci_complete(&msg(&event))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("handle_ci_step_failed_event"),
        vec!["handle_ci_step_failed_event:pipeline=21 reason=step 'scan' failed".to_string()]
    );
    assert!(!platform.called("handle_ci_success_event"));
}

#[tokio::test]
async fn test_ci_status_update_continues_when_retrigger_check_fails() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    platform.fail("check_and_retrigger_ci", CollaboratorError::Unavailable);
    let report = WorkflowStatusReport {
        phase: "Failed".into(),
        ..Default::default()
    };

    processor(&fixture, &platform)
        .handle_ci_workflow_status_update(&msg(&report))
        .await
        .unwrap();

    assert!(platform.called("update_ci_workflow"));
}

#[tokio::test]
async fn test_cd_status_failure_releases_reservations_and_notifies() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let mut failed = runner(8, WorkflowRunnerType::Pre, runner_status::FAILED);
    failed.image_path_reservation_ids = vec![31, 32];
    fixture.runners.insert(failed);
    *platform.cd_workflow_update.lock() = (8, runner_status::FAILED.to_string());
    *platform.retrigger_required.lock() = true;

    let report = WorkflowStatusReport {
        phase: "Failed".into(),
        ..Default::default()
    };
    processor(&fixture, &platform)
        .handle_cd_workflow_status_update(&msg(&report))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("deactivate_image_reservation_paths"),
        vec!["deactivate_image_reservation_paths:[31, 32]".to_string()]
    );
    assert!(platform.called("handle_cd_stage_retrigger"));
    assert_eq!(
        platform.calls_to("write_stage_notification"),
        vec!["write_stage_notification:runner=8 outcome=Fail".to_string()]
    );
}

#[tokio::test]
async fn test_cd_status_running_stops_after_update() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture
        .runners
        .insert(runner(9, WorkflowRunnerType::Deploy, runner_status::RUNNING));
    *platform.cd_workflow_update.lock() = (9, runner_status::RUNNING.to_string());

    processor(&fixture, &platform)
        .handle_cd_workflow_status_update(&msg(&WorkflowStatusReport::default()))
        .await
        .unwrap();

    assert_eq!(platform.calls().len(), 1);
    assert!(platform.called("update_cd_workflow"));
}

#[tokio::test]
async fn test_cd_status_deploy_success_is_not_notified() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture
        .runners
        .insert(runner(9, WorkflowRunnerType::Deploy, runner_status::SUCCEEDED));
    *platform.cd_workflow_update.lock() = (9, runner_status::SUCCEEDED.to_string());

    processor(&fixture, &platform)
        .handle_cd_workflow_status_update(&msg(&WorkflowStatusReport::default()))
        .await
        .unwrap();

    assert!(platform.called("check_if_retrigger_required"));
    assert!(!platform.called("handle_cd_stage_retrigger"));
    assert!(!platform.called("write_stage_notification"));
}

#[tokio::test]
async fn test_bulk_hibernate_survives_missing_acd_context() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    platform.fail("build_acd_context", CollaboratorError::Unavailable);
    let payload = DeploymentGroupAppWithEnv {
        environment_id: 2,
        deployment_group_id: 4,
        app_id: 77,
        active: true,
        user_id: 3,
        request_type: StopStartRequestType::Stop,
    };

    processor(&fixture, &platform)
        .handle_bulk_hibernate(&msg(&payload))
        .await
        .unwrap();

    assert!(!platform.called("stop_start_app"));
}

#[tokio::test]
async fn test_bulk_hibernate_stops_app_with_reference() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let payload = DeploymentGroupAppWithEnv {
        environment_id: 2,
        deployment_group_id: 4,
        app_id: 77,
        active: true,
        user_id: 3,
        request_type: StopStartRequestType::Stop,
    };

    processor(&fixture, &platform)
        .handle_bulk_hibernate(&msg(&payload))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("stop_start_app"),
        vec!["stop_start_app:app=77 env=2 token=acd-token ref=msg-1".to_string()]
    );
}

#[tokio::test]
async fn test_chart_scan_continues_past_failed_image() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    *platform.chart_images.lock() = vec!["nginx:1.25".into(), "redis:7".into()];
    platform.fail("enqueue_scan", CollaboratorError::Unavailable);

    let dto = InstallAppVersionDto {
        installed_app_version_id: 12,
        ..Default::default()
    };
    processor(&fixture, &platform)
        .handle_chart_scan(&msg(&dto))
        .await
        .unwrap();

    assert_eq!(platform.calls_to("create_scan_history").len(), 2);
    assert_eq!(platform.calls_to("enqueue_scan").len(), 2);
}

#[tokio::test]
async fn test_app_store_bulk_deploy_runs_as_system_user() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let payload = DeployPayload {
        installed_app_version_id: 30,
        installed_app_version_history_id: 31,
    };

    processor(&fixture, &platform)
        .handle_app_store_bulk_deploy(&msg(&payload))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("perform_deploy_stage"),
        vec!["perform_deploy_stage:version=30 history=31 user=1".to_string()]
    );
}

#[tokio::test]
async fn test_cd_pipeline_delete_cleans_up_deleted_helm_pipeline() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    platform.fail("remove_release_context", CollaboratorError::Unavailable);
    let mut deleted = pipeline(3, "app-3-prod");
    deleted.deployment_app_type = DEPLOYMENT_APP_TYPE_HELM.into();
    deleted.deleted = true;
    fixture.pipelines.insert(deleted);

    let event = CdPipelineDeleteEvent {
        pipeline_id: 3,
        triggered_by: 9,
    };
    processor(&fixture, &platform)
        .handle_cd_pipeline_delete(&msg(&event))
        .await
        .unwrap();

    assert!(platform.called("remove_release_context"));
    assert_eq!(
        platform.calls_to("delete_deployment_app"),
        vec!["delete_deployment_app:pipeline=3 user=9".to_string()]
    );
}

#[tokio::test]
async fn test_cd_pipeline_delete_ignores_other_deployment_types() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let mut manifest_push = pipeline(4, "app-4");
    manifest_push.deployment_app_type = "manifest_push".into();
    fixture.pipelines.insert(manifest_push);

    processor(&fixture, &platform)
        .handle_cd_pipeline_delete(&msg(&CdPipelineDeleteEvent {
            pipeline_id: 4,
            triggered_by: 9,
        }))
        .await
        .unwrap();

    assert!(platform.calls().is_empty());
}
