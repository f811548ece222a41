// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::sync::Arc;

use common::{installed_app, pipeline, Fixture, RecordingPlatform};
use fabric_core::application::ArgoStatusReconciler;
use fabric_core::domain::argo::{Application, ApplicationDetail, ObjectMeta, Operation, SyncOperation};
use fabric_core::domain::ports::{CollaboratorError, DeploymentStatusOutcome, PipelineOverride};
use fabric_core::infrastructure::pubsub::{HandlerError, InMemoryPubSub, PubSubMsg};

fn application(name: &str, revision: Option<&str>) -> Application {
    Application {
        metadata: ObjectMeta {
            name: name.into(),
            namespace: "argocd".into(),
        },
        operation: revision.map(|rev| Operation {
            sync: Some(SyncOperation { revision: rev.into() }),
        }),
        ..Default::default()
    }
}

fn delta(app: Application) -> PubSubMsg {
    let detail = ApplicationDetail {
        application: Some(app),
        status_time: None,
    };
    PubSubMsg {
        data: serde_json::to_vec(&detail).unwrap(),
        msg_id: "argo-msg".into(),
        delivery: 1,
    }
}

fn reconciler(fixture: &Fixture, platform: &Arc<RecordingPlatform>) -> ArgoStatusReconciler {
    ArgoStatusReconciler::new(
        Arc::new(InMemoryPubSub::with_defaults()),
        &fixture.repositories,
        platform.collaborators(),
    )
}

#[tokio::test]
async fn test_succeeded_pipeline_deployment_triggers_post_deploy() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));
    *platform.deployment_outcome.lock() = DeploymentStatusOutcome {
        is_succeeded: true,
        pipeline_override: Some(PipelineOverride {
            id: 70,
            pipeline_id: 1,
            ci_artifact_id: 10,
            cd_workflow_id: 50,
        }),
    };

    reconciler(&fixture, &platform)
        .handle_status_update(&delta(application("app-1-dev", None)))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("update_deployment_status_and_check_is_succeeded"),
        vec!["update_deployment_status_and_check_is_succeeded:app=app-1-dev app_store=false".to_string()]
    );
    assert_eq!(
        platform.calls_to("handle_deployment_success_event"),
        vec!["handle_deployment_success_event:override=70 ref=argo-msg".to_string()]
    );
}

#[tokio::test]
async fn test_installed_app_update_is_flagged_as_app_store() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.installed_apps.insert(installed_app(5, "redis-prod"));

    reconciler(&fixture, &platform)
        .handle_status_update(&delta(application("redis-prod", None)))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("update_deployment_status_and_check_is_succeeded"),
        vec!["update_deployment_status_and_check_is_succeeded:app=redis-prod app_store=true".to_string()]
    );
    assert!(!platform.called("handle_deployment_success_event"));
}

#[tokio::test]
async fn test_unknown_application_is_dropped() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();

    reconciler(&fixture, &platform)
        .handle_status_update(&delta(application("someone-elses-app", None)))
        .await
        .unwrap();

    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_not_found_falls_back_to_installed_app_version_status() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    platform.fail(
        "update_deployment_status_and_check_is_succeeded",
        CollaboratorError::NotFound,
    );
    fixture.installed_apps.insert(installed_app(5, "redis-prod"));

    reconciler(&fixture, &platform)
        .handle_status_update(&delta(application("redis-prod", None)))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("update_installed_app_version_status"),
        vec!["update_installed_app_version_status:redis-prod".to_string()]
    );
}

#[tokio::test]
async fn test_other_status_errors_are_acked() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    platform.fail(
        "update_deployment_status_and_check_is_succeeded",
        CollaboratorError::Unavailable,
    );
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));

    reconciler(&fixture, &platform)
        .handle_status_update(&delta(application("app-1-dev", None)))
        .await
        .unwrap();

    assert!(!platform.called("update_installed_app_version_status"));
    assert!(!platform.called("handle_deployment_success_event"));
}

#[tokio::test]
async fn test_delete_of_flagged_pipeline_force_deletes() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let mut flagged = pipeline(1, "app-1-dev");
    flagged.deployment_app_delete_request = true;
    fixture.pipelines.insert(flagged);

    reconciler(&fixture, &platform)
        .handle_status_delete(&delta(application("app-1-dev", None)))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("delete_cd_pipeline"),
        vec!["delete_cd_pipeline:pipeline=1 force=true cascade=false user=1".to_string()]
    );
}

#[tokio::test]
async fn test_delete_of_unflagged_pipeline_is_noop() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.pipelines.insert(pipeline(1, "app-1-dev"));

    reconciler(&fixture, &platform)
        .handle_status_delete(&delta(application("app-1-dev", None)))
        .await
        .unwrap();

    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_delete_of_already_deleted_pipeline_is_rejected() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let mut gone = pipeline(1, "app-1-dev");
    gone.deleted = true;
    gone.deployment_app_delete_request = true;
    fixture.pipelines.insert(gone);

    let result = reconciler(&fixture, &platform)
        .handle_status_delete(&delta(application("app-1-dev", None)))
        .await;

    assert!(matches!(result, Err(HandlerError::Permanent(_))));
    assert!(!platform.called("delete_cd_pipeline"));
}

#[tokio::test]
async fn test_delete_of_flagged_helm_app_resolves_by_git_hash() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    let mut flagged = installed_app(5, "redis-prod");
    flagged.deployment_app_delete_request = true;
    fixture.installed_apps.insert(flagged);
    fixture.installed_apps.record_git_hash("9f8e7d", 5);

    reconciler(&fixture, &platform)
        .handle_status_delete(&delta(application("redis-prod", Some("9f8e7d"))))
        .await
        .unwrap();

    assert_eq!(
        platform.calls_to("delete_installed_app"),
        vec!["delete_installed_app:app=5 user=1".to_string()]
    );
}

#[tokio::test]
async fn test_delete_of_unflagged_helm_app_is_noop() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();
    fixture.installed_apps.insert(installed_app(5, "redis-prod"));
    fixture.installed_apps.record_git_hash("9f8e7d", 5);

    reconciler(&fixture, &platform)
        .handle_status_delete(&delta(application("redis-prod", Some("9f8e7d"))))
        .await
        .unwrap();

    assert!(!platform.called("delete_installed_app"));
}

#[tokio::test]
async fn test_delete_with_unknown_git_hash_is_permanent() {
    let fixture = Fixture::new();
    let platform = RecordingPlatform::new();

    let result = reconciler(&fixture, &platform)
        .handle_status_delete(&delta(application("redis-prod", Some("deadbeef"))))
        .await;

    assert!(matches!(result, Err(HandlerError::Permanent(_))));
}
