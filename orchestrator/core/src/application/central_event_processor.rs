// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Central Event Processor
//!
//! Registers every consumer of the fabric on startup, in a fixed order. The
//! first subscription that fails aborts startup so the process never runs
//! with a partial set of consumers.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Subscription bootstrap
//! - **Collaborators:** [`WorkflowEventProcessor`], [`ArgoStatusReconciler`]

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{error, info};

use crate::application::argo_status_reconciler::ArgoStatusReconciler;
use crate::application::workflow_event_processor::WorkflowEventProcessor;
use crate::infrastructure::pubsub::{topics, BusError};

#[derive(Debug, thiserror::Error)]
#[error("failed to subscribe to {topic}: {source}")]
pub struct SubscriptionError {
    pub topic: &'static str,
    #[source]
    pub source: BusError,
}

type Subscribe<'a> = BoxFuture<'a, Result<(), BusError>>;

pub struct CentralEventProcessor {
    workflow_events: Arc<WorkflowEventProcessor>,
    argo_status: Arc<ArgoStatusReconciler>,
}

impl CentralEventProcessor {
    pub fn new(workflow_events: Arc<WorkflowEventProcessor>, argo_status: Arc<ArgoStatusReconciler>) -> Self {
        Self {
            workflow_events,
            argo_status,
        }
    }

    /// Topics in the order they are subscribed.
    pub fn topics() -> [&'static str; 14] {
        [
            topics::CD_STAGE_COMPLETE,
            topics::BULK_DEPLOY,
            topics::BULK_HIBERNATE,
            topics::CI_WORKFLOW_STATUS_UPDATE,
            topics::CD_WORKFLOW_STATUS_UPDATE,
            topics::CI_COMPLETE,
            topics::ARGO_PIPELINE_STATUS_UPDATE,
            topics::APPLICATION_STATUS_UPDATE,
            topics::APPLICATION_STATUS_DELETE,
            topics::NEW_CI_MATERIAL,
            topics::CRON_EVENTS,
            topics::CHART_SCAN,
            topics::APPSTORE_BULK_DEPLOY,
            topics::CD_PIPELINE_DELETE_EVENT,
        ]
    }

    fn subscription(&self, topic: &str) -> Option<Subscribe<'_>> {
        let wf = &self.workflow_events;
        let argo = &self.argo_status;
        let future: Subscribe<'_> = match topic {
            topics::CD_STAGE_COMPLETE => Box::pin(wf.subscribe_cd_stage_complete_event()),
            topics::BULK_DEPLOY => Box::pin(wf.subscribe_trigger_bulk_action()),
            topics::BULK_HIBERNATE => Box::pin(wf.subscribe_hibernate_bulk_action()),
            topics::CI_WORKFLOW_STATUS_UPDATE => Box::pin(wf.subscribe_ci_workflow_status_update()),
            topics::CD_WORKFLOW_STATUS_UPDATE => Box::pin(wf.subscribe_cd_workflow_status_update()),
            topics::CI_COMPLETE => Box::pin(wf.subscribe_ci_complete_event()),
            topics::ARGO_PIPELINE_STATUS_UPDATE => Box::pin(wf.subscribe_argo_pipeline_status_update()),
            topics::APPLICATION_STATUS_UPDATE => Box::pin(argo.subscribe_argo_app_update()),
            topics::APPLICATION_STATUS_DELETE => Box::pin(argo.subscribe_argo_app_delete_status()),
            topics::NEW_CI_MATERIAL => Box::pin(wf.subscribe_new_ci_material()),
            topics::CRON_EVENTS => Box::pin(wf.subscribe_cron_events()),
            topics::CHART_SCAN => Box::pin(wf.subscribe_chart_scan()),
            topics::APPSTORE_BULK_DEPLOY => Box::pin(wf.subscribe_app_store_bulk_deploy()),
            topics::CD_PIPELINE_DELETE_EVENT => Box::pin(wf.subscribe_cd_pipeline_delete_event()),
            _ => return None,
        };
        Some(future)
    }

    pub async fn subscribe_all(&self) -> Result<(), SubscriptionError> {
        for topic in Self::topics() {
            let Some(subscribe) = self.subscription(topic) else {
                continue;
            };
            if let Err(source) = subscribe.await {
                error!(topic, error = %source, "Subscription failed, aborting startup");
                return Err(SubscriptionError { topic, source });
            }
            info!(topic, "Subscribed");
        }
        Ok(())
    }
}
