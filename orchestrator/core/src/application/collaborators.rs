// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bundle of the delivery-platform ports the event handlers call into.

use std::sync::Arc;

use crate::domain::ports::{
    AppLifecycleService, CdTriggerService, CdWorkflowStatusService, ChartScanService, CiEventHandler,
    DeploymentStatusService, EventService, InstalledAppService, NotificationClient, OidcConfigListener,
    PipelineDeletionService,
};
use crate::infrastructure::DeliveryGateway;

#[derive(Clone)]
pub struct Collaborators {
    pub cd_trigger: Arc<dyn CdTriggerService>,
    pub cd_workflow_status: Arc<dyn CdWorkflowStatusService>,
    pub ci_handler: Arc<dyn CiEventHandler>,
    pub deployment_status: Arc<dyn DeploymentStatusService>,
    pub installed_apps: Arc<dyn InstalledAppService>,
    pub app_lifecycle: Arc<dyn AppLifecycleService>,
    pub pipeline_deletion: Arc<dyn PipelineDeletionService>,
    pub events: Arc<dyn EventService>,
    pub chart_scan: Arc<dyn ChartScanService>,
    pub notifications: Arc<dyn NotificationClient>,
    pub oidc_listener: Arc<dyn OidcConfigListener>,
}

impl Collaborators {
    /// Every port served by the delivery platform's internal API.
    pub fn from_gateway(gateway: Arc<DeliveryGateway>) -> Self {
        Self {
            cd_trigger: gateway.clone(),
            cd_workflow_status: gateway.clone(),
            ci_handler: gateway.clone(),
            deployment_status: gateway.clone(),
            installed_apps: gateway.clone(),
            app_lifecycle: gateway.clone(),
            pipeline_deletion: gateway.clone(),
            events: gateway.clone(),
            chart_scan: gateway.clone(),
            notifications: gateway.clone(),
            oidc_listener: gateway,
        }
    }
}
