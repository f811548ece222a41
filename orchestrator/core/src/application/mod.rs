// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod argo_status_reconciler;
pub mod auth_config_service;
pub mod central_event_processor;
pub mod collaborators;
pub mod git_webhook_service;
pub mod global_tag_service;
pub mod repository_factory;
pub mod sso_login_service;
pub mod trigger_audit_service;
pub mod workflow_event_processor;
pub mod workflow_event_publisher;

pub use argo_status_reconciler::{ArgoAppResolution, ArgoStatusReconciler};
pub use auth_config_service::{AuthConfigError, AuthConfigService, StandardAuthConfigService};
pub use central_event_processor::{CentralEventProcessor, SubscriptionError};
pub use collaborators::Collaborators;
pub use git_webhook_service::{GitWebhookError, GitWebhookService, StandardGitWebhookService};
pub use global_tag_service::{GlobalTagError, GlobalTagService, StandardGlobalTagService};
pub use repository_factory::{create_repositories, Repositories};
pub use sso_login_service::{DexSecretWriter, SsoError, SsoLoginService, StandardSsoLoginService};
pub use trigger_audit_service::{StandardTriggerAuditService, TriggerAuditError, TriggerAuditService};
pub use workflow_event_processor::WorkflowEventProcessor;
pub use workflow_event_publisher::{PublishError, StandardWorkflowEventPublisher, WorkflowEventPublisher};
