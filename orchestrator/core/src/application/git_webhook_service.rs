// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Git Webhook Intake
//!
//! Authenticates an inbound git webhook against its registered host and
//! hands it to the bus as a `WEBHOOK-EVENT`.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Host lookup, secret validation, publish
//! - **Collaborators:** `GitHostRepository`, `webhook_validator`,
//!   `WorkflowEventPublisher`

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::workflow_event_publisher::{PublishError, WorkflowEventPublisher};
use crate::domain::repository::{GitHostRepository, RepositoryError};
use crate::infrastructure::webhook_validator::{validate_secret, WebhookRequest};

#[derive(Debug, thiserror::Error)]
pub enum GitWebhookError {
    #[error("webhook secret validation failed for git host {0}")]
    Unauthorized(i64),

    #[error("git host {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[async_trait]
pub trait GitWebhookService: Send + Sync {
    /// `event_type` falls back to the host's event type header when absent.
    /// Returns the event type that was published.
    async fn handle_webhook(
        &self,
        git_host_id: i64,
        event_type: Option<&str>,
        request: &WebhookRequest,
    ) -> Result<String, GitWebhookError>;
}

pub struct StandardGitWebhookService {
    git_hosts: Arc<dyn GitHostRepository>,
    publisher: Arc<dyn WorkflowEventPublisher>,
}

impl StandardGitWebhookService {
    pub fn new(git_hosts: Arc<dyn GitHostRepository>, publisher: Arc<dyn WorkflowEventPublisher>) -> Self {
        Self { git_hosts, publisher }
    }
}

#[async_trait]
impl GitWebhookService for StandardGitWebhookService {
    async fn handle_webhook(
        &self,
        git_host_id: i64,
        event_type: Option<&str>,
        request: &WebhookRequest,
    ) -> Result<String, GitWebhookError> {
        let host = self
            .git_hosts
            .find_by_id(git_host_id)
            .await?
            .ok_or(GitWebhookError::NotFound(git_host_id))?;

        if !validate_secret(&host, request) {
            warn!(
                git_host_id,
                mode = %host.secret_validation_type,
                "Rejected webhook with invalid secret"
            );
            return Err(GitWebhookError::Unauthorized(git_host_id));
        }

        let event_type = match event_type.filter(|e| !e.is_empty()) {
            Some(event_type) => event_type.to_string(),
            None if !host.event_type_header.is_empty() => request
                .header(&host.event_type_header)
                .unwrap_or_default()
                .to_string(),
            None => String::new(),
        };

        self.publisher
            .publish_git_webhook_event(git_host_id, &event_type, &request.body_str())
            .await?;
        info!(git_host_id, event_type = %event_type, "Git webhook accepted");
        Ok(event_type)
    }
}
