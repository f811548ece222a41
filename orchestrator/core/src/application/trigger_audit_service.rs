// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Trigger Audit Service
//!
//! Freezes the workflow request a CI or CD stage runner was started with so
//! the run can be inspected or replayed later.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Build, protect and persist trigger snapshots
//! - **Collaborators:**
//!   - Domain: `WorkflowConfigSnapshot`, `WorkflowSnapshotRepository`
//!   - Infrastructure: `SecretSanitizer` (field-level encryption),
//!     `snapshot_codec` (gzip)
//!
//! Write path is `compress(encrypt(request))`, read path is
//! `decrypt(decompress(bytes))`. Both need the installation API token; without
//! it snapshots are refused rather than stored in clear.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::domain::repository::{RepositoryError, WorkflowSnapshotRepository};
use crate::domain::trigger_audit::{
    AuditWorkflowType, TriggerAuditRecord, TriggerAuditRequest, TriggerAuditSummary, WorkflowConfigSnapshot,
    SNAPSHOT_SCHEMA_VERSION,
};
use crate::infrastructure::crypto::SecretSanitizer;
use crate::infrastructure::snapshot_codec::{self, CompressionError};

#[derive(Debug, thiserror::Error)]
pub enum TriggerAuditError {
    #[error("api token is not configured, trigger audit is unavailable")]
    MissingApiToken,

    #[error("trigger audit not found for {0}")]
    NotFound(String),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[async_trait]
pub trait TriggerAuditService: Send + Sync {
    async fn save_ci_trigger_audit(&self, request: &TriggerAuditRequest)
        -> Result<TriggerAuditSummary, TriggerAuditError>;

    async fn save_pre_cd_trigger_audit(
        &self,
        request: &TriggerAuditRequest,
    ) -> Result<TriggerAuditSummary, TriggerAuditError>;

    async fn save_post_cd_trigger_audit(
        &self,
        request: &TriggerAuditRequest,
    ) -> Result<TriggerAuditSummary, TriggerAuditError>;

    /// Snapshot with its workflow request decrypted.
    async fn get_trigger_audit_by_workflow_id(
        &self,
        workflow_id: i64,
        workflow_type: AuditWorkflowType,
    ) -> Result<TriggerAuditRecord, TriggerAuditError>;

    /// Newest first.
    async fn get_trigger_audit_history(
        &self,
        pipeline_id: i64,
        workflow_type: AuditWorkflowType,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TriggerAuditSummary>, TriggerAuditError>;
}

pub struct StandardTriggerAuditService {
    repository: Arc<dyn WorkflowSnapshotRepository>,
    sanitizer: SecretSanitizer,
    api_token: Option<String>,
}

impl StandardTriggerAuditService {
    pub fn new(
        repository: Arc<dyn WorkflowSnapshotRepository>,
        sanitizer: SecretSanitizer,
        api_token: Option<String>,
    ) -> Self {
        Self {
            repository,
            sanitizer,
            api_token: api_token.filter(|t| !t.is_empty()),
        }
    }

    fn token(&self) -> Result<&str, TriggerAuditError> {
        self.api_token.as_deref().ok_or(TriggerAuditError::MissingApiToken)
    }

    async fn save(
        &self,
        workflow_type: AuditWorkflowType,
        request: &TriggerAuditRequest,
    ) -> Result<TriggerAuditSummary, TriggerAuditError> {
        let token = self.token()?;
        let encrypted = self.sanitizer.encrypt_value(&request.workflow_request, token);
        let workflow_request = snapshot_codec::compress(&encrypted)?;

        let snapshot = WorkflowConfigSnapshot {
            id: 0,
            workflow_id: request.workflow_id,
            workflow_type,
            pipeline_id: request.pipeline_id,
            app_id: request.app_id,
            environment_id: request.environment_id,
            artifact_id: request.artifact_id,
            trigger_type: request.trigger_type.unwrap_or_default(),
            triggered_by: request.triggered_by,
            trigger_metadata: request
                .trigger_metadata
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
            workflow_request,
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            created_by: request.triggered_by,
            created_on: Utc::now(),
        };

        let saved = self.repository.save(&snapshot).await?;
        info!(
            workflow_id = saved.workflow_id,
            workflow_type = saved.workflow_type.as_str(),
            pipeline_id = saved.pipeline_id,
            bytes = saved.workflow_request.len(),
            "Trigger audit saved"
        );
        Ok(TriggerAuditSummary::from(&saved))
    }
}

#[async_trait]
impl TriggerAuditService for StandardTriggerAuditService {
    async fn save_ci_trigger_audit(
        &self,
        request: &TriggerAuditRequest,
    ) -> Result<TriggerAuditSummary, TriggerAuditError> {
        self.save(AuditWorkflowType::Ci, request).await
    }

    async fn save_pre_cd_trigger_audit(
        &self,
        request: &TriggerAuditRequest,
    ) -> Result<TriggerAuditSummary, TriggerAuditError> {
        self.save(AuditWorkflowType::PreCd, request).await
    }

    async fn save_post_cd_trigger_audit(
        &self,
        request: &TriggerAuditRequest,
    ) -> Result<TriggerAuditSummary, TriggerAuditError> {
        self.save(AuditWorkflowType::PostCd, request).await
    }

    async fn get_trigger_audit_by_workflow_id(
        &self,
        workflow_id: i64,
        workflow_type: AuditWorkflowType,
    ) -> Result<TriggerAuditRecord, TriggerAuditError> {
        let token = self.token()?;
        let snapshot = self
            .repository
            .find_by_workflow_id(workflow_id, workflow_type)
            .await?
            .ok_or_else(|| TriggerAuditError::NotFound(format!("{} workflow {}", workflow_type.as_str(), workflow_id)))?;

        let compressed: Value = snapshot_codec::decompress(&snapshot.workflow_request)?;
        let workflow_request = self.sanitizer.decrypt_value(&compressed, token);

        Ok(TriggerAuditRecord {
            id: snapshot.id,
            workflow_id: snapshot.workflow_id,
            workflow_type: snapshot.workflow_type,
            pipeline_id: snapshot.pipeline_id,
            app_id: snapshot.app_id,
            environment_id: snapshot.environment_id,
            artifact_id: snapshot.artifact_id,
            trigger_type: snapshot.trigger_type,
            triggered_by: snapshot.triggered_by,
            trigger_metadata: snapshot.trigger_metadata,
            workflow_request,
            schema_version: snapshot.schema_version,
            created_on: snapshot.created_on,
        })
    }

    async fn get_trigger_audit_history(
        &self,
        pipeline_id: i64,
        workflow_type: AuditWorkflowType,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TriggerAuditSummary>, TriggerAuditError> {
        let rows = self
            .repository
            .find_by_pipeline(pipeline_id, workflow_type, limit.max(0), offset.max(0))
            .await?;
        Ok(rows.iter().map(TriggerAuditSummary::from).collect())
    }
}
