// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the tables the fabric reads and writes. Each
//! interface is defined here and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Rows | Implementations |
//! |-------|------|----------------|
//! | `CdWorkflowRepository` | `cd_workflow` | `InMemoryCdWorkflowRepository`, `PostgresCdWorkflowRepository` |
//! | `CdWorkflowRunnerRepository` | `cd_workflow_runner` | `InMemoryCdWorkflowRunnerRepository`, `PostgresCdWorkflowRunnerRepository` |
//! | `PipelineRepository` | `pipeline` | `InMemoryPipelineRepository`, `PostgresPipelineRepository` |
//! | `InstalledAppRepository` | `installed_apps` | `InMemoryInstalledAppRepository`, `PostgresInstalledAppRepository` |
//! | `CiArtifactRepository` | `ci_artifact` | `InMemoryCiArtifactRepository`, `PostgresCiArtifactRepository` |
//! | `AuthConfigRepository` | `global_authorisation_config` | `InMemoryAuthConfigRepository`, `PostgresAuthConfigRepository` |
//! | `GlobalTagRepository` | `global_tag` | `InMemoryGlobalTagRepository`, `PostgresGlobalTagRepository` |
//! | `SsoLoginRepository` | `sso_login_config` | `InMemorySsoLoginRepository`, `PostgresSsoLoginRepository` |
//! | `WorkflowSnapshotRepository` | `workflow_config_snapshot` | `InMemoryWorkflowSnapshotRepository`, `PostgresWorkflowSnapshotRepository` |
//! | `GitHostRepository` | `git_host` | `InMemoryGitHostRepository`, `PostgresGitHostRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at startup from `fabric-config.yaml`:
//! in-memory when no database URL is configured, PostgreSQL otherwise.
//! Every multi-row write is one transaction inside the repository.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::domain::auth_config::{AuthConfigType, GlobalAuthorisationConfig};
use crate::domain::cd_workflow::{CdWorkflow, WorkflowStatus};
use crate::domain::git_host::GitHost;
use crate::domain::global_tag::GlobalTag;
use crate::domain::pipeline::{CdWorkflowRunner, CiArtifact, InstalledApp, Pipeline};
use crate::domain::ports::SecretStoreError;
use crate::domain::sso::SsoLoginConfig;
use crate::domain::trigger_audit::{AuditWorkflowType, WorkflowConfigSnapshot};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

#[async_trait]
pub trait CdWorkflowRepository: Send + Sync {
    /// Insert a batch of rows; returns them with their assigned ids.
    async fn save_all(&self, rows: &[CdWorkflow]) -> Result<Vec<CdWorkflow>, RepositoryError>;

    async fn update(&self, row: &CdWorkflow) -> Result<(), RepositoryError>;

    /// Moves the row to `row.workflow_status` only while it is still in
    /// `expected`. Returns `false` when the stored status has already moved on.
    async fn update_status_if(&self, row: &CdWorkflow, expected: WorkflowStatus) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<CdWorkflow>, RepositoryError>;

    /// `true` if another row of `pipeline_id` with an id greater than `id` is
    /// still queued or running.
    async fn exists_newer_in_flight(&self, pipeline_id: i64, id: i64) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CdWorkflowRunnerRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<CdWorkflowRunner>, RepositoryError>;

    async fn update_status(&self, id: i64, status: &str, user_id: i32) -> Result<(), RepositoryError>;

    /// `true` if a runner was already created by the message `reference_id`.
    async fn exists_by_reference_id(&self, reference_id: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Live pipeline (`deleted = false`).
    async fn find_by_id(&self, id: i64) -> Result<Option<Pipeline>, RepositoryError>;

    /// Pipeline regardless of its deleted flag.
    async fn find_by_id_including_inactive(&self, id: i64) -> Result<Option<Pipeline>, RepositoryError>;

    /// Most recent Argo CD pipeline deploying `app_name`, deleted or not.
    async fn find_argo_pipeline_by_app_name(&self, app_name: &str) -> Result<Option<Pipeline>, RepositoryError>;
}

#[async_trait]
pub trait InstalledAppRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<InstalledApp>, RepositoryError>;

    async fn find_by_git_ops_app_name(&self, name: &str) -> Result<Option<InstalledApp>, RepositoryError>;

    /// Installation whose version history contains the deployed `git_hash`.
    async fn find_by_git_hash(&self, git_hash: &str) -> Result<Option<InstalledApp>, RepositoryError>;

    async fn find_by_version_id(&self, installed_app_version_id: i64) -> Result<Option<InstalledApp>, RepositoryError>;
}

#[async_trait]
pub trait CiArtifactRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<CiArtifact>, RepositoryError>;

    async fn update_data_source(&self, id: i64, data_source: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuthConfigRepository: Send + Sync {
    async fn find_active(&self) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError>;

    /// Activates exactly `config_types` and deactivates every other row in a
    /// single transaction. Returns the new active set.
    async fn replace_active_set(
        &self,
        config_types: &[AuthConfigType],
        user_id: i32,
    ) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError>;
}

#[async_trait]
pub trait GlobalTagRepository: Send + Sync {
    /// Active tags ordered by id.
    async fn find_all_active(&self) -> Result<Vec<GlobalTag>, RepositoryError>;

    async fn find_active_by_id(&self, id: i64) -> Result<Option<GlobalTag>, RepositoryError>;

    async fn find_active_by_ids(&self, ids: &[i64]) -> Result<Vec<GlobalTag>, RepositoryError>;

    async fn find_active_by_keys(&self, keys: &[String]) -> Result<Vec<GlobalTag>, RepositoryError>;

    /// Inserts all tags in one transaction.
    async fn create_all(&self, tags: &[GlobalTag]) -> Result<Vec<GlobalTag>, RepositoryError>;

    /// Updates all tags in one transaction.
    async fn update_all(&self, tags: &[GlobalTag]) -> Result<(), RepositoryError>;

    /// Soft-deletes all tags in one transaction.
    async fn deactivate_all(&self, ids: &[i64], user_id: i32) -> Result<(), RepositoryError>;
}

/// Authorisation config change applied together with an SSO write.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfigWrite {
    pub config_types: Vec<AuthConfigType>,
    pub user_id: i32,
}

/// Everything an SSO create or update persists.
#[derive(Debug, Clone, PartialEq)]
pub struct SsoLoginWrite {
    /// Previously active row to deactivate.
    pub deactivate_id: Option<i64>,
    /// Row to persist; `id == 0` inserts.
    pub config: SsoLoginConfig,
    pub auth_config: Option<AuthConfigWrite>,
}

/// Side effect that must succeed for the SSO transaction to commit.
pub type BeforeCommit<'a> = BoxFuture<'a, Result<(), SecretStoreError>>;

#[derive(Debug, thiserror::Error)]
pub enum SsoTransactionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    SecretStore(#[from] SecretStoreError),
}

#[async_trait]
pub trait SsoLoginRepository: Send + Sync {
    async fn find_active(&self) -> Result<Option<SsoLoginConfig>, RepositoryError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<SsoLoginConfig>, RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<SsoLoginConfig>, RepositoryError>;

    async fn find_all(&self) -> Result<Vec<SsoLoginConfig>, RepositoryError>;

    /// Applies `write` in one transaction, awaiting `before_commit` after all
    /// rows are written. A failing hook rolls the transaction back.
    async fn save(
        &self,
        write: SsoLoginWrite,
        before_commit: BeforeCommit<'_>,
    ) -> Result<SsoLoginConfig, SsoTransactionError>;
}

#[async_trait]
pub trait WorkflowSnapshotRepository: Send + Sync {
    /// Fails with `Conflict` if a snapshot for the same
    /// `(workflow_id, workflow_type)` exists.
    async fn save(&self, snapshot: &WorkflowConfigSnapshot) -> Result<WorkflowConfigSnapshot, RepositoryError>;

    async fn find_by_workflow_id(
        &self,
        workflow_id: i64,
        workflow_type: AuditWorkflowType,
    ) -> Result<Option<WorkflowConfigSnapshot>, RepositoryError>;

    /// Newest first.
    async fn find_by_pipeline(
        &self,
        pipeline_id: i64,
        workflow_type: AuditWorkflowType,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowConfigSnapshot>, RepositoryError>;
}

#[async_trait]
pub trait GitHostRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<GitHost>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RepositoryError {
    /// Errors worth retrying by redelivering the message.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Database(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
