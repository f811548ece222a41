// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend
//! configuration, keeping the domain layer free of infrastructure types.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select PostgreSQL or in-memory persistence once at startup

use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

use crate::domain::repository::{
    AuthConfigRepository, CdWorkflowRepository, CdWorkflowRunnerRepository, CiArtifactRepository,
    GitHostRepository, GlobalTagRepository, InstalledAppRepository, PipelineRepository, SsoLoginRepository,
    StorageBackend, WorkflowSnapshotRepository,
};
use crate::infrastructure::repositories::{
    InMemoryAuthConfigRepository, InMemoryCdWorkflowRepository, InMemoryCdWorkflowRunnerRepository,
    InMemoryCiArtifactRepository, InMemoryGitHostRepository, InMemoryGlobalTagRepository,
    InMemoryInstalledAppRepository, InMemoryPipelineRepository, InMemorySsoLoginRepository,
    InMemoryWorkflowSnapshotRepository, PostgresAuthConfigRepository, PostgresCdWorkflowRepository,
    PostgresCdWorkflowRunnerRepository, PostgresCiArtifactRepository, PostgresGitHostRepository,
    PostgresGlobalTagRepository, PostgresInstalledAppRepository, PostgresPipelineRepository,
    PostgresSsoLoginRepository, PostgresWorkflowSnapshotRepository,
};

/// Every repository the fabric uses, sharing one backend.
#[derive(Clone)]
pub struct Repositories {
    pub cd_workflows: Arc<dyn CdWorkflowRepository>,
    pub cd_workflow_runners: Arc<dyn CdWorkflowRunnerRepository>,
    pub pipelines: Arc<dyn PipelineRepository>,
    pub installed_apps: Arc<dyn InstalledAppRepository>,
    pub ci_artifacts: Arc<dyn CiArtifactRepository>,
    pub auth_configs: Arc<dyn AuthConfigRepository>,
    pub global_tags: Arc<dyn GlobalTagRepository>,
    pub sso_logins: Arc<dyn SsoLoginRepository>,
    pub workflow_snapshots: Arc<dyn WorkflowSnapshotRepository>,
    pub git_hosts: Arc<dyn GitHostRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        let auth_configs = Arc::new(InMemoryAuthConfigRepository::new());
        Self {
            cd_workflows: Arc::new(InMemoryCdWorkflowRepository::new()),
            cd_workflow_runners: Arc::new(InMemoryCdWorkflowRunnerRepository::new()),
            pipelines: Arc::new(InMemoryPipelineRepository::new()),
            installed_apps: Arc::new(InMemoryInstalledAppRepository::new()),
            ci_artifacts: Arc::new(InMemoryCiArtifactRepository::new()),
            sso_logins: Arc::new(InMemorySsoLoginRepository::new(auth_configs.clone())),
            auth_configs,
            global_tags: Arc::new(InMemoryGlobalTagRepository::new()),
            workflow_snapshots: Arc::new(InMemoryWorkflowSnapshotRepository::new()),
            git_hosts: Arc::new(InMemoryGitHostRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            cd_workflows: Arc::new(PostgresCdWorkflowRepository::new(pool.clone())),
            cd_workflow_runners: Arc::new(PostgresCdWorkflowRunnerRepository::new(pool.clone())),
            pipelines: Arc::new(PostgresPipelineRepository::new(pool.clone())),
            installed_apps: Arc::new(PostgresInstalledAppRepository::new(pool.clone())),
            ci_artifacts: Arc::new(PostgresCiArtifactRepository::new(pool.clone())),
            auth_configs: Arc::new(PostgresAuthConfigRepository::new(pool.clone())),
            global_tags: Arc::new(PostgresGlobalTagRepository::new(pool.clone())),
            sso_logins: Arc::new(PostgresSsoLoginRepository::new(pool.clone())),
            workflow_snapshots: Arc::new(PostgresWorkflowSnapshotRepository::new(pool.clone())),
            git_hosts: Arc::new(PostgresGitHostRepository::new(pool)),
        }
    }
}

/// Creates the repository set for the configured backend. A PostgreSQL
/// backend without a pool degrades to in-memory storage.
pub fn create_repositories(backend: &StorageBackend, pool: Option<PgPool>) -> Repositories {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Repositories::postgres(pool),
        (StorageBackend::PostgreSQL(_), None) => {
            warn!("PostgreSQL backend selected without a connection pool, using in-memory repositories");
            Repositories::in_memory()
        }
        (StorageBackend::InMemory, _) => Repositories::in_memory(),
    }
}
