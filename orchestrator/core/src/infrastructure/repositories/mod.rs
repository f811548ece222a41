// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! [`crate::domain::repository`].
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve pipeline, tag, SSO and audit rows
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresCdWorkflowRepository** / **PostgresCdWorkflowRunnerRepository** - bulk CD rows and stage runners
//! - **PostgresPipelineRepository** / **PostgresInstalledAppRepository** / **PostgresCiArtifactRepository** - read models of the delivery platform
//! - **PostgresAuthConfigRepository** - global authorisation config
//! - **PostgresGlobalTagRepository** - global tags
//! - **PostgresSsoLoginRepository** - SSO connectors (transactional with auth config)
//! - **PostgresWorkflowSnapshotRepository** - trigger audit snapshots
//! - **PostgresGitHostRepository** - webhook sources
//!
//! ## In-Memory Repositories
//!
//! Same contracts over `parking_lot::RwLock<BTreeMap<..>>`, for single-node
//! deployments without a database and for tests. Multi-row writes are applied
//! to a copy and swapped in, so a failed write leaves no trace.

pub mod postgres_auth_config;
pub mod postgres_cd_workflow;
pub mod postgres_git_host;
pub mod postgres_global_tag;
pub mod postgres_pipeline;
pub mod postgres_sso_login;
pub mod postgres_trigger_audit;

pub use postgres_auth_config::PostgresAuthConfigRepository;
pub use postgres_cd_workflow::{PostgresCdWorkflowRepository, PostgresCdWorkflowRunnerRepository};
pub use postgres_git_host::PostgresGitHostRepository;
pub use postgres_global_tag::PostgresGlobalTagRepository;
pub use postgres_pipeline::{PostgresCiArtifactRepository, PostgresInstalledAppRepository, PostgresPipelineRepository};
pub use postgres_sso_login::PostgresSsoLoginRepository;
pub use postgres_trigger_audit::PostgresWorkflowSnapshotRepository;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::domain::auth_config::{AuthConfigType, GlobalAuthorisationConfig};
use crate::domain::cd_workflow::{CdWorkflow, WorkflowStatus};
use crate::domain::git_host::GitHost;
use crate::domain::global_tag::GlobalTag;
use crate::domain::pipeline::{CdWorkflowRunner, CiArtifact, InstalledApp, Pipeline, DEPLOYMENT_APP_TYPE_ARGO_CD};
use crate::domain::repository::{
    AuthConfigRepository, BeforeCommit, CdWorkflowRepository, CdWorkflowRunnerRepository, CiArtifactRepository,
    GitHostRepository, GlobalTagRepository, InstalledAppRepository, PipelineRepository, RepositoryError,
    SsoLoginRepository, SsoLoginWrite, SsoTransactionError, WorkflowSnapshotRepository,
};
use crate::domain::sso::SsoLoginConfig;
use crate::domain::trigger_audit::{AuditWorkflowType, WorkflowConfigSnapshot};

/// Id sequence shared by clones of one repository.
#[derive(Clone)]
struct Sequence(Arc<AtomicI64>);

impl Sequence {
    fn new() -> Self {
        Self(Arc::new(AtomicI64::new(1)))
    }

    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// Keeps the sequence ahead of externally seeded ids.
    fn observe(&self, id: i64) {
        self.0.fetch_max(id + 1, Ordering::SeqCst);
    }
}

type Table<T> = Arc<RwLock<BTreeMap<i64, T>>>;

fn table<T>() -> Table<T> {
    Arc::new(RwLock::new(BTreeMap::new()))
}

// ============================================================================
// CD workflows
// ============================================================================

#[derive(Clone)]
pub struct InMemoryCdWorkflowRepository {
    rows: Table<CdWorkflow>,
    ids: Sequence,
}

impl InMemoryCdWorkflowRepository {
    pub fn new() -> Self {
        Self {
            rows: table(),
            ids: Sequence::new(),
        }
    }
}

impl Default for InMemoryCdWorkflowRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdWorkflowRepository for InMemoryCdWorkflowRepository {
    async fn save_all(&self, rows: &[CdWorkflow]) -> Result<Vec<CdWorkflow>, RepositoryError> {
        let mut table = self.rows.write();
        let saved: Vec<CdWorkflow> = rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                if row.id == 0 {
                    row.id = self.ids.next();
                } else {
                    self.ids.observe(row.id);
                }
                row
            })
            .collect();
        for row in &saved {
            table.insert(row.id, row.clone());
        }
        Ok(saved)
    }

    async fn update(&self, row: &CdWorkflow) -> Result<(), RepositoryError> {
        let mut table = self.rows.write();
        match table.get_mut(&row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("cd_workflow {}", row.id))),
        }
    }

    async fn update_status_if(&self, row: &CdWorkflow, expected: WorkflowStatus) -> Result<bool, RepositoryError> {
        let mut table = self.rows.write();
        match table.get_mut(&row.id) {
            Some(existing) if existing.workflow_status == expected => {
                existing.workflow_status = row.workflow_status;
                existing.updated_by = row.updated_by;
                existing.updated_on = row.updated_on;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CdWorkflow>, RepositoryError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn exists_newer_in_flight(&self, pipeline_id: i64, id: i64) -> Result<bool, RepositoryError> {
        let table = self.rows.read();
        Ok(table
            .range(id + 1..)
            .any(|(_, row)| row.pipeline_id == pipeline_id && row.workflow_status.is_in_flight()))
    }
}

#[derive(Clone)]
pub struct InMemoryCdWorkflowRunnerRepository {
    rows: Table<CdWorkflowRunner>,
}

impl InMemoryCdWorkflowRunnerRepository {
    pub fn new() -> Self {
        Self { rows: table() }
    }

    pub fn insert(&self, runner: CdWorkflowRunner) {
        self.rows.write().insert(runner.id, runner);
    }
}

impl Default for InMemoryCdWorkflowRunnerRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdWorkflowRunnerRepository for InMemoryCdWorkflowRunnerRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<CdWorkflowRunner>, RepositoryError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn update_status(&self, id: i64, status: &str, _user_id: i32) -> Result<(), RepositoryError> {
        let mut table = self.rows.write();
        let runner = table
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("cd_workflow_runner {}", id)))?;
        runner.status = status.to_string();
        Ok(())
    }

    async fn exists_by_reference_id(&self, reference_id: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .rows
            .read()
            .values()
            .any(|r| r.reference_id.as_deref() == Some(reference_id)))
    }
}

// ============================================================================
// Pipelines, installed apps, artifacts
// ============================================================================

#[derive(Clone)]
pub struct InMemoryPipelineRepository {
    rows: Table<Pipeline>,
}

impl InMemoryPipelineRepository {
    pub fn new() -> Self {
        Self { rows: table() }
    }

    pub fn insert(&self, pipeline: Pipeline) {
        self.rows.write().insert(pipeline.id, pipeline);
    }
}

impl Default for InMemoryPipelineRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Pipeline>, RepositoryError> {
        Ok(self.rows.read().get(&id).filter(|p| !p.deleted).cloned())
    }

    async fn find_by_id_including_inactive(&self, id: i64) -> Result<Option<Pipeline>, RepositoryError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn find_argo_pipeline_by_app_name(&self, app_name: &str) -> Result<Option<Pipeline>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .values()
            .rev()
            .find(|p| p.deployment_app_name == app_name && p.deployment_app_type == DEPLOYMENT_APP_TYPE_ARGO_CD)
            .cloned())
    }
}

#[derive(Clone)]
pub struct InMemoryInstalledAppRepository {
    rows: Table<InstalledApp>,
    /// Deployed git hash -> installed app id.
    git_hashes: Arc<RwLock<HashMap<String, i64>>>,
}

impl InMemoryInstalledAppRepository {
    pub fn new() -> Self {
        Self {
            rows: table(),
            git_hashes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn insert(&self, app: InstalledApp) {
        self.rows.write().insert(app.id, app);
    }

    /// Records that `git_hash` was deployed for `installed_app_id`.
    pub fn record_git_hash(&self, git_hash: &str, installed_app_id: i64) {
        self.git_hashes.write().insert(git_hash.to_string(), installed_app_id);
    }
}

impl Default for InMemoryInstalledAppRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstalledAppRepository for InMemoryInstalledAppRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<InstalledApp>, RepositoryError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn find_by_git_ops_app_name(&self, name: &str) -> Result<Option<InstalledApp>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .values()
            .find(|a| a.active && a.git_ops_app_name == name)
            .cloned())
    }

    async fn find_by_git_hash(&self, git_hash: &str) -> Result<Option<InstalledApp>, RepositoryError> {
        let id = match self.git_hashes.read().get(git_hash) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn find_by_version_id(&self, installed_app_version_id: i64) -> Result<Option<InstalledApp>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .values()
            .find(|a| a.installed_app_version_id == installed_app_version_id)
            .cloned())
    }
}

#[derive(Clone)]
pub struct InMemoryCiArtifactRepository {
    rows: Table<CiArtifact>,
}

impl InMemoryCiArtifactRepository {
    pub fn new() -> Self {
        Self { rows: table() }
    }

    pub fn insert(&self, artifact: CiArtifact) {
        self.rows.write().insert(artifact.id, artifact);
    }
}

impl Default for InMemoryCiArtifactRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CiArtifactRepository for InMemoryCiArtifactRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<CiArtifact>, RepositoryError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn update_data_source(&self, id: i64, data_source: &str) -> Result<(), RepositoryError> {
        let mut table = self.rows.write();
        let artifact = table
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("ci_artifact {}", id)))?;
        artifact.data_source = data_source.to_string();
        Ok(())
    }
}

// ============================================================================
// Global authorisation config
// ============================================================================

#[derive(Clone)]
pub struct InMemoryAuthConfigRepository {
    rows: Table<GlobalAuthorisationConfig>,
    ids: Sequence,
    /// Serialises writers, including SSO transactions that touch this table.
    tx: Arc<tokio::sync::Mutex<()>>,
}

impl InMemoryAuthConfigRepository {
    pub fn new() -> Self {
        Self {
            rows: table(),
            ids: Sequence::new(),
            tx: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Applies an active-set replacement to `rows` and returns the new active
    /// rows. Rows of other types are deactivated, missing types inserted.
    fn apply_active_set(
        &self,
        rows: &mut BTreeMap<i64, GlobalAuthorisationConfig>,
        config_types: &[AuthConfigType],
        user_id: i32,
    ) -> Vec<GlobalAuthorisationConfig> {
        let now = Utc::now();
        for row in rows.values_mut() {
            let wanted = config_types.contains(&row.config_type);
            if row.active != wanted {
                row.active = wanted;
                row.updated_by = user_id;
                row.updated_on = now;
            }
        }
        for config_type in config_types {
            if !rows.values().any(|r| r.config_type == *config_type) {
                let id = self.ids.next();
                rows.insert(
                    id,
                    GlobalAuthorisationConfig {
                        id,
                        config_type: *config_type,
                        active: true,
                        created_by: user_id,
                        created_on: now,
                        updated_by: user_id,
                        updated_on: now,
                    },
                );
            }
        }
        rows.values().filter(|r| r.active).cloned().collect()
    }
}

impl Default for InMemoryAuthConfigRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthConfigRepository for InMemoryAuthConfigRepository {
    async fn find_active(&self) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError> {
        Ok(self.rows.read().values().filter(|r| r.active).cloned().collect())
    }

    async fn replace_active_set(
        &self,
        config_types: &[AuthConfigType],
        user_id: i32,
    ) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError> {
        let _tx = self.tx.lock().await;
        let mut staged = self.rows.read().clone();
        let active = self.apply_active_set(&mut staged, config_types, user_id);
        *self.rows.write() = staged;
        Ok(active)
    }
}

// ============================================================================
// Global tags
// ============================================================================

#[derive(Clone)]
pub struct InMemoryGlobalTagRepository {
    rows: Table<GlobalTag>,
    ids: Sequence,
}

impl InMemoryGlobalTagRepository {
    pub fn new() -> Self {
        Self {
            rows: table(),
            ids: Sequence::new(),
        }
    }
}

impl Default for InMemoryGlobalTagRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_unique_active_keys(rows: &BTreeMap<i64, GlobalTag>) -> Result<(), RepositoryError> {
    let mut seen = std::collections::HashSet::new();
    for tag in rows.values().filter(|t| t.active) {
        if !seen.insert(tag.key.as_str()) {
            return Err(RepositoryError::Conflict(format!("active global tag key {} already exists", tag.key)));
        }
    }
    Ok(())
}

#[async_trait]
impl GlobalTagRepository for InMemoryGlobalTagRepository {
    async fn find_all_active(&self) -> Result<Vec<GlobalTag>, RepositoryError> {
        Ok(self.rows.read().values().filter(|t| t.active).cloned().collect())
    }

    async fn find_active_by_id(&self, id: i64) -> Result<Option<GlobalTag>, RepositoryError> {
        Ok(self.rows.read().get(&id).filter(|t| t.active).cloned())
    }

    async fn find_active_by_ids(&self, ids: &[i64]) -> Result<Vec<GlobalTag>, RepositoryError> {
        let table = self.rows.read();
        Ok(ids
            .iter()
            .filter_map(|id| table.get(id))
            .filter(|t| t.active)
            .cloned()
            .collect())
    }

    async fn find_active_by_keys(&self, keys: &[String]) -> Result<Vec<GlobalTag>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|t| t.active && keys.contains(&t.key))
            .cloned()
            .collect())
    }

    async fn create_all(&self, tags: &[GlobalTag]) -> Result<Vec<GlobalTag>, RepositoryError> {
        let mut table = self.rows.write();
        let mut staged = table.clone();
        let mut created = Vec::with_capacity(tags.len());
        for tag in tags {
            let mut tag = tag.clone();
            tag.id = self.ids.next();
            staged.insert(tag.id, tag.clone());
            created.push(tag);
        }
        ensure_unique_active_keys(&staged)?;
        *table = staged;
        Ok(created)
    }

    async fn update_all(&self, tags: &[GlobalTag]) -> Result<(), RepositoryError> {
        let mut table = self.rows.write();
        let mut staged = table.clone();
        for tag in tags {
            match staged.get_mut(&tag.id) {
                Some(existing) => *existing = tag.clone(),
                None => return Err(RepositoryError::NotFound(format!("global_tag {}", tag.id))),
            }
        }
        ensure_unique_active_keys(&staged)?;
        *table = staged;
        Ok(())
    }

    async fn deactivate_all(&self, ids: &[i64], user_id: i32) -> Result<(), RepositoryError> {
        let mut table = self.rows.write();
        let now = Utc::now();
        for id in ids {
            if let Some(tag) = table.get_mut(id) {
                tag.active = false;
                tag.updated_by = user_id;
                tag.updated_on = now;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SSO login config
// ============================================================================

/// SSO connectors. Shares its transaction with the authorisation config
/// table it is constructed with.
#[derive(Clone)]
pub struct InMemorySsoLoginRepository {
    rows: Table<SsoLoginConfig>,
    ids: Sequence,
    auth_configs: Arc<InMemoryAuthConfigRepository>,
}

impl InMemorySsoLoginRepository {
    pub fn new(auth_configs: Arc<InMemoryAuthConfigRepository>) -> Self {
        Self {
            rows: table(),
            ids: Sequence::new(),
            auth_configs,
        }
    }
}

#[async_trait]
impl SsoLoginRepository for InMemorySsoLoginRepository {
    async fn find_active(&self) -> Result<Option<SsoLoginConfig>, RepositoryError> {
        Ok(self.rows.read().values().find(|c| c.active).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SsoLoginConfig>, RepositoryError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<SsoLoginConfig>, RepositoryError> {
        let table = self.rows.read();
        let mut candidates: Vec<&SsoLoginConfig> = table.values().filter(|c| c.name == name).collect();
        candidates.sort_by_key(|c| (c.active, c.id));
        Ok(candidates.last().map(|c| (*c).clone()))
    }

    async fn find_all(&self) -> Result<Vec<SsoLoginConfig>, RepositoryError> {
        Ok(self.rows.read().values().cloned().collect())
    }

    async fn save(
        &self,
        write: SsoLoginWrite,
        before_commit: BeforeCommit<'_>,
    ) -> Result<SsoLoginConfig, SsoTransactionError> {
        let _tx = self.auth_configs.tx.lock().await;

        let mut sso_rows = self.rows.read().clone();
        let mut auth_rows = self.auth_configs.rows.read().clone();
        let now = Utc::now();

        if let Some(previous) = write.deactivate_id {
            if let Some(row) = sso_rows.get_mut(&previous) {
                row.active = false;
                row.updated_by = write.config.updated_by;
                row.updated_on = now;
            }
        }

        let mut saved = write.config;
        if saved.id == 0 {
            saved.id = self.ids.next();
        } else if !sso_rows.contains_key(&saved.id) {
            return Err(RepositoryError::NotFound(format!("sso_login_config {}", saved.id)).into());
        }
        sso_rows.insert(saved.id, saved.clone());

        if let Some(auth) = &write.auth_config {
            self.auth_configs
                .apply_active_set(&mut auth_rows, &auth.config_types, auth.user_id);
        }

        before_commit.await?;

        *self.rows.write() = sso_rows;
        *self.auth_configs.rows.write() = auth_rows;
        Ok(saved)
    }
}

// ============================================================================
// Trigger audit snapshots
// ============================================================================

#[derive(Clone)]
pub struct InMemoryWorkflowSnapshotRepository {
    rows: Table<WorkflowConfigSnapshot>,
    ids: Sequence,
}

impl InMemoryWorkflowSnapshotRepository {
    pub fn new() -> Self {
        Self {
            rows: table(),
            ids: Sequence::new(),
        }
    }
}

impl Default for InMemoryWorkflowSnapshotRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowSnapshotRepository for InMemoryWorkflowSnapshotRepository {
    async fn save(&self, snapshot: &WorkflowConfigSnapshot) -> Result<WorkflowConfigSnapshot, RepositoryError> {
        let mut table = self.rows.write();
        if table
            .values()
            .any(|s| s.workflow_id == snapshot.workflow_id && s.workflow_type == snapshot.workflow_type)
        {
            return Err(RepositoryError::Conflict(format!(
                "snapshot for {} workflow {} already exists",
                snapshot.workflow_type.as_str(),
                snapshot.workflow_id
            )));
        }
        let mut saved = snapshot.clone();
        saved.id = self.ids.next();
        table.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn find_by_workflow_id(
        &self,
        workflow_id: i64,
        workflow_type: AuditWorkflowType,
    ) -> Result<Option<WorkflowConfigSnapshot>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .values()
            .find(|s| s.workflow_id == workflow_id && s.workflow_type == workflow_type)
            .cloned())
    }

    async fn find_by_pipeline(
        &self,
        pipeline_id: i64,
        workflow_type: AuditWorkflowType,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowConfigSnapshot>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .values()
            .rev()
            .filter(|s| s.pipeline_id == pipeline_id && s.workflow_type == workflow_type)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Git hosts
// ============================================================================

#[derive(Clone)]
pub struct InMemoryGitHostRepository {
    rows: Table<GitHost>,
}

impl InMemoryGitHostRepository {
    pub fn new() -> Self {
        Self { rows: table() }
    }

    pub fn insert(&self, host: GitHost) {
        self.rows.write().insert(host.id, host);
    }
}

impl Default for InMemoryGitHostRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitHostRepository for InMemoryGitHostRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<GitHost>, RepositoryError> {
        Ok(self.rows.read().get(&id).filter(|h| h.active).cloned())
    }
}
