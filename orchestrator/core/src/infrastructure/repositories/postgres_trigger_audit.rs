// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, WorkflowSnapshotRepository};
use crate::domain::trigger_audit::{AuditWorkflowType, TriggerType, WorkflowConfigSnapshot};

const COLUMNS: &str = "id, workflow_id, workflow_type, pipeline_id, app_id, environment_id, artifact_id, \
     trigger_type, triggered_by, trigger_metadata, workflow_request, schema_version, created_by, created_on";

fn from_row(row: &PgRow) -> Result<WorkflowConfigSnapshot, RepositoryError> {
    let workflow_type: String = row.try_get("workflow_type")?;
    let trigger_type: String = row.try_get("trigger_type")?;
    Ok(WorkflowConfigSnapshot {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        workflow_type: AuditWorkflowType::parse(&workflow_type)
            .ok_or_else(|| RepositoryError::Serialization(format!("unknown workflow type {}", workflow_type)))?,
        pipeline_id: row.try_get("pipeline_id")?,
        app_id: row.try_get("app_id")?,
        environment_id: row.try_get("environment_id")?,
        artifact_id: row.try_get("artifact_id")?,
        trigger_type: TriggerType::parse(&trigger_type),
        triggered_by: row.try_get("triggered_by")?,
        trigger_metadata: row.try_get("trigger_metadata")?,
        workflow_request: row.try_get("workflow_request")?,
        schema_version: row.try_get("schema_version")?,
        created_by: row.try_get("created_by")?,
        created_on: row.try_get("created_on")?,
    })
}

pub struct PostgresWorkflowSnapshotRepository {
    pool: PgPool,
}

impl PostgresWorkflowSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowSnapshotRepository for PostgresWorkflowSnapshotRepository {
    async fn save(&self, snapshot: &WorkflowConfigSnapshot) -> Result<WorkflowConfigSnapshot, RepositoryError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO workflow_config_snapshot (workflow_id, workflow_type, pipeline_id, app_id, environment_id,
                artifact_id, trigger_type, triggered_by, trigger_metadata, workflow_request, schema_version,
                created_by, created_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(snapshot.workflow_id)
        .bind(snapshot.workflow_type.as_str())
        .bind(snapshot.pipeline_id)
        .bind(snapshot.app_id)
        .bind(snapshot.environment_id)
        .bind(snapshot.artifact_id)
        .bind(snapshot.trigger_type.as_str())
        .bind(snapshot.triggered_by)
        .bind(&snapshot.trigger_metadata)
        .bind(&snapshot.workflow_request)
        .bind(&snapshot.schema_version)
        .bind(snapshot.created_by)
        .bind(snapshot.created_on)
        .fetch_one(&self.pool)
        .await?;

        let mut saved = snapshot.clone();
        saved.id = id;
        Ok(saved)
    }

    async fn find_by_workflow_id(
        &self,
        workflow_id: i64,
        workflow_type: AuditWorkflowType,
    ) -> Result<Option<WorkflowConfigSnapshot>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_config_snapshot WHERE workflow_id = $1 AND workflow_type = $2",
            COLUMNS
        ))
        .bind(workflow_id)
        .bind(workflow_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(from_row).transpose()
    }

    async fn find_by_pipeline(
        &self,
        pipeline_id: i64,
        workflow_type: AuditWorkflowType,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowConfigSnapshot>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflow_config_snapshot WHERE pipeline_id = $1 AND workflow_type = $2 \
             ORDER BY created_on DESC, id DESC LIMIT $3 OFFSET $4",
            COLUMNS
        ))
        .bind(pipeline_id)
        .bind(workflow_type.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(from_row).collect()
    }
}
