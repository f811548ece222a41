// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::cd_workflow::{CdWorkflow, WorkflowStatus};
use crate::domain::pipeline::{CdWorkflowRunner, WorkflowRunnerType};
use crate::domain::repository::{CdWorkflowRepository, CdWorkflowRunnerRepository, RepositoryError};

pub struct PostgresCdWorkflowRepository {
    pool: PgPool,
}

impl PostgresCdWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<CdWorkflow, RepositoryError> {
        let status: String = row.try_get("workflow_status")?;
        Ok(CdWorkflow {
            id: row.try_get("id")?,
            ci_artifact_id: row.try_get("ci_artifact_id")?,
            pipeline_id: row.try_get("pipeline_id")?,
            workflow_status: WorkflowStatus::parse(&status)
                .ok_or_else(|| RepositoryError::Serialization(format!("unknown workflow status {}", status)))?,
            created_by: row.try_get("created_by")?,
            created_on: row.try_get("created_on")?,
            updated_by: row.try_get("updated_by")?,
            updated_on: row.try_get("updated_on")?,
        })
    }
}

#[async_trait]
impl CdWorkflowRepository for PostgresCdWorkflowRepository {
    async fn save_all(&self, rows: &[CdWorkflow]) -> Result<Vec<CdWorkflow>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(rows.len());

        for row in rows {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO cd_workflow (ci_artifact_id, pipeline_id, workflow_status, created_by, created_on, updated_by, updated_on)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(row.ci_artifact_id)
            .bind(row.pipeline_id)
            .bind(row.workflow_status.as_str())
            .bind(row.created_by)
            .bind(row.created_on)
            .bind(row.updated_by)
            .bind(row.updated_on)
            .fetch_one(&mut *tx)
            .await?;

            let mut row = row.clone();
            row.id = id;
            saved.push(row);
        }

        tx.commit().await?;
        Ok(saved)
    }

    async fn update(&self, row: &CdWorkflow) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE cd_workflow
            SET workflow_status = $2, updated_by = $3, updated_on = $4
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(row.workflow_status.as_str())
        .bind(row.updated_by)
        .bind(row.updated_on)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("cd_workflow {}", row.id)));
        }
        Ok(())
    }

    async fn update_status_if(&self, row: &CdWorkflow, expected: WorkflowStatus) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE cd_workflow
            SET workflow_status = $2, updated_by = $3, updated_on = $4
            WHERE id = $1 AND workflow_status = $5
            "#,
        )
        .bind(row.id)
        .bind(row.workflow_status.as_str())
        .bind(row.updated_by)
        .bind(row.updated_on)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CdWorkflow>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, ci_artifact_id, pipeline_id, workflow_status, created_by, created_on, updated_by, updated_on
            FROM cd_workflow
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn exists_newer_in_flight(&self, pipeline_id: i64, id: i64) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM cd_workflow
                WHERE pipeline_id = $1
                  AND id > $2
                  AND workflow_status IN ($3, $4, $5)
            )
            "#,
        )
        .bind(pipeline_id)
        .bind(id)
        .bind(WorkflowStatus::RequestAccepted.as_str())
        .bind(WorkflowStatus::Enqueued.as_str())
        .bind(WorkflowStatus::WfStarted.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

pub struct PostgresCdWorkflowRunnerRepository {
    pool: PgPool,
}

impl PostgresCdWorkflowRunnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CdWorkflowRunnerRepository for PostgresCdWorkflowRunnerRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<CdWorkflowRunner>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, cd_workflow_id, pipeline_id, app_id, environment_id, workflow_type, status, image_path_reservation_ids,
                   reference_id
            FROM cd_workflow_runner
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let workflow_type: String = row.try_get("workflow_type")?;
        Ok(Some(CdWorkflowRunner {
            id: row.try_get("id")?,
            cd_workflow_id: row.try_get("cd_workflow_id")?,
            pipeline_id: row.try_get("pipeline_id")?,
            app_id: row.try_get("app_id")?,
            environment_id: row.try_get("environment_id")?,
            workflow_type: WorkflowRunnerType::parse(&workflow_type)
                .ok_or_else(|| RepositoryError::Serialization(format!("unknown runner type {}", workflow_type)))?,
            status: row.try_get("status")?,
            image_path_reservation_ids: row.try_get("image_path_reservation_ids")?,
            reference_id: row.try_get("reference_id")?,
        }))
    }

    async fn update_status(&self, id: i64, status: &str, user_id: i32) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE cd_workflow_runner
            SET status = $2, updated_by = $3, updated_on = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("cd_workflow_runner {}", id)));
        }
        Ok(())
    }

    async fn exists_by_reference_id(&self, reference_id: &str) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM cd_workflow_runner WHERE reference_id = $1)",
        )
        .bind(reference_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
