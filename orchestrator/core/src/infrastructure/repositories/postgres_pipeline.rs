// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read models of the delivery platform tables the fabric consults.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::pipeline::{CiArtifact, InstalledApp, Pipeline, DEPLOYMENT_APP_TYPE_ARGO_CD};
use crate::domain::repository::{CiArtifactRepository, InstalledAppRepository, PipelineRepository, RepositoryError};

const PIPELINE_COLUMNS: &str = "id, app_id, environment_id, pipeline_name, deployment_app_name, \
     deployment_app_type, deleted, deployment_app_delete_request";

fn pipeline_from_row(row: &PgRow) -> Result<Pipeline, RepositoryError> {
    Ok(Pipeline {
        id: row.try_get("id")?,
        app_id: row.try_get("app_id")?,
        environment_id: row.try_get("environment_id")?,
        name: row.try_get("pipeline_name")?,
        deployment_app_name: row.try_get("deployment_app_name")?,
        deployment_app_type: row.try_get("deployment_app_type")?,
        deleted: row.try_get("deleted")?,
        deployment_app_delete_request: row.try_get("deployment_app_delete_request")?,
    })
}

pub struct PostgresPipelineRepository {
    pool: PgPool,
}

impl PostgresPipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRepository for PostgresPipelineRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Pipeline>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM pipeline WHERE id = $1 AND deleted = false",
            PIPELINE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(pipeline_from_row).transpose()
    }

    async fn find_by_id_including_inactive(&self, id: i64) -> Result<Option<Pipeline>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM pipeline WHERE id = $1", PIPELINE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(pipeline_from_row).transpose()
    }

    async fn find_argo_pipeline_by_app_name(&self, app_name: &str) -> Result<Option<Pipeline>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM pipeline WHERE deployment_app_name = $1 AND deployment_app_type = $2 \
             ORDER BY id DESC LIMIT 1",
            PIPELINE_COLUMNS
        ))
        .bind(app_name)
        .bind(DEPLOYMENT_APP_TYPE_ARGO_CD)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(pipeline_from_row).transpose()
    }
}

/// Installed app with its latest active version.
const INSTALLED_APP_SELECT: &str = r#"
    SELECT a.id, a.app_id, a.environment_id, a.app_name, a.git_ops_app_name, a.deployment_app_type,
           a.deployment_app_delete_request, a.active,
           COALESCE((
               SELECT v.id FROM installed_app_versions v
               WHERE v.installed_app_id = a.id AND v.active = true
               ORDER BY v.id DESC LIMIT 1
           ), 0) AS installed_app_version_id
    FROM installed_apps a
"#;

fn installed_app_from_row(row: &PgRow) -> Result<InstalledApp, RepositoryError> {
    Ok(InstalledApp {
        id: row.try_get("id")?,
        app_id: row.try_get("app_id")?,
        environment_id: row.try_get("environment_id")?,
        app_name: row.try_get("app_name")?,
        git_ops_app_name: row.try_get("git_ops_app_name")?,
        deployment_app_type: row.try_get("deployment_app_type")?,
        deployment_app_delete_request: row.try_get("deployment_app_delete_request")?,
        active: row.try_get("active")?,
        installed_app_version_id: row.try_get("installed_app_version_id")?,
    })
}

pub struct PostgresInstalledAppRepository {
    pool: PgPool,
}

impl PostgresInstalledAppRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstalledAppRepository for PostgresInstalledAppRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<InstalledApp>, RepositoryError> {
        let row = sqlx::query(&format!("{} WHERE a.id = $1", INSTALLED_APP_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(installed_app_from_row).transpose()
    }

    async fn find_by_git_ops_app_name(&self, name: &str) -> Result<Option<InstalledApp>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{} WHERE a.git_ops_app_name = $1 AND a.active = true ORDER BY a.id DESC LIMIT 1",
            INSTALLED_APP_SELECT
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(installed_app_from_row).transpose()
    }

    async fn find_by_git_hash(&self, git_hash: &str) -> Result<Option<InstalledApp>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"{} WHERE a.id = (
                SELECT v.installed_app_id
                FROM installed_app_version_history h
                JOIN installed_app_versions v ON v.id = h.installed_app_version_id
                WHERE h.git_hash = $1
                ORDER BY h.id DESC LIMIT 1
            )"#,
            INSTALLED_APP_SELECT
        ))
        .bind(git_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(installed_app_from_row).transpose()
    }

    async fn find_by_version_id(&self, installed_app_version_id: i64) -> Result<Option<InstalledApp>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{} WHERE a.id = (SELECT installed_app_id FROM installed_app_versions WHERE id = $1)",
            INSTALLED_APP_SELECT
        ))
        .bind(installed_app_version_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(installed_app_from_row).transpose()
    }
}

pub struct PostgresCiArtifactRepository {
    pool: PgPool,
}

impl PostgresCiArtifactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CiArtifactRepository for PostgresCiArtifactRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<CiArtifact>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, pipeline_id, image, image_digest, data_source
            FROM ci_artifact
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(CiArtifact {
            id: row.try_get("id")?,
            pipeline_id: row.try_get("pipeline_id")?,
            image: row.try_get("image")?,
            image_digest: row.try_get("image_digest")?,
            data_source: row.try_get("data_source")?,
        }))
    }

    async fn update_data_source(&self, id: i64, data_source: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE ci_artifact SET data_source = $2 WHERE id = $1")
            .bind(id)
            .bind(data_source)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
