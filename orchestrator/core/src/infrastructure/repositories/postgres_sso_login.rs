// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use super::postgres_auth_config::replace_active_set_in_tx;
use crate::domain::repository::{
    BeforeCommit, RepositoryError, SsoLoginRepository, SsoLoginWrite, SsoTransactionError,
};
use crate::domain::sso::SsoLoginConfig;

const COLUMNS: &str = "id, name, label, url, config, active, created_by, created_on, updated_by, updated_on";

fn from_row(row: &PgRow) -> Result<SsoLoginConfig, RepositoryError> {
    Ok(SsoLoginConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        label: row.try_get("label")?,
        url: row.try_get("url")?,
        config: row.try_get("config")?,
        active: row.try_get("active")?,
        created_by: row.try_get("created_by")?,
        created_on: row.try_get("created_on")?,
        updated_by: row.try_get("updated_by")?,
        updated_on: row.try_get("updated_on")?,
    })
}

pub struct PostgresSsoLoginRepository {
    pool: PgPool,
}

impl PostgresSsoLoginRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SsoLoginRepository for PostgresSsoLoginRepository {
    async fn find_active(&self) -> Result<Option<SsoLoginConfig>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sso_login_config WHERE active = true ORDER BY id DESC LIMIT 1",
            COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(from_row).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SsoLoginConfig>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM sso_login_config WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<SsoLoginConfig>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sso_login_config WHERE name = $1 ORDER BY active DESC, id DESC LIMIT 1",
            COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(from_row).transpose()
    }

    async fn find_all(&self) -> Result<Vec<SsoLoginConfig>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {} FROM sso_login_config ORDER BY id", COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(from_row).collect()
    }

    async fn save(
        &self,
        write: SsoLoginWrite,
        before_commit: BeforeCommit<'_>,
    ) -> Result<SsoLoginConfig, SsoTransactionError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let config = write.config;

        if let Some(previous) = write.deactivate_id {
            sqlx::query(
                r#"
                UPDATE sso_login_config
                SET active = false, updated_by = $2, updated_on = $3
                WHERE id = $1
                "#,
            )
            .bind(previous)
            .bind(config.updated_by)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }

        let mut saved = config.clone();
        if config.id == 0 {
            saved.id = sqlx::query_scalar(
                r#"
                INSERT INTO sso_login_config (name, label, url, config, active, created_by, created_on, updated_by, updated_on)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id
                "#,
            )
            .bind(&config.name)
            .bind(&config.label)
            .bind(&config.url)
            .bind(&config.config)
            .bind(config.active)
            .bind(config.created_by)
            .bind(config.created_on)
            .bind(config.updated_by)
            .bind(config.updated_on)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        } else {
            let result = sqlx::query(
                r#"
                UPDATE sso_login_config
                SET label = $2, url = $3, config = $4, active = $5, updated_by = $6, updated_on = $7
                WHERE id = $1
                "#,
            )
            .bind(config.id)
            .bind(&config.label)
            .bind(&config.url)
            .bind(&config.config)
            .bind(config.active)
            .bind(config.updated_by)
            .bind(config.updated_on)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(format!("sso_login_config {}", config.id)).into());
            }
        }

        if let Some(auth) = &write.auth_config {
            replace_active_set_in_tx(&mut tx, &auth.config_types, auth.user_id).await?;
        }

        before_commit.await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(saved)
    }
}
