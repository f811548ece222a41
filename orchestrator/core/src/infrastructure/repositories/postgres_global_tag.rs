// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::global_tag::GlobalTag;
use crate::domain::repository::{GlobalTagRepository, RepositoryError};

const COLUMNS: &str = "id, key, mandatory_project_ids_csv, propagate, description, active, \
     created_by, created_on, updated_by, updated_on";

fn from_row(row: &PgRow) -> Result<GlobalTag, RepositoryError> {
    Ok(GlobalTag {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        mandatory_project_ids_csv: row.try_get("mandatory_project_ids_csv")?,
        propagate: row.try_get("propagate")?,
        description: row.try_get("description")?,
        active: row.try_get("active")?,
        created_by: row.try_get("created_by")?,
        created_on: row.try_get("created_on")?,
        updated_by: row.try_get("updated_by")?,
        updated_on: row.try_get("updated_on")?,
    })
}

pub struct PostgresGlobalTagRepository {
    pool: PgPool,
}

impl PostgresGlobalTagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GlobalTagRepository for PostgresGlobalTagRepository {
    async fn find_all_active(&self) -> Result<Vec<GlobalTag>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM global_tag WHERE active = true ORDER BY id",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(from_row).collect()
    }

    async fn find_active_by_id(&self, id: i64) -> Result<Option<GlobalTag>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM global_tag WHERE id = $1 AND active = true",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(from_row).transpose()
    }

    async fn find_active_by_ids(&self, ids: &[i64]) -> Result<Vec<GlobalTag>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM global_tag WHERE id = ANY($1) AND active = true ORDER BY id",
            COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(from_row).collect()
    }

    async fn find_active_by_keys(&self, keys: &[String]) -> Result<Vec<GlobalTag>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM global_tag WHERE key = ANY($1) AND active = true ORDER BY id",
            COLUMNS
        ))
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(from_row).collect()
    }

    async fn create_all(&self, tags: &[GlobalTag]) -> Result<Vec<GlobalTag>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(tags.len());

        for tag in tags {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO global_tag (key, mandatory_project_ids_csv, propagate, description, active,
                                        created_by, created_on, updated_by, updated_on)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id
                "#,
            )
            .bind(&tag.key)
            .bind(&tag.mandatory_project_ids_csv)
            .bind(tag.propagate)
            .bind(&tag.description)
            .bind(tag.active)
            .bind(tag.created_by)
            .bind(tag.created_on)
            .bind(tag.updated_by)
            .bind(tag.updated_on)
            .fetch_one(&mut *tx)
            .await?;

            let mut tag = tag.clone();
            tag.id = id;
            created.push(tag);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update_all(&self, tags: &[GlobalTag]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for tag in tags {
            let result = sqlx::query(
                r#"
                UPDATE global_tag
                SET key = $2, mandatory_project_ids_csv = $3, propagate = $4, description = $5,
                    active = $6, updated_by = $7, updated_on = $8
                WHERE id = $1
                "#,
            )
            .bind(tag.id)
            .bind(&tag.key)
            .bind(&tag.mandatory_project_ids_csv)
            .bind(tag.propagate)
            .bind(&tag.description)
            .bind(tag.active)
            .bind(tag.updated_by)
            .bind(tag.updated_on)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(format!("global_tag {}", tag.id)));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn deactivate_all(&self, ids: &[i64], user_id: i32) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE global_tag
            SET active = false, updated_by = $2, updated_on = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
