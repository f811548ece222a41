// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{PgConnection, Row};

use crate::domain::auth_config::{AuthConfigType, GlobalAuthorisationConfig};
use crate::domain::repository::{AuthConfigRepository, RepositoryError};

fn from_row(row: &PgRow) -> Result<GlobalAuthorisationConfig, RepositoryError> {
    let config_type: String = row.try_get("config_type")?;
    Ok(GlobalAuthorisationConfig {
        id: row.try_get("id")?,
        config_type: config_type
            .parse()
            .map_err(|e: crate::domain::auth_config::UnknownAuthConfigType| RepositoryError::Serialization(e.to_string()))?,
        active: row.try_get("active")?,
        created_by: row.try_get("created_by")?,
        created_on: row.try_get("created_on")?,
        updated_by: row.try_get("updated_by")?,
        updated_on: row.try_get("updated_on")?,
    })
}

/// Replaces the active set inside the caller's transaction.
///
/// Every row whose type is outside `config_types` is deactivated, existing
/// rows of the requested types are reactivated and missing types inserted.
pub(crate) async fn replace_active_set_in_tx(
    conn: &mut PgConnection,
    config_types: &[AuthConfigType],
    user_id: i32,
) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError> {
    let wanted: Vec<&str> = config_types.iter().map(AuthConfigType::as_str).collect();

    sqlx::query(
        r#"
        UPDATE global_authorisation_config
        SET active = false, updated_by = $2, updated_on = NOW()
        WHERE active = true AND NOT (config_type = ANY($1))
        "#,
    )
    .bind(&wanted)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE global_authorisation_config
        SET active = true, updated_by = $2, updated_on = NOW()
        WHERE active = false AND config_type = ANY($1)
        "#,
    )
    .bind(&wanted)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO global_authorisation_config (config_type, active, created_by, created_on, updated_by, updated_on)
        SELECT t, true, $2, NOW(), $2, NOW()
        FROM UNNEST($1::varchar[]) AS t
        WHERE NOT EXISTS (SELECT 1 FROM global_authorisation_config g WHERE g.config_type = t)
        "#,
    )
    .bind(&wanted)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    let rows = sqlx::query(
        r#"
        SELECT id, config_type, active, created_by, created_on, updated_by, updated_on
        FROM global_authorisation_config
        WHERE active = true
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(from_row).collect()
}

pub struct PostgresAuthConfigRepository {
    pool: PgPool,
}

impl PostgresAuthConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthConfigRepository for PostgresAuthConfigRepository {
    async fn find_active(&self) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, config_type, active, created_by, created_on, updated_by, updated_on
            FROM global_authorisation_config
            WHERE active = true
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(from_row).collect()
    }

    async fn replace_active_set(
        &self,
        config_types: &[AuthConfigType],
        user_id: i32,
    ) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let active = replace_active_set_in_tx(&mut tx, config_types, user_id).await?;
        tx.commit().await?;
        Ok(active)
    }
}
