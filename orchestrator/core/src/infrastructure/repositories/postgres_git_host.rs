// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::git_host::{GitHost, SecretValidationType};
use crate::domain::repository::{GitHostRepository, RepositoryError};

pub struct PostgresGitHostRepository {
    pool: PgPool,
}

impl PostgresGitHostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GitHostRepository for PostgresGitHostRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<GitHost>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, webhook_url, webhook_secret, secret_header, secret_validation_type,
                   event_type_header, active
            FROM git_host
            WHERE id = $1 AND active = true
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let validation: String = row.try_get("secret_validation_type")?;
        Ok(Some(GitHost {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            webhook_url: row.try_get("webhook_url")?,
            webhook_secret: row.try_get("webhook_secret")?,
            secret_header: row.try_get("secret_header")?,
            secret_validation_type: SecretValidationType::parse(&validation),
            event_type_header: row.try_get("event_type_header")?,
            active: row.try_get("active")?,
        }))
    }
}
