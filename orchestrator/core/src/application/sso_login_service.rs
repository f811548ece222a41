// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SSO Login Service
//!
//! Creates and updates the single active Dex connector.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Keep `sso_login_config`, the authorisation config and
//!   the in-cluster Dex secret in step
//! - **Collaborators:**
//!   - Domain: `SsoLoginConfig`, `preserve_credentials`, `mask_credentials`
//!   - Infrastructure: `SsoLoginRepository`, `SecretStore`
//!   - Application: `AuthConfigService`, `OidcConfigListener`
//!
//! # Write flow
//!
//! 1. Deactivate the currently active row when it is a different row
//! 2. Persist the row (and the requested auth config type) in one transaction
//! 3. Before commit, rewrite `dex.config` and `url` in the Dex secret,
//!    retrying on conflicts; exhausting the retries rolls everything back
//! 4. After commit, invalidate the OIDC client and reload the auth cache

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::auth_config_service::{parse_config_types, AuthConfigError, AuthConfigService};
use crate::domain::config::DexConfig;
use crate::domain::ports::{OidcConfigListener, SecretStore, SecretStoreError};
use crate::domain::repository::{
    AuthConfigWrite, RepositoryError, SsoLoginRepository, SsoLoginWrite, SsoTransactionError,
};
use crate::domain::sso::{
    dex_connectors_yaml, mask_credentials, preserve_credentials, SsoLoginConfig, SsoLoginDto, DEX_CONFIG_KEY,
    DEX_URL_KEY,
};

/// Attempts at writing the Dex secret before the SSO write is abandoned.
pub const DEX_UPDATE_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SsoError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("resource version not matched with config map attempted 3 times")]
    DexUpdateExhausted,

    #[error("dex secret error: {0}")]
    SecretStore(SecretStoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<AuthConfigError> for SsoError {
    fn from(err: AuthConfigError) -> Self {
        match err {
            AuthConfigError::Validation(msg) => SsoError::Validation(msg),
            AuthConfigError::Repository(e) => SsoError::Repository(e),
        }
    }
}

impl From<SsoTransactionError> for SsoError {
    fn from(err: SsoTransactionError) -> Self {
        match err {
            SsoTransactionError::Repository(e) => SsoError::Repository(e),
            SsoTransactionError::SecretStore(SecretStoreError::Conflict(_)) => SsoError::DexUpdateExhausted,
            SsoTransactionError::SecretStore(e) => SsoError::SecretStore(e),
        }
    }
}

/// Writes the active connector into the Dex secret.
pub struct DexSecretWriter {
    store: Arc<dyn SecretStore>,
    namespace: String,
    secret_name: String,
}

impl DexSecretWriter {
    pub fn new(store: Arc<dyn SecretStore>, config: &DexConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
            secret_name: config.secret_name.clone(),
        }
    }

    /// Read-modify-write of the secret, re-reading after every failed update.
    /// Fails with `Conflict` once [`DEX_UPDATE_ATTEMPTS`] updates failed.
    pub async fn apply(&self, connector: &Value, url: &str) -> Result<(), SecretStoreError> {
        let dex_config = dex_connectors_yaml(connector).map_err(|e| SecretStoreError::Decode(e.to_string()))?;

        for attempt in 1..=DEX_UPDATE_ATTEMPTS {
            let mut secret = self.store.get_secret(&self.namespace, &self.secret_name).await?;
            secret.data.insert(DEX_CONFIG_KEY.to_string(), dex_config.clone());
            secret.data.insert(DEX_URL_KEY.to_string(), url.to_string());

            match self.store.update_secret(&secret).await {
                Ok(_) => {
                    debug!(attempt, "Dex secret updated for sso config");
                    return Ok(());
                }
                Err(e) => warn!(attempt, error = %e, "Dex secret update failed for sso config"),
            }
        }

        Err(SecretStoreError::Conflict(format!("{}/{}", self.namespace, self.secret_name)))
    }
}

#[async_trait]
pub trait SsoLoginService: Send + Sync {
    async fn create_sso_login(&self, request: &SsoLoginDto) -> Result<SsoLoginDto, SsoError>;

    async fn update_sso_login(&self, request: &SsoLoginDto) -> Result<SsoLoginDto, SsoError>;

    /// Full config, credentials included.
    async fn get_by_id(&self, id: i64) -> Result<SsoLoginDto, SsoError>;

    /// All rows without their connector config.
    async fn get_all(&self) -> Result<Vec<SsoLoginDto>, SsoError>;

    /// Config with `clientID`/`clientSecret` blanked.
    async fn get_by_name(&self, name: &str) -> Result<SsoLoginDto, SsoError>;
}

pub struct StandardSsoLoginService {
    repository: Arc<dyn SsoLoginRepository>,
    auth_config_service: Arc<dyn AuthConfigService>,
    dex: DexSecretWriter,
    oidc_listener: Arc<dyn OidcConfigListener>,
}

impl StandardSsoLoginService {
    pub fn new(
        repository: Arc<dyn SsoLoginRepository>,
        auth_config_service: Arc<dyn AuthConfigService>,
        dex: DexSecretWriter,
        oidc_listener: Arc<dyn OidcConfigListener>,
    ) -> Self {
        Self {
            repository,
            auth_config_service,
            dex,
            oidc_listener,
        }
    }

    fn auth_config_write(request: &SsoLoginDto) -> Result<Option<AuthConfigWrite>, SsoError> {
        match request.global_auth_config_type.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Ok(Some(AuthConfigWrite {
                config_types: parse_config_types(&[raw.to_string()])?,
                user_id: request.user_id,
            })),
            _ => Ok(None),
        }
    }

    async fn persist(&self, write: SsoLoginWrite, connector: &Value, url: &str) -> Result<SsoLoginConfig, SsoError> {
        let hook = Box::pin(self.dex.apply(connector, url));
        let saved = self.repository.save(write, hook).await?;
        self.after_commit().await;
        Ok(saved)
    }

    async fn after_commit(&self) {
        if let Err(e) = self.oidc_listener.on_config_change().await {
            warn!(error = %e, "Failed to invalidate OIDC client after sso change");
        }
        if let Err(e) = self.auth_config_service.reload_cache().await {
            error!(error = %e, "Failed to reload authorisation config cache after sso change");
        }
    }
}

fn validate_connector(config: &Value) -> Result<(), SsoError> {
    if config.is_object() {
        Ok(())
    } else {
        Err(SsoError::Validation("sso config must be a JSON object".to_string()))
    }
}

fn parse_stored(row: &SsoLoginConfig) -> Value {
    serde_json::from_str(&row.config).unwrap_or_else(|e| {
        warn!(sso_id = row.id, error = %e, "Stored sso config is not valid JSON");
        Value::Null
    })
}

fn to_dto(row: &SsoLoginConfig, config: Value) -> SsoLoginDto {
    SsoLoginDto {
        id: row.id,
        name: row.name.clone(),
        label: row.label.clone(),
        url: row.url.clone(),
        config,
        active: row.active,
        user_id: 0,
        global_auth_config_type: None,
    }
}

#[async_trait]
impl SsoLoginService for StandardSsoLoginService {
    async fn create_sso_login(&self, request: &SsoLoginDto) -> Result<SsoLoginDto, SsoError> {
        if request.name.trim().is_empty() {
            return Err(SsoError::Validation("sso name is required".to_string()));
        }
        validate_connector(&request.config)?;
        let auth_config = Self::auth_config_write(request)?;

        let deactivate_id = self.repository.find_active().await?.map(|active| active.id);
        let now = Utc::now();
        let row = SsoLoginConfig {
            id: 0,
            name: request.name.clone(),
            label: request.label.clone(),
            url: request.url.clone(),
            config: request.config.to_string(),
            active: true,
            created_by: request.user_id,
            created_on: now,
            updated_by: request.user_id,
            updated_on: now,
        };

        let saved = self
            .persist(
                SsoLoginWrite {
                    deactivate_id,
                    config: row,
                    auth_config,
                },
                &request.config,
                &request.url,
            )
            .await?;

        info!(sso_id = saved.id, name = %saved.name, user_id = request.user_id, "SSO login config created");
        Ok(to_dto(&saved, request.config.clone()))
    }

    async fn update_sso_login(&self, request: &SsoLoginDto) -> Result<SsoLoginDto, SsoError> {
        validate_connector(&request.config)?;
        let auth_config = Self::auth_config_write(request)?;

        let mut row = self
            .repository
            .find_by_id(request.id)
            .await?
            .ok_or_else(|| SsoError::NotFound(format!("sso config not found for id {}", request.id)))?;

        let deactivate_id = self
            .repository
            .find_active()
            .await?
            .map(|active| active.id)
            .filter(|id| *id != row.id);

        let mut merged = request.config.clone();
        preserve_credentials(&mut merged, &parse_stored(&row));

        row.label = request.label.clone();
        row.url = request.url.clone();
        row.config = merged.to_string();
        row.active = true;
        row.updated_by = request.user_id;
        row.updated_on = Utc::now();

        let saved = self
            .persist(
                SsoLoginWrite {
                    deactivate_id,
                    config: row,
                    auth_config,
                },
                &merged,
                &request.url,
            )
            .await?;

        info!(sso_id = saved.id, user_id = request.user_id, "SSO login config updated");
        Ok(to_dto(&saved, merged))
    }

    async fn get_by_id(&self, id: i64) -> Result<SsoLoginDto, SsoError> {
        let row = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| SsoError::NotFound(format!("sso config not found for id {}", id)))?;
        Ok(to_dto(&row, parse_stored(&row)))
    }

    async fn get_all(&self) -> Result<Vec<SsoLoginDto>, SsoError> {
        let rows = self.repository.find_all().await?;
        Ok(rows.iter().map(|row| to_dto(row, Value::Null)).collect())
    }

    async fn get_by_name(&self, name: &str) -> Result<SsoLoginDto, SsoError> {
        let row = self
            .repository
            .find_by_name(name)
            .await?
            .ok_or_else(|| SsoError::NotFound(format!("sso config not found for name {}", name)))?;
        let mut config = parse_stored(&row);
        mask_credentials(&mut config);
        Ok(to_dto(&row, config))
    }
}
