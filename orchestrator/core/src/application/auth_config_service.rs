// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Global Authorisation Config Service
//!
//! Owns the set of active authorisation modes and an in-process cache of it.
//! Login-time role resolution and the enforcer read the cache on every
//! request, so lookups never touch the database.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Replace the active config set and keep the cache coherent
//! - **Collaborators:**
//!   - Domain: `AuthConfigType`, `AuthConfigRepository`
//!
//! # Cache consistency
//!
//! The cache is an `Arc<HashMap<..>>` behind a lock. A reload builds the new
//! map completely and swaps the pointer, so readers observe either the
//! pre-write or the post-commit set. A failed reload keeps the old map.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::auth_config::{AuthConfigType, GlobalAuthorisationConfigResponse};
use crate::domain::repository::{AuthConfigRepository, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum AuthConfigError {
    #[error("Validation error - {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Parses and de-duplicates the requested config types.
pub fn parse_config_types(config_types: &[String]) -> Result<Vec<AuthConfigType>, AuthConfigError> {
    if config_types.is_empty() {
        return Err(AuthConfigError::Validation("no config type found in the request".to_string()));
    }
    let mut parsed = BTreeSet::new();
    for raw in config_types {
        let config_type = raw
            .trim()
            .parse::<AuthConfigType>()
            .map_err(|e| AuthConfigError::Validation(e.to_string()))?;
        parsed.insert(config_type);
    }
    Ok(parsed.into_iter().collect())
}

#[async_trait]
pub trait AuthConfigService: Send + Sync {
    /// Activates exactly `config_types`, deactivates the rest and reloads the
    /// cache.
    async fn create_or_update_global_auth_config(
        &self,
        config_types: &[String],
        user_id: i32,
    ) -> Result<Vec<GlobalAuthorisationConfigResponse>, AuthConfigError>;

    async fn get_all_active_configs(&self) -> Result<Vec<GlobalAuthorisationConfigResponse>, AuthConfigError>;

    fn is_group_claims_config_active(&self) -> bool;

    fn is_devtron_system_managed_config_active(&self) -> bool;

    fn is_devtron_self_registered_group_config_active(&self) -> bool;

    async fn reload_cache(&self) -> Result<(), AuthConfigError>;
}

pub struct StandardAuthConfigService {
    repository: Arc<dyn AuthConfigRepository>,
    cache: RwLock<Arc<HashMap<AuthConfigType, bool>>>,
}

impl StandardAuthConfigService {
    pub fn new(repository: Arc<dyn AuthConfigRepository>) -> Self {
        Self {
            repository,
            cache: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Current cache contents.
    pub fn snapshot(&self) -> Arc<HashMap<AuthConfigType, bool>> {
        self.cache.read().clone()
    }

    fn is_active(&self, config_type: AuthConfigType) -> bool {
        self.snapshot().get(&config_type).copied().unwrap_or(false)
    }

    /// Reload after a committed write. Failures are logged and the previous
    /// cache is kept; the write itself already succeeded.
    pub async fn reload_after_write(&self) {
        if let Err(e) = self.reload_cache().await {
            error!(error = %e, "Failed to reload global authorisation config cache, keeping previous state");
        }
    }
}

#[async_trait]
impl AuthConfigService for StandardAuthConfigService {
    async fn create_or_update_global_auth_config(
        &self,
        config_types: &[String],
        user_id: i32,
    ) -> Result<Vec<GlobalAuthorisationConfigResponse>, AuthConfigError> {
        let config_types = parse_config_types(config_types)?;
        let active = self.repository.replace_active_set(&config_types, user_id).await?;

        info!(
            config_types = ?config_types.iter().map(AuthConfigType::as_str).collect::<Vec<_>>(),
            user_id,
            "Global authorisation config updated"
        );
        self.reload_after_write().await;

        Ok(active.iter().map(GlobalAuthorisationConfigResponse::from).collect())
    }

    async fn get_all_active_configs(&self) -> Result<Vec<GlobalAuthorisationConfigResponse>, AuthConfigError> {
        let active = self.repository.find_active().await?;
        Ok(active.iter().map(GlobalAuthorisationConfigResponse::from).collect())
    }

    fn is_group_claims_config_active(&self) -> bool {
        self.is_active(AuthConfigType::GroupClaims)
    }

    fn is_devtron_system_managed_config_active(&self) -> bool {
        self.is_active(AuthConfigType::DevtronSystemManaged)
    }

    fn is_devtron_self_registered_group_config_active(&self) -> bool {
        self.is_active(AuthConfigType::DevtronSelfRegisteredGroup)
    }

    async fn reload_cache(&self) -> Result<(), AuthConfigError> {
        let active = self.repository.find_active().await?;
        let next: HashMap<AuthConfigType, bool> =
            active.into_iter().map(|row| (row.config_type, row.active)).collect();
        *self.cache.write() = Arc::new(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth_config::GlobalAuthorisationConfig;
    use crate::infrastructure::repositories::InMemoryAuthConfigRepository;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Repository whose reads can be switched to fail.
    struct FlakyAuthConfigRepository {
        inner: InMemoryAuthConfigRepository,
        fail_reads: AtomicBool,
    }

    #[async_trait]
    impl AuthConfigRepository for FlakyAuthConfigRepository {
        async fn find_active(&self) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(RepositoryError::Database("connection reset".to_string()));
            }
            self.inner.find_active().await
        }

        async fn replace_active_set(
            &self,
            config_types: &[AuthConfigType],
            user_id: i32,
        ) -> Result<Vec<GlobalAuthorisationConfig>, RepositoryError> {
            self.inner.replace_active_set(config_types, user_id).await
        }
    }

    fn types(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_write_replaces_active_set_and_cache() {
        let service = StandardAuthConfigService::new(Arc::new(InMemoryAuthConfigRepository::new()));

        service
            .create_or_update_global_auth_config(&types(&["devtron-system-managed"]), 1)
            .await
            .unwrap();
        assert!(service.is_devtron_system_managed_config_active());
        assert!(!service.is_group_claims_config_active());

        let active = service
            .create_or_update_global_auth_config(&types(&["group-claims"]), 1)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].config_type, AuthConfigType::GroupClaims);
        assert!(service.is_group_claims_config_active());
        assert!(!service.is_devtron_system_managed_config_active());
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let service = StandardAuthConfigService::new(Arc::new(InMemoryAuthConfigRepository::new()));
        assert!(matches!(
            service.create_or_update_global_auth_config(&[], 1).await,
            Err(AuthConfigError::Validation(_))
        ));
        assert!(matches!(
            service.create_or_update_global_auth_config(&types(&["ldap"]), 1).await,
            Err(AuthConfigError::Validation(_))
        ));
        assert!(service.get_all_active_configs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_cache() {
        let repository = Arc::new(FlakyAuthConfigRepository {
            inner: InMemoryAuthConfigRepository::new(),
            fail_reads: AtomicBool::new(false),
        });
        let service = StandardAuthConfigService::new(repository.clone());
        service
            .create_or_update_global_auth_config(&types(&["group-claims"]), 1)
            .await
            .unwrap();

        repository.fail_reads.store(true, Ordering::SeqCst);
        service
            .create_or_update_global_auth_config(&types(&["devtron-self-registered-group"]), 1)
            .await
            .unwrap();

        // the write committed but the cache still reflects the last good read
        assert!(service.is_group_claims_config_active());
        assert!(!service.is_devtron_self_registered_group_config_active());
        assert!(service.reload_cache().await.is_err());

        repository.fail_reads.store(false, Ordering::SeqCst);
        service.reload_cache().await.unwrap();
        assert!(service.is_devtron_self_registered_group_config_active());
        assert!(!service.is_group_claims_config_active());
    }

    #[test]
    fn test_parse_config_types_dedupes() {
        let parsed = parse_config_types(&types(&["group-claims", " group-claims "])).unwrap();
        assert_eq!(parsed, vec![AuthConfigType::GroupClaims]);
    }
}
