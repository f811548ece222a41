// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Global Tag Service
//!
//! CRUD for global tags and the mandatory-label check applied when an app is
//! created or its labels change.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Validate tag writes and evaluate project label rules
//! - **Collaborators:**
//!   - Domain: `GlobalTag`, `missing_mandatory_labels`, `qualified_name_violations`
//!   - Infrastructure: `GlobalTagRepository`
//!
//! Every multi-tag write is validated up front and persisted in one repository
//! call, so a request either applies completely or not at all.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::global_tag::{
    missing_mandatory_labels, qualified_name_violations, CreateGlobalTagsRequest, DeleteGlobalTagsRequest,
    GlobalTag, GlobalTagDto, GlobalTagDtoForProject, UpdateGlobalTagsRequest,
};
use crate::domain::repository::{GlobalTagRepository, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum GlobalTagError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn empty_key() -> GlobalTagError {
    GlobalTagError::Validation("Validation error - empty key found in the request".to_string())
}

fn duplicate_in_request(key: &str) -> GlobalTagError {
    GlobalTagError::Validation(format!("Validation error - Duplicate tag - {} found in request", key))
}

fn invalid_label_key(key: &str) -> GlobalTagError {
    GlobalTagError::Validation(format!(
        "Validation error - tag - {} is not satisfying the label key criteria",
        key
    ))
}

fn already_exists(key: &str) -> GlobalTagError {
    GlobalTagError::Validation(format!("Validation error - tag - {} already exists", key))
}

fn check_label_key(key: &str) -> Result<(), GlobalTagError> {
    let violations = qualified_name_violations(key);
    if violations.is_empty() {
        return Ok(());
    }
    error!(key, errors = ?violations, "Tag key is not a valid label key");
    Err(invalid_label_key(key))
}

#[async_trait]
pub trait GlobalTagService: Send + Sync {
    async fn get_all_active_tags(&self) -> Result<Vec<GlobalTagDto>, GlobalTagError>;

    async fn get_active_tag_by_id(&self, id: i64) -> Result<GlobalTagDto, GlobalTagError>;

    async fn get_all_active_tags_for_project(
        &self,
        project_id: i64,
    ) -> Result<Vec<GlobalTagDtoForProject>, GlobalTagError>;

    async fn create_tags(&self, request: &CreateGlobalTagsRequest, user_id: i32) -> Result<(), GlobalTagError>;

    async fn update_tags(&self, request: &UpdateGlobalTagsRequest, user_id: i32) -> Result<(), GlobalTagError>;

    async fn delete_tags(&self, request: &DeleteGlobalTagsRequest, user_id: i32) -> Result<(), GlobalTagError>;

    /// Fails listing the keys of mandatory tags missing from `labels`.
    async fn validate_mandatory_labels_for_project(
        &self,
        project_id: i64,
        labels: &HashMap<String, String>,
    ) -> Result<(), GlobalTagError>;
}

pub struct StandardGlobalTagService {
    repository: Arc<dyn GlobalTagRepository>,
}

impl StandardGlobalTagService {
    pub fn new(repository: Arc<dyn GlobalTagRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl GlobalTagService for StandardGlobalTagService {
    async fn get_all_active_tags(&self) -> Result<Vec<GlobalTagDto>, GlobalTagError> {
        let tags = self.repository.find_all_active().await?;
        Ok(tags.iter().map(GlobalTagDto::from).collect())
    }

    async fn get_active_tag_by_id(&self, id: i64) -> Result<GlobalTagDto, GlobalTagError> {
        match self.repository.find_active_by_id(id).await? {
            Some(tag) => Ok(GlobalTagDto::from(&tag)),
            None => Err(GlobalTagError::NotFound(format!("Global tag not found for tagId - {}", id))),
        }
    }

    async fn get_all_active_tags_for_project(
        &self,
        project_id: i64,
    ) -> Result<Vec<GlobalTagDtoForProject>, GlobalTagError> {
        let tags = self.repository.find_all_active().await?;
        Ok(tags
            .iter()
            .map(|tag| GlobalTagDtoForProject {
                key: tag.key.clone(),
                description: tag.description.clone(),
                is_mandatory: tag.is_mandatory_for_project(project_id),
                propagate: tag.propagate,
            })
            .collect())
    }

    async fn create_tags(&self, request: &CreateGlobalTagsRequest, user_id: i32) -> Result<(), GlobalTagError> {
        info!(count = request.tags.len(), user_id, "Creating global tags");

        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(request.tags.len());
        for tag in &request.tags {
            let key = tag.key.trim();
            if key.is_empty() {
                return Err(empty_key());
            }
            if !seen.insert(key.to_string()) {
                return Err(duplicate_in_request(key));
            }
            if tag.propagate {
                check_label_key(key)?;
            }
            keys.push(key.to_string());
        }

        if let Some(existing) = self.repository.find_active_by_keys(&keys).await?.first() {
            return Err(already_exists(&existing.key));
        }

        let now = Utc::now();
        let rows: Vec<GlobalTag> = request
            .tags
            .iter()
            .zip(keys)
            .map(|(tag, key)| GlobalTag {
                id: 0,
                key,
                mandatory_project_ids_csv: tag.mandatory_project_ids_csv.clone(),
                propagate: tag.propagate,
                description: tag.description.clone(),
                active: true,
                created_by: user_id,
                created_on: now,
                updated_by: user_id,
                updated_on: now,
            })
            .collect();

        self.repository.create_all(&rows).await?;
        Ok(())
    }

    async fn update_tags(&self, request: &UpdateGlobalTagsRequest, user_id: i32) -> Result<(), GlobalTagError> {
        info!(count = request.tags.len(), user_id, "Updating global tags");

        let now = Utc::now();
        let mut rows = Vec::with_capacity(request.tags.len());
        let mut seen = HashSet::new();
        for tag in &request.tags {
            let key = tag.key.trim();
            if key.is_empty() {
                return Err(empty_key());
            }
            if !seen.insert(key.to_string()) {
                return Err(duplicate_in_request(key));
            }

            let mut stored = self
                .repository
                .find_active_by_id(tag.id)
                .await?
                .ok_or_else(|| GlobalTagError::NotFound(format!("Global tag not found for tagId - {}", tag.id)))?;

            if tag.propagate {
                check_label_key(key)?;
            }

            if stored.key != key {
                let collision = self
                    .repository
                    .find_active_by_keys(&[key.to_string()])
                    .await?
                    .into_iter()
                    .any(|other| other.id != tag.id);
                if collision {
                    return Err(already_exists(key));
                }
            }

            stored.key = key.to_string();
            stored.description = tag.description.clone();
            stored.mandatory_project_ids_csv = tag.mandatory_project_ids_csv.clone();
            stored.propagate = tag.propagate;
            stored.updated_by = user_id;
            stored.updated_on = now;
            rows.push(stored);
        }

        self.repository.update_all(&rows).await?;
        Ok(())
    }

    async fn delete_tags(&self, request: &DeleteGlobalTagsRequest, user_id: i32) -> Result<(), GlobalTagError> {
        info!(ids = ?request.ids, user_id, "Deleting global tags");

        let found = self.repository.find_active_by_ids(&request.ids).await?;
        let found_ids: HashSet<i64> = found.iter().map(|t| t.id).collect();
        if let Some(missing) = request.ids.iter().find(|id| !found_ids.contains(id)) {
            return Err(GlobalTagError::NotFound(format!("Global tag not found for tagId - {}", missing)));
        }

        self.repository.deactivate_all(&request.ids, user_id).await?;
        Ok(())
    }

    async fn validate_mandatory_labels_for_project(
        &self,
        project_id: i64,
        labels: &HashMap<String, String>,
    ) -> Result<(), GlobalTagError> {
        let tags = self.repository.find_all_active().await?;
        let missing = missing_mandatory_labels(&tags, project_id, labels);
        if missing.is_empty() {
            return Ok(());
        }
        error!(project_id, missing = ?missing, "Mandatory labels missing");
        Err(GlobalTagError::Validation(format!(
            "Validation error - mandatory tags {} not found",
            missing.join(", ")
        )))
    }
}
