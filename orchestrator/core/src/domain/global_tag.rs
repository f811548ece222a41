// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Global tags and mandatory label rules
//!
//! A global tag may be declared mandatory for a set of projects through a CSV
//! of project ids; the literal `-1` means every project. Tags flagged
//! `propagate` are copied onto Kubernetes resources, so their key must be a
//! valid Kubernetes label key.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Pure rules used by `GlobalTagService` and the label writers

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// CSV token meaning "mandatory for all projects".
pub const ALL_PROJECTS: &str = "-1";

const QUALIFIED_NAME_MAX_LEN: usize = 63;
const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;

static QUALIFIED_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").unwrap());
static DNS1123_SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTag {
    pub id: i64,
    pub key: String,
    pub mandatory_project_ids_csv: String,
    pub propagate: bool,
    pub description: String,
    pub active: bool,
    pub created_by: i32,
    pub created_on: DateTime<Utc>,
    pub updated_by: i32,
    pub updated_on: DateTime<Utc>,
}

impl GlobalTag {
    pub fn is_mandatory_for_project(&self, project_id: i64) -> bool {
        is_mandatory_for_project(&self.mandatory_project_ids_csv, project_id)
    }
}

/// API view of a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTagDto {
    pub id: i64,
    pub key: String,
    pub mandatory_project_ids_csv: String,
    pub propagate: bool,
    pub description: String,
    pub created_on_in_ms: i64,
    pub updated_on_in_ms: Option<i64>,
}

impl From<&GlobalTag> for GlobalTagDto {
    fn from(tag: &GlobalTag) -> Self {
        Self {
            id: tag.id,
            key: tag.key.clone(),
            mandatory_project_ids_csv: tag.mandatory_project_ids_csv.clone(),
            propagate: tag.propagate,
            description: tag.description.clone(),
            created_on_in_ms: tag.created_on.timestamp_millis(),
            updated_on_in_ms: Some(tag.updated_on.timestamp_millis()),
        }
    }
}

/// Tag as seen from one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTagDtoForProject {
    pub key: String,
    pub description: String,
    pub is_mandatory: bool,
    pub propagate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGlobalTagDto {
    pub key: String,
    #[serde(default)]
    pub mandatory_project_ids_csv: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub propagate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGlobalTagsRequest {
    pub tags: Vec<CreateGlobalTagDto>,
    #[serde(default)]
    pub user_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGlobalTagDto {
    pub id: i64,
    pub key: String,
    #[serde(default)]
    pub mandatory_project_ids_csv: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub propagate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGlobalTagsRequest {
    pub tags: Vec<UpdateGlobalTagDto>,
    #[serde(default)]
    pub user_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteGlobalTagsRequest {
    pub ids: Vec<i64>,
    #[serde(default)]
    pub user_id: i32,
}

/// `true` iff the CSV names every project (`-1`) or `project_id` itself.
pub fn is_mandatory_for_project(mandatory_project_ids_csv: &str, project_id: i64) -> bool {
    let project = project_id.to_string();
    mandatory_project_ids_csv
        .split(',')
        .map(str::trim)
        .any(|token| token == ALL_PROJECTS || token == project)
}

/// Keys of the mandatory tags that are absent or empty in `labels`, in tag
/// order. An empty result means the labels satisfy the project's rules.
pub fn missing_mandatory_labels(
    tags: &[GlobalTag],
    project_id: i64,
    labels: &HashMap<String, String>,
) -> Vec<String> {
    tags.iter()
        .filter(|tag| tag.is_mandatory_for_project(project_id))
        .filter(|tag| labels.get(&tag.key).map_or(true, |v| v.is_empty()))
        .map(|tag| tag.key.clone())
        .collect()
}

/// Kubernetes qualified-name check for label keys
/// (`[prefix/]name`, prefix a DNS-1123 subdomain). Returns the violations.
pub fn qualified_name_violations(key: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let parts: Vec<&str> = key.split('/').collect();
    let name = match parts.as_slice() {
        [name] => *name,
        [prefix, name] => {
            if prefix.is_empty() {
                errors.push("prefix part must be non-empty".to_string());
            } else {
                if prefix.len() > DNS1123_SUBDOMAIN_MAX_LEN {
                    errors.push(format!(
                        "prefix part must be no more than {} characters",
                        DNS1123_SUBDOMAIN_MAX_LEN
                    ));
                }
                if !DNS1123_SUBDOMAIN_REGEX.is_match(prefix) {
                    errors.push("prefix part must be a lowercase RFC 1123 subdomain".to_string());
                }
            }
            *name
        }
        _ => {
            errors.push("a qualified name must consist of an optional prefix and a name separated by '/'".to_string());
            return errors;
        }
    };

    if name.is_empty() {
        errors.push("name part must be non-empty".to_string());
    } else {
        if name.len() > QUALIFIED_NAME_MAX_LEN {
            errors.push(format!("name part must be no more than {} characters", QUALIFIED_NAME_MAX_LEN));
        }
        if !QUALIFIED_NAME_REGEX.is_match(name) {
            errors.push(
                "name part must consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character"
                    .to_string(),
            );
        }
    }
    errors
}

pub fn is_valid_label_key(key: &str) -> bool {
    qualified_name_violations(key).is_empty()
}
