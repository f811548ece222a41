// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pipeline, Installed App, Artifact and Runner read models
//!
//! The fabric does not own these tables; it reads the columns it needs to
//! route events and writes back only runner status and artifact data-source
//! migrations.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Typed inputs for event handlers and the Argo reconciler

use serde::{Deserialize, Serialize};

/// Current data source written for externally pushed images.
pub const DATA_SOURCE_WEBHOOK: &str = "EXTERNAL";
/// Deprecated spelling of [`DATA_SOURCE_WEBHOOK`], still present on old rows.
pub const DATA_SOURCE_EXT_DEPRECATED: &str = "ext";
pub const DATA_SOURCE_CI_RUNNER: &str = "CI-RUNNER";

pub const DEPLOYMENT_APP_TYPE_HELM: &str = "helm";
pub const DEPLOYMENT_APP_TYPE_ARGO_CD: &str = "argo_cd";

/// Devtron CD pipeline (subset of columns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: i64,
    pub app_id: i64,
    pub environment_id: i64,
    pub name: String,
    /// Name of the Argo CD `Application` backing this pipeline.
    pub deployment_app_name: String,
    pub deployment_app_type: String,
    pub deleted: bool,
    pub deployment_app_delete_request: bool,
}

impl Pipeline {
    pub fn is_helm_or_argo(&self) -> bool {
        self.deployment_app_type == DEPLOYMENT_APP_TYPE_HELM
            || self.deployment_app_type == DEPLOYMENT_APP_TYPE_ARGO_CD
    }
}

/// Chart-store installation tracked alongside pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    pub id: i64,
    pub app_id: i64,
    pub environment_id: i64,
    pub app_name: String,
    /// Name of the Argo CD `Application` rendered for this installation.
    pub git_ops_app_name: String,
    pub deployment_app_type: String,
    pub deployment_app_delete_request: bool,
    pub active: bool,
    pub installed_app_version_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiArtifact {
    pub id: i64,
    pub pipeline_id: i64,
    pub image: String,
    pub image_digest: String,
    pub data_source: String,
}

impl CiArtifact {
    /// Rows written with the deprecated `ext` data source must be rewritten
    /// before they are deployed.
    pub fn is_migration_required(&self) -> bool {
        self.data_source == DATA_SOURCE_EXT_DEPRECATED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowRunnerType {
    #[serde(rename = "PRE")]
    Pre,
    #[serde(rename = "DEPLOY")]
    Deploy,
    #[serde(rename = "POST")]
    Post,
}

impl WorkflowRunnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowRunnerType::Pre => "PRE",
            WorkflowRunnerType::Deploy => "DEPLOY",
            WorkflowRunnerType::Post => "POST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PRE" => Some(WorkflowRunnerType::Pre),
            "DEPLOY" => Some(WorkflowRunnerType::Deploy),
            "POST" => Some(WorkflowRunnerType::Post),
            _ => None,
        }
    }

    pub fn is_stage(&self) -> bool {
        matches!(self, WorkflowRunnerType::Pre | WorkflowRunnerType::Post)
    }
}

/// Argo workflow node phases as reported by the CI/CD runners.
pub mod runner_status {
    pub const SUCCEEDED: &str = "Succeeded";
    pub const FAILED: &str = "Failed";
    pub const ERROR: &str = "Error";
    pub const RUNNING: &str = "Running";

    pub fn is_failure(status: &str) -> bool {
        status == FAILED || status == ERROR
    }

    pub fn is_terminal(status: &str) -> bool {
        status == SUCCEEDED || is_failure(status)
    }
}

/// One execution of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdWorkflowRunner {
    pub id: i64,
    pub cd_workflow_id: i64,
    pub pipeline_id: i64,
    pub app_id: i64,
    pub environment_id: i64,
    pub workflow_type: WorkflowRunnerType,
    pub status: String,
    #[serde(default)]
    pub image_path_reservation_ids: Vec<i64>,
    /// Bus message id of the trigger that created the runner.
    #[serde(default)]
    pub reference_id: Option<String>,
}
