// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! REST surface for global auth config, SSO connectors, global tags, workflow
//! trigger audits and the git webhook intake.
//!
//! Every route except `/health` and the webhook requires an `X-User-Id`
//! header; webhooks authenticate through their git host's secret instead.

use axum::{
    body::Bytes,
    extract::{FromRequestParts, OriginalUri, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::application::{
    AuthConfigError, AuthConfigService, GitWebhookError, GitWebhookService, GlobalTagError, GlobalTagService,
    SsoError, SsoLoginService, TriggerAuditError, TriggerAuditService,
};
use crate::domain::auth_config::GlobalAuthorisationConfigResponse;
use crate::domain::global_tag::{
    CreateGlobalTagsRequest, DeleteGlobalTagsRequest, GlobalTagDto, GlobalTagDtoForProject, UpdateGlobalTagsRequest,
};
use crate::domain::ports::Enforcer;
use crate::domain::repository::RepositoryError;
use crate::domain::sso::SsoLoginDto;
use crate::domain::trigger_audit::{AuditWorkflowType, TriggerAuditRecord, TriggerAuditRequest, TriggerAuditSummary};
use crate::infrastructure::webhook_validator::WebhookRequest;

pub const USER_ID_HEADER: &str = "x-user-id";

const RESOURCE_GLOBAL: &str = "global";
const RESOURCE_GLOBAL_TAG: &str = "tag";
const RESOURCE_TRIGGER_AUDIT: &str = "trigger-audit";
const ACTION_GET: &str = "get";
const ACTION_CREATE: &str = "create";
const ACTION_UPDATE: &str = "update";
const ACTION_DELETE: &str = "delete";

pub struct AppState {
    pub auth_config: Arc<dyn AuthConfigService>,
    pub sso: Arc<dyn SsoLoginService>,
    pub global_tags: Arc<dyn GlobalTagService>,
    pub git_webhooks: Arc<dyn GitWebhookService>,
    pub trigger_audits: Arc<dyn TriggerAuditService>,
    pub enforcer: Arc<dyn Enforcer>,
    pub start_time: Instant,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/global-config", get(get_global_config).post(save_global_config))
        .route("/sso/create", post(create_sso))
        .route("/sso/update", put(update_sso))
        .route("/sso/list", get(list_sso))
        .route("/sso/{id}", get(get_sso_by_id))
        .route("/sso", get(get_sso_by_name))
        .route(
            "/global-tags",
            get(list_global_tags)
                .post(create_global_tags)
                .put(update_global_tags)
                .delete(delete_global_tags),
        )
        .route("/global-tags/{id}", get(get_global_tag))
        .route("/global-tags/project/{project_id}", get(list_project_tags))
        .route("/trigger-audit/{workflow_type}", post(save_trigger_audit))
        .route("/trigger-audit/workflow/{workflow_id}", get(get_trigger_audit))
        .route("/trigger-audit/pipeline/{pipeline_id}", get(get_trigger_audit_history))
        .route("/webhook/git/{git_host_id}", post(git_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        error!(error = %err, "Request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            RepositoryError::Conflict(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            other => Self::internal(other),
        }
    }
}

impl From<AuthConfigError> for ApiError {
    fn from(err: AuthConfigError) -> Self {
        match err {
            AuthConfigError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            AuthConfigError::Repository(e) => e.into(),
        }
    }
}

impl From<SsoError> for ApiError {
    fn from(err: SsoError) -> Self {
        match err {
            SsoError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            SsoError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            SsoError::DexUpdateExhausted => Self::new(StatusCode::CONFLICT, err.to_string()),
            SsoError::Repository(e) => e.into(),
            other => Self::internal(other),
        }
    }
}

impl From<GlobalTagError> for ApiError {
    fn from(err: GlobalTagError) -> Self {
        match err {
            GlobalTagError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            GlobalTagError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            GlobalTagError::Repository(e) => e.into(),
        }
    }
}

impl From<TriggerAuditError> for ApiError {
    fn from(err: TriggerAuditError) -> Self {
        match err {
            TriggerAuditError::MissingApiToken => Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            TriggerAuditError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            TriggerAuditError::Repository(e) => e.into(),
            other => Self::internal(other),
        }
    }
}

impl From<GitWebhookError> for ApiError {
    fn from(err: GitWebhookError) -> Self {
        match err {
            GitWebhookError::Unauthorized(_) => Self::new(StatusCode::UNAUTHORIZED, err.to_string()),
            GitWebhookError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            GitWebhookError::Repository(e) => e.into(),
            other => Self::internal(other),
        }
    }
}

// ============================================================================
// Authentication / authorization
// ============================================================================

/// Caller identity taken from the `X-User-Id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i32);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i32>().ok())
            .filter(|id| *id > 0)
            .map(AuthUser)
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "unauthenticated"))
    }
}

fn authorize(state: &AppState, user: AuthUser, resource: &str, action: &str) -> Result<(), ApiError> {
    if state.enforcer.check(&user.0.to_string(), resource, action, "*") {
        return Ok(());
    }
    warn!(user_id = user.0, resource, action, "RBAC denied");
    Err(ApiError::new(StatusCode::FORBIDDEN, "unauthorized user"))
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAuthConfigRequest {
    pub config_types: Vec<String>,
    #[serde(default)]
    pub user_id: Option<i32>,
}

async fn get_global_config(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<GlobalAuthorisationConfigResponse>>, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL, ACTION_GET)?;
    Ok(Json(state.auth_config.get_all_active_configs().await?))
}

async fn save_global_config(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<GlobalAuthConfigRequest>,
) -> Result<Json<Vec<GlobalAuthorisationConfigResponse>>, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL, ACTION_UPDATE)?;
    let saved = state
        .auth_config
        .create_or_update_global_auth_config(&request.config_types, user.0)
        .await?;
    Ok(Json(saved))
}

async fn create_sso(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(mut request): Json<SsoLoginDto>,
) -> Result<Json<SsoLoginDto>, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL, ACTION_CREATE)?;
    request.user_id = user.0;
    Ok(Json(state.sso.create_sso_login(&request).await?))
}

async fn update_sso(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(mut request): Json<SsoLoginDto>,
) -> Result<Json<SsoLoginDto>, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL, ACTION_UPDATE)?;
    request.user_id = user.0;
    Ok(Json(state.sso.update_sso_login(&request).await?))
}

async fn list_sso(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<Json<Vec<SsoLoginDto>>, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL, ACTION_GET)?;
    Ok(Json(state.sso.get_all().await?))
}

async fn get_sso_by_id(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<SsoLoginDto>, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL, ACTION_GET)?;
    Ok(Json(state.sso.get_by_id(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SsoNameQuery {
    pub name: String,
}

/// Readable by any authenticated user; credentials come back masked.
async fn get_sso_by_name(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<SsoNameQuery>,
) -> Result<Json<SsoLoginDto>, ApiError> {
    Ok(Json(state.sso.get_by_name(&query.name).await?))
}

async fn list_global_tags(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Vec<GlobalTagDto>>, ApiError> {
    Ok(Json(state.global_tags.get_all_active_tags().await?))
}

async fn get_global_tag(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<GlobalTagDto>, ApiError> {
    Ok(Json(state.global_tags.get_active_tag_by_id(id).await?))
}

async fn list_project_tags(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<GlobalTagDtoForProject>>, ApiError> {
    Ok(Json(state.global_tags.get_all_active_tags_for_project(project_id).await?))
}

async fn create_global_tags(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreateGlobalTagsRequest>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL_TAG, ACTION_CREATE)?;
    state.global_tags.create_tags(&request, user.0).await?;
    Ok(StatusCode::OK)
}

async fn update_global_tags(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<UpdateGlobalTagsRequest>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL_TAG, ACTION_UPDATE)?;
    state.global_tags.update_tags(&request, user.0).await?;
    Ok(StatusCode::OK)
}

async fn delete_global_tags(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<DeleteGlobalTagsRequest>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, user, RESOURCE_GLOBAL_TAG, ACTION_DELETE)?;
    state.global_tags.delete_tags(&request, user.0).await?;
    Ok(StatusCode::OK)
}

async fn save_trigger_audit(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(workflow_type): Path<AuditWorkflowType>,
    Json(request): Json<TriggerAuditRequest>,
) -> Result<Json<TriggerAuditSummary>, ApiError> {
    authorize(&state, user, RESOURCE_TRIGGER_AUDIT, ACTION_CREATE)?;
    let audits = &state.trigger_audits;
    let summary = match workflow_type {
        AuditWorkflowType::Ci => audits.save_ci_trigger_audit(&request).await?,
        AuditWorkflowType::PreCd => audits.save_pre_cd_trigger_audit(&request).await?,
        AuditWorkflowType::PostCd => audits.save_post_cd_trigger_audit(&request).await?,
    };
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAuditQuery {
    pub workflow_type: AuditWorkflowType,
    #[serde(default = "default_history_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_history_limit() -> i64 {
    20
}

async fn get_trigger_audit(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(workflow_id): Path<i64>,
    Query(query): Query<TriggerAuditQuery>,
) -> Result<Json<TriggerAuditRecord>, ApiError> {
    authorize(&state, user, RESOURCE_TRIGGER_AUDIT, ACTION_GET)?;
    let record = state
        .trigger_audits
        .get_trigger_audit_by_workflow_id(workflow_id, query.workflow_type)
        .await?;
    Ok(Json(record))
}

async fn get_trigger_audit_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(pipeline_id): Path<i64>,
    Query(query): Query<TriggerAuditQuery>,
) -> Result<Json<Vec<TriggerAuditSummary>>, ApiError> {
    authorize(&state, user, RESOURCE_TRIGGER_AUDIT, ACTION_GET)?;
    let history = state
        .trigger_audits
        .get_trigger_audit_history(pipeline_id, query.workflow_type, query.limit.clamp(1, 100), query.offset.max(0))
        .await?;
    Ok(Json(history))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookQuery {
    pub event_type: Option<String>,
}

async fn git_webhook(
    State(state): State<Arc<AppState>>,
    Path(git_host_id): Path<i64>,
    Query(query): Query<WebhookQuery>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let mut request = WebhookRequest::new(uri.to_string(), body.to_vec());
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            request.insert_header(name.as_str(), value);
        }
    }

    let event_type = state
        .git_webhooks
        .handle_webhook(git_host_id, query.event_type.as_deref(), &request)
        .await?;
    Ok(Json(json!({ "gitHostId": git_host_id, "eventType": event_type })))
}
