//! Admin API handlers under `/_admin`

use crate::application::overrides::{ImportReport, OverrideExport, OverrideImport};
use crate::domain::{Backend, BackendKey, NewRule, Rule, RuleId, RulePatch};
use crate::error::{Error, Result};
use crate::proxy::headers::content_types;
use crate::proxy::service::{AppState, ClientAddress};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Shown instead of auth header values
const REDACTED: &str = "***";

/// Admin routes, relative to the server root
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/_admin/health", get(health_handler))
        .route(
            "/_admin/overrides",
            get(list_overrides).post(create_override),
        )
        .route("/_admin/overrides/export", get(export_overrides))
        .route(
            "/_admin/overrides/import",
            axum::routing::post(import_overrides),
        )
        .route(
            "/_admin/overrides/{id}",
            get(get_override).put(update_override).delete(delete_override),
        )
        .route("/_admin/backends", get(list_backends))
        .route("/_admin/backends/{key}", get(get_backend))
}

/// Health check handler
async fn health_handler() -> &'static str {
    "OK"
}

async fn list_overrides(State(state): State<AppState>) -> Result<Json<Vec<Rule>>> {
    Ok(Json(state.overrides.list_rules().await?))
}

async fn create_override(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewRule>, JsonRejection>,
) -> Result<(StatusCode, Json<Rule>)> {
    let Json(new_rule) = payload.map_err(json_rejection)?;
    let rule = state.overrides.create_rule(new_rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn get_override(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Rule>> {
    let id = parse_rule_id(&id)?;
    Ok(Json(state.overrides.get_rule(id).await?))
}

async fn update_override(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<RulePatch>, JsonRejection>,
) -> Result<Json<Rule>> {
    let id = parse_rule_id(&id)?;
    let Json(patch) = payload.map_err(json_rejection)?;
    Ok(Json(state.overrides.update_rule(id, patch).await?))
}

async fn delete_override(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id = parse_rule_id(&id)?;
    state.overrides.delete_rule(id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn export_overrides(
    State(state): State<AppState>,
    ClientAddress(client): ClientAddress,
) -> Result<Response> {
    let export: OverrideExport = state.overrides.export_rules(client.as_deref()).await?;
    let body = serde_json::to_string_pretty(&export)?;

    let filename = format!(
        "attachment; filename=\"api-overrides-{}.json\"",
        export.exported_at.format("%Y-%m-%d")
    );
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_types::APPLICATION_JSON),
    );
    if let Ok(disposition) = HeaderValue::from_str(&filename) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

async fn import_overrides(
    State(state): State<AppState>,
    ClientAddress(client): ClientAddress,
    payload: std::result::Result<Json<OverrideImport>, JsonRejection>,
) -> Result<Json<ImportReport>> {
    let Json(document) = payload.map_err(json_rejection)?;
    Ok(Json(
        state
            .overrides
            .import_rules(document, client.as_deref())
            .await?,
    ))
}

/// Backend as exposed by the admin API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BackendDescriptor {
    key: String,
    base_url: String,
    auth_headers: BTreeMap<String, String>,
    timeout_ms: u64,
    is_default: bool,
}

impl BackendDescriptor {
    fn describe(backend: &Backend, default_key: Option<&BackendKey>) -> Self {
        Self {
            key: backend.key.to_string(),
            base_url: backend.base_url.to_string(),
            auth_headers: backend
                .auth_headers
                .keys()
                .map(|name| (name.clone(), REDACTED.to_string()))
                .collect(),
            timeout_ms: *backend.timeout.as_ref(),
            is_default: default_key == Some(&backend.key),
        }
    }
}

async fn list_backends(State(state): State<AppState>) -> Result<Json<Vec<BackendDescriptor>>> {
    let store = state.overrides.backends();
    let default_key = store.default_backend().await?.map(|b| b.key);
    let backends = store.list_backends().await?;

    Ok(Json(
        backends
            .iter()
            .map(|backend| BackendDescriptor::describe(backend, default_key.as_ref()))
            .collect(),
    ))
}

async fn get_backend(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<BackendDescriptor>> {
    let store = state.overrides.backends();
    let key = BackendKey::try_new(key.as_str())
        .map_err(|_| Error::not_found(format!("backend {key}")))?;
    let backend = store
        .get_backend(&key)
        .await?
        .ok_or_else(|| Error::not_found(format!("backend {key}")))?;
    let default_key = store.default_backend().await?.map(|b| b.key);

    Ok(Json(BackendDescriptor::describe(
        &backend,
        default_key.as_ref(),
    )))
}

fn parse_rule_id(raw: &str) -> Result<RuleId> {
    RuleId::parse(raw).ok_or_else(|| Error::not_found(format!("override {raw}")))
}

fn json_rejection(rejection: JsonRejection) -> Error {
    Error::invalid_input("body", rejection.body_text())
}
