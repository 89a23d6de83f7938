//! Override service: match-or-forward plus rule management
//!
//! This is the single entry point the HTTP surface talks to. Request
//! handling reads the stores; admin operations write to them after the
//! duplicate validator has run.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{
    domain::{
        ip, matching, validation, Backend, BackendKey, InboundRequest, NewRule, Rule, RuleHeaders,
        RuleId, RulePatch,
    },
    error::{Error, Result},
    infrastructure::{
        log_messages::{admin, requests},
        BackendStore, RuleStore,
    },
    proxy::{
        forwarder::{OutboundResult, ProxyForwarder},
        headers::{content_types, CONTENT_TYPE, NOT_ECHOED, X_OVERRIDE_BACKEND},
    },
};

/// Version tag written into export documents
pub const EXPORT_VERSION: &str = "1.0";

/// Response built from a matched rule without contacting any backend
#[derive(Debug, Clone)]
pub struct SyntheticResponse {
    pub rule_id: RuleId,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl SyntheticResponse {
    /// Build the response for `rule`, echoing the request's headers.
    pub fn from_rule(rule: &Rule, request: &InboundRequest) -> Result<Self> {
        let status = StatusCode::from_u16(*rule.status.as_ref())
            .map_err(|e| Error::Internal(format!("stored status is invalid: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            if !NOT_ECHOED.contains(&name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(content_types::APPLICATION_JSON));

        let body = match &rule.response_body {
            Value::String(raw) => Bytes::from(raw.clone()),
            other => Bytes::from(serde_json::to_vec(other)?),
        };

        Ok(Self {
            rule_id: rule.id,
            status,
            headers,
            body,
        })
    }
}

impl IntoResponse for SyntheticResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Result of consulting the rules for one request
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Synthetic(SyntheticResponse),
    NotMatched,
}

/// Final answer for a proxied request
#[derive(Debug, Clone)]
pub enum ProxyOutcome {
    Synthetic(SyntheticResponse),
    Forwarded(OutboundResult),
    /// No rule matched and there is nowhere to forward to
    NoBackend,
}

impl IntoResponse for ProxyOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Synthetic(synthetic) => synthetic.into_response(),
            Self::Forwarded(result) => result.into_response(),
            Self::NoBackend => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Main API not configured" })),
            )
                .into_response(),
        }
    }
}

/// One rule in an export document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedOverride {
    pub method: String,
    pub path: String,
    pub headers: Option<RuleHeaders>,
    pub body: Option<Value>,
    pub status: u16,
    pub response_body: Value,
}

impl From<&Rule> for ExportedOverride {
    fn from(rule: &Rule) -> Self {
        Self {
            method: rule.method.to_string(),
            path: rule.path.to_string(),
            headers: rule.headers.clone(),
            body: rule.body.clone(),
            status: *rule.status.as_ref(),
            response_body: rule.response_body.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub overrides: Vec<ExportedOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverrideImport {
    #[serde(default)]
    pub version: Option<String>,
    pub overrides: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportReport {
    pub success: bool,
    pub message: String,
    pub created: usize,
    pub errors: Vec<String>,
}

/// Core application service
#[derive(Clone)]
pub struct OverrideService {
    rules: Arc<dyn RuleStore>,
    backends: Arc<dyn BackendStore>,
    forwarder: ProxyForwarder,
}

impl OverrideService {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        backends: Arc<dyn BackendStore>,
        forwarder: ProxyForwarder,
    ) -> Self {
        Self {
            rules,
            backends,
            forwarder,
        }
    }

    pub fn backends(&self) -> &Arc<dyn BackendStore> {
        &self.backends
    }

    /// Match-or-forward for one inbound request.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path_and_query))]
    pub async fn handle(&self, request: &InboundRequest) -> Result<ProxyOutcome> {
        let requested = request.header_value(X_OVERRIDE_BACKEND);
        let backend = self.select_backend(requested.as_deref()).await?;

        if let MatchOutcome::Synthetic(synthetic) =
            self.match_and_respond(request, backend.as_ref()).await?
        {
            return Ok(ProxyOutcome::Synthetic(synthetic));
        }

        match backend {
            Some(backend) => Ok(ProxyOutcome::Forwarded(
                self.forward_to_backend(request, &backend).await,
            )),
            None => {
                warn!("{}", requests::NO_BACKEND);
                Ok(ProxyOutcome::NoBackend)
            }
        }
    }

    /// The backend named by `requested`, or the default one.
    pub async fn select_backend(&self, requested: Option<&str>) -> Result<Option<Backend>> {
        let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
            return self.backends.default_backend().await;
        };

        let key = BackendKey::try_new(raw)
            .map_err(|e| Error::invalid_input(X_OVERRIDE_BACKEND, e))?;
        match self.backends.get_backend(&key).await? {
            Some(backend) => Ok(Some(backend)),
            None => {
                warn!(backend = %key, "{}", requests::UNKNOWN_BACKEND);
                Err(Error::not_found(format!("backend {key}")))
            }
        }
    }

    /// Rules eligible for `request`, in store order.
    pub async fn candidate_rules(
        &self,
        request: &InboundRequest,
        backend: Option<&Backend>,
    ) -> Result<Vec<Rule>> {
        let backend_key = backend.map(|b| &b.key);
        let rules = self.rules.list_rules().await?;

        Ok(rules
            .into_iter()
            .filter(|rule| rule.applies_to_client(request.client_address.as_deref()))
            .filter(|rule| rule.applies_to_backend(backend_key))
            .collect())
    }

    pub async fn match_and_respond(
        &self,
        request: &InboundRequest,
        backend: Option<&Backend>,
    ) -> Result<MatchOutcome> {
        let candidates = self.candidate_rules(request, backend).await?;

        match matching::find_match(request, &candidates) {
            Some(rule) => {
                info!(rule_id = %rule.id, status = *rule.status.as_ref(), "{}", requests::OVERRIDE_MATCHED);
                Ok(MatchOutcome::Synthetic(SyntheticResponse::from_rule(
                    rule, request,
                )?))
            }
            None => {
                debug!(candidates = candidates.len(), "No override matched");
                Ok(MatchOutcome::NotMatched)
            }
        }
    }

    pub async fn forward_to_backend(
        &self,
        request: &InboundRequest,
        backend: &Backend,
    ) -> OutboundResult {
        self.forwarder.forward(request, backend).await
    }

    /// All rules, newest first.
    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        let mut rules = self.rules.list_rules().await?;
        rules.reverse();
        Ok(rules)
    }

    pub async fn get_rule(&self, id: RuleId) -> Result<Rule> {
        self.rules
            .get_rule(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("override {id}")))
    }

    #[instrument(skip(self, new_rule), fields(method = %new_rule.method, path = %new_rule.path))]
    pub async fn create_rule(&self, new_rule: NewRule) -> Result<Rule> {
        self.ensure_backend_exists(new_rule.backend_id.as_ref())
            .await?;

        let rule = new_rule.into_rule(Utc::now());
        let existing = self.rules.list_rules().await?;
        if let Some(duplicate) = validation::find_duplicate(&rule, &existing, None) {
            return Err(Error::Duplicate {
                existing: duplicate.id,
            });
        }

        let created = self.rules.create_rule(rule).await?;
        info!(rule_id = %created.id, "{}", admin::OVERRIDE_CREATED);
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_rule(&self, id: RuleId, patch: RulePatch) -> Result<Rule> {
        let current = self.get_rule(id).await?;
        let updated = patch.apply(&current, Utc::now());
        self.ensure_backend_exists(updated.backend_id.as_ref())
            .await?;

        let existing = self.rules.list_rules().await?;
        if let Some(duplicate) = validation::find_duplicate(&updated, &existing, Some(id)) {
            return Err(Error::Duplicate {
                existing: duplicate.id,
            });
        }

        let saved = self.rules.update_rule(updated).await?;
        info!(rule_id = %saved.id, "{}", admin::OVERRIDE_UPDATED);
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete_rule(&self, id: RuleId) -> Result<()> {
        if !self.rules.delete_rule(id).await? {
            return Err(Error::not_found(format!("override {id}")));
        }
        info!(rule_id = %id, "{}", admin::OVERRIDE_DELETED);
        Ok(())
    }

    /// Rules scoped to `client_address`, newest first.
    pub async fn export_rules(&self, client_address: Option<&str>) -> Result<OverrideExport> {
        let client = require_client_address(client_address)?;

        let overrides = self
            .list_rules()
            .await?
            .iter()
            .filter(|rule| {
                rule.scope_address
                    .as_deref()
                    .is_some_and(|scope| ip::equal(Some(scope), Some(client)))
            })
            .map(ExportedOverride::from)
            .collect();

        Ok(OverrideExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            overrides,
        })
    }

    /// Create each entry independently, scoped to `client_address`.
    ///
    /// Entries that fail to parse, reference an unknown backend or
    /// duplicate an existing rule are reported and skipped.
    #[instrument(skip(self, document), fields(entries = document.overrides.len()))]
    pub async fn import_rules(
        &self,
        document: OverrideImport,
        client_address: Option<&str>,
    ) -> Result<ImportReport> {
        let mut created = 0;
        let mut errors = Vec::new();

        for entry in document.overrides {
            let label = entry_label(&entry);
            let mut new_rule: NewRule = match serde_json::from_value(entry) {
                Ok(new_rule) => new_rule,
                Err(e) => {
                    errors.push(format!("Skipped override {label}: {e}"));
                    continue;
                }
            };
            new_rule.scope_address = client_address.map(str::to_string);

            match self.create_rule(new_rule).await {
                Ok(_) => created += 1,
                Err(e) => errors.push(format!("Failed to import override {label}: {e}")),
            }
        }

        info!(created, failed = errors.len(), "{}", admin::OVERRIDES_IMPORTED);
        Ok(ImportReport {
            success: true,
            message: format!("Imported {created} override(s)"),
            created,
            errors,
        })
    }

    async fn ensure_backend_exists(&self, key: Option<&BackendKey>) -> Result<()> {
        let Some(key) = key else {
            return Ok(());
        };
        match self.backends.get_backend(key).await? {
            Some(_) => Ok(()),
            None => Err(Error::not_found(format!("backend {key}"))),
        }
    }
}

fn require_client_address(client_address: Option<&str>) -> Result<&str> {
    client_address
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::invalid_input("clientAddress", "unable to determine client IP address")
        })
}

fn entry_label(entry: &Value) -> String {
    let field = |name: &str| {
        entry
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string()
    };
    format!("{} {}", field("method"), field("path"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BaseUrl, HttpMethod, RequestBody, RulePath};
    use crate::infrastructure::{InMemoryBackendStore, InMemoryRuleStore};
    use http::Method;
    use rstest::rstest;

    fn backend(key: &str) -> Backend {
        Backend::new(
            BackendKey::try_new(key).unwrap(),
            BaseUrl::try_new("http://127.0.0.1:9").unwrap(),
        )
    }

    fn service_with(backends: Vec<Backend>) -> OverrideService {
        OverrideService::new(
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(InMemoryBackendStore::new(backends)),
            ProxyForwarder::new(),
        )
    }

    fn new_rule(method: &str, path: &str, response_body: Value) -> NewRule {
        NewRule::new(
            HttpMethod::try_new(method).unwrap(),
            RulePath::try_new(path).unwrap(),
            response_body,
        )
    }

    #[tokio::test]
    async fn test_synthetic_response_without_backend() {
        let service = service_with(vec![]);
        service
            .create_rule(new_rule("GET", "/users/1", json!({"name": "a"})))
            .await
            .unwrap();

        let request = InboundRequest::new(Method::GET, "/users/1/");
        let outcome = service.handle(&request).await.unwrap();

        let ProxyOutcome::Synthetic(synthetic) = outcome else {
            panic!("expected a synthetic response");
        };
        assert_eq!(synthetic.status, StatusCode::OK);
        assert_eq!(synthetic.body, Bytes::from_static(br#"{"name":"a"}"#));
        assert_eq!(synthetic.headers[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_unmatched_without_backend() {
        let service = service_with(vec![]);
        let request = InboundRequest::new(Method::GET, "/nothing");

        let outcome = service.handle(&request).await.unwrap();
        assert!(matches!(outcome, ProxyOutcome::NoBackend));
        assert_eq!(
            outcome.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_synthetic_headers_and_string_body() {
        let mut rule = new_rule("POST", "/echo", json!("raw <b>text</b>")).into_rule(Utc::now());
        rule.status = crate::domain::ResponseStatus::try_new(418).unwrap();
        let request = InboundRequest::new(Method::POST, "/echo")
            .with_header("host", "proxy.local")
            .with_header("content-length", "5")
            .with_header("x-trace", "abc")
            .with_header("x-override-backend", "main");

        let synthetic = SyntheticResponse::from_rule(&rule, &request).unwrap();

        assert_eq!(synthetic.status.as_u16(), 418);
        assert_eq!(synthetic.body, Bytes::from_static(b"raw <b>text</b>"));
        assert_eq!(synthetic.headers["x-trace"], "abc");
        assert!(!synthetic.headers.contains_key("host"));
        assert!(!synthetic.headers.contains_key("content-length"));
        assert!(!synthetic.headers.contains_key(X_OVERRIDE_BACKEND));
    }

    #[tokio::test]
    async fn test_scope_filters_candidates() {
        let service = service_with(vec![]);
        let mut scoped = new_rule("GET", "/me", json!({"who": "scoped"}));
        scoped.scope_address = Some("10.0.0.7".to_string());
        service.create_rule(scoped).await.unwrap();

        let from_owner = InboundRequest::new(Method::GET, "/me").with_client_address("::ffff:10.0.0.7");
        assert!(matches!(
            service.match_and_respond(&from_owner, None).await.unwrap(),
            MatchOutcome::Synthetic(_)
        ));

        let from_other = InboundRequest::new(Method::GET, "/me").with_client_address("10.0.0.8");
        assert!(matches!(
            service.match_and_respond(&from_other, None).await.unwrap(),
            MatchOutcome::NotMatched
        ));
    }

    #[tokio::test]
    async fn test_backend_binding_filters_candidates() {
        let users = backend("users");
        let orders = backend("orders");
        let service = service_with(vec![users.clone(), orders.clone()]);

        let mut bound = new_rule("GET", "/ping", json!("pong"));
        bound.backend_id = Some(users.key.clone());
        service.create_rule(bound).await.unwrap();

        let request = InboundRequest::new(Method::GET, "/ping");
        assert!(matches!(
            service.match_and_respond(&request, Some(&users)).await.unwrap(),
            MatchOutcome::Synthetic(_)
        ));
        assert!(matches!(
            service.match_and_respond(&request, Some(&orders)).await.unwrap(),
            MatchOutcome::NotMatched
        ));
    }

    #[tokio::test]
    async fn test_first_match_wins_in_insertion_order() {
        let service = service_with(vec![]);
        service
            .create_rule(new_rule("GET", "/x", json!("first")))
            .await
            .unwrap();
        let mut narrower = new_rule("GET", "/x", json!("second"));
        narrower.headers = Some(RuleHeaders::from([(
            "x-tenant".to_string(),
            "acme".to_string(),
        )]));
        service.create_rule(narrower).await.unwrap();

        let request = InboundRequest::new(Method::GET, "/x").with_header("x-tenant", "acme");
        let MatchOutcome::Synthetic(synthetic) =
            service.match_and_respond(&request, None).await.unwrap()
        else {
            panic!("expected a match");
        };
        assert_eq!(synthetic.body, Bytes::from_static(b"first"));
    }

    #[rstest]
    #[case(None, Some("users"))]
    #[case(Some("orders"), Some("orders"))]
    #[case(Some("  "), Some("users"))]
    #[tokio::test]
    async fn test_select_backend(#[case] requested: Option<&str>, #[case] expected: Option<&str>) {
        let service = service_with(vec![backend("users"), backend("orders")]);
        let selected = service.select_backend(requested).await.unwrap();
        assert_eq!(selected.map(|b| b.key.to_string()).as_deref(), expected);
    }

    #[tokio::test]
    async fn test_unknown_backend_is_not_found() {
        let service = service_with(vec![backend("users")]);
        let result = service.select_backend(Some("billing")).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_unknown_backend() {
        let service = service_with(vec![backend("users")]);
        service
            .create_rule(new_rule("GET", "/a/", json!(1)))
            .await
            .unwrap();

        let duplicate = service.create_rule(new_rule("get", "/a", json!(2))).await;
        assert!(matches!(duplicate, Err(Error::Duplicate { .. })));

        let mut unknown = new_rule("GET", "/b", json!(1));
        unknown.backend_id = Some(BackendKey::try_new("billing").unwrap());
        assert!(matches!(
            service.create_rule(unknown).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_clears_fields_and_detects_duplicates() {
        let service = service_with(vec![]);
        let mut with_body = new_rule("POST", "/orders", json!("ok"));
        with_body.body = Some(json!({"sku": "A"}));
        let created = service.create_rule(with_body).await.unwrap();
        service
            .create_rule(new_rule("POST", "/orders", json!("plain")))
            .await
            .unwrap();

        let clear_body: RulePatch = serde_json::from_value(json!({"body": null})).unwrap();
        let result = service.update_rule(created.id, clear_body).await;
        assert!(matches!(result, Err(Error::Duplicate { .. })));

        let retarget: RulePatch =
            serde_json::from_value(json!({"body": null, "path": "/orders/new"})).unwrap();
        let updated = service.update_rule(created.id, retarget).await.unwrap();
        assert!(updated.body.is_none());
        assert_eq!(updated.path.as_ref(), "/orders/new");
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_delete() {
        let service = service_with(vec![]);
        let first = service.create_rule(new_rule("GET", "/1", json!(1))).await.unwrap();
        let second = service.create_rule(new_rule("GET", "/2", json!(2))).await.unwrap();

        let ids: Vec<_> = service.list_rules().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        service.delete_rule(first.id).await.unwrap();
        assert!(matches!(
            service.delete_rule(first.id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            service.get_rule(first.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_export_only_includes_callers_rules() {
        let service = service_with(vec![]);
        let mut mine = new_rule("GET", "/mine", json!(1));
        mine.scope_address = Some("203.0.113.5".to_string());
        service.create_rule(mine).await.unwrap();
        let mut theirs = new_rule("GET", "/theirs", json!(2));
        theirs.scope_address = Some("203.0.113.6".to_string());
        service.create_rule(theirs).await.unwrap();
        service
            .create_rule(new_rule("GET", "/global", json!(3)))
            .await
            .unwrap();

        let export = service.export_rules(Some("::ffff:203.0.113.5")).await.unwrap();
        assert_eq!(export.version, EXPORT_VERSION);
        assert_eq!(export.overrides.len(), 1);
        assert_eq!(export.overrides[0].path, "/mine");

        assert!(matches!(
            service.export_rules(None).await,
            Err(Error::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_import_reports_each_entry() {
        let service = service_with(vec![]);
        service
            .create_rule(new_rule("GET", "/exists", json!(0)))
            .await
            .unwrap();

        let document: OverrideImport = serde_json::from_value(json!({
            "version": "1.0",
            "overrides": [
                {"method": "get", "path": "/a", "responseBody": {"a": 1}},
                {"method": "GET", "path": "/b", "status": 404, "responseBody": "missing"},
                {"method": "GET", "path": "/no-response-body"},
                {"method": "GET", "path": "/exists", "responseBody": 1}
            ]
        }))
        .unwrap();

        let report = service
            .import_rules(document, Some("198.51.100.4"))
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.created, 2);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.message, "Imported 2 override(s)");

        let imported = service.export_rules(Some("198.51.100.4")).await.unwrap();
        assert_eq!(imported.overrides.len(), 2);
    }

    #[tokio::test]
    async fn test_text_body_rule_matches_text_request() {
        let service = service_with(vec![]);
        let mut rule = new_rule("POST", "/form", json!("accepted"));
        rule.body = Some(json!("a=1&b=2"));
        service.create_rule(rule).await.unwrap();

        let request = InboundRequest::new(Method::POST, "/form")
            .with_body(RequestBody::Text("a=1&b=2".to_string()));
        assert!(matches!(
            service.match_and_respond(&request, None).await.unwrap(),
            MatchOutcome::Synthetic(_)
        ));
    }
}
