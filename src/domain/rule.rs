//! Override rules: a request matcher paired with a synthetic response

use crate::domain::backend::BackendKey;
use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Expected request headers, name to exact value.
pub type RuleHeaders = BTreeMap<String, String>;

/// Opaque rule identity (UUID v7, so ids sort by creation time)
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRef,
    Display
))]
pub struct RuleId(Uuid);

impl RuleId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self::new)
    }
}

/// HTTP method, stored uppercase
#[nutype(
    sanitize(trim, uppercase),
    validate(
        not_empty,
        len_char_max = 16,
        predicate = |m: &str| m.bytes().all(|b| b.is_ascii_alphabetic())
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        AsRef,
        Display,
        TryFrom
    )
)]
pub struct HttpMethod(String);

/// Path a rule answers on, optionally including a literal query string
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 4096),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        AsRef,
        Display,
        TryFrom
    )
)]
pub struct RulePath(String);

/// Status code returned by a matched rule
#[nutype(
    validate(greater_or_equal = 100, less_or_equal = 599),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Serialize,
        Deserialize,
        AsRef,
        Display,
        TryFrom,
        Default
    ),
    default = 200
)]
pub struct ResponseStatus(u16);

/// A stored override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub method: HttpMethod,
    pub path: RulePath,
    pub headers: Option<RuleHeaders>,
    pub body: Option<Value>,
    pub status: ResponseStatus,
    pub response_body: Value,
    pub scope_address: Option<String>,
    pub backend_id: Option<BackendKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Whether this rule may answer a request from `client_address`.
    pub fn applies_to_client(&self, client_address: Option<&str>) -> bool {
        match self.scope_address.as_deref() {
            None => true,
            Some(scope) => crate::domain::ip::equal(Some(scope), client_address),
        }
    }

    /// Whether this rule may answer a request routed to `backend`.
    pub fn applies_to_backend(&self, backend: Option<&BackendKey>) -> bool {
        match &self.backend_id {
            None => true,
            Some(own) => backend == Some(own),
        }
    }
}

/// Payload for creating a rule
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub method: HttpMethod,
    pub path: RulePath,
    #[serde(default)]
    pub headers: Option<RuleHeaders>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub status: ResponseStatus,
    pub response_body: Value,
    #[serde(default)]
    pub scope_address: Option<String>,
    #[serde(default)]
    pub backend_id: Option<BackendKey>,
}

impl NewRule {
    pub fn new(method: HttpMethod, path: RulePath, response_body: Value) -> Self {
        Self {
            method,
            path,
            headers: None,
            body: None,
            status: ResponseStatus::default(),
            response_body,
            scope_address: None,
            backend_id: None,
        }
    }

    pub fn into_rule(self, now: DateTime<Utc>) -> Rule {
        Rule {
            id: RuleId::generate(),
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body.filter(|b| !b.is_null()),
            status: self.status,
            response_body: self.response_body,
            scope_address: self.scope_address.filter(|s| !s.trim().is_empty()),
            backend_id: self.backend_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a rule.
///
/// The outer `Option` distinguishes "field omitted" from an explicit
/// `null`, which clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePatch {
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub path: Option<RulePath>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub headers: Option<Option<RuleHeaders>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub body: Option<Option<Value>>,
    #[serde(default)]
    pub status: Option<ResponseStatus>,
    #[serde(default)]
    pub response_body: Option<Value>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub scope_address: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub backend_id: Option<Option<BackendKey>>,
}

impl RulePatch {
    /// Produce the updated rule without touching the original.
    pub fn apply(self, rule: &Rule, now: DateTime<Utc>) -> Rule {
        let mut updated = rule.clone();
        if let Some(method) = self.method {
            updated.method = method;
        }
        if let Some(path) = self.path {
            updated.path = path;
        }
        if let Some(headers) = self.headers {
            updated.headers = headers;
        }
        if let Some(body) = self.body {
            updated.body = body.filter(|b| !b.is_null());
        }
        if let Some(status) = self.status {
            updated.status = status;
        }
        if let Some(response_body) = self.response_body {
            updated.response_body = response_body;
        }
        if let Some(scope_address) = self.scope_address {
            updated.scope_address = scope_address.filter(|s| !s.trim().is_empty());
        }
        if let Some(backend_id) = self.backend_id {
            updated.backend_id = backend_id;
        }
        updated.updated_at = now;
        updated
    }
}

fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
