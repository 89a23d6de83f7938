//! Upstream backends ("base APIs") that unmatched requests are forwarded to

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Short unique name of a backend, also its identity
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
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
pub struct BackendKey(String);

/// Origin requests are forwarded to
#[nutype(
    sanitize(trim),
    validate(predicate = |s: &str| s.starts_with("http://") || s.starts_with("https://")),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Serialize,
        Deserialize,
        AsRef,
        Display,
        TryFrom
    )
)]
pub struct BaseUrl(String);

/// Per-call deadline in milliseconds
#[nutype(
    validate(greater = 0),
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
    default = 30_000
)]
pub struct TimeoutMillis(u64);

impl TimeoutMillis {
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(*self.as_ref())
    }
}

/// A configured upstream service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub key: BackendKey,
    pub base_url: BaseUrl,
    /// Injected into every forwarded call; wins over caller headers.
    #[serde(default)]
    pub auth_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout: TimeoutMillis,
}

impl Backend {
    pub fn new(key: BackendKey, base_url: BaseUrl) -> Self {
        Self {
            key,
            base_url,
            auth_headers: BTreeMap::new(),
            timeout: TimeoutMillis::default(),
        }
    }

    pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutMillis) -> Self {
        self.timeout = timeout;
        self
    }
}
