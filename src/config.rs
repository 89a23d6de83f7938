use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::env;
use tracing::warn;

use crate::domain::{Backend, BackendKey, BaseUrl, TimeoutMillis};
use crate::error::Error;
use crate::infrastructure::log_messages;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub logging: LoggingSettings,
    pub proxy: ProxySettings,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub backends: Vec<BackendSettings>,
    /// Raw `BASE_APIS` value in `name:url,name2:url2` form
    #[serde(default)]
    pub base_apis: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    pub default_timeout_ms: u64,
    pub max_request_size: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminSettings {
    /// When set, admin routes require this key
    #[serde(default)]
    pub user_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub key: String,
    pub base_url: String,
    #[serde(default)]
    pub auth_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Self::with_defaults(Config::builder(), &environment)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("OVERRIDE_PROXY").separator("__"))
            .set_override_option("base_apis", env::var("BASE_APIS").ok())?
            .build()?;

        config.try_deserialize()
    }

    fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
        environment: &str,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 3000)?
            .set_default("application.environment", environment)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("proxy.default_timeout_ms", 30_000)?
            .set_default("proxy.max_request_size", 10 * 1024 * 1024)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Validate configured backends and append those from `BASE_APIS`.
    ///
    /// Entries in the `backends` list are authoritative: an invalid one is
    /// an error. `BASE_APIS` entries are best effort and skipped with a
    /// warning when malformed or when their key is already taken.
    pub fn resolve_backends(&self) -> Result<Vec<Backend>, Error> {
        let default_timeout = TimeoutMillis::try_new(self.proxy.default_timeout_ms)
            .map_err(|e| Error::invalid_input("proxy.default_timeout_ms", e))?;

        let mut backends = Vec::new();
        let mut seen = HashSet::new();

        for entry in &self.backends {
            let backend = entry.to_backend(default_timeout)?;
            if !seen.insert(backend.key.clone()) {
                return Err(Error::invalid_input(
                    "backends",
                    format!("duplicate backend key {}", backend.key),
                ));
            }
            backends.push(backend);
        }

        if let Some(raw) = &self.base_apis {
            for backend in parse_base_apis(raw, default_timeout) {
                if seen.insert(backend.key.clone()) {
                    backends.push(backend);
                } else {
                    warn!(backend = %backend.key, "{}", log_messages::config::DUPLICATE_BASE_API);
                }
            }
        }

        Ok(backends)
    }
}

impl BackendSettings {
    fn to_backend(&self, default_timeout: TimeoutMillis) -> Result<Backend, Error> {
        let key = BackendKey::try_new(self.key.as_str())
            .map_err(|e| Error::invalid_input("backends.key", e))?;
        let base_url = BaseUrl::try_new(self.base_url.as_str())
            .map_err(|e| Error::invalid_input("backends.base_url", e))?;
        let timeout = match self.timeout_ms {
            Some(ms) => TimeoutMillis::try_new(ms)
                .map_err(|e| Error::invalid_input("backends.timeout_ms", e))?,
            None => default_timeout,
        };

        let mut backend = Backend::new(key, base_url).with_timeout(timeout);
        backend.auth_headers = self.auth_headers.clone();
        Ok(backend)
    }
}

/// Parse `name:url,name2:url2` into backends, skipping malformed entries.
pub fn parse_base_apis(raw: &str, timeout: TimeoutMillis) -> Vec<Backend> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = entry.split_once(':').and_then(|(name, url)| {
                let key = BackendKey::try_new(name).ok()?;
                let base_url = BaseUrl::try_new(url).ok()?;
                Some(Backend::new(key, base_url).with_timeout(timeout))
            });
            if parsed.is_none() {
                warn!(entry, "{}", log_messages::config::MALFORMED_BASE_API);
            }
            parsed
        })
        .collect()
}
