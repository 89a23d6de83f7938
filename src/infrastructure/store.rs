//! Rule and backend storage
//!
//! Storage sits behind async traits so a persistent store can replace the
//! in-memory one without touching request handling.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    domain::{validation, Backend, BackendKey, Rule, RuleId},
    error::{Error, Result},
};

/// Persistence for override rules
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All rules in insertion order
    async fn list_rules(&self) -> Result<Vec<Rule>>;

    async fn get_rule(&self, id: RuleId) -> Result<Option<Rule>>;

    /// Insert a rule; fails with [`Error::Duplicate`] if an equivalent rule exists.
    async fn create_rule(&self, rule: Rule) -> Result<Rule>;

    /// Replace the stored rule with the same id.
    async fn update_rule(&self, rule: Rule) -> Result<Rule>;

    /// Returns whether a rule was removed.
    async fn delete_rule(&self, id: RuleId) -> Result<bool>;
}

/// Read access to the configured backends
#[async_trait]
pub trait BackendStore: Send + Sync {
    async fn list_backends(&self) -> Result<Vec<Backend>>;

    async fn get_backend(&self, key: &BackendKey) -> Result<Option<Backend>>;

    /// Backend used when a request does not select one
    async fn default_backend(&self) -> Result<Option<Backend>>;
}

/// In-memory rule store
///
/// The duplicate check and the write happen under one write lock, so two
/// concurrent creations of the same logical rule cannot both succeed.
#[derive(Clone, Default)]
pub struct InMemoryRuleStore {
    rules: Arc<RwLock<Vec<Rule>>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.rules.read().await.clone())
    }

    async fn get_rule(&self, id: RuleId) -> Result<Option<Rule>> {
        let rules = self.rules.read().await;
        Ok(rules.iter().find(|rule| rule.id == id).cloned())
    }

    async fn create_rule(&self, rule: Rule) -> Result<Rule> {
        let mut rules = self.rules.write().await;

        if let Some(existing) = validation::find_duplicate(&rule, &rules, None) {
            return Err(Error::Duplicate {
                existing: existing.id,
            });
        }

        rules.push(rule.clone());
        Ok(rule)
    }

    async fn update_rule(&self, rule: Rule) -> Result<Rule> {
        let mut rules = self.rules.write().await;

        if let Some(existing) = validation::find_duplicate(&rule, &rules, Some(rule.id)) {
            return Err(Error::Duplicate {
                existing: existing.id,
            });
        }

        let slot = rules
            .iter_mut()
            .find(|stored| stored.id == rule.id)
            .ok_or_else(|| Error::not_found(format!("override {}", rule.id)))?;
        *slot = rule.clone();
        Ok(rule)
    }

    async fn delete_rule(&self, id: RuleId) -> Result<bool> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| rule.id != id);
        Ok(rules.len() != before)
    }
}

/// Backends fixed at startup
///
/// The first configured backend is the default.
#[derive(Clone, Default)]
pub struct InMemoryBackendStore {
    backends: Arc<Vec<Backend>>,
}

impl InMemoryBackendStore {
    pub fn new(backends: Vec<Backend>) -> Self {
        Self {
            backends: Arc::new(backends),
        }
    }
}

#[async_trait]
impl BackendStore for InMemoryBackendStore {
    async fn list_backends(&self) -> Result<Vec<Backend>> {
        Ok(self.backends.as_ref().clone())
    }

    async fn get_backend(&self, key: &BackendKey) -> Result<Option<Backend>> {
        Ok(self
            .backends
            .iter()
            .find(|backend| &backend.key == key)
            .cloned())
    }

    async fn default_backend(&self) -> Result<Option<Backend>> {
        Ok(self.backends.first().cloned())
    }
}
