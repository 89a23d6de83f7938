//! Duplicate-rule detection
//!
//! Two rules are duplicates when their normalized `(method, path, headers,
//! body)` keys are identical. Unlike matching, headers must be equal as a
//! whole set: rules differing only in an extra header are distinct even if
//! one request could satisfy both.

use crate::domain::matching::normalize_path;
use crate::domain::rule::{Rule, RuleHeaders, RuleId};
use crate::domain::value::canonical_json;
use serde_json::{Map, Value};

/// Normalized identity of what a rule matches on.
///
/// Absent headers and absent bodies are `None`, which never equals any
/// serialized value (including `{}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey {
    method: String,
    path: String,
    headers: Option<String>,
    body: Option<String>,
}

impl MatchKey {
    pub fn of(rule: &Rule) -> Self {
        Self {
            method: rule.method.as_ref().to_ascii_uppercase(),
            path: normalize_path(rule.path.as_ref()).to_string(),
            headers: normalized_headers(rule.headers.as_ref()),
            body: normalized_body(rule.body.as_ref()),
        }
    }

    fn same_route(&self, other: &Self) -> bool {
        self.method == other.method && self.path == other.path
    }
}

/// Lower-case header names, sort, serialize.
pub fn normalized_headers(headers: Option<&RuleHeaders>) -> Option<String> {
    headers.map(|headers| {
        let lowered: Map<String, Value> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), Value::String(value.clone())))
            .collect();
        canonical_json(&Value::Object(lowered))
    })
}

pub fn normalized_body(body: Option<&Value>) -> Option<String> {
    body.filter(|b| !b.is_null()).map(canonical_json)
}

/// The existing rule `candidate` would duplicate, if any.
///
/// `exclude_id` skips the rule being updated so it does not collide with
/// its own stored version.
pub fn find_duplicate<'a>(
    candidate: &Rule,
    existing: &'a [Rule],
    exclude_id: Option<RuleId>,
) -> Option<&'a Rule> {
    let key = MatchKey::of(candidate);

    existing
        .iter()
        .filter(|rule| Some(rule.id) != exclude_id)
        .find(|rule| {
            let other = MatchKey::of(rule);
            key.same_route(&other) && key.headers == other.headers && key.body == other.body
        })
}

pub fn is_duplicate(candidate: &Rule, existing: &[Rule], exclude_id: Option<RuleId>) -> bool {
    find_duplicate(candidate, existing, exclude_id).is_some()
}
