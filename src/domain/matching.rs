//! Request-to-rule matching
//!
//! Rules are scanned in the order given and the first applicable one wins.
//! Callers that want "most specific first" must order the list themselves;
//! two overlapping rules resolve to whichever comes first.

use crate::domain::request::InboundRequest;
use crate::domain::rule::{Rule, RuleHeaders};
use crate::domain::value::deep_equal;
use serde_json::Value;

/// Strip trailing slashes; an empty result collapses to `/`.
///
/// Query strings are part of the literal path and are left alone.
pub fn normalize_path(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// First rule in `rules` that matches `request`.
pub fn find_match<'a, I>(request: &InboundRequest, rules: I) -> Option<&'a Rule>
where
    I: IntoIterator<Item = &'a Rule>,
{
    rules.into_iter().find(|rule| matches(request, rule))
}

/// Whether a single rule applies to a request.
pub fn matches(request: &InboundRequest, rule: &Rule) -> bool {
    method_matches(request, rule)
        && path_matches(request, rule)
        && headers_match(request, rule.headers.as_ref())
        && body_matches(request, rule.body.as_ref())
}

fn method_matches(request: &InboundRequest, rule: &Rule) -> bool {
    request
        .method
        .as_str()
        .eq_ignore_ascii_case(rule.method.as_ref())
}

fn path_matches(request: &InboundRequest, rule: &Rule) -> bool {
    normalize_path(&request.path_and_query) == normalize_path(rule.path.as_ref())
}

/// Subset match: every expected header must be present with the same value.
fn headers_match(request: &InboundRequest, expected: Option<&RuleHeaders>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    expected.iter().all(|(name, value)| {
        request
            .header_value(name)
            .is_some_and(|actual| actual == *value)
    })
}

fn body_matches(request: &InboundRequest, expected: Option<&Value>) -> bool {
    match (expected, &request.body) {
        (None, _) | (Some(Value::Null), _) => true,
        (Some(_), None) => false,
        (Some(expected), Some(actual)) => deep_equal(expected, &actual.as_value()),
    }
}
