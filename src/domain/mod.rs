//! Domain types and the pure decision logic of the override proxy
//!
//! Everything in here is synchronous and side-effect free: rule matching,
//! duplicate detection, IP normalization and JSON value comparison.

pub mod backend;
pub mod ip;
pub mod matching;
pub mod request;
pub mod rule;
pub mod validation;
pub mod value;

pub use backend::{Backend, BackendKey, BaseUrl, TimeoutMillis};
pub use request::{InboundRequest, RequestBody};
pub use rule::{HttpMethod, NewRule, ResponseStatus, Rule, RuleHeaders, RuleId, RulePatch, RulePath};
