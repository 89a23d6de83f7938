//! HTTP surface of the override proxy
//!
//! - Proxy path: match an override or forward to a backend
//! - Admin path: manage overrides and inspect backends under `/_admin`

pub mod admin;
pub mod error_response;
pub mod forwarder;
pub mod headers;
pub mod middleware;
pub mod middleware_stack;
pub mod service;
pub mod types;
pub mod url_resolver;

pub use forwarder::{ForwardFailure, OutboundResult, ProxyForwarder, RelayedResponse};
pub use middleware::AdminAuthConfig;
pub use service::ProxyService;
pub use types::{ProxyConfig, ProxyError, ProxyResult};
