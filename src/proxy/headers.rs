//! HTTP header constants and utilities for the proxy service
//!
//! Centralizes the header names the proxy reads or strips so the
//! forwarder, the synthetic response builder and the middleware agree.

use ::http::{header, HeaderMap};

/// Header selecting which configured backend a request is routed to
pub const X_OVERRIDE_BACKEND: &str = "x-override-backend";

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header carrying the admin user key
pub const X_API_KEY: &str = "x-api-key";

/// Standard header re-exports for convenience
pub use header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};

/// Connection-scoped headers that never survive a hop
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Request headers echoed into a synthetic response, minus these
pub const NOT_ECHOED: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    X_OVERRIDE_BACKEND,
];

/// Well-known paths
pub mod paths {
    /// Prefix of every admin route; never proxied
    pub const ADMIN_PREFIX: &str = "/_admin";

    /// Health check endpoint path
    pub const HEALTH: &str = "/_admin/health";
}

/// Common content types
pub mod content_types {
    pub const APPLICATION_JSON: &str = "application/json";
}

/// Remove everything that must not be forwarded verbatim to a backend.
pub fn strip_for_forwarding(headers: &mut HeaderMap) {
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    headers.remove(X_OVERRIDE_BACKEND);
    strip_hop_by_hop(headers);
}

/// Remove connection-scoped headers, e.g. before relaying a re-framed body.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
