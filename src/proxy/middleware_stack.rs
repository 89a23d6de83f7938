//! Middleware stack builder for clean composition
//!
//! This module provides a builder pattern for composing the Tower middleware stack,
//! making it easier to maintain and test the middleware pipeline.

use crate::proxy::middleware::*;
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Builder for composing the proxy middleware stack
pub struct ProxyMiddlewareStack {
    admin_auth: Arc<AdminAuthConfig>,
    max_request_size: usize,
}

impl ProxyMiddlewareStack {
    pub fn new(admin_auth: AdminAuthConfig, max_request_size: usize) -> Self {
        Self {
            admin_auth: Arc::new(admin_auth),
            max_request_size,
        }
    }

    /// Wrap the admin routes with the user key check and body limit.
    ///
    /// Layers added here only apply to the admin routes, never to the
    /// proxy fallback, which enforces its own limit while buffering.
    pub fn guard_admin<S>(&self, admin: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        admin
            .layer(from_fn_with_state(
                self.admin_auth.clone(),
                admin_key_middleware,
            ))
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(self.max_request_size))
    }

    /// Apply the request-wide middleware to a router
    ///
    /// Order (outer to inner):
    /// 1. Request ID generation/propagation
    /// 2. Logging (with request ID)
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .layer(from_fn(logging_middleware))
            .layer(from_fn(request_id_middleware))
    }
}
