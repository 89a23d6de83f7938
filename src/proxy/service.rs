//! Main proxy service implementation
//!
//! The `ProxyService` is the HTTP entry point of the override proxy. Every
//! path outside `/_admin` is answered by the fallback handler, which either
//! synthesizes a response from a matching override or forwards the request
//! to the selected backend.
//!
//! ## Service Lifecycle
//!
//! ```rust,ignore
//! use override_proxy::proxy::{AdminAuthConfig, ProxyConfig, ProxyService};
//!
//! let service = ProxyService::new(overrides, ProxyConfig::default());
//! let router = service.into_router(AdminAuthConfig::default());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(
//!     listener,
//!     router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! ```

use crate::application::overrides::OverrideService;
use crate::domain::{request::resolve_client_address, InboundRequest, RequestBody};
use crate::error::Error;
use crate::proxy::headers::{paths, CONTENT_TYPE};
use crate::proxy::middleware::AdminAuthConfig;
use crate::proxy::middleware_stack::ProxyMiddlewareStack;
use crate::proxy::{admin, types::ProxyConfig};
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub overrides: OverrideService,
    pub config: Arc<ProxyConfig>,
}

/// Caller address resolved from proxy headers or the TCP peer
#[derive(Debug, Clone)]
pub struct ClientAddress(pub Option<String>);

impl<S> FromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self(resolve_client_address(&parts.headers, peer)))
    }
}

/// HTTP front of the override proxy
pub struct ProxyService {
    overrides: OverrideService,
    config: ProxyConfig,
}

impl ProxyService {
    pub fn new(overrides: OverrideService, config: ProxyConfig) -> Self {
        Self { overrides, config }
    }

    /// Create an Axum router for the proxy service with middleware
    pub fn into_router(self, admin_auth: AdminAuthConfig) -> axum::Router {
        let max_request_size = *self.config.max_request_size.as_ref();
        let state = AppState {
            overrides: self.overrides,
            config: Arc::new(self.config),
        };

        let middleware_stack = ProxyMiddlewareStack::new(admin_auth, max_request_size);
        let admin = middleware_stack.guard_admin(admin::routes());

        let router = axum::Router::new()
            .merge(admin)
            .fallback(proxy_handler)
            .with_state(state);

        middleware_stack.apply_to_router(router)
    }
}

/// Axum handler for every non-admin request
async fn proxy_handler(
    State(state): State<AppState>,
    ClientAddress(client_address): ClientAddress,
    request: Request<Body>,
) -> Result<Response, Error> {
    let path = request.uri().path();
    if path == paths::ADMIN_PREFIX || path.starts_with(&format!("{}/", paths::ADMIN_PREFIX)) {
        return Err(Error::not_found(format!("admin route {path}")));
    }

    let inbound = read_inbound(request, client_address, *state.config.max_request_size.as_ref())
        .await?;
    let outcome = state.overrides.handle(&inbound).await?;

    Ok(outcome.into_response())
}

/// Buffer and parse the request into the form the matcher works on.
async fn read_inbound(
    request: Request<Body>,
    client_address: Option<String>,
    limit: usize,
) -> Result<InboundRequest, Error> {
    let (parts, body) = request.into_parts();

    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                Error::PayloadTooLarge { limit }
            } else {
                Error::invalid_input("body", format!("Body collection error: {e}"))
            }
        })?
        .to_bytes();

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let body = RequestBody::parse(content_type, &bytes);

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    Ok(InboundRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
        client_address,
    })
}
