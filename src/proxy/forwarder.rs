//! Outbound forwarding of unmatched requests to a backend
//!
//! The forwarder rebuilds the call from the parsed [`InboundRequest`],
//! injects the backend's auth headers, enforces the backend deadline over
//! the whole exchange and buffers the response so it can be relayed as-is.

use crate::domain::{Backend, InboundRequest, RequestBody};
use crate::proxy::headers::{self, content_types, CONTENT_TYPE};
use crate::proxy::types::*;
use crate::proxy::url_resolver::UrlResolver;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::ext::ReasonPhrase;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// A backend response buffered for relay
#[derive(Debug, Clone)]
pub struct RelayedResponse {
    pub status: StatusCode,
    pub reason: Option<ReasonPhrase>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RelayedResponse {
    /// The status text the backend sent, or the canonical one.
    pub fn status_text(&self) -> String {
        match &self.reason {
            Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
            None => self.status.canonical_reason().unwrap_or_default().to_string(),
        }
    }
}

impl IntoResponse for RelayedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(reason) = self.reason {
            response.extensions_mut().insert(reason);
        }
        response
    }
}

/// Why a forwarded call produced no backend response
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardFailure {
    Timeout(Duration),
    Transport(String),
}

impl ForwardFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::Timeout(_) => json!({ "error": "Request timeout" }),
            Self::Transport(message) => json!({
                "error": "Proxy request failed",
                "message": message,
            }),
        }
    }
}

impl From<ProxyError> for ForwardFailure {
    fn from(error: ProxyError) -> Self {
        match error {
            ProxyError::RequestTimeout(duration) => Self::Timeout(duration),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl IntoResponse for ForwardFailure {
    fn into_response(self) -> Response {
        (self.status(), Json(self.payload())).into_response()
    }
}

/// Outcome of forwarding one request
#[derive(Debug, Clone)]
pub enum OutboundResult {
    Relayed(RelayedResponse),
    Failed(ForwardFailure),
}

impl OutboundResult {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Relayed(relayed) => relayed.status,
            Self::Failed(failure) => failure.status(),
        }
    }
}

impl IntoResponse for OutboundResult {
    fn into_response(self) -> Response {
        match self {
            Self::Relayed(relayed) => relayed.into_response(),
            Self::Failed(failure) => failure.into_response(),
        }
    }
}

/// HTTP(S) client wrapper used for every forwarded call
#[derive(Clone)]
pub struct ProxyForwarder {
    client: HttpsClient,
}

impl Default for ProxyForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyForwarder {
    pub fn new() -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .build(connector);

        Self { client }
    }

    /// Forward `request` to `backend` and capture the full response.
    ///
    /// Never returns an error: failures become 504/502 outcomes.
    pub async fn forward(&self, request: &InboundRequest, backend: &Backend) -> OutboundResult {
        let start_time = Instant::now();
        let deadline = backend.timeout.as_duration();

        let outcome = match self.build_request(request, backend) {
            Ok(outgoing) => match tokio::time::timeout(deadline, self.execute(outgoing)).await {
                Ok(result) => result,
                Err(_) => Err(ProxyError::RequestTimeout(deadline)),
            },
            Err(e) => Err(e),
        };

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        match outcome {
            Ok(relayed) => {
                info!(
                    backend = %backend.key,
                    method = %request.method,
                    path = %request.path_and_query,
                    status = relayed.status.as_u16(),
                    elapsed_ms,
                    "Request forwarded"
                );
                OutboundResult::Relayed(relayed)
            }
            Err(error) => {
                warn!(
                    backend = %backend.key,
                    method = %request.method,
                    path = %request.path_and_query,
                    elapsed_ms,
                    error = %error,
                    "Forwarding failed"
                );
                OutboundResult::Failed(error.into())
            }
        }
    }

    fn build_request(
        &self,
        request: &InboundRequest,
        backend: &Backend,
    ) -> ProxyResult<Request<Full<Bytes>>> {
        let uri = UrlResolver::resolve_target_uri(&backend.base_url, &request.path_and_query)?;

        let mut outbound_headers = request.headers.clone();
        for (name, value) in &backend.auth_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ProxyError::InvalidHeader { name: name.clone() })?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ProxyError::InvalidHeader { name: name.clone() })?;
            outbound_headers.insert(header_name, header_value);
        }
        headers::strip_for_forwarding(&mut outbound_headers);

        let body = outbound_body(&request.method, request.body.as_ref(), &mut outbound_headers)?;

        debug!(target_uri = %uri, "Built outbound request");

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = outbound_headers;
        }
        Ok(builder.body(Full::new(body))?)
    }

    async fn execute(&self, outgoing: Request<Full<Bytes>>) -> ProxyResult<RelayedResponse> {
        let response = self
            .client
            .request(outgoing)
            .await
            .map_err(|e| ProxyError::Connection(error_chain(&e)))?;

        let (mut parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| ProxyError::Body(error_chain(&e)))?
            .to_bytes();

        headers::strip_hop_by_hop(&mut parts.headers);

        Ok(RelayedResponse {
            status: parts.status,
            reason: parts.extensions.remove::<ReasonPhrase>(),
            headers: parts.headers,
            body,
        })
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn outbound_body(
    method: &Method,
    body: Option<&RequestBody>,
    headers: &mut HeaderMap,
) -> ProxyResult<Bytes> {
    if !carries_body(method) {
        return Ok(Bytes::new());
    }

    match body {
        None => Ok(Bytes::new()),
        Some(RequestBody::Text(text)) => Ok(Bytes::from(text.clone())),
        Some(RequestBody::Json(value)) => {
            let encoded = serde_json::to_vec(value).map_err(|e| ProxyError::Body(e.to_string()))?;
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(content_types::APPLICATION_JSON));
            Ok(Bytes::from(encoded))
        }
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
