//! The inbound request as seen by the matcher and the forwarder

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::borrow::Cow;
use std::net::IpAddr;

/// Request body after content-type driven parsing
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text(String),
}

impl RequestBody {
    /// Parse a raw body.
    ///
    /// JSON content types are parsed, and a body that fails to parse is
    /// treated as absent. Any other non-empty UTF-8 body is kept as text.
    pub fn parse(content_type: Option<&str>, bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }

        let is_json = content_type
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));
        if is_json {
            return serde_json::from_slice(bytes).ok().map(Self::Json);
        }

        std::str::from_utf8(bytes)
            .ok()
            .map(|text| Self::Text(text.to_string()))
    }

    /// View the body as a JSON value; text compares as a JSON string.
    pub fn as_value(&self) -> Cow<'_, Value> {
        match self {
            Self::Json(value) => Cow::Borrowed(value),
            Self::Text(text) => Cow::Owned(Value::String(text.clone())),
        }
    }
}

/// One inbound call, owned by the request-handling stack
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub client_address: Option<String>,
}

impl InboundRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: None,
            client_address: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_client_address(mut self, address: impl Into<String>) -> Self {
        self.client_address = Some(address.into());
        self
    }

    /// All values of a header joined with `", "`, looked up case-insensitively.
    ///
    /// Returns `None` when the header is missing or any value is not
    /// visible ASCII.
    pub fn header_value(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        let mut values = self.headers.get_all(name.as_str()).iter().peekable();
        values.peek()?;

        values
            .map(|v| v.to_str().ok())
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join(", "))
    }
}

/// Resolve the caller's address from proxy headers, falling back to the peer.
///
/// Order of preference: first entry of `x-forwarded-for`, `x-real-ip`,
/// `x-vercel-forwarded-for`, then the TCP peer.
pub fn resolve_client_address(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    header("x-real-ip")
        .or_else(|| header("x-vercel-forwarded-for"))
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;

    #[test]
    fn test_json_body_is_parsed() {
        let body = RequestBody::parse(Some("application/json; charset=utf-8"), br#"{"a":1}"#);
        assert_eq!(body, Some(RequestBody::Json(json!({"a": 1}))));
    }

    #[test]
    fn test_malformed_json_is_absent() {
        assert_eq!(RequestBody::parse(Some("application/json"), b"{nope"), None);
        assert_eq!(RequestBody::parse(Some("application/json"), b""), None);
    }

    #[test]
    fn test_other_bodies_are_text() {
        assert_eq!(
            RequestBody::parse(Some("text/plain"), b"hello"),
            Some(RequestBody::Text("hello".to_string()))
        );
        assert_eq!(
            RequestBody::parse(None, b"a=1&b=2"),
            Some(RequestBody::Text("a=1&b=2".to_string()))
        );
        assert_eq!(RequestBody::parse(None, &[0xff, 0xfe]), None);
    }

    #[test]
    fn test_header_values_are_joined() {
        let request = InboundRequest::new(Method::GET, "/")
            .with_header("accept", "text/html")
            .with_header("accept", "application/json");

        assert_eq!(
            request.header_value("Accept").as_deref(),
            Some("text/html, application/json")
        );
        assert_eq!(request.header_value("x-missing"), None);
    }

    #[test]
    fn test_client_address_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", " 203.0.113.5 , 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());

        let peer = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            resolve_client_address(&headers, peer).as_deref(),
            Some("203.0.113.5")
        );
    }

    #[test]
    fn test_client_address_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-vercel-forwarded-for", "198.51.100.9".parse().unwrap());
        assert_eq!(
            resolve_client_address(&headers, None).as_deref(),
            Some("198.51.100.9")
        );

        let peer = Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(
            resolve_client_address(&HeaderMap::new(), peer).as_deref(),
            Some("10.1.2.3")
        );
        assert_eq!(resolve_client_address(&HeaderMap::new(), None), None);
    }
}
