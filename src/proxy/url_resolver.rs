//! Target URL resolution for forwarded requests

use crate::domain::BaseUrl;
use crate::proxy::types::*;
use hyper::Uri;

/// Strategy for composing a backend origin with the inbound path
pub struct UrlResolver;

impl UrlResolver {
    /// Resolve the final URI for the outgoing request.
    ///
    /// The base URL's own path, if any, acts as a prefix; the inbound path
    /// and query are appended unchanged.
    pub fn resolve_target_uri(base_url: &BaseUrl, path_and_query: &str) -> ProxyResult<Uri> {
        let base = base_url.as_ref().trim_end_matches('/');
        let path_and_query = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };

        let final_uri_str = format!("{base}{path_and_query}");
        let uri: Uri = final_uri_str
            .parse()
            .map_err(|_| ProxyError::InvalidTargetUrl(final_uri_str.clone()))?;

        if uri.host().is_none() {
            return Err(ProxyError::InvalidTargetUrl(final_uri_str));
        }

        Ok(uri)
    }
}
