//! Endpoint providers.
//!
//! A [`Provider`] decides where requests go and how they authenticate: it
//! builds the base URI, resolves relative paths against it and adds its
//! headers (bearer token, API key, organization).

use std::fmt;

use async_trait::async_trait;
use reqwest::Url;

use crate::http::HeaderSet;
use crate::outcome::ApiError;

pub mod azure;
pub mod openai;

// Re-export for convenience
pub use azure::AzureProvider;
pub use openai::OpenAiProvider;

#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Absolute base URI all request paths are resolved against.
    fn build_base_uri(&self) -> Result<Url, ApiError>;

    /// Absolute URI for a relative request path.
    fn resolve_uri(&self, path: &str) -> Result<Url, ApiError> {
        join_uri(&self.build_base_uri()?, path)
    }

    /// Add authentication and provider policy headers.
    async fn configure_headers(&self, headers: &mut HeaderSet) -> Result<(), ApiError>;
}

/// Append a relative path (which may carry a query) to a base URI.
///
/// # Example
/// ```
/// use aidispatch::providers::join_uri;
/// use reqwest::Url;
///
/// let base = Url::parse("https://api.openai.com/").unwrap();
/// let url = join_uri(&base, "/v1/models").unwrap();
/// assert_eq!(url.as_str(), "https://api.openai.com/v1/models");
/// ```
pub fn join_uri(base: &Url, path: &str) -> Result<Url, ApiError> {
    if path.contains("://") {
        return Err(ApiError::validation(format!(
            "Request path '{path}' must be relative to the provider base URI"
        )));
    }

    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| ApiError::validation(format!("Invalid request URI '{joined}': {e}")))
}

pub(crate) fn parse_base_uri(base: &str) -> Result<Url, ApiError> {
    Url::parse(base).map_err(|e| ApiError::validation(format!("Invalid base URI '{base}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_uri_keeps_base_path_and_query() {
        let base = Url::parse("https://proxy.example.com/openai/").unwrap();
        let url = join_uri(&base, "v1/files?purpose=batch").unwrap();
        assert_eq!(url.as_str(), "https://proxy.example.com/openai/v1/files?purpose=batch");
    }

    #[test]
    fn test_join_uri_rejects_absolute_paths() {
        let base = Url::parse("https://api.openai.com").unwrap();
        assert!(join_uri(&base, "http://other.example.com/v1").is_err());
    }

    #[test]
    fn test_parse_base_uri_rejects_garbage() {
        assert!(parse_base_uri("not a url").is_err());
    }
}
