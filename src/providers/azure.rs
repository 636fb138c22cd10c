//! Azure OpenAI endpoint provider.
//!
//! Requests go to a deployment-scoped base URI, carry an `api-version` query
//! parameter and authenticate with the `api-key` header.
//! See: <https://learn.microsoft.com/azure/ai-services/openai/reference>

use async_trait::async_trait;
use reqwest::Url;

use super::{join_uri, parse_base_uri, Provider};
use crate::http::HeaderSet;
use crate::options::SecretString;
use crate::outcome::ApiError;

pub const DEFAULT_API_VERSION: &str = "2024-10-21";

/// Azure OpenAI deployment endpoint.
#[derive(Debug, Clone)]
pub struct AzureProvider {
    api_key: SecretString,
    endpoint: String,
    deployment: String,
    api_version: String,
}

impl AzureProvider {
    /// Endpoint for `https://{resource}.openai.azure.com`.
    pub fn new(
        resource: impl AsRef<str>,
        deployment: impl Into<String>,
        api_key: impl Into<SecretString>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: format!("https://{}.openai.azure.com", resource.as_ref()),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// Use a custom endpoint instead of the resource-derived one.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }
}

/// Drop the leading `/v1` segment used by OpenAI-style paths.
fn strip_version_prefix(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    match trimmed.strip_prefix("v1") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') => rest,
        _ => trimmed,
    }
}

#[async_trait]
impl Provider for AzureProvider {
    fn build_base_uri(&self) -> Result<Url, ApiError> {
        if self.deployment.trim().is_empty() {
            return Err(ApiError::validation("Azure deployment name is required"));
        }
        parse_base_uri(&format!(
            "{}/openai/deployments/{}",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        ))
    }

    fn resolve_uri(&self, path: &str) -> Result<Url, ApiError> {
        let mut url = join_uri(&self.build_base_uri()?, strip_version_prefix(path))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    async fn configure_headers(&self, headers: &mut HeaderSet) -> Result<(), ApiError> {
        if self.api_key.is_empty() {
            return Err(ApiError::validation("API key is required"));
        }
        headers.set_sensitive("api-key", self.api_key.expose_secret())
    }
}
