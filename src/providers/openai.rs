//! OpenAI endpoint provider.
//!
//! Bearer-token authentication with optional organization and project
//! headers. See: <https://platform.openai.com/docs/api-reference/authentication>

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Url;

use super::{parse_base_uri, Provider};
use crate::http::HeaderSet;
use crate::options::SecretString;
use crate::outcome::ApiError;

const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// OpenAI (or any OpenAI-compatible) endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: SecretString,
    base_url: String,
    organization: Option<String>,
    project: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            organization: None,
            project: None,
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn build_base_uri(&self) -> Result<Url, ApiError> {
        parse_base_uri(&self.base_url)
    }

    async fn configure_headers(&self, headers: &mut HeaderSet) -> Result<(), ApiError> {
        // Validate API key is present
        if self.api_key.is_empty() {
            return Err(ApiError::validation("API key is required"));
        }

        headers.set_sensitive(
            AUTHORIZATION.as_str(),
            &format!("Bearer {}", self.api_key.expose_secret()),
        )?;

        if let Some(organization) = &self.organization {
            headers.set("OpenAI-Organization", organization)?;
        }
        if let Some(project) = &self.project {
            headers.set("OpenAI-Project", project)?;
        }

        Ok(())
    }
}
