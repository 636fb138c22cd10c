//! Configuration for the HTTP transport and credentials.

use std::time::Duration;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("aidispatch/", env!("CARGO_PKG_VERSION"));

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Transport configuration shared by every request of a client.
///
/// # Example
/// ```rust
/// use aidispatch::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new()
///     .with_timeout(Duration::from_secs(30))
///     .with_header("x-request-source", "batch");
/// assert_eq!(options.extra_headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Total request timeout, including reading the body.
    pub timeout: Option<Duration>,

    pub connect_timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Overrides [`DEFAULT_USER_AGENT`].
    pub user_agent: Option<String>,

    /// Headers added after the provider's own, in insertion order.
    pub extra_headers: Vec<(String, String)>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((key.into(), value.into()));
        self
    }

    pub(crate) fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}
