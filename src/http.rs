//! HTTP client utilities: client construction, header merging and the
//! pre-send hook.

use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Request};

use crate::options::TransportOptions;
use crate::outcome::ApiError;

/// Build a configured HTTP client from transport options.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(options: &TransportOptions) -> Result<Client, ApiError> {
    let mut builder = Client::builder();

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(timeout) = options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ApiError::validation(format!("Invalid proxy URL '{proxy_url}': {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(ApiError::transport)
}

/// Ordered, case-insensitive set of request headers.
///
/// Setting a header that is already present replaces its value but keeps its
/// original position.
///
/// # Example
/// ```
/// use aidispatch::http::HeaderSet;
///
/// let mut headers = HeaderSet::new();
/// headers.set("Accept", "application/json").unwrap();
/// headers.set("X-Trace", "1").unwrap();
/// headers.set("accept", "text/event-stream").unwrap();
///
/// let names: Vec<_> = headers.iter().map(|(name, _)| name.as_str()).collect();
/// assert_eq!(names, ["accept", "x-trace"]);
/// assert_eq!(headers.get("ACCEPT").unwrap(), "text/event-stream");
/// ```
#[derive(Clone, Default)]
pub struct HeaderSet {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Parse and insert a header.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ApiError> {
        let (name, value) = parse_header(name, value)?;
        self.insert(name, value);
        Ok(())
    }

    /// Insert a header whose value must never show up in logs.
    pub fn set_sensitive(&mut self, name: &str, value: &str) -> Result<(), ApiError> {
        let (name, mut value) = parse_header(name, value)?;
        value.set_sensitive(true);
        self.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.as_str().eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let index = self
            .entries
            .iter()
            .position(|(existing, _)| existing.as_str().eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(name, value)| (name, value))
    }

    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            map.insert(name.clone(), value.clone());
        }
        map
    }
}

impl fmt::Debug for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, value)| {
                let shown = if value.is_sensitive() {
                    "[REDACTED]"
                } else {
                    value.to_str().unwrap_or("[binary]")
                };
                (name.as_str(), shown)
            }))
            .finish()
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ApiError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ApiError::validation(format!("Invalid header name '{name}': {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| ApiError::validation(format!("Invalid value for header '{name}': {e}")))?;
    Ok((name, value))
}

/// Add the extra headers from transport options, after the provider's own.
pub fn add_extra_headers(headers: &mut HeaderSet, options: &TransportOptions) -> Result<(), ApiError> {
    for (key, value) in &options.extra_headers {
        headers.set(key, value)?;
    }
    Ok(())
}

/// Hook run on every request right before it is sent.
///
/// Hooks may rewrite the request in place (headers, URL, body). Returning an
/// error aborts the call with that error.
pub trait BeforeSend: Send + Sync {
    fn before_send(&self, request: &mut Request) -> Result<(), ApiError>;
}

impl<F> BeforeSend for F
where
    F: Fn(&mut Request) -> Result<(), ApiError> + Send + Sync,
{
    fn before_send(&self, request: &mut Request) -> Result<(), ApiError> {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ErrorKind;
    use std::time::Duration;

    #[test]
    fn test_build_http_client() {
        let options = TransportOptions::new()
            .with_timeout(Duration::from_secs(30))
            .with_connect_timeout(Duration::from_secs(5));

        assert!(build_http_client(&options).is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let options = TransportOptions::new().with_proxy("http://proxy.example.com:8080");

        assert!(build_http_client(&options).is_ok());
    }

    #[test]
    fn test_header_set_last_writer_wins_in_place() {
        let mut headers = HeaderSet::new();
        headers.set("User-Agent", "lib/1").unwrap();
        headers.set("Accept", "application/json").unwrap();
        headers.set("Authorization", "Bearer a").unwrap();
        headers.set("USER-AGENT", "caller/2").unwrap();

        let merged: Vec<_> = headers
            .iter()
            .map(|(name, value)| (name.as_str().to_owned(), value.to_str().unwrap().to_owned()))
            .collect();
        assert_eq!(
            merged,
            vec![
                ("user-agent".to_owned(), "caller/2".to_owned()),
                ("accept".to_owned(), "application/json".to_owned()),
                ("authorization".to_owned(), "Bearer a".to_owned()),
            ]
        );

        let map = headers.to_header_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("user-agent").unwrap(), "caller/2");
    }

    #[test]
    fn test_header_set_remove_keeps_order() {
        let mut headers = HeaderSet::new();
        headers.set("a", "1").unwrap();
        headers.set("b", "2").unwrap();
        headers.set("c", "3").unwrap();

        assert_eq!(headers.remove("B").unwrap(), "2");
        let names: Vec<_> = headers.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
        assert!(headers.remove("b").is_none());
    }

    #[test]
    fn test_header_set_redacts_sensitive_values() {
        let mut headers = HeaderSet::new();
        headers.set_sensitive("Authorization", "Bearer secret").unwrap();
        headers.set("Accept", "application/json").unwrap();

        let rendered = format!("{headers:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("application/json"));
    }

    #[test]
    fn test_invalid_header_is_validation_error() {
        let mut headers = HeaderSet::new();
        let error = headers.set("bad header", "x").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);

        let error = headers.set("x-ok", "line\nbreak").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_add_extra_headers_overrides() {
        let mut headers = HeaderSet::new();
        headers.set("x-source", "lib").unwrap();
        let options = TransportOptions::new()
            .with_header("X-Source", "caller")
            .with_header("x-extra", "1");

        add_extra_headers(&mut headers, &options).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("x-source").unwrap(), "caller");
    }
}
