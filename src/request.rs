//! Description of one outgoing request.

use std::fmt;

use reqwest::Method;
use serde::Serialize;

use crate::content::{Content, ContentFactory, JsonContent, MultipartBody, MultipartContent};
use crate::outcome::ApiError;

/// Method, relative path, optional typed body and the strategy that encodes
/// the body. Consumed by the dispatcher.
///
/// # Example
/// ```
/// use aidispatch::request::RequestDescriptor;
/// use reqwest::Method;
/// use serde_json::json;
///
/// let descriptor = RequestDescriptor::json(Method::POST, "/v1/embeddings", json!({"input": "hi"}));
/// assert_eq!(descriptor.path(), "/v1/embeddings");
/// assert!(descriptor.has_body());
/// ```
pub struct RequestDescriptor<B> {
    method: Method,
    path: String,
    body: Option<B>,
    factory: Box<dyn ContentFactory<B>>,
}

impl RequestDescriptor<()> {
    /// A request without a body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::with_factory(method, path, None, JsonContent)
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }
}

impl<B: Serialize> RequestDescriptor<B> {
    /// A request whose body is sent as JSON.
    pub fn json(method: Method, path: impl Into<String>, body: B) -> Self {
        Self::with_factory(method, path, Some(body), JsonContent)
    }
}

impl<B: MultipartBody> RequestDescriptor<B> {
    /// A request whose body is sent as `multipart/form-data`.
    pub fn multipart(method: Method, path: impl Into<String>, body: B) -> Self {
        Self::with_factory(method, path, Some(body), MultipartContent)
    }
}

impl<B> RequestDescriptor<B> {
    /// A request with a custom content strategy.
    pub fn with_factory(
        method: Method,
        path: impl Into<String>,
        body: Option<B>,
        factory: impl ContentFactory<B> + 'static,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            factory: Box::new(factory),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Local checks made before anything is sent.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.path.trim().is_empty() {
            return Err(ApiError::validation("Request path is empty"));
        }
        if self.path.contains("://") {
            return Err(ApiError::validation(format!(
                "Request path '{}' must be relative to the provider base URI",
                self.path
            )));
        }
        Ok(())
    }

    /// Split into method, path and encoded content.
    pub(crate) fn into_parts(self) -> Result<(Method, String, Option<Content>), ApiError> {
        let content = match self.body {
            Some(body) => Some(self.factory.build(body)?),
            None => None,
        };
        Ok((self.method, self.path, content))
    }
}

impl<B> fmt::Debug for RequestDescriptor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{FilePart, MultipartPayload};
    use crate::outcome::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_descriptor_without_body() {
        let descriptor = RequestDescriptor::get("/v1/models");
        assert_eq!(descriptor.method(), Method::GET);
        assert!(!descriptor.has_body());

        let (method, path, content) = descriptor.into_parts().unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(path, "/v1/models");
        assert!(content.is_none());
    }

    #[test]
    fn test_json_descriptor_encodes_body() {
        let descriptor = RequestDescriptor::json(Method::POST, "/v1/chat/completions", json!({"n": 1}));
        let (_, _, content) = descriptor.into_parts().unwrap();
        assert!(matches!(content, Some(Content::Json(_))));
    }

    #[test]
    fn test_multipart_descriptor_encodes_form() {
        let payload = MultipartPayload::new().file("file", FilePart::from_bytes("a.txt", &b"a"[..]));
        let descriptor = RequestDescriptor::multipart(Method::POST, "/v1/files", payload);
        let (_, _, content) = descriptor.into_parts().unwrap();
        assert!(matches!(content, Some(Content::Multipart(_))));
    }

    #[test]
    fn test_validate_rejects_absolute_and_empty_paths() {
        let absolute = RequestDescriptor::get("https://evil.example.com/v1/models");
        assert_eq!(absolute.validate().unwrap_err().kind(), ErrorKind::Validation);

        let empty = RequestDescriptor::get("  ");
        assert_eq!(empty.validate().unwrap_err().kind(), ErrorKind::Validation);

        assert!(RequestDescriptor::get("/v1/models?limit=2").validate().is_ok());
    }
}
