//! Strategies that turn a typed request body into HTTP content.
//!
//! A [`ContentFactory`] is chosen per request: [`JsonContent`] for ordinary
//! bodies, [`MultipartContent`] for bodies that carry file attachments.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Serialize;

use crate::outcome::ApiError;

/// Encoded request content, ready to attach to a request.
#[derive(Debug)]
pub enum Content {
    /// JSON bytes, sent with `Content-Type: application/json`.
    Json(Bytes),
    /// A multipart form; the boundary content type is set when attached.
    Multipart(Form),
}

/// Turns a typed body into [`Content`].
pub trait ContentFactory<B>: Send + Sync {
    fn build(&self, body: B) -> Result<Content, ApiError>;
}

/// Encodes the body as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContent;

impl<B: Serialize> ContentFactory<B> for JsonContent {
    fn build(&self, body: B) -> Result<Content, ApiError> {
        let bytes = serde_json::to_vec(&body).map_err(ApiError::encoding)?;
        Ok(Content::Json(Bytes::from(bytes)))
    }
}

/// A file attachment in a multipart body.
///
/// Holds either a streamed body or an in-memory buffer. When both are set
/// the stream is sent.
#[derive(Debug, Default)]
pub struct FilePart {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub stream: Option<Body>,
    pub bytes: Option<Bytes>,
}

impl FilePart {
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: Some(bytes.into()),
            ..Self::default()
        }
    }

    /// Attach a streamed body, e.g. `reqwest::Body::wrap_stream(...)` over a file.
    pub fn from_stream(file_name: impl Into<String>, stream: impl Into<Body>) -> Self {
        Self {
            file_name: file_name.into(),
            stream: Some(stream.into()),
            ..Self::default()
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    fn into_part(self, field: &str) -> Result<Part, ApiError> {
        if self.file_name.trim().is_empty() {
            return Err(ApiError::validation(format!(
                "File part '{field}' has no file name"
            )));
        }

        let part = match (self.stream, self.bytes) {
            (Some(stream), _) => Part::stream(stream),
            (None, Some(bytes)) => {
                let length = bytes.len() as u64;
                Part::stream_with_length(Body::from(bytes), length)
            }
            (None, None) => {
                return Err(ApiError::validation(format!(
                    "File part '{field}' has neither a stream nor a byte buffer"
                )))
            }
        };
        let part = part.file_name(self.file_name);

        match self.mime_type {
            Some(mime) => part
                .mime_str(&mime)
                .map_err(|e| ApiError::validation(format!("Invalid MIME type '{mime}': {e}"))),
            None => Ok(part),
        }
    }
}

/// Text fields and file parts of a multipart body, in send order.
#[derive(Debug, Default)]
pub struct MultipartPayload {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, FilePart)>,
}

impl MultipartPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, name: impl Into<String>, file: FilePart) -> Self {
        self.files.push((name.into(), file));
        self
    }
}

/// A request body that is sent as `multipart/form-data`.
pub trait MultipartBody: Send {
    fn into_multipart(self) -> MultipartPayload;
}

impl MultipartBody for MultipartPayload {
    fn into_multipart(self) -> MultipartPayload {
        self
    }
}

/// Builds a multipart form from a [`MultipartBody`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartContent;

impl<B: MultipartBody> ContentFactory<B> for MultipartContent {
    fn build(&self, body: B) -> Result<Content, ApiError> {
        let payload = body.into_multipart();

        let mut form = Form::new();
        for (name, value) in payload.fields {
            form = form.text(name, value);
        }
        for (name, file) in payload.files {
            let part = file.into_part(&name)?;
            form = form.part(name, part);
        }

        Ok(Content::Multipart(form))
    }
}
