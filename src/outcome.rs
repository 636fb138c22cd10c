//! Result envelope returned by every public operation.
//!
//! An [`Outcome`] is a decoded payload, an empty success, or an [`ApiError`]
//! describing why the call failed. Nothing on the public surface returns a
//! bare `Err` or panics because a request went wrong.

use std::error::Error as StdError;
use std::fmt;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{self, StringOrList};

/// Boxed error kept as the source of a transport failure.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Coarse classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection, timeout, body read or cancellation.
    Transport,
    /// The remote API answered with an error.
    RemoteApi,
    /// A body did not match the requested shape.
    Serialization,
    /// The request failed a local check before anything was sent.
    Validation,
}

/// Errors captured by the dispatch pipeline.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Remote API error (HTTP {status}): {message}")]
    RemoteApi {
        status: StatusCode,
        message: String,
        body: Option<ErrorBody>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
        /// Raw text that failed to decode, when there was one.
        payload: Option<String>,
        status: Option<StatusCode>,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ApiError {
    /// Wrap a network or I/O fault, keeping it as the error source.
    pub fn transport<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transport {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// A body that could not be encoded for sending.
    pub(crate) fn encoding(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
            source: Some(error),
            payload: None,
            status: None,
        }
    }

    pub(crate) fn decoding(error: serde_json::Error, payload: &[u8], status: StatusCode) -> Self {
        Self::Serialization {
            message: error.to_string(),
            source: Some(error),
            payload: Some(String::from_utf8_lossy(payload).into_owned()),
            status: Some(status),
        }
    }

    pub(crate) fn remote(status: StatusCode, body: ErrorBody) -> Self {
        let message = body
            .render()
            .unwrap_or_else(|| status_reason(status));
        Self::RemoteApi {
            status,
            message,
            body: Some(body),
        }
    }

    /// Build the error for a non-2xx response.
    ///
    /// The body is parsed as the API's `{"error": {...}}` envelope when
    /// possible; otherwise the raw text is kept verbatim.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
            return Self::remote(status, envelope.error);
        }

        let text = String::from_utf8_lossy(body).into_owned();
        let message = if text.trim().is_empty() {
            status_reason(status)
        } else {
            text
        };

        Self::RemoteApi {
            status,
            message,
            body: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::Cancelled => ErrorKind::Transport,
            Self::RemoteApi { .. } => ErrorKind::RemoteApi,
            Self::Serialization { .. } => ErrorKind::Serialization,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// HTTP status received from the server, if the call got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RemoteApi { status, .. } => Some(*status),
            Self::Serialization { status, .. } => *status,
            _ => None,
        }
    }

    /// The structured error body sent by the remote API.
    pub fn body(&self) -> Option<&ErrorBody> {
        match self {
            Self::RemoteApi { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether sending the same request again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::RemoteApi { status, .. } => {
                *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error()
            }
            _ => false,
        }
    }
}

fn status_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// Error object sent by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<StringOrList>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,

    #[serde(
        default,
        deserialize_with = "codec::string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,
}

impl ErrorBody {
    /// Human readable message, with the error code appended when present.
    pub fn render(&self) -> Option<String> {
        let message = self.message.as_ref().map(StringOrList::display_string)?;
        Some(match &self.code {
            Some(code) => format!("{message} [code: {code}]"),
            None => message,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// Decode a JSON body into `T`.
///
/// A body that does not fit `T` but is the API's error envelope becomes
/// [`ApiError::RemoteApi`]; anything else becomes [`ApiError::Serialization`].
pub(crate) fn decode_payload<T: DeserializeOwned>(
    payload: &[u8],
    status: StatusCode,
) -> Result<T, ApiError> {
    serde_json::from_slice::<T>(payload).map_err(|error| {
        match serde_json::from_slice::<ErrorEnvelope>(payload) {
            Ok(envelope) => ApiError::remote(status, envelope.error),
            Err(_) => ApiError::decoding(error, payload, status),
        }
    })
}

/// Outcome of one HTTP operation.
#[derive(Debug)]
#[must_use]
pub enum Outcome<T> {
    /// Success with a decoded payload.
    Success(T),
    /// Success without a payload (empty body, or a stream that completed).
    Empty,
    Failure(ApiError),
}

impl<T> Outcome<T> {
    pub(crate) fn from_optional(result: Result<Option<T>, ApiError>) -> Self {
        match result {
            Ok(Some(payload)) => Self::Success(payload),
            Ok(None) => Self::Empty,
            Err(error) => Self::Failure(error),
        }
    }

    /// True unless the outcome carries an error.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Option<T> {
        match self {
            Self::Success(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_error(self) -> Option<ApiError> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Convert into a standard `Result` for use with `?`.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        match self {
            Self::Success(payload) => Ok(Some(payload)),
            Self::Empty => Ok(None),
            Self::Failure(error) => Err(error),
        }
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(payload) => Outcome::Success(f(payload)),
            Self::Empty => Outcome::Empty,
            Self::Failure(error) => Outcome::Failure(error),
        }
    }
}

impl<T> From<Result<T, ApiError>> for Outcome<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(error) => Self::Failure(error),
        }
    }
}

impl<T> From<ApiError> for Outcome<T> {
    fn from(error: ApiError) -> Self {
        Self::Failure(error)
    }
}

impl<T: fmt::Debug> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(payload) => write!(f, "success: {payload:?}"),
            Self::Empty => f.write_str("success (no content)"),
            Self::Failure(error) => {
                let mut rendered = error.to_string();
                write!(f, "failure: {rendered}")?;
                let mut source = error.source();
                while let Some(cause) = source {
                    // Wrappers often repeat their cause's text in their own message
                    let text = cause.to_string();
                    if !rendered.ends_with(&text) {
                        write!(f, ": {text}")?;
                    }
                    rendered = text;
                    source = cause.source();
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_success_predicates() {
        let outcome: Outcome<u32> = Outcome::Success(7);
        assert!(outcome.is_success());
        assert!(!outcome.is_empty());
        assert_eq!(outcome.payload(), Some(&7));
        assert!(outcome.error().is_none());

        let empty: Outcome<u32> = Outcome::Empty;
        assert!(empty.is_success());
        assert!(empty.payload().is_none());
        assert!(matches!(empty.into_result(), Ok(None)));
    }

    #[test]
    fn test_failure_predicates() {
        let outcome: Outcome<u32> = ApiError::validation("missing model").into();
        assert!(!outcome.is_success());
        assert_eq!(outcome.error().map(ApiError::kind), Some(ErrorKind::Validation));
        assert!(outcome.into_result().is_err());
    }

    #[test]
    fn test_render_never_requires_inspection() {
        let ok: Outcome<&str> = Outcome::Success("hi");
        assert_eq!(ok.to_string(), "success: \"hi\"");

        let empty: Outcome<()> = Outcome::Empty;
        assert_eq!(empty.to_string(), "success (no content)");

        let failed: Outcome<()> = Outcome::Failure(ApiError::Cancelled);
        assert_eq!(failed.to_string(), "failure: Request cancelled");
    }

    #[test]
    fn test_render_includes_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let outcome: Outcome<()> = ApiError::transport(io).into();
        assert_eq!(outcome.to_string(), "failure: Transport error: refused");

        #[derive(Debug, thiserror::Error)]
        #[error("connect failed")]
        struct ConnectError(#[source] std::io::Error);

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let outcome: Outcome<()> = ApiError::transport(ConnectError(io)).into();
        assert_eq!(outcome.to_string(), "failure: Transport error: connect failed: refused");
    }

    #[test]
    fn test_from_response_structured() {
        let body = br#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error", "param": null, "code": "invalid_api_key"}}"#;
        let error = ApiError::from_response(StatusCode::UNAUTHORIZED, body);

        assert_eq!(error.kind(), ErrorKind::RemoteApi);
        assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));
        let parsed = error.body().expect("structured body");
        assert_eq!(parsed.error_type.as_deref(), Some("invalid_request_error"));
        assert_eq!(parsed.code.as_deref(), Some("invalid_api_key"));
        assert!(error
            .to_string()
            .contains("Incorrect API key provided [code: invalid_api_key]"));
    }

    #[test]
    fn test_from_response_message_list_and_numeric_code() {
        let body = br#"{"error": {"message": ["first", "second"], "code": 429}}"#;
        let error = ApiError::from_response(StatusCode::TOO_MANY_REQUESTS, body);

        match &error {
            ApiError::RemoteApi { message, .. } => assert_eq!(message, "first\nsecond [code: 429]"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(error.is_retryable());
    }

    #[test]
    fn test_from_response_raw_fallback() {
        let error = ApiError::from_response(StatusCode::BAD_GATEWAY, b"<html>upstream down</html>");
        match &error {
            ApiError::RemoteApi { message, body, status } => {
                assert_eq!(message, "<html>upstream down</html>");
                assert!(body.is_none());
                assert_eq!(*status, StatusCode::BAD_GATEWAY);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let empty = ApiError::from_response(StatusCode::NOT_FOUND, b"");
        assert!(empty.to_string().ends_with("Not Found"));
    }

    #[test]
    fn test_decode_payload_mismatch_is_serialization() {
        let error = decode_payload::<Vec<u32>>(br#"{"id": 1}"#, StatusCode::OK).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Serialization);
        assert_eq!(error.status(), Some(StatusCode::OK));
        assert!(error.source().is_some());
        match error {
            ApiError::Serialization { payload, .. } => assert_eq!(payload.as_deref(), Some(r#"{"id": 1}"#)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_payload_error_envelope_is_remote() {
        let error = decode_payload::<Vec<u32>>(
            br#"{"error": {"message": "server overloaded"}}"#,
            StatusCode::OK,
        )
        .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::RemoteApi);
        assert_eq!(error.status(), Some(StatusCode::OK));
    }

    #[test]
    fn test_decode_payload_success() {
        let value: Value = decode_payload(br#"{"id": 1}"#, StatusCode::OK).unwrap();
        assert_eq!(value["id"], 1);
    }
}
