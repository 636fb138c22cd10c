//! Request dispatcher.
//!
//! [`ApiClient`] turns a [`RequestDescriptor`] into an HTTP request, sends it
//! and hands the response either to a one-shot decode ([`Outcome`]) or to the
//! stream decoder ([`EventStream`]). Calls never return a bare `Err`; every
//! failure ends up inside the returned envelope.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::content::{Content, MultipartBody};
use crate::http::{add_extra_headers, build_http_client, BeforeSend, HeaderSet};
use crate::options::TransportOptions;
use crate::outcome::{decode_payload, ApiError, Outcome};
use crate::providers::Provider;
use crate::request::RequestDescriptor;
use crate::sse::StreamDecoder;
use crate::stream::{EventResult, EventStream};

const APPLICATION_JSON: &str = "application/json";
const TEXT_EVENT_STREAM: &str = "text/event-stream";
const ANY: &str = "*/*";

/// Client for one provider endpoint.
///
/// Cloning is cheap; clones share the connection pool and configuration.
/// Calls made concurrently are independent of each other.
///
/// # Example
/// ```no_run
/// use aidispatch::client::ApiClient;
/// use aidispatch::model::ModelList;
/// use aidispatch::options::TransportOptions;
/// use aidispatch::providers::OpenAiProvider;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let client = ApiClient::new(OpenAiProvider::new("sk-..."), TransportOptions::new())
///         .expect("valid transport options");
///
///     let models = client.get::<ModelList>("/v1/models", &CancellationToken::new()).await;
///     println!("{models}");
/// }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    provider: Arc<dyn Provider>,
    options: Arc<TransportOptions>,
    hooks: Vec<Arc<dyn BeforeSend>>,
}

impl ApiClient {
    /// Create a client with its own connection pool built from `options`.
    pub fn new(provider: impl Provider + 'static, options: TransportOptions) -> Result<Self, ApiError> {
        let http = build_http_client(&options)?;
        Ok(Self::with_http_client(provider, options, http))
    }

    /// Create a client on top of an existing `reqwest::Client`.
    ///
    /// Timeouts and proxy settings in `options` are ignored; they belong to
    /// the supplied client.
    pub fn with_http_client(
        provider: impl Provider + 'static,
        options: TransportOptions,
        http: reqwest::Client,
    ) -> Self {
        Self {
            http,
            provider: Arc::new(provider),
            options: Arc::new(options),
            hooks: Vec::new(),
        }
    }

    /// Register a hook that may rewrite every request right before it is sent.
    /// Hooks run in registration order.
    pub fn with_before_send(mut self, hook: impl BeforeSend + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Send a request and decode its JSON body into `T`.
    pub async fn send<B, T>(&self, descriptor: RequestDescriptor<B>, cancel: &CancellationToken) -> Outcome<T>
    where
        T: DeserializeOwned,
    {
        Outcome::from_optional(self.try_send(descriptor, cancel).await)
    }

    pub async fn get<T>(&self, path: &str, cancel: &CancellationToken) -> Outcome<T>
    where
        T: DeserializeOwned,
    {
        self.send(RequestDescriptor::get(path), cancel).await
    }

    /// POST `body` as JSON.
    pub async fn post<B, T>(&self, path: &str, body: B, cancel: &CancellationToken) -> Outcome<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.send(RequestDescriptor::json(Method::POST, path, body), cancel)
            .await
    }

    /// POST `body` as `multipart/form-data`.
    pub async fn post_multipart<B, T>(&self, path: &str, body: B, cancel: &CancellationToken) -> Outcome<T>
    where
        B: MultipartBody,
        T: DeserializeOwned,
    {
        self.send(RequestDescriptor::multipart(Method::POST, path, body), cancel)
            .await
    }

    pub async fn delete<T>(&self, path: &str, cancel: &CancellationToken) -> Outcome<T>
    where
        T: DeserializeOwned,
    {
        self.send(RequestDescriptor::delete(path), cancel).await
    }

    /// Send a request and decode its body as a stream of events.
    ///
    /// Failures before the stream starts (validation, transport, non-2xx) are
    /// delivered as the stream's only item.
    pub async fn stream<B, T>(&self, descriptor: RequestDescriptor<B>, cancel: &CancellationToken) -> EventStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let response = match self.execute(descriptor, TEXT_EVENT_STREAM, cancel).await {
            Ok(response) => response,
            Err(error) => return EventStream::failed(error),
        };

        let status = response.status();
        if !status.is_success() {
            return EventStream::failed(error_from_response(response, cancel).await);
        }

        EventStream::new(StreamDecoder::new(response.bytes_stream(), status, cancel.clone()))
    }

    /// Stream events from a GET request.
    pub async fn stream_get<T>(&self, path: &str, cancel: &CancellationToken) -> EventStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.stream(RequestDescriptor::get(path), cancel).await
    }

    /// Stream events from a GET request into `on_event`.
    pub async fn stream_get_with<T, F>(&self, path: &str, cancel: &CancellationToken, on_event: F) -> Outcome<()>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(EventResult<T>),
    {
        self.stream_get(path, cancel).await.for_each_event(on_event).await
    }

    /// Stream events from a POST request with a JSON body.
    pub async fn stream_post<B, T>(&self, path: &str, body: B, cancel: &CancellationToken) -> EventStream<T>
    where
        B: Serialize,
        T: DeserializeOwned + Send + 'static,
    {
        self.stream(RequestDescriptor::json(Method::POST, path, body), cancel)
            .await
    }

    /// Stream events from a POST request with a JSON body into `on_event`.
    pub async fn stream_post_with<B, T, F>(
        &self,
        path: &str,
        body: B,
        cancel: &CancellationToken,
        on_event: F,
    ) -> Outcome<()>
    where
        B: Serialize,
        T: DeserializeOwned + Send + 'static,
        F: FnMut(EventResult<T>),
    {
        self.stream_post(path, body, cancel)
            .await
            .for_each_event(on_event)
            .await
    }

    /// Write the raw body of a GET request into `sink`.
    ///
    /// Returns the number of bytes written.
    pub async fn download_to<W>(&self, path: &str, sink: &mut W, cancel: &CancellationToken) -> Outcome<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.try_download(path, sink, cancel).await.into()
    }

    async fn try_send<B, T>(
        &self,
        descriptor: RequestDescriptor<B>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(descriptor, APPLICATION_JSON, cancel).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response, cancel).await);
        }

        let body = read_body(response, cancel).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        decode_payload(&body, status).map(Some)
    }

    async fn try_download<W>(&self, path: &str, sink: &mut W, cancel: &CancellationToken) -> Result<u64, ApiError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let response = self.execute(RequestDescriptor::get(path), ANY, cancel).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, cancel).await);
        }

        let mut body = response.bytes_stream();
        let mut written = 0u64;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk.map_err(ApiError::transport)?;
            sink.write_all(&chunk).await.map_err(ApiError::transport)?;
            written += chunk.len() as u64;
        }
        sink.flush().await.map_err(ApiError::transport)?;

        debug!(path, bytes = written, "Download completed");
        Ok(written)
    }

    /// Build, hook and send a request.
    async fn execute<B>(
        &self,
        descriptor: RequestDescriptor<B>,
        accept: &'static str,
        cancel: &CancellationToken,
    ) -> Result<Response, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let request = self.prepare(descriptor, accept).await?;
        debug!(method = %request.method(), url = %request.url(), "Dispatching request");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
            response = self.http.execute(request) => response.map_err(ApiError::transport),
        }
    }

    async fn prepare<B>(&self, descriptor: RequestDescriptor<B>, accept: &'static str) -> Result<Request, ApiError> {
        descriptor.validate()?;
        let url = self.provider.resolve_uri(descriptor.path())?;
        let (method, _, content) = descriptor.into_parts()?;

        let mut headers = HeaderSet::new();
        headers.insert(USER_AGENT, header_value(self.options.user_agent())?);
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        if let Some(Content::Json(_)) = &content {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        }
        self.provider.configure_headers(&mut headers).await?;
        add_extra_headers(&mut headers, &self.options)?;
        // The multipart boundary is only known to the form
        if let Some(Content::Multipart(_)) = &content {
            headers.remove(CONTENT_TYPE.as_str());
        }

        let mut builder = self.http.request(method, url).headers(headers.to_header_map());
        builder = match content {
            Some(Content::Json(bytes)) => builder.body(bytes),
            Some(Content::Multipart(form)) => builder.multipart(form),
            None => builder,
        };

        let mut request = builder
            .build()
            .map_err(|e| ApiError::validation(format!("Failed to build request: {e}")))?;
        for hook in &self.hooks {
            hook.before_send(&mut request)?;
        }
        Ok(request)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("provider", &self.provider)
            .field("options", &self.options)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::validation(format!("Invalid header value '{value}': {e}")))
}

async fn read_body(response: Response, cancel: &CancellationToken) -> Result<Bytes, ApiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        body = response.bytes() => body.map_err(ApiError::transport),
    }
}

/// Read a non-2xx response into its error.
async fn error_from_response(response: Response, cancel: &CancellationToken) -> ApiError {
    let status = response.status();
    let url = response.url().clone();
    let error = match read_body(response, cancel).await {
        Ok(body) => ApiError::from_response(status, &body),
        Err(error) => error,
    };
    warn!(status = status.as_u16(), url = %url, error = %error, "Request failed");
    error
}
