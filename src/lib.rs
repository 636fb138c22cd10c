//! # aidispatch - HTTP client core for AI completion APIs
//!
//! A small, pragmatic Rust library that sends requests to OpenAI-style REST
//! endpoints and turns the responses into typed results or typed event streams.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Non-panicking result envelope ([`Outcome`]) on every call
//! - Server-sent event decoding with two consumption modes: pull
//!   ([`futures::Stream`]) or callback
//! - Cooperative cancellation through [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - Codecs for polymorphic JSON fields (string-or-list, integer-or-`"auto"`)
//! - OpenAI and Azure OpenAI endpoints
//!
//! ## Architecture
//!
//! - **[`ApiClient`]**: builds, sends and decodes requests described by a
//!   [`RequestDescriptor`]. Typed helpers for common endpoints live in [`api`].
//! - **[`Provider`](providers::Provider)**: base URI, path mapping and
//!   authentication headers for one endpoint.
//! - **[`StreamDecoder`](sse::StreamDecoder)**: incremental SSE parser over a
//!   response body.
//! - **[`EventStream`]**: the decoded events, consumed by polling or by callback.
//!
//! ## Example
//! ```no_run
//! use aidispatch::model::{ChatCompletionRequest, ChatMessage};
//! use aidispatch::options::TransportOptions;
//! use aidispatch::providers::OpenAiProvider;
//! use aidispatch::ApiClient;
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new(OpenAiProvider::new("your-api-key"), TransportOptions::new())?;
//!     let cancel = CancellationToken::new();
//!
//!     let request = ChatCompletionRequest::new("gpt-4o", vec![ChatMessage::user("Hello!")]);
//!     let mut chunks = client.stream_chat_completion(request, &cancel).await;
//!
//!     while let Some(chunk) = chunks.next().await {
//!         print!("{}", chunk?.payload.delta_text());
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod codec;
pub mod content;
pub mod http;
pub mod model;
pub mod options;
pub mod outcome;
pub mod providers;
pub mod request;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use client::ApiClient;
pub use outcome::{ApiError, ErrorKind, Outcome};
pub use request::RequestDescriptor;
pub use stream::{EventFrame, EventStream};
