//! Streaming chat completion, consumed both ways.
//!
//! Run with:
//! ```bash
//! export OPENAI_API_KEY="your-api-key"
//! RUST_LOG=aidispatch=debug cargo run --example stream_chat
//! ```

use std::io::Write;

use aidispatch::model::{ChatCompletionRequest, ChatMessage};
use aidispatch::options::TransportOptions;
use aidispatch::providers::OpenAiProvider;
use aidispatch::ApiClient;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");
    let client = ApiClient::new(OpenAiProvider::new(api_key), TransportOptions::new())?;
    let cancel = CancellationToken::new();

    // Ctrl-C stops the stream at the next frame
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let request = ChatCompletionRequest::new(
        "gpt-4o-mini",
        vec![
            ChatMessage::system("You are a concise assistant."),
            ChatMessage::user("Name three rivers in Europe."),
        ],
    );

    println!("Pull mode:");
    let mut chunks = client.stream_chat_completion(request.clone(), &cancel).await;
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(frame) => print!("{}", frame.payload.delta_text()),
            Err(error) => eprintln!("\n[error] {error}"),
        }
        std::io::stdout().flush()?;
    }

    println!("\n\nCallback mode:");
    let outcome = client
        .stream_chat_completion_with(request, &cancel, |chunk| match chunk {
            Ok(frame) => {
                print!("{}", frame.payload.delta_text());
                let _ = std::io::stdout().flush();
            }
            Err(error) => eprintln!("\n[error] {error}"),
        })
        .await;
    println!("\n\n{outcome}");

    Ok(())
}
