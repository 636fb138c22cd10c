//! Wire models for the chat completion, model and file endpoints.
//!
//! Only the fields the helpers in [`crate::api`] need are modeled; unknown
//! fields in responses are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{int_or_auto, IntOrAuto, StringOrList, TextOrList, TextOrStructured};
use crate::content::{FilePart, MultipartBody, MultipartPayload};
use crate::outcome::ApiError;

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

/// One element of a multi-part message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,

    /// Either plain text or a list of parts. Assistant messages that only
    /// call tools have no content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<TextOrList<ContentPart>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(TextOrList::Text(text.into())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Text of the message. Text parts are concatenated; other parts are
    /// skipped.
    pub fn text(&self) -> String {
        match &self.content {
            Some(TextOrList::Text(text)) => text.clone(),
            Some(TextOrList::List(parts)) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,

    /// JSON-encoded arguments, as produced by the model.
    pub arguments: String,
}

/// A tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,

    pub function: FunctionDefinition,
}

impl Tool {
    pub fn function(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: None,
                parameters: Some(parameters),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema of the arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Structured form of `tool_choice`: force a specific function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolChoice {
    #[serde(rename = "type")]
    pub kind: String,

    pub function: ToolChoiceFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolChoiceFunction {
    pub name: String,
}

impl ToolChoice {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            kind: "function".to_string(),
            function: ToolChoiceFunction { name: name.into() },
        }
    }
}

/// Request body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatCompletionRequest {
    /// Model identifier (e.g., "gpt-4o")
    pub model: String,

    /// Conversation history
    pub messages: Vec<ChatMessage>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// One stop sequence or several.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StringOrList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// `"none"`, `"auto"`, `"required"` or a specific function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<TextOrStructured<ToolChoice>>,

    /// Set by the streaming helpers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    /// Checks made before the request is sent.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.model.trim().is_empty() {
            return Err(ApiError::validation("Chat completion request has no model"));
        }
        if self.messages.is_empty() {
            return Err(ApiError::validation("Chat completion request has no messages"));
        }
        Ok(())
    }
}

/// Reason for finishing the response generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,

    pub completion_tokens: u32,

    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,

    pub message: ChatMessage,

    pub finish_reason: Option<FinishReason>,
}

/// Response of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,

    pub created: i64,

    pub model: String,

    pub choices: Vec<ChatChoice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Text of the first choice, if any.
    pub fn first_text(&self) -> Option<String> {
        self.choices.first().map(|choice| choice.message.text())
    }
}

/// Incremental message content carried by a streamed chunk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,

    #[serde(default)]
    pub delta: ChatDelta,

    pub finish_reason: Option<FinishReason>,
}

/// One streamed frame of a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub choices: Vec<ChunkChoice>,

    /// Sent on the last chunk when usage reporting is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    /// Content carried by this chunk across all choices.
    pub fn delta_text(&self) -> String {
        self.choices
            .iter()
            .filter_map(|choice| choice.delta.content.as_deref())
            .collect()
    }
}

/// Entry of `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,

    #[serde(default)]
    pub created: i64,

    #[serde(default)]
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelInfo>,
}

/// File metadata returned by the file endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileObject {
    pub id: String,

    pub bytes: u64,

    pub created_at: i64,

    pub filename: String,

    pub purpose: String,
}

/// Body of `POST /v1/files`.
#[derive(Debug)]
pub struct FileUpload {
    pub file: FilePart,

    /// e.g. `"fine-tune"`, `"batch"`, `"assistants"`.
    pub purpose: String,
}

impl FileUpload {
    pub fn new(file: FilePart, purpose: impl Into<String>) -> Self {
        Self {
            file,
            purpose: purpose.into(),
        }
    }
}

impl MultipartBody for FileUpload {
    fn into_multipart(self) -> MultipartPayload {
        MultipartPayload::new()
            .text("purpose", self.purpose)
            .file("file", self.file)
    }
}

/// Response of the delete endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionStatus {
    pub id: String,

    pub deleted: bool,
}

/// Fine-tuning hyperparameters. Each value may be `"auto"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Hyperparameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_epochs: Option<IntOrAuto>,

    /// `-1` stands for `"auto"`.
    #[serde(default, with = "int_or_auto", skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,
}
