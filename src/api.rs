//! Typed helpers for the chat completion, model and file endpoints.

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;
use crate::model::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, DeletionStatus, FileObject, FileUpload,
    ModelInfo, ModelList,
};
use crate::outcome::{ApiError, Outcome};
use crate::stream::{EventResult, EventStream};

const CHAT_COMPLETIONS: &str = "/v1/chat/completions";
const MODELS: &str = "/v1/models";
const FILES: &str = "/v1/files";

impl ApiClient {
    pub async fn list_models(&self, cancel: &CancellationToken) -> Outcome<ModelList> {
        self.get(MODELS, cancel).await
    }

    pub async fn retrieve_model(&self, model_id: &str, cancel: &CancellationToken) -> Outcome<ModelInfo> {
        match resource_path(MODELS, model_id, "") {
            Ok(path) => self.get(&path, cancel).await,
            Err(error) => Outcome::Failure(error),
        }
    }

    pub async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Outcome<ChatCompletion> {
        if let Err(error) = request.validate() {
            return Outcome::Failure(error);
        }
        self.post(CHAT_COMPLETIONS, request, cancel).await
    }

    /// Stream a chat completion as chunks. `stream` is forced on.
    pub async fn stream_chat_completion(
        &self,
        mut request: ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> EventStream<ChatCompletionChunk> {
        if let Err(error) = request.validate() {
            return EventStream::failed(error);
        }
        request.stream = Some(true);
        self.stream_post(CHAT_COMPLETIONS, request, cancel).await
    }

    /// Stream a chat completion into `on_chunk`.
    pub async fn stream_chat_completion_with<F>(
        &self,
        request: ChatCompletionRequest,
        cancel: &CancellationToken,
        on_chunk: F,
    ) -> Outcome<()>
    where
        F: FnMut(EventResult<ChatCompletionChunk>),
    {
        self.stream_chat_completion(request, cancel)
            .await
            .for_each_event(on_chunk)
            .await
    }

    pub async fn upload_file(&self, upload: FileUpload, cancel: &CancellationToken) -> Outcome<FileObject> {
        if upload.purpose.trim().is_empty() {
            return Outcome::Failure(ApiError::validation("File upload has no purpose"));
        }
        self.post_multipart(FILES, upload, cancel).await
    }

    pub async fn delete_file(&self, file_id: &str, cancel: &CancellationToken) -> Outcome<DeletionStatus> {
        match resource_path(FILES, file_id, "") {
            Ok(path) => self.delete(&path, cancel).await,
            Err(error) => Outcome::Failure(error),
        }
    }

    /// Write the content of a stored file into `sink`.
    pub async fn download_file_content<W>(
        &self,
        file_id: &str,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Outcome<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match resource_path(FILES, file_id, "/content") {
            Ok(path) => self.download_to(&path, sink, cancel).await,
            Err(error) => Outcome::Failure(error),
        }
    }
}

/// `{collection}/{id}{suffix}`, rejecting ids that would change the path.
fn resource_path(collection: &str, id: &str, suffix: &str) -> Result<String, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::validation("Resource id is empty"));
    }
    // URL parsing would resolve dot segments, including percent-encoded ones
    if id == "." || id == ".." || id.contains(['/', '\\', '?', '#', '%']) {
        return Err(ApiError::validation(format!("Invalid resource id '{id}'")));
    }
    Ok(format!("{collection}/{id}{suffix}"))
}
