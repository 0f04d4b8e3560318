pub mod openai;

use async_trait::async_trait;
use futures::Stream;
use serde_json::{ Map, Value };
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmError };
use self::openai::OpenAIChatClient;
use crate::models::chat::{ ChatRequest, ChatResponse };

/// Incremental text pieces as the provider emits them. Ends after the
/// provider's own end-of-stream marker.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Opens a streaming completion. Connection and status failures are
    /// reported here, before any fragment is produced.
    async fn complete_stream(&self, request: &ChatRequest) -> Result<FragmentStream, LlmError>;
}

/// Provider request body: the caller's decoding params with `model`,
/// `messages` and `stream` laid over them.
pub fn build_payload(request: &ChatRequest, stream: bool) -> Result<Map<String, Value>, LlmError> {
    let mut body = request.params.clone();
    body.insert("model".to_string(), Value::String(request.model_id.clone()));
    body.insert("messages".to_string(), serde_json::to_value(&request.messages)?);
    if stream {
        body.insert("stream".to_string(), Value::Bool(true));
    } else {
        body.remove("stream");
    }
    Ok(body)
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = Arc::new(OpenAIChatClient::from_config(config)?);
    Ok(client)
}
