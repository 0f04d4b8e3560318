use serde::{ Serialize, Deserialize };
use serde_json::{ Map, Value };

/// One role/content pair of the conversation. Keys other than `role` and
/// `content` (e.g. `name`, `images`) are passed to the provider untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Value::String(content.to_string()),
            extra: Map::new(),
        }
    }
}

/// Body of `/api/chat` and `/api/chat/stream`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model_id: String,
    /// Decoding options forwarded verbatim (temperature, max_tokens, ...).
    #[serde(default)]
    pub params: Map<String, Value>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub raw: Value,
}

/// What a finished stream leaves behind in the interaction log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamTranscript {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoggedResponse {
    Completion(ChatResponse),
    Stream(StreamTranscript),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub request: ChatRequest,
    pub response: LoggedResponse,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}
