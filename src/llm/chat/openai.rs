use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ build_payload, ChatClient, FragmentStream };
use crate::llm::{ LlmConfig, LlmError };
use crate::models::chat::{ ChatRequest, ChatResponse };

/// Client for any server speaking the OpenAI chat-completions protocol
/// (Ollama, llama.cpp, vLLM, LM Studio, OpenAI itself).
pub struct OpenAIChatClient {
    http: HttpClient,
    config: LlmConfig,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

/// One decoded server-sent-event line.
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

/// Buffers raw body bytes and hands out complete lines. Network chunks can
/// split a line (or a multi-byte character) anywhere.
#[derive(Default)]
pub(crate) struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string())
    }
}

pub(crate) fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        // blank separators, comments, `event:` and `id:` fields
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let event: OpenAIStreamResponse = serde_json::from_str(data)?;
    if let Some(error) = event.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(LlmError::Stream(message));
    }

    match event.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(content) if !content.is_empty() => Ok(SseLine::Fragment(content)),
        _ => Ok(SseLine::Skip),
    }
}

/// Turns raw body chunks into fragments on `tx`. Returns as soon as the
/// consumer hangs up, even while the provider is silent, so the body (and
/// with it the upstream connection) is dropped.
pub(crate) async fn pump_events<S, B, E>(stream: S, tx: mpsc::Sender<Result<String, LlmError>>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<LlmError>,
{
    tokio::pin!(stream);
    let mut lines = SseLineBuffer::default();

    loop {
        let chunk_result = tokio::select! {
            biased;
            _ = tx.closed() => {
                debug!("Stream consumer went away, dropping provider connection");
                return;
            }
            next = stream.next() => match next {
                Some(chunk_result) => chunk_result,
                None => break,
            },
        };
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        };

        for line in lines.push(chunk.as_ref()) {
            match parse_sse_line(&line) {
                Ok(SseLine::Fragment(content)) => {
                    if tx.send(Ok(content)).await.is_err() {
                        return;
                    }
                }
                Ok(SseLine::Done) => return,
                Ok(SseLine::Skip) => {}
                Err(e) => {
                    warn!("Bad stream event from provider: {} ({})", e, line);
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }

    if let Some(line) = lines.finish() {
        match parse_sse_line(&line) {
            Ok(SseLine::Fragment(content)) => {
                let _ = tx.send(Ok(content)).await;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Status { status, body })
}

impl OpenAIChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| LlmError::InvalidApiKey(e.to_string()))?
        );

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self { http, config })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(config.clone())
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> Result<Response, LlmError> {
        let url = self.config.endpoint("chat/completions");
        let payload = build_payload(request, stream)?;
        debug!("POST {} model={} stream={}", url, request.model_id, stream);

        let resp = self.http.post(&url).json(&payload).send().await?;
        check_status(resp).await
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let resp = self.send(request, false).await?;
        let bytes = resp.bytes().await?;
        let raw: Value = serde_json::from_slice(&bytes)?;
        let parsed: OpenAIResponse = serde_json::from_value(raw.clone())?;

        let content = parsed.choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?
            .message.content
            .unwrap_or_default();

        Ok(ChatResponse { content, raw })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<FragmentStream, LlmError> {
        let resp = self.send(request, true).await?;

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(pump_events(resp.bytes_stream(), tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{ body_partial_json, header, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn request() -> ChatRequest {
        ChatRequest {
            model_id: "llama3".into(),
            params: serde_json::from_value(json!({"temperature": 0.1})).unwrap(),
            messages: vec![ChatMessage::new("user", "Say hi")],
        }
    }

    fn client(server: &MockServer) -> OpenAIChatClient {
        OpenAIChatClient::new(LlmConfig::new(format!("{}/v1", server.uri()), "test-key")).unwrap()
    }

    #[test]
    fn line_buffer_joins_split_chunks() {
        let mut buf = SseLineBuffer::default();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b": 1}\r\n\ndata: [DO"), vec!["data: {\"a\": 1}".to_string(), String::new()]);
        assert_eq!(buf.finish(), Some("data: [DO".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_multibyte_chars_across_chunks() {
        let text = "data: é\n".as_bytes();
        let mut buf = SseLineBuffer::default();
        assert!(buf.push(&text[..7]).is_empty());
        assert_eq!(buf.push(&text[7..]), vec!["data: é".to_string()]);
    }

    #[test]
    fn parses_sse_lines() {
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#).unwrap(),
            SseLine::Fragment("Hel".into())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
        assert!(matches!(
            parse_sse_line(r#"data: {"error":{"message":"model not found"}}"#),
            Err(LlmError::Stream(msg)) if msg == "model not found"
        ));
        assert!(matches!(parse_sse_line("data: {oops"), Err(LlmError::Decode(_))));
    }

    #[tokio::test]
    async fn pump_stops_when_consumer_leaves_during_silence() {
        let first: Result<&[u8], LlmError> = Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n");
        let body = futures::stream::iter([first]).chain(futures::stream::pending());

        let (tx, mut rx) = mpsc::channel(32);
        let handle = tokio::spawn(pump_events(body, tx));

        assert_eq!(rx.recv().await.unwrap().unwrap(), "x");
        drop(rx);

        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("pump kept waiting on a silent provider")
            .unwrap();
    }

    #[tokio::test]
    async fn complete_returns_content_and_raw() {
        let server = MockServer::start().await;
        let raw = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}}]
        });
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "llama3", "temperature": 0.1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(raw.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server).complete(&request()).await.unwrap();
        assert_eq!(resp.content, "Hi!");
        assert_eq!(resp.raw, raw);
    }

    #[tokio::test]
    async fn complete_propagates_provider_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = client(&server).complete(&request()).await.unwrap_err();
        match err {
            LlmError::Status { status, body } => {
                assert_eq!(status.as_u16(), 404);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn complete_without_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn complete_stream_yields_fragments_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let fragments: Vec<String> = client(&server)
            .complete_stream(&request())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(fragments, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn complete_stream_fails_before_first_fragment_on_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = client(&server).complete_stream(&request()).await;
        assert!(matches!(result, Err(LlmError::Status { .. })));
    }
}
