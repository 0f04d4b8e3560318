use crate::cli::Args;
use crate::history::InteractionLog;
use crate::llm::chat::{ new_client, ChatClient };
use crate::llm::discovery::discover_models;
use crate::llm::{ LlmConfig, LlmError };
use crate::models::chat::{ ChatRequest, ChatResponse, LoggedResponse, ModelsResponse };
use super::relay::relay_fragments;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    body::Body,
    routing::{ get, post },
    Router,
    Json,
    extract::State,
    response::{ Html, IntoResponse, Response },
    http::{ header::CONTENT_TYPE, StatusCode },
};
use serde_json::json;
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to read UI document {path}: {source}")]
    MissingAsset {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Upstream(#[from] LlmError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub llm: LlmConfig,
    pub chat: Arc<dyn ChatClient>,
    pub history: InteractionLog,
    /// Unauthenticated client for model discovery.
    pub http: reqwest::Client,
    pub ui_path: PathBuf,
    pub discovery_timeout: Duration,
    pub stream_delay: Duration,
}

impl AppState {
    pub fn from_args(args: &Args) -> Result<Self, LlmError> {
        let config = LlmConfig::new(args.base_url.clone(), args.api_key.clone());
        Ok(Self {
            chat: new_client(&config)?,
            llm: config,
            history: InteractionLog::new(&args.log_dir),
            http: reqwest::Client::new(),
            ui_path: PathBuf::from(&args.ui_path),
            discovery_timeout: Duration::from_secs(args.discovery_timeout_secs),
            stream_delay: Duration::from_millis(args.stream_delay_ms),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/models", get(models_handler))
        .route("/api/models/ollama_live", get(models_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: &str,
    state: AppState,
    args: &Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = router(state);

    if let Some((cert_path, key_path)) = args.tls_paths() {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        info!("HTTPS server listening on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("HTTP server listening on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    tokio::fs::read_to_string(&state.ui_path)
        .await
        .map(Html)
        .map_err(|source| {
            error!("UI document {} unavailable: {}", state.ui_path.display(), source);
            ApiError::MissingAsset {
                path: state.ui_path.display().to_string(),
                source,
            }
        })
}

async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = discover_models(&state.http, &state.llm.base_url, state.discovery_timeout).await;
    Json(ModelsResponse { models })
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!("Chat request: model={} messages={}", req.model_id, req.messages.len());

    let resp = state.chat.complete(&req).await.map_err(|e| {
        error!("Chat completion for {} failed: {}", req.model_id, e);
        e
    })?;

    if let Err(e) = state.history.record(&req, LoggedResponse::Completion(resp.clone())).await {
        error!("Failed to log interaction: {}", e);
    }

    Ok(Json(resp))
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    info!("Streaming chat request: model={} messages={}", req.model_id, req.messages.len());

    let fragments = state.chat.complete_stream(&req).await.map_err(|e| {
        error!("Opening stream for {} failed: {}", req.model_id, e);
        e
    })?;

    let rx = relay_fragments(fragments, req, state.history.clone(), state.stream_delay);
    let body = Body::from_stream(ReceiverStream::new(rx));

    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}
