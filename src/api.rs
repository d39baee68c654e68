//! HTTP ingress for the Verdana agent: the four routes named in SPEC_FULL §6,
//! grounded on the teacher's `api.rs` (axum `Router`, `AppState`, utoipa
//! annotations) but rewritten to this crate's wire contract. The
//! workflow/visual-builder surface is gone — this ingress exists only to
//! drive the chat pipeline, speech adapter, health check, and KB listing.

use crate::agent::{Agent, AgentResponse};
use crate::error::AgentError;
use crate::speech::SpeechTranscriber;
use crate::store::VectorStore;
use crate::types::{QueryClass, SourceRef};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::{OpenApi, ToSchema};

/// Shared application state, constructed once at startup (§9 dependency
/// injection) and cloned per request (all fields are `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub store: Arc<dyn VectorStore>,
    pub speech: Arc<dyn SpeechTranscriber>,
    /// Per-session processing gate: a session must finish one turn before its
    /// next is admitted (§5 concurrency model).
    session_locks: Arc<RwLock<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>, store: Arc<dyn VectorStore>, speech: Arc<dyn SpeechTranscriber>) -> Self {
        Self {
            agent,
            store,
            speech,
            session_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.session_locks.read().await.get(session_id) {
            return lock.clone();
        }
        let mut locks = self.session_locks.write().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AiConsent {
    pub accepted: bool,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ChatRequest {
    #[schema(example = "What does the Carbon Border Adjustment Mechanism cover?")]
    pub message: String,
    pub session_id: String,
    pub language: Option<String>,
    pub ai_consent: AiConsent,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatMetadata {
    /// `"ok"`, `"llm_unavailable"`, or `"insufficient_evidence"`.
    pub status: String,
    pub query_class: QueryClass,
    pub generated_by: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub ai_disclosure: String,
    /// Number of `sources` entries drawn from the knowledge base, as opposed
    /// to web fallback.
    pub kb_hits: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub metadata: ChatMetadata,
}

impl From<AgentResponse> for ChatResponse {
    fn from(resp: AgentResponse) -> Self {
        ChatResponse {
            response: resp.text,
            sources: resp.sources,
            metadata: ChatMetadata {
                status: resp.status.to_string(),
                query_class: resp.marker.query_class,
                generated_by: resp.marker.generated_by.to_string(),
                model: resp.marker.model,
                timestamp: resp.marker.timestamp,
                session_id: resp.marker.session_id,
                ai_disclosure: "This response was generated by an AI agent.".to_string(),
                kb_hits: resp.kb_hits,
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SpeechToTextResponse {
    pub transcript: String,
    pub detected_language: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub document_count: usize,
    pub chunk_count: usize,
    pub avg_chunk_length: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KnowledgeBaseDocument {
    pub filename: String,
    pub title: String,
    pub chunk_count: usize,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KnowledgeBaseResponse {
    pub total_documents: usize,
    pub documents: Vec<KnowledgeBaseDocument>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

/// Maps a library error onto an HTTP status + typed JSON body. Status mapping
/// lives here, at the ingress boundary, never inside library code.
pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            AgentError::ConsentMissing => (StatusCode::FORBIDDEN, "consent_required"),
            AgentError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AgentError::Config(_) => (StatusCode::BAD_REQUEST, "config_error"),
            AgentError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        warn!(error = %self.0, category = self.0.category(), "request failed");
        let body = Json(ErrorResponse {
            error: code.to_string(),
            details: Some(self.0.to_string()),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(OpenApi)]
#[openapi(
    paths(chat_message_handler, speech_to_text_handler, health_handler, knowledge_base_handler),
    components(schemas(
        AiConsent,
        ChatRequest,
        ChatMetadata,
        ChatResponse,
        SpeechToTextResponse,
        HealthResponse,
        KnowledgeBaseDocument,
        KnowledgeBaseResponse,
        ErrorResponse,
        QueryClass,
        SourceRef,
    )),
    tags(
        (name = "chat", description = "Grounded-answer chat pipeline"),
        (name = "documents", description = "Knowledge base introspection"),
        (name = "health", description = "Service health"),
    ),
    info(
        title = "Verdana Agent API",
        version = "0.1.0",
        description = "Retrieval-augmented Q&A over an ingested EU Green Deal policy corpus."
    )
)]
struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/chat/message", post(chat_message_handler))
        .route("/chat/speech-to-text", post(speech_to_text_handler))
        .route("/health", get(health_handler))
        .route("/documents/knowledge-base", get(knowledge_base_handler))
        .route("/api-docs/openapi.json", get(openapi_spec_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn openapi_spec_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Processes one chat turn through the agent orchestrator.
#[utoipa::path(
    post,
    path = "/chat/message",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Turn processed", body = ChatResponse),
        (status = 403, description = "AI consent not given", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    )
)]
async fn chat_message_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if !request.ai_consent.accepted {
        return Err(ApiError::from(AgentError::ConsentMissing));
    }

    let lock = state.session_lock(&request.session_id).await;
    let _guard = lock.lock().await;

    info!(session_id = %request.session_id, "processing chat message");
    let response = state
        .agent
        .process(&request.session_id, &request.message)
        .await?;

    Ok(Json(response.into()))
}

/// Transcribes uploaded audio via the speech adapter boundary (C11).
#[utoipa::path(
    post,
    path = "/chat/speech-to-text",
    tag = "chat",
    responses(
        (status = 200, description = "Transcribed", body = SpeechToTextResponse),
        (status = 400, description = "Missing audio_file field", body = ErrorResponse),
    )
)]
async fn speech_to_text_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<SpeechToTextResponse>> {
    const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

    let mut audio: Option<Vec<u8>> = None;
    let mut language: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from(AgentError::Config(e.to_string())))?
    {
        match field.name().unwrap_or_default() {
            "audio_file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::from(AgentError::Config(e.to_string())))?;
                if bytes.len() > MAX_AUDIO_BYTES {
                    return Err(ApiError::from(AgentError::Config(
                        "audio_file exceeds 25 MB limit".to_string(),
                    )));
                }
                audio = Some(bytes.to_vec());
            }
            "language" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from(AgentError::Config(e.to_string())))?;
                language = Some(text);
            }
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| {
        ApiError::from(AgentError::Config("missing audio_file field".to_string()))
    })?;

    let transcription = state
        .speech
        .transcribe(&audio, language.as_deref())
        .await?;

    Ok(Json(SpeechToTextResponse {
        transcript: transcription.transcript,
        detected_language: transcription.detected_language,
    }))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
async fn health_handler(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let (document_count, chunk_count, avg_chunk_length) = state.store.stats().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        document_count,
        chunk_count,
        avg_chunk_length,
    }))
}

#[utoipa::path(
    get,
    path = "/documents/knowledge-base",
    tag = "documents",
    responses((status = 200, description = "Ingested documents", body = KnowledgeBaseResponse))
)]
async fn knowledge_base_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<KnowledgeBaseResponse>> {
    let documents = state.store.list_documents().await?;
    let mut out = Vec::with_capacity(documents.len());
    for doc in &documents {
        let chunk_count = state.store.chunk_count(&doc.id).await?;
        let doc_type = std::path::Path::new(&doc.filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_string();
        out.push(KnowledgeBaseDocument {
            filename: doc.filename.clone(),
            title: doc.title.clone(),
            chunk_count,
            doc_type,
            url: doc.url.clone(),
        });
    }

    Ok(Json(KnowledgeBaseResponse {
        total_documents: documents.len(),
        documents: out,
    }))
}

/// Binds and serves the router until shutdown.
pub async fn start_server(state: AppState, host: &str, port: u16) -> crate::error::Result<()> {
    let addr = format!("{host}:{port}");
    info!(%addr, "starting Verdana agent HTTP server");

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(AgentError::Io)?;

    info!(%addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| AgentError::Config(format!("server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_missing_maps_to_403() {
        let response = ApiError::from(AgentError::ConsentMissing).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_timeout_maps_to_504() {
        let response =
            ApiError::from(AgentError::Timeout(std::time::Duration::from_secs(5))).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_chat_response_carries_ai_disclosure() {
        let agent_response = crate::agent::AgentResponse {
            text: "answer".to_string(),
            sources: Vec::new(),
            query_class: QueryClass::Policy,
            marker: crate::agent::ContentMarker {
                generated_by: "agent",
                model: "llama3.2".to_string(),
                timestamp: Utc::now(),
                session_id: "s1".to_string(),
                query_class: QueryClass::Policy,
            },
            status: "ok",
            kb_hits: 0,
        };
        let chat_response: ChatResponse = agent_response.into();
        assert!(!chat_response.metadata.ai_disclosure.is_empty());
        assert_eq!(chat_response.metadata.status, "ok");
    }
}
