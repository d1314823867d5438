//! quill-api - HTTP API server for quillbox

mod auth;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tokio_stream::StreamExt;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use quill_agent::{AgentService, NoteMetaCache, OpenAIProvider, QueryEmbedder, ToolDispatcher};
use quill_core::{
    validate_embedding, CreateNoteRequest, SearchQuery, UpdateNoteRequest, GENERIC_USER_MESSAGE,
};
use quill_db::{Database, NoteRepository, PgCandidateSource};
use quill_search::RetrievalGateway;

use auth::TokenVerifier;

/// Generates time-ordered UUIDv7 request correlation ids.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Clone)]
struct AppState {
    db: Database,
    gateway: Arc<RetrievalGateway<PgCandidateSource>>,
    agent: Arc<AgentService<OpenAIProvider, PgCandidateSource>>,
    verifier: Arc<TokenVerifier>,
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
    Internal,
}

impl From<quill_core::Error> for ApiError {
    fn from(err: quill_core::Error) -> Self {
        match err {
            quill_core::Error::Validation(msg) => ApiError::BadRequest(msg),
            quill_core::Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            quill_core::Error::NoteNotFound(id) => {
                ApiError::NotFound(format!("Note {id} not found"))
            }
            quill_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            // Internal detail stays in the logs, not the response body.
            _ => ApiError::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_USER_MESSAGE.to_string(),
            ),
        };
        let body = Json(serde_json::json!({ "error": message }));
        (status, body).into_response()
    }
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// The authenticated note owner, extracted from the bearer token.
struct AuthOwner(Uuid);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthOwner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let owner = auth::verify_bearer(&state.verifier, header)?;
        Ok(AuthOwner(owner))
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_note(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Json(req): Json<CreateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.db.notes.create(owner, req).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_notes(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = quill_core::clamp_limit(params.limit.unwrap_or(quill_core::DEFAULT_LIMIT));
    let offset = params.offset.unwrap_or(0).max(0);
    let notes = state.db.notes.list(owner, limit, offset).await?;
    Ok(Json(notes))
}

async fn get_note(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.db.notes.fetch(owner, id).await?;
    Ok(Json(note))
}

async fn update_note(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.db.notes.update(owner, id, req).await?;
    Ok(Json(note))
}

async fn delete_note(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.notes.delete(owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SetEmbeddingRequest {
    embedding: Vec<f32>,
}

async fn set_embedding(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Path(id): Path<Uuid>,
    Json(req): Json<SetEmbeddingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_embedding(&req.embedding)?;
    state.db.notes.set_embedding(owner, id, &req.embedding).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_notes(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Json(query): Json<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state.gateway.search_direct(owner, query).await?;
    Ok(Json(serde_json::json!({
        "count": results.len(),
        "results": results,
    })))
}

async fn note_meta(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let meta = state.agent.note_meta(owner, id).await?;
    Ok(Json(meta))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    previous_response_id: Option<String>,
}

/// Stream one conversational turn as Server-Sent Events.
///
/// Each turn event becomes one SSE message with its kind as the event name
/// and the JSON payload as data. The stream always ends with a terminal
/// event (`final_done`, `final`, or `error`).
async fn chat_stream(
    State(state): State<AppState>,
    AuthOwner(owner): AuthOwner,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let events = state
        .agent
        .chat_stream(owner, message, req.previous_response_id);

    let stream = events.filter_map(|event| {
        let kind = event.kind();
        match serde_json::to_string(&event) {
            Ok(json) => Some(Ok::<_, std::convert::Infallible>(
                Event::default().event(kind).data(json),
            )),
            Err(_) => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    ))
}

// =============================================================================
// ROUTER
// =============================================================================

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/notes", post(create_note).get(list_notes))
        .route(
            "/api/v1/notes/:id",
            get(get_note).patch(update_note).delete(delete_note),
        )
        .route("/api/v1/notes/:id/embedding", put(set_embedding))
        .route("/api/v1/notes/:id/meta", get(note_meta))
        .route("/api/v1/notes/search", post(search_notes))
        .route("/api/v1/chat/stream", post(chat_stream))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // LOG_FORMAT selects "json" or "text"; RUST_LOG is the standard filter.
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quill_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/quillbox".to_string());
    let bind = std::env::var("QUILL_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let auth_secret = std::env::var("QUILL_AUTH_SECRET")
        .map_err(|_| anyhow::anyhow!("QUILL_AUTH_SECRET must be set"))?;

    let db = Database::connect(&database_url).await?;
    db.migrate().await?;
    info!(subsystem = "api", "Database connected and migrated");

    let verifier = Arc::new(TokenVerifier::new(&auth_secret)?);
    let gateway = Arc::new(RetrievalGateway::new(PgCandidateSource::new(
        db.pool().clone(),
    )));
    let provider = Arc::new(OpenAIProvider::from_env()?);
    let repository: Arc<dyn NoteRepository> =
        Arc::new(quill_db::PgNoteRepository::new(db.pool().clone()));
    let meta_cache = Arc::new(NoteMetaCache::new());
    let embedder: Arc<dyn QueryEmbedder> = provider.clone();
    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::clone(&repository),
        Arc::clone(&gateway),
        Some(embedder),
        Arc::clone(&meta_cache),
    ));
    let agent = Arc::new(AgentService::new(
        provider,
        dispatcher,
        repository,
        meta_cache,
    ));

    let state = AppState {
        db,
        gateway,
        agent,
        verifier,
    };

    let addr: SocketAddr = bind.parse()?;
    info!(subsystem = "api", %addr, "Starting quill-api");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
