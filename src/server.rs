//! JSON HTTP API over the question-answering engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/ask` | Answer a question within a session (`session_id` optional; a new one is issued) |
//! | `POST`   | `/feedback` | Record a 1–5 rating for an answer |
//! | `POST`   | `/sessions/{id}/export` | Write the session's history to the exports directory |
//! | `DELETE` | `/sessions/{id}` | Clear and forget a session |
//! | `POST`   | `/reindex` | Rebuild the index from the text directory |
//! | `GET`    | `/stats` | Index, feedback and session counters |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `embedding_error` (502),
//! `generation_error` (502), `index_error` (500), `io_error` (500), `internal` (500).
//!
//! # Concurrency
//!
//! One engine behind one async mutex: requests that touch the engine run one
//! at a time. Sessions live in memory and are lost on restart. At most
//! `[server].max_sessions` are kept; the least recently used one is dropped
//! to make room. `/reindex` clears the history of every live session.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{Config, ServerConfig};
use crate::error::QaError;
use crate::export;
use crate::feedback::{FeedbackRecord, FeedbackStore};
use crate::index::IndexHandle;
use crate::models::SourceAttribution;
use crate::qa::QaEngine;
use crate::session::Session;
use crate::stats::{self, Stats};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Mutex<QaEngine>>,
    sessions: Arc<Mutex<SessionStore>>,
    feedback: Arc<FeedbackStore>,
    exports_dir: Arc<PathBuf>,
    questions_asked: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(engine: QaEngine, feedback: FeedbackStore, exports_dir: PathBuf) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            sessions: Arc::new(Mutex::new(SessionStore::new(
                ServerConfig::default().max_sessions,
            ))),
            feedback: Arc::new(feedback),
            exports_dir: Arc::new(exports_dir),
            questions_asked: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Caps the number of sessions kept in memory.
    pub fn with_max_sessions(self, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(SessionStore::new(max_sessions))),
            ..self
        }
    }
}

// ============ Session store ============

struct SessionSlot {
    session: Session,
    last_used: u64,
}

/// In-memory sessions keyed by id, bounded by `capacity`.
///
/// Every access bumps a logical clock; when a new session does not fit, the
/// slot with the oldest `last_used` is evicted.
struct SessionStore {
    slots: HashMap<String, SessionSlot>,
    clock: u64,
    capacity: usize,
}

impl SessionStore {
    fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            clock: 0,
            capacity: capacity.max(1),
        }
    }

    /// Returns the session for `id`, creating it (and evicting if full) when missing.
    fn checkout(&mut self, id: &str) -> &mut Session {
        self.clock += 1;
        if !self.slots.contains_key(id) && self.slots.len() >= self.capacity {
            let oldest = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.slots.remove(&oldest);
                tracing::info!(session_id = %oldest, capacity = self.capacity, "evicted least recently used session");
            }
        }

        let clock = self.clock;
        let slot = self.slots.entry(id.to_string()).or_insert_with(|| SessionSlot {
            session: Session::new(),
            last_used: clock,
        });
        slot.last_used = clock;
        &mut slot.session
    }

    fn get(&self, id: &str) -> Option<&Session> {
        self.slots.get(id).map(|slot| &slot.session)
    }

    fn remove(&mut self, id: &str) -> Option<Session> {
        self.slots.remove(id).map(|slot| slot.session)
    }

    /// Clears the history of every session, keeping their ids valid.
    fn clear_all(&mut self) -> usize {
        for slot in self.slots.values_mut() {
            slot.session.clear();
        }
        self.slots.len()
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Builds the router with CORS open to all origins.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .route("/feedback", post(handle_feedback))
        .route("/sessions/{id}/export", post(handle_export))
        .route("/sessions/{id}", delete(handle_clear))
        .route("/reindex", post(handle_reindex))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = QaEngine::from_config(config).await?;
    let feedback = FeedbackStore::new(config.paths.feedback_path());
    let state = AppState::new(engine, feedback, config.paths.exports_dir.clone())
        .with_max_sessions(config.server.max_sessions);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "docqa server listening");
    println!("docqa server listening on http://{}", config.server.bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QaError> for AppError {
    fn from(err: QaError) -> Self {
        let code = err.code();
        let status = match code {
            "bad_request" => StatusCode::BAD_REQUEST,
            "embedding_error" | "generation_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status != StatusCode::BAD_REQUEST {
            tracing::error!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    session_id: String,
    question: String,
    answer: String,
    sources: Vec<SourceAttribution>,
    turn: usize,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let session_id = req
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Lock order: engine, then sessions
    let mut engine = state.engine.lock().await;
    let mut sessions = state.sessions.lock().await;
    let session = sessions.checkout(&session_id);

    let result = engine.answer(session, &req.question).await;
    let turn = session.turn_count();
    if result.is_err() && session.is_empty() {
        sessions.remove(&session_id);
    }
    let answer = result?;

    state.questions_asked.fetch_add(1, Ordering::Relaxed);

    Ok(Json(AskResponse {
        session_id,
        question: answer.question,
        answer: answer.answer,
        sources: answer.sources,
        turn,
    }))
}

// ============ POST /feedback ============

#[derive(Deserialize)]
struct FeedbackRequest {
    question: String,
    answer: String,
    rating: i64,
    #[serde(default)]
    comment: Option<String>,
}

async fn handle_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<FeedbackRecord>, AppError> {
    let rating = u8::try_from(req.rating)
        .map_err(|_| bad_request(format!("rating must be between 1 and 5, got {}", req.rating)))?;
    let record = state
        .feedback
        .record_feedback(&req.question, &req.answer, rating, req.comment)?;
    Ok(Json(record))
}

// ============ POST /sessions/{id}/export ============

#[derive(Deserialize, Default)]
struct ExportRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
struct ExportResponse {
    path: String,
    turns: usize,
}

async fn handle_export(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, AppError> {
    let sessions = state.sessions.lock().await;
    let session = sessions
        .get(&id)
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;

    let path = export::export_history(session, &state.exports_dir, req.name.as_deref())?;
    Ok(Json(ExportResponse {
        path: path.display().to_string(),
        turns: session.turn_count(),
    }))
}

// ============ DELETE /sessions/{id} ============

#[derive(Serialize)]
struct ClearResponse {
    session_id: String,
    cleared: bool,
}

async fn handle_clear(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClearResponse>, AppError> {
    let mut engine = state.engine.lock().await;
    let mut sessions = state.sessions.lock().await;

    let cleared = match sessions.remove(&id) {
        Some(mut session) => {
            engine.clear_history(&mut session);
            true
        }
        None => false,
    };

    Ok(Json(ClearResponse {
        session_id: id,
        cleared,
    }))
}

// ============ POST /reindex ============

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<IndexHandle>, AppError> {
    let mut engine = state.engine.lock().await;
    let handle = engine.reindex().await?;

    // History grounded on the old corpus is dropped with it
    let cleared = state.sessions.lock().await.clear_all();
    tracing::info!(entries = handle.entry_count, sessions_cleared = cleared, "reindexed");
    Ok(Json(handle))
}

// ============ GET /stats ============

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: Stats,
    active_sessions: usize,
    questions_asked: usize,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let engine = state.engine.lock().await;
    let stats = stats::collect(&engine, &state.feedback).await?;
    let active_sessions = state.sessions.lock().await.len();

    Ok(Json(StatsResponse {
        stats,
        active_sessions,
        questions_asked: state.questions_asked.load(Ordering::Relaxed),
    }))
}
