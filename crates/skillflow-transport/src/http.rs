//! HTTP transport: skill execution over SSE plus session endpoints.

use std::{convert::Infallible, path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use skillflow_core::SkillEvent;
use skillflow_executor::PromptMode;
use skillflow_session::{
    ExecutionOutcome, Orchestrator, Session, SessionMeta, SessionStore, SkillRequest, preview_of,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::trace::TraceLayer;

use crate::{
    executions::{ActiveExecutions, ExecutionHandle},
    protocol::{
        CancelResponse, ErrorResponse, ExecuteRequest, ListQuery, RespondRequest, SessionList,
        SuccessResponse, encode_event,
    },
};

/// Icon recorded on free-form prompt sessions.
const PROMPT_ICON: &str = "\u{26A1}";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    orchestrator: Orchestrator,
    /// Project holding the skill documents; also the runtime's working directory.
    project_dir: PathBuf,
    executions: ActiveExecutions,
}

impl AppState {
    #[must_use]
    pub fn new(orchestrator: Orchestrator, project_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(AppInner {
                orchestrator,
                project_dir,
                executions: ActiveExecutions::new(),
            }),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        self.inner.orchestrator.sessions()
    }

    #[must_use]
    pub fn executions(&self) -> &ActiveExecutions {
        &self.inner.executions
    }
}

/// Error returned by the JSON endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session not found")]
    SessionNotFound,
    #[error("No pending response for this session")]
    NoPendingResponse,
    #[error("{0}")]
    BadRequest(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::SessionNotFound | Self::NoPendingResponse => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Create the HTTP router.
///
/// # Example
/// ```ignore
/// let app = create_router(AppState::new(orchestrator, project_dir));
/// axum::serve(listener, app).await?;
/// ```
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/skills/{name}/execute", post(execute_skill))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/cancel", post(cancel_execution))
        .route("/api/sessions/{id}/respond", post(respond))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run a skill and stream its events.
///
/// Dropping the response stream (client disconnect) cancels the run.
async fn execute_skill(
    State(state): State<AppState>,
    Path(skill_name): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mode = PromptMode::for_skill(&skill_name);
    if mode == PromptMode::FreeForm && req.trimmed_input().is_none() {
        return Err(ApiError::BadRequest("Prompt input is required"));
    }

    let sessions = state.sessions();
    let session = match &req.session_id {
        Some(id) => sessions.get(id).ok_or(ApiError::SessionNotFound)?,
        None => sessions.create(&skill_name).await,
    };

    let meta = SessionMeta {
        preview: req
            .input
            .as_deref()
            .filter(|input| !input.is_empty())
            .map(preview_of),
        plugin_id: req.plugin_id.clone(),
        skill_icon: (mode == PromptMode::FreeForm).then(|| PROMPT_ICON.to_string()),
        ..SessionMeta::default()
    };
    if let Err(e) = sessions.update_meta(&session.id, meta).await {
        tracing::warn!("Session vanished before execution: {e}");
    }

    let handle = state.executions().begin(&session.id);
    let request = SkillRequest {
        skill_name,
        input: req.input,
        project_dir: state.inner.project_dir.clone(),
        working_dir: state.inner.project_dir.clone(),
        resume_session_id: session.sdk_session_id.clone(),
        attachments: req.file_paths,
        previous_skill: session.previous_skill_name.clone(),
        plugin_id: req.plugin_id,
        language: req.lang,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let guard = handle.cancel.clone().drop_guard();
    tokio::spawn(run_execution(state.clone(), session.id, request, handle, tx));

    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        // Dropping the stream drops the guard and cancels the run.
        let _guard = &guard;
        Ok::<_, Infallible>(Event::default().data(encode_event(&event)))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn run_execution(
    state: AppState,
    session_id: String,
    request: SkillRequest,
    handle: ExecutionHandle,
    tx: mpsc::UnboundedSender<SkillEvent>,
) {
    let outcome = state
        .inner
        .orchestrator
        .execute(&session_id, &request, &tx, &handle.cancel)
        .await;

    match &outcome {
        ExecutionOutcome::Completed { fully_complete } => {
            tracing::info!(session = %session_id, fully_complete, "Execution completed");
        }
        ExecutionOutcome::Chained {
            skill_name,
            session_id: next,
            ..
        } => tracing::info!(session = %session_id, next = %next, "Execution chained to {skill_name}"),
        ExecutionOutcome::Cancelled => tracing::info!(session = %session_id, "Execution cancelled"),
        ExecutionOutcome::NotFound => {
            tracing::warn!(session = %session_id, "Skill {} not found", request.skill_name);
        }
        ExecutionOutcome::Failed(message) => {
            tracing::warn!(session = %session_id, "Execution failed: {message}");
        }
    }

    state.executions().finish(&session_id, handle.id);
    let _ = tx.send(SkillEvent::Done);
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.executions().cancel(&id),
    })
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<SessionList> {
    Json(SessionList {
        sessions: state.sessions().list(query.plugin_id.as_deref()),
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .sessions()
        .get(&id)
        .map(Json)
        .ok_or(ApiError::SessionNotFound)
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.executions().cancel(&id);
    if state.sessions().delete(&id).await {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(ApiError::SessionNotFound)
    }
}

async fn respond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if req.response.is_empty() {
        return Err(ApiError::BadRequest("Response is required"));
    }
    if state.sessions().resolve_user_response(&id, &req.response).await {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(ApiError::NoPendingResponse)
    }
}
