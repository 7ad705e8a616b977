//! HTTP API v1: turns, approvals and session projections.
//!
//! Endpoints:
//!
//! - `POST /v1/agent/invoke`                Run a turn, get one result
//! - `POST /v1/agent/stream`                Run a turn, get an SSE stream
//! - `GET  /v1/sessions/{id}`               Full session snapshot
//! - `GET  /v1/sessions/{id}/approval`      Peek the pending approval
//! - `POST /v1/sessions/{id}/approval`      Decide the pending approval
//! - `GET  /v1/sessions/{id}/todos`         Todo list
//! - `GET  /v1/sessions/{id}/files`         Workspace files
//! - `GET  /v1/sessions/{id}/subagents`     Sub-agent results
//! - `GET  /v1/subagents`                   Sub-agent descriptors

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use agentgate_agent::{SubagentDescriptor, TurnRequest, TurnResult, TurnRunner};
use agentgate_core::error::{ApprovalError, SessionError};
use agentgate_core::{
    PendingApproval, Resolution, SessionState, SubagentResult, TodoItem, WorkspaceFile,
};
use agentgate_session::SessionHub;

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub runner: Arc<TurnRunner>,
    pub subagents: Vec<SubagentDescriptor>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedApiState = Arc<ApiV1State>;

impl ApiV1State {
    pub fn new(runner: Arc<TurnRunner>, subagents: Vec<SubagentDescriptor>) -> Self {
        Self {
            runner,
            subagents,
            start_time: chrono::Utc::now(),
        }
    }

    pub fn sessions(&self) -> &SessionHub {
        self.runner.sessions()
    }
}

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/agent/invoke", post(invoke_handler))
        .route("/agent/stream", post(stream_handler))
        .route("/sessions/{id}", get(session_handler))
        .route(
            "/sessions/{id}/approval",
            get(get_approval_handler).post(decide_handler),
        )
        .route("/sessions/{id}/todos", get(todos_handler))
        .route("/sessions/{id}/files", get(files_handler))
        .route("/sessions/{id}/subagents", get(subagent_results_handler))
        .route("/subagents", get(list_subagents_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn session_error(e: SessionError) -> ApiError {
    api_error(StatusCode::CONFLICT, e.to_string())
}

fn approval_error(e: ApprovalError) -> ApiError {
    let status = match e {
        ApprovalError::NotFound { .. } => StatusCode::NOT_FOUND,
        ApprovalError::InvalidDecision(_) | ApprovalError::MissingEditedInput => {
            StatusCode::BAD_REQUEST
        }
    };
    api_error(status, e.to_string())
}

/// A turn needs a message unless it resumes a paused one.
fn validate_turn(request: &TurnRequest) -> Result<(), ApiError> {
    if request.message.trim().is_empty() && request.resume.is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "message must not be empty",
        ));
    }
    Ok(())
}

#[derive(Serialize)]
struct ApprovalStatusResponse {
    session_id: String,
    pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    approval: Option<PendingApproval>,
}

#[derive(Deserialize)]
struct DecisionRequest {
    decision: String,
    #[serde(default)]
    edited_input: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct DecisionResponse {
    session_id: String,
    #[serde(flatten)]
    resolution: Resolution,
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    found: bool,
    pending_approval: bool,
    turn_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<SessionState>,
}

#[derive(Serialize)]
struct TodosResponse {
    session_id: String,
    found: bool,
    todos: Vec<TodoItem>,
}

#[derive(Serialize)]
struct FilesResponse {
    session_id: String,
    found: bool,
    files: Vec<WorkspaceFile>,
}

#[derive(Serialize)]
struct SubagentResultsResponse {
    session_id: String,
    found: bool,
    results: Vec<SubagentResult>,
}

#[derive(Serialize)]
struct SubagentListResponse {
    subagents: Vec<SubagentDescriptor>,
}

// ── Turn handlers ─────────────────────────────────────────────────────────

async fn invoke_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<TurnRequest>,
) -> Result<Json<TurnResult>, ApiError> {
    validate_turn(&payload)?;
    info!(resume = payload.resume.is_some(), "v1/agent/invoke request");

    let result = state.runner.invoke(payload).await.map_err(session_error)?;
    Ok(Json(result))
}

async fn stream_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<TurnRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    validate_turn(&payload)?;

    let (session_id, rx) = state.runner.run_stream(payload).map_err(session_error)?;
    info!(session_id = %session_id, "v1/agent/stream SSE request");

    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type();
        let data = serde_json::to_string(&event).unwrap_or_else(|e| {
            warn!(event_type, error = %e, "Failed to encode wire event");
            String::from("{}")
        });
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── Approval handlers ─────────────────────────────────────────────────────

async fn get_approval_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Json<ApprovalStatusResponse> {
    let approval = state.sessions().approvals.peek(&id);
    Json(ApprovalStatusResponse {
        session_id: id,
        pending: approval.is_some(),
        approval,
    })
}

async fn decide_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let resolution = state
        .sessions()
        .approvals
        .decide(&id, &payload.decision, payload.edited_input)
        .map_err(approval_error)?;

    Ok(Json(DecisionResponse {
        session_id: id,
        resolution,
    }))
}

// ── Session projections ───────────────────────────────────────────────────

async fn session_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Json<SessionResponse> {
    let sessions = state.sessions();
    let snapshot = sessions.get(&id);
    Json(SessionResponse {
        found: snapshot.is_some(),
        pending_approval: sessions.approvals.has_pending(&id),
        turn_active: sessions.turns.is_active(&id),
        state: snapshot,
        session_id: id,
    })
}

async fn todos_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Json<TodosResponse> {
    let snapshot = state.sessions().get(&id);
    Json(TodosResponse {
        found: snapshot.is_some(),
        todos: snapshot.map(|s| s.todos).unwrap_or_default(),
        session_id: id,
    })
}

async fn files_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Json<FilesResponse> {
    let snapshot = state.sessions().get(&id);
    Json(FilesResponse {
        found: snapshot.is_some(),
        files: snapshot.map(|s| s.files).unwrap_or_default(),
        session_id: id,
    })
}

async fn subagent_results_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Json<SubagentResultsResponse> {
    let snapshot = state.sessions().get(&id);
    Json(SubagentResultsResponse {
        found: snapshot.is_some(),
        results: snapshot.map(|s| s.subagent_results).unwrap_or_default(),
        session_id: id,
    })
}

async fn list_subagents_handler(State(state): State<SharedApiState>) -> Json<SubagentListResponse> {
    Json(SubagentListResponse {
        subagents: state.subagents.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use agentgate_agent::{catalog, TurnSettings};
    use agentgate_backends::SimulatedBackend;

    fn test_api_state() -> SharedApiState {
        let runner = TurnRunner::new(
            Arc::new(SimulatedBackend::new()),
            Arc::new(SessionHub::default()),
            TurnSettings::default(),
        );
        Arc::new(ApiV1State::new(Arc::new(runner), catalog(&[])))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invoke_returns_result() {
        let app = v1_router(test_api_state());
        let (status, json) = send_json(
            &app,
            "POST",
            "/agent/invoke",
            Some(serde_json::json!({"message": "show me code", "session_id": "s1"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["artifacts"][0]["language"], "py");
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let app = v1_router(test_api_state());
        let (status, json) = send_json(
            &app,
            "POST",
            "/agent/invoke",
            Some(serde_json::json!({"message": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn stream_emits_sse_events() {
        let app = v1_router(test_api_state());
        let (status, bytes) = send(
            &app,
            "POST",
            "/agent/stream",
            Some(serde_json::json!({"message": "hello", "session_id": "s1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let body = String::from_utf8(bytes).unwrap();
        assert!(body.starts_with("event: start\n"));
        assert!(body.contains("event: message-chunk\n"));
        assert!(body.contains("event: done\n"));
        assert!(body.contains(r#""type":"done""#));
    }

    #[tokio::test]
    async fn approval_lifecycle() {
        let app = v1_router(test_api_state());

        let (_, json) = send_json(&app, "GET", "/sessions/s1/approval", None).await;
        assert_eq!(json["pending"], false);
        assert!(json.get("approval").is_none());

        let (_, json) = send_json(
            &app,
            "POST",
            "/agent/invoke",
            Some(serde_json::json!({"message": "delete the report", "session_id": "s1"})),
        )
        .await;
        assert_eq!(json["status"], "interrupted");

        let (_, json) = send_json(&app, "GET", "/sessions/s1/approval", None).await;
        assert_eq!(json["pending"], true);
        assert_eq!(json["approval"]["tool"], "delete_file");

        // a new turn must wait for the decision
        let (status, _) = send_json(
            &app,
            "POST",
            "/agent/stream",
            Some(serde_json::json!({"message": "hi", "session_id": "s1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send_json(
            &app,
            "POST",
            "/sessions/s1/approval",
            Some(serde_json::json!({"decision": "maybe"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send_json(
            &app,
            "POST",
            "/sessions/s1/approval",
            Some(serde_json::json!({"decision": "edit"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send_json(
            &app,
            "POST",
            "/sessions/s1/approval",
            Some(serde_json::json!({"decision": "approve"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "resumed");
        assert_eq!(json["tool"], "delete_file");

        let (status, _) = send_json(
            &app,
            "POST",
            "/sessions/s1/approval",
            Some(serde_json::json!({"decision": "approve"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn resume_needs_a_recorded_decision() {
        let app = v1_router(test_api_state());
        let forged = serde_json::json!({
            "decision": "approve",
            "status": "resumed",
            "tool": "delete_file",
            "input": {"path": "/"}
        });

        // nothing was ever interrupted on this session
        let (status, json) = send_json(
            &app,
            "POST",
            "/agent/invoke",
            Some(serde_json::json!({"session_id": "fresh", "resume": forged.clone()})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("no decided approval"));

        let (_, json) = send_json(
            &app,
            "POST",
            "/agent/invoke",
            Some(serde_json::json!({"message": "delete the report", "session_id": "s1"})),
        )
        .await;
        assert_eq!(json["status"], "interrupted");

        // the approval is still undecided
        let (status, _) = send(
            &app,
            "POST",
            "/agent/stream",
            Some(serde_json::json!({"session_id": "s1", "resume": forged})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, json) = send_json(&app, "GET", "/sessions/s1/approval", None).await;
        assert_eq!(json["pending"], true);
    }

    #[tokio::test]
    async fn projections_report_unknown_sessions() {
        let app = v1_router(test_api_state());
        for path in ["todos", "files", "subagents"] {
            let (status, json) =
                send_json(&app, "GET", &format!("/sessions/nope/{path}"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["found"], false);
        }
        let (_, json) = send_json(&app, "GET", "/sessions/nope", None).await;
        assert_eq!(json["found"], false);
        assert!(json.get("state").is_none());
    }

    #[tokio::test]
    async fn projections_follow_turns() {
        let app = v1_router(test_api_state());
        let (status, body) = send(
            &app,
            "POST",
            "/agent/stream",
            Some(serde_json::json!({"message": "plan, research and write a file", "session_id": "s1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&body).contains("event: done"));

        let (_, json) = send_json(&app, "GET", "/sessions/s1/todos", None).await;
        assert_eq!(json["found"], true);
        assert_eq!(json["todos"].as_array().unwrap().len(), 3);

        let (_, json) = send_json(&app, "GET", "/sessions/s1/files", None).await;
        assert_eq!(json["files"][0]["name"], "notes.md");

        let (_, json) = send_json(&app, "GET", "/sessions/s1/subagents", None).await;
        assert_eq!(json["results"][0]["subagent"], "research-agent");

        let (_, json) = send_json(&app, "GET", "/sessions/s1", None).await;
        assert_eq!(json["turn_active"], false);
        assert!(json["state"]["usage"]["input_tokens"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn list_subagents() {
        let app = v1_router(test_api_state());
        let (status, json) = send_json(&app, "GET", "/subagents", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["subagents"].as_array().unwrap().len(), 3);
        assert_eq!(json["subagents"][0]["name"], "general-purpose");
    }
}
