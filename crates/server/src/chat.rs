//! Chat endpoints.
//!
//! - `POST /threads/{thread_id}/messages` runs one turn on the thread and stores the checkpoint
//! - `GET  /threads/{thread_id}`          returns the stored checkpoint

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use railsql_agent::{ThreadService, TurnReport, TurnRequest};
use railsql_core::audit::AuditContext;
use railsql_core::domain::conversation::{ConversationState, RowRecord};
use railsql_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ChatState {
    service: ThreadService,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub thread_id: String,
    pub correlation_id: String,
    pub question: String,
    pub answer: Option<String>,
    pub query: Option<String>,
    pub rows: Vec<RowRecord>,
    pub error: Option<String>,
    pub error_count: u32,
    pub steps: Vec<&'static str>,
}

impl TurnResponse {
    fn new(thread_id: String, correlation_id: String, report: TurnReport) -> Self {
        let steps = report.path().into_iter().map(|node| node.as_str()).collect();
        let state = report.state;
        Self {
            thread_id,
            correlation_id,
            question: state.question,
            answer: state.answer,
            query: state.query,
            rows: state.data.unwrap_or_default(),
            error: state.error,
            error_count: state.error_count,
            steps,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub thread_id: String,
    pub state: ConversationState,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ChatError {
    status: StatusCode,
    body: ErrorBody,
}

impl ChatError {
    fn not_found(thread_id: &str, correlation_id: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody { error: format!("thread `{thread_id}` not found"), correlation_id },
        }
    }
}

impl From<InterfaceError> for ChatError {
    fn from(error: InterfaceError) -> Self {
        let status = match error {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: ErrorBody {
                error: error.user_message().to_string(),
                correlation_id: error.correlation_id().to_string(),
            },
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn router(service: ThreadService) -> Router {
    Router::new()
        .route("/threads/{thread_id}", get(get_thread))
        .route("/threads/{thread_id}/messages", post(post_message))
        .with_state(ChatState { service })
}

async fn post_message(
    Path(thread_id): Path<String>,
    State(state): State<ChatState>,
    headers: HeaderMap,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ChatError> {
    let correlation_id = correlation_id(&headers);
    if request.question.trim().is_empty() {
        return Err(InterfaceError::BadRequest {
            message: "question must not be empty".to_string(),
            correlation_id,
        }
        .into());
    }

    let audit = AuditContext::new(Some(thread_id.clone()), correlation_id.clone(), "http");
    let report = state
        .service
        .ask(Some(&thread_id), request, &audit)
        .await
        .map_err(|error| turn_failed(&thread_id, &correlation_id, error))?;

    info!(
        event_name = "server.turn.completed",
        correlation_id = %correlation_id,
        thread_id = %thread_id,
        steps = report.steps.len(),
        rows = report.state.rows().len(),
        answered = report.state.has_answer(),
        "turn completed"
    );
    Ok(Json(TurnResponse::new(thread_id, correlation_id, report)))
}

async fn get_thread(
    Path(thread_id): Path<String>,
    State(state): State<ChatState>,
    headers: HeaderMap,
) -> Result<Json<ThreadResponse>, ChatError> {
    let correlation_id = correlation_id(&headers);
    match state.service.snapshot(&thread_id).await {
        Ok(Some(state)) => Ok(Json(ThreadResponse { thread_id, state })),
        Ok(None) => Err(ChatError::not_found(&thread_id, correlation_id)),
        Err(error) => Err(turn_failed(&thread_id, &correlation_id, error)),
    }
}

fn turn_failed(thread_id: &str, correlation_id: &str, error: ApplicationError) -> ChatError {
    warn!(
        event_name = "server.turn.failed",
        correlation_id = %correlation_id,
        thread_id = %thread_id,
        error = %error,
        "thread request failed"
    );
    error.into_interface(correlation_id).into()
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use railsql_agent::providers::{DRY_RUN_ANSWER, DRY_RUN_QUERY};
    use railsql_agent::{assemble, ChatStack};
    use railsql_core::config::AppConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, CORRELATION_HEADER};

    async fn demo_stack() -> ChatStack {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;
        assemble(&config).await.expect("demo stack should assemble")
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("router should respond");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, payload)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .header(CORRELATION_HEADER, "req-42")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn message_runs_a_turn_and_checkpoints_the_thread() {
        let stack = demo_stack().await;
        let app = router(stack.service.clone());

        let (status, payload) = send(
            &app,
            post_json("/threads/t-1/messages", json!({"question": "Wie viele Züge kamen an?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "payload: {payload}");
        assert_eq!(payload["thread_id"], "t-1");
        assert_eq!(payload["correlation_id"], "req-42");
        assert_eq!(payload["answer"], DRY_RUN_ANSWER);
        assert_eq!(payload["query"], DRY_RUN_QUERY);
        assert_eq!(payload["rows"].as_array().map(Vec::len), Some(10));
        assert_eq!(payload["steps"][0], "supervisor");
        assert_eq!(payload["steps"][5], "terminal");

        let (status, payload) = send(&app, get("/threads/t-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["state"]["question"], "Wie viele Züge kamen an?");
        assert_eq!(payload["state"]["answer"], DRY_RUN_ANSWER);

        stack.close().await;
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let stack = demo_stack().await;
        let app = router(stack.service.clone());

        let (status, payload) = send(&app, get("/threads/missing")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(payload["error"], "thread `missing` not found");
        stack.close().await;
    }

    #[tokio::test]
    async fn unknown_backend_is_a_bad_request_and_stores_nothing() {
        let stack = demo_stack().await;
        let app = router(stack.service.clone());

        let (status, payload) = send(
            &app,
            post_json(
                "/threads/t-2/messages",
                json!({"question": "Wie viele Züge kamen an?", "model_query": "claude"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["correlation_id"], "req-42");
        let (status, _) = send(&app, get("/threads/t-2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        stack.close().await;
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let stack = demo_stack().await;
        let app = router(stack.service.clone());

        let (status, payload) =
            send(&app, post_json("/threads/t-3/messages", json!({"question": "   "}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["correlation_id"], "req-42");
        stack.close().await;
    }
}
