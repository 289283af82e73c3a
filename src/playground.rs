//! HTTP playground
//!
//! Exposes agents over REST:
//! - `GET  /health`
//! - `GET  /v1/playground/status`
//! - `GET  /v1/playground/agent/get`
//! - `POST /v1/playground/agent/run`

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{snake_case, Agent};
use crate::error::{details, ErrorResponse, ErrorType, FinancialAgentError};
use crate::models::ToolCallRecord;
use crate::runner::query_agent;
use crate::Result;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct AgentRunRequest {
    pub message: String,
    pub agent_id: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentRunResponse {
    pub content: String,
    pub agent_id: String,
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub execution_time: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: String,
    pub role: Option<String>,
    pub model: String,
    pub tools: Vec<String>,
}

impl AgentInfo {
    fn from_agent(agent: &Agent) -> Self {
        Self {
            agent_id: snake_case(agent.name()),
            name: agent.name().to_string(),
            role: agent.role().map(str::to_string),
            model: agent.model_id().to_string(),
            tools: agent.tool_names().into_iter().map(String::from).collect(),
        }
    }
}

/// =============================
/// State
/// =============================

#[derive(Clone)]
pub struct PlaygroundState {
    agents: Arc<Vec<Arc<Agent>>>,
}

impl PlaygroundState {
    /// Match by agent id (`financial_agent`) or by display name (`FinancialAgent`)
    fn find(&self, agent_id: &str) -> Option<Arc<Agent>> {
        let wanted = agent_id.trim();
        self.agents
            .iter()
            .find(|a| snake_case(a.name()) == wanted || a.name() == wanted)
            .cloned()
    }
}

/// =============================
/// Helpers
/// =============================

pub fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Accept a UUID as-is, hash anything else, mint one when absent
pub fn normalize_session_id(value: Option<&str>) -> Uuid {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v)),
        _ => Uuid::new_v4(),
    }
}

pub fn status_for(error_type: ErrorType) -> StatusCode {
    match error_type {
        ErrorType::ValidationError => StatusCode::BAD_REQUEST,
        ErrorType::ApiError => StatusCode::BAD_GATEWAY,
        ErrorType::NetworkError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorType::ConfigurationError
        | ErrorType::AgentExecutionError
        | ErrorType::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(status: StatusCode, error: ErrorResponse) -> Response {
    (status, Json(error)).into_response()
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn playground_status() -> Json<serde_json::Value> {
    Json(json!({ "playground": "available" }))
}

async fn list_agents(State(state): State<PlaygroundState>) -> Json<Vec<AgentInfo>> {
    Json(state.agents.iter().map(|a| AgentInfo::from_agent(a)).collect())
}

async fn run_agent(
    State(state): State<PlaygroundState>,
    Json(req): Json<AgentRunRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        let err = FinancialAgentError::validation(
            "Message must not be empty",
            details([("agent_id", json!(req.agent_id))]),
        );
        return error_reply(StatusCode::BAD_REQUEST, err.to_response());
    }

    let Some(agent) = state.find(&req.agent_id) else {
        warn!("Unknown agent requested: {}", req.agent_id);
        let available: Vec<String> = state.agents.iter().map(|a| snake_case(a.name())).collect();
        let err = FinancialAgentError::validation(
            format!("Agent '{}' not found", req.agent_id),
            details([
                ("agent_id", json!(req.agent_id)),
                ("available_agents", json!(available)),
            ]),
        );
        return error_reply(StatusCode::NOT_FOUND, err.to_response());
    };

    let session_id = normalize_session_id(req.session_id.as_deref());
    info!(
        "run_agent ids => agent={} session_id={} user_id={:?}",
        agent.name(),
        session_id,
        req.user_id
    );

    let outcome = query_agent(&agent, &req.message).await;

    match (outcome.success, outcome.error) {
        (true, _) | (false, None) => (
            StatusCode::OK,
            Json(AgentRunResponse {
                content: outcome.content.unwrap_or_default(),
                agent_id: snake_case(agent.name()),
                session_id,
                user_id: req.user_id,
                tool_calls: outcome.tool_calls,
                execution_time: outcome.execution_time,
            }),
        )
            .into_response(),
        (false, Some(error)) => error_reply(status_for(error.error_type), error),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(agents: Vec<Arc<Agent>>) -> Router {
    let state = PlaygroundState {
        agents: Arc::new(agents),
    };

    Router::new()
        .route("/health", get(health))
        .route("/v1/playground/status", get(playground_status))
        .route("/v1/playground/agent/get", get(list_agents))
        .route("/v1/playground/agent/run", post(run_agent))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(agents: Vec<Arc<Agent>>, host: &str, port: u16) -> Result<()> {
    let router = create_router(agents);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;

    info!("Playground listening on http://{}:{}", host, port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{call_reply, text_reply, ScriptedModel};
    use crate::error::AgentError;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn agents_with(model: ScriptedModel) -> Vec<Arc<Agent>> {
        let model = Arc::new(model);
        vec![
            Arc::new(
                Agent::builder("FinancialAgent", model.clone())
                    .role("Fetch financial details about stocks.")
                    .build(),
            ),
            Arc::new(
                Agent::builder("WebSearchAgent", model)
                    .role("Search the web for information.")
                    .build(),
            ),
        ]
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn run_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/playground/agent/run")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let router = create_router(agents_with(ScriptedModel::answering("x")));
        let (status, body) = send(router.clone(), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));

        let (status, body) = send(router, get_request("/v1/playground/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"playground": "available"}));
    }

    #[tokio::test]
    async fn test_list_agents() {
        let router = create_router(agents_with(ScriptedModel::answering("x")));
        let (status, body) = send(router, get_request("/v1/playground/agent/get")).await;
        assert_eq!(status, StatusCode::OK);

        let agents: Vec<AgentInfo> = serde_json::from_value(body).unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].agent_id, "financial_agent");
        assert_eq!(agents[1].name, "WebSearchAgent");
        assert_eq!(agents[1].model, "scripted");
    }

    #[tokio::test]
    async fn test_run_agent_success() {
        let model = ScriptedModel::new(vec![
            Ok(call_reply("c1", "missing_tool", json!({}))),
            Ok(text_reply("AAPL is trading at 190.5")),
        ]);
        let router = create_router(agents_with(model));

        let (status, body) = send(
            router,
            run_request(json!({
                "message": "What is the current price of AAPL?",
                "agent_id": "FinancialAgent",
                "session_id": "chat-42"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], json!("AAPL is trading at 190.5"));
        assert_eq!(body["agent_id"], json!("financial_agent"));
        assert_eq!(body["session_id"], json!(stable_uuid_from_string("chat-42").to_string()));
        assert_eq!(body["tool_calls"][0]["tool_name"], json!("missing_tool"));
    }

    #[tokio::test]
    async fn test_run_unknown_agent() {
        let router = create_router(agents_with(ScriptedModel::answering("x")));
        let (status, body) = send(
            router,
            run_request(json!({"message": "hi", "agent_id": "multi_agent_system"})),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_type"], json!("validation_error"));
        assert_eq!(
            body["details"]["available_agents"],
            json!(["financial_agent", "web_search_agent"])
        );
    }

    #[tokio::test]
    async fn test_run_empty_message() {
        let router = create_router(agents_with(ScriptedModel::answering("x")));
        let (status, body) = send(
            router,
            run_request(json!({"message": "   ", "agent_id": "financial_agent"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Message must not be empty"));
    }

    #[tokio::test]
    async fn test_run_upstream_failure_maps_status() {
        let model = ScriptedModel::new(vec![Err(AgentError::Api {
            status: 429,
            message: "Rate limit reached".into(),
        })]);
        let router = create_router(agents_with(model));
        let (status, body) = send(
            router,
            run_request(json!({"message": "AI news", "agent_id": "web_search_agent"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error_type"], json!("api_error"));
        assert_eq!(body["error"], json!("Rate limit exceeded. Please wait and try again."));
    }

    #[test]
    fn test_session_id_normalization() {
        let id = "0b7f5a8e-2a5c-4d7e-9b1a-3f2e1d0c9b8a";
        assert_eq!(normalize_session_id(Some(id)).to_string(), id);
        assert_eq!(
            normalize_session_id(Some("session-1")),
            normalize_session_id(Some("session-1"))
        );
        assert_ne!(
            normalize_session_id(Some("session-1")),
            normalize_session_id(Some("session-2"))
        );
        assert_eq!(stable_uuid_from_string("x").get_version_num(), 4);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorType::ValidationError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorType::NetworkError), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorType::ConfigurationError), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
