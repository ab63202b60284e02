mod config;
mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Json, Path, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use intelli_agents::{AgentError, AgentSettings, AssistantAgent, ChatInput};
use intelli_core::RuleTable;
use intelli_observability::AppMetrics;
use intelli_storage::MemoryStore;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use crate::config::ApiConfig;
use crate::rate_limit::ClientRateLimiter;

const MAX_BODY_BYTES: usize = 16 * 1024;
const MAX_MESSAGE_CHARS: usize = 2_000;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<AssistantAgent<MemoryStore>>,
    pub api_key: Arc<str>,
    limiter: ClientRateLimiter,
    trust_forwarded: bool,
}

impl ApiState {
    /// Drops rate-limit bookkeeping for clients idle for a whole window.
    pub fn sweep_rate_limits(&self) -> usize {
        self.limiter.sweep()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    open_conversations: usize,
    rules: usize,
    metrics: intelli_observability::MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    conversation_id: Option<String>,
    text: String,
}

pub fn build_state(config: &ApiConfig) -> Result<ApiState> {
    let rules = match config.rules_path.as_ref() {
        Some(path) => RuleTable::from_json_file(path)
            .with_context(|| format!("failed loading rule table from {}", path.display()))?,
        None => RuleTable::default_table(),
    };

    let settings = AgentSettings {
        conversation_ttl: chrono::Duration::from_std(config.conversation_ttl)
            .context("conversation ttl out of range")?,
        max_transcript_turns: config.max_transcript_turns,
    };

    let agent = AssistantAgent::new(
        Arc::new(rules),
        Arc::new(MemoryStore::new()),
        AppMetrics::shared(),
        settings,
    );

    Ok(ApiState {
        agent: Arc::new(agent),
        api_key: Arc::from(config.api_key.as_str()),
        limiter: ClientRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        trust_forwarded: config.trust_forwarded,
    })
}

pub fn build_app(config: &ApiConfig) -> Result<Router> {
    Ok(build_router(build_state(config)?))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/rules", get(rules_list))
        .route("/v1/conversations", post(conversation_open))
        .route(
            "/v1/conversations/{conversation_id}",
            get(conversation_get).delete(conversation_end),
        )
        .route("/v1/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> Response {
    let open_conversations = match state.agent.open_conversations().await {
        Ok(count) => count,
        Err(err) => return agent_error_response(err),
    };

    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        open_conversations,
        rules: state.agent.rules().len(),
        metrics: state.agent.metrics().snapshot(),
    };
    (StatusCode::OK, Json(payload)).into_response()
}

async fn rules_list(State(state): State<ApiState>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "rules": state.agent.rules().rules() })),
    )
        .into_response()
}

async fn conversation_open(State(state): State<ApiState>) -> Response {
    match state.agent.open_conversation().await {
        Ok(opened) => (StatusCode::CREATED, Json(opened)).into_response(),
        Err(err) => agent_error_response(err),
    }
}

async fn conversation_get(
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
) -> Response {
    match state.agent.transcript(&conversation_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => conversation_not_found(),
        Err(err) => agent_error_response(err),
    }
}

async fn conversation_end(
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
) -> Response {
    match state.agent.end_conversation(&conversation_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => conversation_not_found(),
        Err(err) => agent_error_response(err),
    }
}

async fn chat(
    State(state): State<ApiState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &rejection.body_text(),
            )
        }
    };

    if request.text.chars().count() > MAX_MESSAGE_CHARS {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "message_too_long",
            "message exceeds the maximum length",
        );
    }

    let input = ChatInput {
        conversation_id: request.conversation_id,
        text: request.text,
    };

    match state.agent.handle_turn(input).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(err) => agent_error_response(err),
    }
}

fn agent_error_response(err: AgentError) -> Response {
    match err {
        AgentError::EmptyMessage => error_response(
            StatusCode::BAD_REQUEST,
            "empty_message",
            "message text must not be blank",
        ),
        AgentError::InvalidConversationId => error_response(
            StatusCode::BAD_REQUEST,
            "invalid_conversation_id",
            "conversation_id must be 1 to 64 letters, digits, '-' or '_'",
        ),
        AgentError::Store(err) => {
            error!(error = %err, "conversation store failure");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "conversation could not be processed",
            )
        }
    }
}

fn conversation_not_found() -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "conversation_not_found",
        "conversation is unknown, ended, or expired",
    )
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message
        })),
    )
        .into_response()
}

fn is_public_endpoint(path: &str) -> bool {
    path == "/health"
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != &*state.api_key {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid x-api-key",
        );
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let client = client_key(&request, state.trust_forwarded);
    if !state.limiter.allow(&client) {
        info!(client = %client, "rate limited");
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded for this client",
        );
    }

    next.run(request).await
}

fn client_key(request: &Request<Body>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(client) = forwarded_client(request) {
            return client;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "local".to_string())
}

fn forwarded_client(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}
