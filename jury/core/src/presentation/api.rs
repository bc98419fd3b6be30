// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP façade over the jury pipeline.
//!
//! Thin by design: request decoding, session binding via `X-Session-Id`,
//! lifecycle gating, and response formatting. Everything interesting
//! happens in `application::jury`.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::formatter::{self, ReportFormat};
use crate::application::jury::{JuryError, JuryRequest, JuryService};
use crate::application::lifecycle::LifecycleManager;
use crate::application::memory_service::MemoryService;
use crate::infrastructure::router_client::ModelRouterClient;
use crate::infrastructure::station::HeartbeatStatus;
use crate::infrastructure::telemetry::Telemetry;

const SESSION_HEADER: &str = "x-session-id";

pub struct AppState {
    pub jury: Arc<JuryService>,
    pub memory: Arc<MemoryService>,
    pub lifecycle: Arc<LifecycleManager>,
    pub heartbeat: Arc<HeartbeatStatus>,
    pub telemetry: Arc<Telemetry>,
    pub prometheus: PrometheusHandle,
    pub router: Arc<ModelRouterClient>,
    pub configured_models: Vec<String>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/api/chat/history/{session_id}", get(chat_history))
        .route("/api/memory/stats", get(memory_stats))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn count_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    state.telemetry.record_request();
    next.run(request).await
}

fn session_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

fn jury_error_response(err: JuryError) -> Response {
    match err {
        JuryError::GuardrailBlocked { reason, risk } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "code": "GUARDRAIL_BLOCKED",
                    "message": format!("input blocked ({risk} risk): {reason}"),
                    "reason": reason,
                    "riskLevel": risk,
                }
            })),
        )
            .into_response(),
        JuryError::Internal(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"code": "INTERNAL", "message": message}})),
        )
            .into_response(),
    }
}

fn busy_response(state: &AppState) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": {
                "code": "LIFECYCLE_BUSY",
                "message": "agent is not accepting queries",
                "state": state.lifecycle.state(),
            }
        })),
    )
        .into_response()
}

// ============================================================================
// POST /query
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    question: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    models: Option<Vec<String>>,
    #[serde(default)]
    format: Option<ReportFormat>,
}

async fn query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<QueryBody>,
) -> Response {
    if !state.lifecycle.state().accepts_queries() {
        return busy_response(&state);
    }

    let format = body.format.unwrap_or_default();
    let request = JuryRequest {
        question: body.question.clone(),
        context: body.context,
        models: body.models,
        session_id: session_from(&headers),
        ..JuryRequest::default()
    };

    match state.jury.execute(request).await {
        Ok(result) => Json(formatter::render(&body.question, &result, format)).into_response(),
        Err(err) => jury_error_response(err),
    }
}

// ============================================================================
// POST /api/chat
// ============================================================================

#[derive(Deserialize)]
struct ChatTurn {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatBody {
    message: String,
    #[serde(default)]
    history: Option<Vec<ChatTurn>>,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Response {
    if !state.lifecycle.state().accepts_queries() {
        return busy_response(&state);
    }

    let session_id =
        session_from(&headers).unwrap_or_else(|| Uuid::new_v4().to_string());
    let context = body.history.as_deref().filter(|h| !h.is_empty()).map(|turns| {
        turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    });

    let request = JuryRequest {
        question: body.message,
        context,
        session_id: Some(session_id.clone()),
        ..JuryRequest::default()
    };

    match state.jury.execute(request).await {
        Ok(result) => {
            let answers: Vec<serde_json::Value> = result
                .responses
                .iter()
                .filter(|r| r.success)
                .map(|r| json!({"model": r.model, "answer": r.answer}))
                .collect();
            let failed: Vec<&str> = result
                .responses
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.model.as_str())
                .collect();

            Json(json!({
                "response": result
                    .consensus_answer
                    .as_deref()
                    .unwrap_or("The jury could not produce an answer."),
                "sessionId": session_id,
                "consensus": {
                    "verdict": result.verdict,
                    "confidence": result.confidence,
                    "agreementScore": result.agreement_score,
                },
                "answers": answers,
                "failedModels": failed,
                "memoryContextUsed": result.memory_context_used,
                "reflectionApplied": result.reflection_applied,
            }))
            .into_response()
        }
        Err(err) => jury_error_response(err),
    }
}

// ============================================================================
// Health, status, metrics
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let lifecycle = state.lifecycle.state();
    let healthy = lifecycle.is_healthy() && state.heartbeat.is_healthy();
    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "state": lifecycle,
        "uptime": state.telemetry.uptime_seconds(),
    });
    let code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body)).into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    let available: Vec<String> = state
        .router
        .list_models()
        .await
        .map(|models| models.into_iter().map(|m| m.id).collect())
        .unwrap_or_default();

    Json(json!({
        "state": state.lifecycle.state(),
        "heartbeat": {
            "mode": state.heartbeat.mode(),
            "healthy": state.heartbeat.is_healthy(),
        },
        "uptime_seconds": state.telemetry.uptime_seconds(),
        "metrics": state.telemetry.snapshot(),
        "models": {
            "configured": state.configured_models,
            "available": available,
        },
    }))
    .into_response()
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
        .into_response()
}

// ============================================================================
// Memory endpoints
// ============================================================================

async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    match state.memory.history(&session_id) {
        Some(entries) => Json(json!({
            "sessionId": session_id,
            "entries": entries,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": "SESSION_NOT_FOUND", "message": "unknown session"}})),
        )
            .into_response(),
    }
}

async fn memory_stats(State(state): State<Arc<AppState>>) -> Response {
    Json(state.memory.stats()).into_response()
}
