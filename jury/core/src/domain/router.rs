// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Chat-completion domain interface.
//!
//! The jury never talks to individual LLM vendors; everything goes through
//! the Model Router upstream. This trait keeps the pipeline decoupled from
//! the HTTP client in `infrastructure::router_client` so tests can script a
//! jury with an in-memory backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completed chat call, including the billing/observability metadata the
/// Model Router carries in response headers.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub cost_usd: Option<f64>,
    pub provider: Option<String>,
    pub router_latency_ms: Option<u64>,
    pub cache_hit: bool,
}

/// A model known to the router, from `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterModel {
    pub id: String,
    pub owned_by: String,
}

/// Errors produced by the Model Router client, each individually surfacable.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Upstream 401. Never retried; operator-visible.
    #[error("model router authentication failed: {0}")]
    Auth(String),

    /// Upstream 402. Never retried.
    #[error("model router budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Upstream 429. Retried within the client's budget, honouring
    /// `Retry-After` when present.
    #[error("model router rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    /// Any other non-2xx, carrying the body's `error.message` when the
    /// body was JSON.
    #[error("model router error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Timeouts, connection failures, malformed response bodies.
    #[error("model router transport error: {0}")]
    Transport(String),
}

impl RouterError {
    /// Whether the client's retry budget applies to this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            RouterError::Auth(_) | RouterError::BudgetExceeded(_) => false,
            RouterError::RateLimited { .. } | RouterError::Transport(_) => true,
            RouterError::Api { status, .. } => *status >= 500,
        }
    }
}

/// The single upstream seam the fan-out, reflection, and moderation share.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome, RouterError>;
}
