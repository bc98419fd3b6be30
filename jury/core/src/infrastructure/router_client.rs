// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for the Model Router upstream.
//!
//! One endpoint abstracts every LLM vendor: `POST /v1/chat/completions`
//! with a bearer JWT and the PAP tracking headers. The client owns the
//! retry budget (two retries, linear back-off, `Retry-After` honoured) and
//! maps upstream statuses onto the [`RouterError`] kinds; authentication
//! and budget failures bypass retry entirely.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::router::{
    ChatBackend, ChatOutcome, ChatRequest, RouterError, RouterModel, TokenUsage,
};

/// Upstream call timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Retries after the initial attempt.
const MAX_RETRIES: u32 = 2;

/// Back-off base; attempt `n` waits `n * BACKOFF_BASE`.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

pub struct ModelRouterClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    agent_id: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [crate::domain::router::ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageBody {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<RouterModel>,
}

impl ModelRouterClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client must build");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            agent_id: agent_id.into(),
        }
    }

    /// Models currently served by the router.
    pub async fn list_models(&self) -> Result<Vec<RouterModel>, RouterError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("X-PAP-Agent-Id", &self.agent_id)
            .header("X-PAP-Request-Id", Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| RouterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_error(status, &response_body(response).await, None));
        }
        let body: ModelsResponse = response
            .json()
            .await
            .map_err(|e| RouterError::Transport(format!("malformed models response: {e}")))?;
        Ok(body.data)
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<ChatOutcome, RouterError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("X-PAP-Agent-Id", &self.agent_id)
            .header("X-PAP-Request-Id", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RouterError::Transport(format!("request timed out after {REQUEST_TIMEOUT:?}"))
                } else {
                    RouterError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = header_u64(&response, RETRY_AFTER.as_str());
            let text = response_body(response).await;
            return Err(Self::map_error(status, &text, retry_after));
        }

        // Billing/observability metadata rides in the response headers.
        let cost_usd = header_f64(&response, "X-Request-Cost");
        let router_latency_ms = header_u64(&response, "X-Request-Latency-Ms");
        let provider = header_str(&response, "X-Model-Provider");
        let cache_hit = header_str(&response, "X-Cache-Status").as_deref() == Some("HIT");

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| RouterError::Transport(format!("malformed completion response: {e}")))?;

        // An HTTP success with an empty choice list or empty content is
        // still a success here; the aggregator filters empty answers.
        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(ChatOutcome {
            text,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            cost_usd,
            provider,
            router_latency_ms,
            cache_hit,
        })
    }

    fn map_error(status: StatusCode, body: &str, retry_after: Option<u64>) -> RouterError {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(|m| m.to_string())
            })
            .unwrap_or_else(|| body.trim().to_string());

        match status.as_u16() {
            401 => RouterError::Auth(message),
            402 => RouterError::BudgetExceeded(message),
            429 => RouterError::RateLimited { message, retry_after_seconds: retry_after },
            code => RouterError::Api { status: code, message },
        }
    }
}

#[async_trait]
impl ChatBackend for ModelRouterClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome, RouterError> {
        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                // Linear back-off, unless the router told us exactly how
                // long to stay away.
                let delay = match &last_error {
                    Some(RouterError::RateLimited {
                        retry_after_seconds: Some(seconds), ..
                    }) => Duration::from_secs(*seconds),
                    _ => BACKOFF_BASE * attempt,
                };
                debug!(model = %request.model, attempt, ?delay, "retrying model router call");
                tokio::time::sleep(delay).await;
            }

            match self.attempt(request).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    warn!(model = %request.model, attempt, %err, "model router call failed, will retry");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        // The loop always returns before falling through.
        Err(last_error.unwrap_or_else(|| RouterError::Transport("retry budget exhausted".into())))
    }
}

async fn response_body(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn header_f64(response: &reqwest::Response, name: &str) -> Option<f64> {
    header_str(response, name).and_then(|v| v.parse().ok())
}

fn header_u64(response: &reqwest::Response, name: &str) -> Option<u64> {
    header_str(response, name).and_then(|v| v.parse().ok())
}
