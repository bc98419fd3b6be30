// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Parallel dispatch of one question to the juror panel.
//!
//! All calls go out concurrently; the wall-clock cost of a round is the
//! slowest call plus its retries, never the sum. A failing model never
//! affects the others: its slot in the result list carries
//! `success = false` and the observed latency.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{error, warn};

use crate::domain::consensus::ModelResponse;
use crate::domain::prompts::JURY_SYSTEM_PROMPT;
use crate::domain::router::{ChatBackend, ChatMessage, ChatRequest, RouterError};
use crate::infrastructure::telemetry::Telemetry;

/// Sampling temperature for juror calls.
const JUROR_TEMPERATURE: f32 = 0.3;

/// Token budget per juror answer.
const JUROR_MAX_TOKENS: u32 = 2048;

pub struct ModelFanout {
    backend: Arc<dyn ChatBackend>,
    telemetry: Arc<Telemetry>,
}

impl ModelFanout {
    pub fn new(backend: Arc<dyn ChatBackend>, telemetry: Arc<Telemetry>) -> Self {
        Self { backend, telemetry }
    }

    /// The user message every juror receives.
    pub fn compose_user_message(question: &str, context: Option<&str>) -> String {
        match context {
            Some(ctx) if !ctx.trim().is_empty() => {
                format!("Context: {ctx}\n\nQuestion: {question}")
            }
            _ => question.to_string(),
        }
    }

    /// Ask every model in `models` concurrently. The result preserves the
    /// input order; a successful HTTP call with empty content still comes
    /// back `success = true` and is filtered later by the aggregator.
    pub async fn dispatch(
        &self,
        question: &str,
        context: Option<&str>,
        models: &[String],
    ) -> Vec<ModelResponse> {
        let user_message = Self::compose_user_message(question, context);
        let calls = models.iter().map(|model| self.ask(model, &user_message));
        join_all(calls).await
    }

    async fn ask(&self, model: &str, user_message: &str) -> ModelResponse {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(JURY_SYSTEM_PROMPT),
                ChatMessage::user(user_message),
            ],
            temperature: JUROR_TEMPERATURE,
            max_tokens: JUROR_MAX_TOKENS,
        };

        let start = Instant::now();
        match self.backend.chat(&request).await {
            Ok(outcome) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                self.telemetry
                    .record_dispatch(model, true, latency_ms, outcome.cost_usd, outcome.cache_hit);
                ModelResponse::answered(model, outcome.text, latency_ms)
            }
            Err(err) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                self.telemetry.record_dispatch(model, false, latency_ms, None, false);
                if matches!(err, RouterError::Auth(_)) {
                    // Operator signal: a revoked token takes down every juror.
                    error!(model, %err, "model router rejected credentials");
                } else {
                    warn!(model, %err, "juror dispatch failed");
                }
                ModelResponse::failed(model, err.to_string(), latency_ms)
            }
        }
    }
}
