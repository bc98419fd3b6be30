// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Model-backed moderation of the outgoing consensus answer.
//!
//! One cheap, deterministic call. The policy is fail-open: if the moderation
//! call or its JSON cannot be trusted, the answer ships and the uncertainty
//! is logged at medium risk.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::domain::guardrail::RiskLevel;
use crate::domain::prompts::MODERATION_SYSTEM_PROMPT;
use crate::domain::router::{ChatBackend, ChatMessage, ChatRequest};

const MODERATION_TEMPERATURE: f32 = 0.0;
const MODERATION_MAX_TOKENS: u32 = 200;

#[derive(Debug, Clone, Serialize)]
pub struct ModerationVerdict {
    pub safe: bool,
    pub concerns: Vec<String>,
}

impl ModerationVerdict {
    fn fail_open(note: impl Into<String>) -> Self {
        Self { safe: true, concerns: vec![note.into()] }
    }
}

pub struct OutputModerator {
    backend: Arc<dyn ChatBackend>,
    model: String,
}

impl OutputModerator {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        Self { backend, model: model.into() }
    }

    pub async fn review(&self, answer: &str) -> ModerationVerdict {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(MODERATION_SYSTEM_PROMPT),
                ChatMessage::user(answer.to_string()),
            ],
            temperature: MODERATION_TEMPERATURE,
            max_tokens: MODERATION_MAX_TOKENS,
        };

        let reply = match self.backend.chat(&request).await {
            Ok(outcome) => outcome.text,
            Err(err) => {
                warn!(risk = %RiskLevel::Medium, %err, "output moderation call failed, failing open");
                return ModerationVerdict::fail_open(format!("moderation unavailable: {err}"));
            }
        };

        match serde_json::from_str::<serde_json::Value>(reply.trim()) {
            Ok(value) => {
                let safe = value.get("safe").and_then(|v| v.as_bool()).unwrap_or(true);
                let concerns = value
                    .get("concerns")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|i| i.as_str())
                            .map(|s| s.to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                ModerationVerdict { safe, concerns }
            }
            Err(err) => {
                warn!(risk = %RiskLevel::Medium, %err, "output moderation reply unparseable, failing open");
                ModerationVerdict::fail_open(format!("unparseable moderation reply: {err}"))
            }
        }
    }
}
