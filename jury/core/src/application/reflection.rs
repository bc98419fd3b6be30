// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Second-pass critique of the consensus answer.
//!
//! A single critic model reviews the chosen answer against every juror's
//! answer and returns a quality score plus an optional refinement. The pass
//! is strictly non-fatal: any transport or parse failure collapses to a
//! zero-quality outcome and the original answer stands. The orchestrator
//! only swaps the answer in when the quality score clears the threshold.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::consensus::{ConsensusResult, Verdict};
use crate::domain::prompts::CRITIC_SYSTEM_PROMPT;
use crate::domain::router::{ChatBackend, ChatMessage, ChatRequest};

/// Minimum critic score at which the refined answer replaces the original.
pub const QUALITY_THRESHOLD: f64 = 70.0;

/// Juror answers are truncated to this many characters in the critic prompt.
const ANSWER_SNIPPET_CHARS: usize = 1000;

const CRITIC_TEMPERATURE: f32 = 0.2;
const CRITIC_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Clone, Serialize)]
pub struct ReflectionOutcome {
    pub quality_score: f64,
    pub issues: Vec<String>,
    pub refined_answer: Option<String>,
}

impl ReflectionOutcome {
    fn failure(note: impl Into<String>) -> Self {
        Self {
            quality_score: 0.0,
            issues: vec![note.into()],
            refined_answer: None,
        }
    }

    /// Whether the refinement clears the replacement threshold.
    pub fn should_replace(&self) -> bool {
        self.quality_score >= QUALITY_THRESHOLD && self.refined_answer.is_some()
    }
}

pub struct ReflectionPass {
    backend: Arc<dyn ChatBackend>,
    model: String,
}

impl ReflectionPass {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        Self { backend, model: model.into() }
    }

    /// Reflection runs only when there is an answer worth refining and the
    /// jury was not in complete disagreement.
    pub fn applies_to(result: &ConsensusResult) -> bool {
        result.consensus_answer.is_some() && result.verdict != Verdict::NoConsensus
    }

    /// Review the consensus answer. Infallible by contract: every failure
    /// mode folds into a zero-quality [`ReflectionOutcome`].
    pub async fn review(&self, question: &str, result: &ConsensusResult) -> ReflectionOutcome {
        let Some(answer) = result.consensus_answer.as_deref() else {
            return ReflectionOutcome::failure("no consensus answer to review");
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(CRITIC_SYSTEM_PROMPT),
                ChatMessage::user(build_critic_prompt(question, answer, result)),
            ],
            temperature: CRITIC_TEMPERATURE,
            max_tokens: CRITIC_MAX_TOKENS,
        };

        let reply = match self.backend.chat(&request).await {
            Ok(outcome) => outcome.text,
            Err(err) => {
                warn!(model = %self.model, %err, "reflection call failed");
                return ReflectionOutcome::failure(format!("reflection call failed: {err}"));
            }
        };

        match parse_critic_reply(&reply) {
            Ok(outcome) => {
                debug!(quality = outcome.quality_score, "reflection completed");
                outcome
            }
            Err(reason) => {
                warn!(model = %self.model, reason, "reflection reply was not valid JSON");
                ReflectionOutcome::failure(format!("unparseable critic reply: {reason}"))
            }
        }
    }
}

fn build_critic_prompt(question: &str, answer: &str, result: &ConsensusResult) -> String {
    let juror_answers = result
        .responses
        .iter()
        .filter(|r| r.is_usable())
        .map(|r| format!("[{}]: {}", r.model, truncate(&r.answer, ANSWER_SNIPPET_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Question:\n{question}\n\nConsensus answer under review:\n{answer}\n\n\
         Individual juror answers:\n{juror_answers}"
    )
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parse the critic's JSON reply, tolerating ``` and ```json fences.
fn parse_critic_reply(reply: &str) -> Result<ReflectionOutcome, String> {
    let body = strip_fences(reply.trim());
    let value: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| e.to_string())?;

    let quality_score = value
        .get("qualityScore")
        .and_then(|v| v.as_f64())
        .ok_or("missing numeric qualityScore")?;
    let issues = value
        .get("issues")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();
    let refined_answer = value
        .get("refinedAnswer")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string());

    Ok(ReflectionOutcome {
        quality_score: quality_score.clamp(0.0, 100.0),
        issues,
        refined_answer,
    })
}

/// Models often wrap JSON in markdown code fences despite instructions.
fn strip_fences(text: &str) -> String {
    if text.starts_with("```") {
        text.lines()
            .skip(1)
            .take_while(|line| !line.trim().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        text.to_string()
    }
}
