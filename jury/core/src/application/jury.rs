// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The jury pipeline orchestrator.
//!
//! Sequences the whole query: guardrails, memory context, fan-out,
//! aggregation, reflection, moderation, memory write-back, metrics. Only a
//! guardrail block aborts the pipeline; every upstream failure is carried
//! as data, and reflection/memory problems are logged and swallowed.
//!
//! The orchestrator owns no persistent state. Session and long-term memory
//! belong to the [`MemoryService`] handed in at construction; the returned
//! [`ConsensusResult`] belongs to the caller.
//!
//! Cancellation: if the inbound request is dropped, the future returned by
//! [`JuryService::execute`] is dropped with it, which aborts every
//! outstanding model call.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::config::JuryConfig;
use crate::domain::consensus::{aggregate, ConsensusResult, Verdict};
use crate::domain::guardrail::{self, RiskLevel};
use crate::domain::memory::MemoryEntry;
use crate::domain::router::ChatBackend;
use crate::infrastructure::telemetry::Telemetry;

use super::fanout::ModelFanout;
use super::memory_service::MemoryService;
use super::moderation::OutputModerator;
use super::reflection::ReflectionPass;

#[derive(Debug, Error)]
pub enum JuryError {
    /// Input rejected before any model call. Recoverable at the caller
    /// as a 400.
    #[error("guardrail blocked input ({risk}): {reason}")]
    GuardrailBlocked { reason: String, risk: RiskLevel },

    /// Anything unexpected inside the orchestrator itself.
    #[error("internal jury error: {0}")]
    Internal(String),
}

/// One jury query. Per-request flags override the configured defaults;
/// `None` falls back to configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JuryRequest {
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub enable_reflection: Option<bool>,
    #[serde(default)]
    pub enable_memory: Option<bool>,
    #[serde(default)]
    pub enable_guardrails: Option<bool>,
}

impl JuryRequest {
    pub fn question(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Self::default() }
    }
}

pub struct JuryService {
    fanout: ModelFanout,
    reflection: ReflectionPass,
    moderator: OutputModerator,
    memory: Arc<MemoryService>,
    telemetry: Arc<Telemetry>,
    default_models: Vec<String>,
    reflection_enabled: bool,
    memory_enabled: bool,
    guardrails_enabled: bool,
}

impl JuryService {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        memory: Arc<MemoryService>,
        telemetry: Arc<Telemetry>,
        config: &JuryConfig,
    ) -> Self {
        Self {
            fanout: ModelFanout::new(backend.clone(), telemetry.clone()),
            reflection: ReflectionPass::new(backend.clone(), config.reflection_model.clone()),
            moderator: OutputModerator::new(backend, config.reflection_model.clone()),
            memory,
            telemetry,
            default_models: config.models.clone(),
            reflection_enabled: config.enable_reflection,
            memory_enabled: config.enable_memory,
            guardrails_enabled: config.enable_guardrails,
        }
    }

    /// Run the full pipeline for one question.
    pub async fn execute(&self, request: JuryRequest) -> Result<ConsensusResult, JuryError> {
        let guardrails = request.enable_guardrails.unwrap_or(self.guardrails_enabled);
        let use_memory = request.enable_memory.unwrap_or(self.memory_enabled);
        let reflect = request.enable_reflection.unwrap_or(self.reflection_enabled);

        // 1. Input guardrails. A block stops everything before fan-out.
        if guardrails {
            match guardrail::check_input(&request.question) {
                Ok(None) => {}
                Ok(Some(warning)) => {
                    warn!(topic = %warning.topic, risk = %warning.risk, "sensitive topic allowed through");
                }
                Err(violation) => {
                    return Err(JuryError::GuardrailBlocked {
                        reason: violation.reason,
                        risk: violation.risk,
                    });
                }
            }
        }

        // 2. Conversational context from the session ring.
        let memory_context = match (&request.session_id, use_memory) {
            (Some(session_id), true) => self.memory.session_context(session_id),
            _ => None,
        };
        let memory_context_used = memory_context.is_some();
        let context = merge_context(memory_context, request.context.as_deref());

        // 3. Fan out to the juror panel.
        let models = request.models.as_deref().unwrap_or(&self.default_models);
        let responses = self
            .fanout
            .dispatch(&request.question, context.as_deref(), models)
            .await;
        let any_success = responses.iter().any(|r| r.success);
        let max_latency_ms = responses.iter().map(|r| r.latency_ms).max().unwrap_or(0);

        // 4. Aggregate into a verdict.
        let mut result = aggregate(responses);

        // 5. Session metadata tags.
        result.guardrails_applied = guardrails;
        result.session_id = request.session_id.clone();
        result.memory_context_used = memory_context_used;

        // 6. Optional reflection; a sub-threshold critique changes nothing.
        if reflect && ReflectionPass::applies_to(&result) {
            let outcome = self.reflection.review(&request.question, &result).await;
            result.quality_score = Some(outcome.quality_score);
            if outcome.should_replace() {
                result.original_consensus_answer = result.consensus_answer.take();
                result.consensus_answer = outcome.refined_answer;
                result.reflection_applied = true;
            } else if !outcome.issues.is_empty() {
                info!(issues = ?outcome.issues, "reflection kept the original answer");
            }
        }

        // Output moderation rides on the guardrail flag and is advisory:
        // fail-open, logged, never mutates the result.
        if guardrails {
            if let Some(answer) = &result.consensus_answer {
                let verdict = self.moderator.review(answer).await;
                if !verdict.safe {
                    warn!(concerns = ?verdict.concerns, "moderation flagged the consensus answer");
                }
            }
        }

        // 7. Write the outcome back to the session.
        if use_memory {
            if let (Some(session_id), Some(answer)) =
                (&request.session_id, result.consensus_answer.as_ref())
            {
                self.memory.record(
                    session_id,
                    MemoryEntry::new(
                        request.question.clone(),
                        answer.clone(),
                        result.verdict,
                        result.agreement_score,
                    ),
                );
            }
        }

        // 8. Overall query metric. Latency is the max per-model latency:
        // the parallel lower bound, not the sum.
        let success = any_success || result.verdict != Verdict::NoConsensus;
        self.telemetry.record_query(success, result.verdict, max_latency_ms);
        info!(
            verdict = result.verdict.label(),
            score = result.agreement_score,
            latency_ms = max_latency_ms,
            session = request.session_id.as_deref().unwrap_or("-"),
            "jury query completed"
        );

        Ok(result)
    }
}

/// Memory context comes first, then the caller's context, separated by a
/// blank line.
fn merge_context(memory: Option<String>, caller: Option<&str>) -> Option<String> {
    match (memory, caller.filter(|c| !c.trim().is_empty())) {
        (Some(m), Some(c)) => Some(format!("{m}\n\n{c}")),
        (Some(m), None) => Some(m),
        (None, Some(c)) => Some(c.to_string()),
        (None, None) => None,
    }
}
