// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Input guardrails for the jury pipeline.
//!
//! Synchronous pattern checks only. A blocked input never reaches the
//! fan-out; sensitive topics are allowed through but flagged so the
//! orchestrator can log them. Output moderation (the model-backed half of
//! the filter) lives in `application::moderation`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inputs longer than this are rejected outright.
pub const MAX_INPUT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A blocked input, surfaced to the façade as a 400.
#[derive(Debug, Clone, Error, Serialize)]
#[error("input blocked ({risk} risk): {reason}")]
pub struct GuardrailViolation {
    pub reason: String,
    pub risk: RiskLevel,
}

/// A sensitive topic that was allowed through but should be logged.
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailWarning {
    pub topic: String,
    pub risk: RiskLevel,
}

/// Prompt-injection phrasings rejected with high risk, case-insensitive.
static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"ignore\s+(all\s+)?previous\s+instructions",
        r"disregard\s+(all\s+)?(your|previous)\s+instructions",
        r"forget\s+(all\s+)?your\s+instructions",
        r"you\s+are\s+now",
        r"pretend\s+(that\s+)?you\s+are",
        r"act\s+as\s+if\s+you",
        r"jailbreak",
        r"dan\s+mode",
        r"bypass\s+safety",
        r"override\s+instructions",
        r"ignore\s+safety",
        r"system\s+prompt",
        r"reveal\s+your\s+(instructions|prompt|system)",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("injection pattern must compile"))
    .collect()
});

/// Topics that are flagged (medium risk) but not blocked. Stems so that
/// "manufacture"/"manufacturing" and "activity"/"activities" both match.
const SENSITIVE_TOPICS: &[&str] = &[
    "illegal activit",
    "weapons manufactur",
    "explosive",
    "medical diagnosis",
    "legal advice",
    "self-harm",
    "suicide",
];

/// Validate a question before it is allowed anywhere near the fan-out.
///
/// Returns `Ok(None)` for clean input, `Ok(Some(warning))` for a flagged
/// but allowed topic, and `Err` for a blocked input.
pub fn check_input(input: &str) -> Result<Option<GuardrailWarning>, GuardrailViolation> {
    if input.trim().is_empty() {
        return Err(GuardrailViolation {
            reason: "input is empty".to_string(),
            risk: RiskLevel::Low,
        });
    }

    if input.chars().count() > MAX_INPUT_CHARS {
        return Err(GuardrailViolation {
            reason: format!("input exceeds {MAX_INPUT_CHARS} characters"),
            risk: RiskLevel::Medium,
        });
    }

    for pattern in INJECTION_PATTERNS.iter() {
        if let Some(found) = pattern.find(input) {
            return Err(GuardrailViolation {
                reason: format!("prompt injection pattern detected: \"{}\"", found.as_str()),
                risk: RiskLevel::High,
            });
        }
    }

    let folded = input.to_lowercase();
    for topic in SENSITIVE_TOPICS {
        if folded.contains(topic) {
            return Ok(Some(GuardrailWarning {
                topic: (*topic).to_string(),
                risk: RiskLevel::Medium,
            }));
        }
    }

    Ok(None)
}
