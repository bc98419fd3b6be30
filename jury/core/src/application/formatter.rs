// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Report presentations of a [`ConsensusResult`].
//!
//! Three shapes: a JSON-LD report object, a Markdown report, and a short
//! post that fits in 280 characters.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::consensus::{ConsensusResult, Verdict};

/// Hard length cap for the short-post presentation.
const SHORT_POST_MAX_CHARS: usize = 280;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Twitter,
    Markdown,
}

/// Render a verdict report in the requested format. The JSON presentation
/// returns a structured object; the other two wrap a rendered string.
pub fn render(question: &str, result: &ConsensusResult, format: ReportFormat) -> serde_json::Value {
    match format {
        ReportFormat::Json => json_ld(question, result),
        ReportFormat::Markdown => json!({
            "format": "markdown",
            "report": markdown(question, result),
        }),
        ReportFormat::Twitter => json!({
            "format": "twitter",
            "report": short_post(result),
        }),
    }
}

fn verdict_emoji(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Unanimous => "✅",
        Verdict::Split => "⚖️",
        Verdict::NoConsensus => "❌",
    }
}

/// JSON-LD envelope around the full consensus result.
fn json_ld(question: &str, result: &ConsensusResult) -> serde_json::Value {
    json!({
        "@context": "https://schema.org",
        "@type": "AssessAction",
        "name": "AI Jury verdict",
        "question": question,
        "result": result,
        "generatedAt": chrono::Utc::now().to_rfc3339(),
    })
}

fn markdown(question: &str, result: &ConsensusResult) -> String {
    let mut out = String::new();
    out.push_str("# AI Jury Report\n\n");
    out.push_str(&format!("**Question:** {question}\n\n"));
    out.push_str(&format!(
        "**Verdict:** {} {} (confidence: {:?}, agreement {:.2})\n\n",
        verdict_emoji(result.verdict),
        result.verdict.label(),
        result.confidence,
        result.agreement_score,
    ));

    if let Some(answer) = &result.consensus_answer {
        out.push_str("## Consensus answer\n\n");
        out.push_str(answer);
        out.push_str("\n\n");
    }

    if result.reflection_applied {
        if let Some(original) = &result.original_consensus_answer {
            out.push_str("## Original answer (before reflection)\n\n");
            out.push_str(original);
            out.push_str("\n\n");
        }
    }

    if let Some(dissenter) = &result.dissenter {
        out.push_str(&format!(
            "## Dissenting opinion — {}\n\n{}\n\n",
            dissenter.model, dissenter.answer
        ));
    }

    out.push_str("## Jury\n\n");
    out.push_str("| Model | Status | Latency |\n|---|---|---|\n");
    for response in &result.responses {
        let status = if response.success {
            "answered".to_string()
        } else {
            format!("failed: {}", response.error.as_deref().unwrap_or("unknown"))
        };
        out.push_str(&format!(
            "| {} | {} | {} ms |\n",
            response.model, status, response.latency_ms
        ));
    }
    out
}

fn short_post(result: &ConsensusResult) -> String {
    let jurors = result.responses.len();
    let header = format!(
        "{} AI Jury: {} ({jurors} models, agreement {:.2})\n",
        verdict_emoji(result.verdict),
        result.verdict.label(),
        result.agreement_score,
    );
    let mut post = header.clone();
    if let Some(answer) = &result.consensus_answer {
        post.push_str(answer);
    }

    if post.chars().count() > SHORT_POST_MAX_CHARS {
        let budget = SHORT_POST_MAX_CHARS - 1;
        post = post.chars().take(budget).collect();
        post.push('…');
    }
    post
}
