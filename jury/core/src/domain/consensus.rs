// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Consensus aggregation over the jury's model responses.
//!
//! The aggregator is pure and never fails: whatever the fan-out produced is
//! carried through unchanged in [`ConsensusResult::responses`] so callers can
//! inspect per-model errors. Verdicts follow fixed agreement thresholds:
//!
//! | agreement score | verdict       | confidence |
//! |-----------------|---------------|------------|
//! | `>= 0.90`       | unanimous     | high       |
//! | `>= 0.60`       | split         | medium     |
//! | otherwise       | no_consensus  | low        |

use serde::{Deserialize, Serialize};

use super::similarity;

/// Agreement score at or above which the jury is unanimous.
pub const UNANIMOUS_THRESHOLD: f64 = 0.90;

/// Agreement score at or above which the jury is split (below unanimous).
pub const SPLIT_THRESHOLD: f64 = 0.60;

/// Categorical summary of inter-model agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Unanimous,
    Split,
    NoConsensus,
}

impl Verdict {
    /// Label used in metrics and report output.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Unanimous => "unanimous",
            Verdict::Split => "split",
            Verdict::NoConsensus => "no_consensus",
        }
    }

    /// Confidence is uniquely determined by the verdict.
    pub fn confidence(&self) -> ConfidenceLevel {
        match self {
            Verdict::Unanimous => ConfidenceLevel::High,
            Verdict::Split => ConfidenceLevel::Medium,
            Verdict::NoConsensus => ConfidenceLevel::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// The outcome of asking one model one question.
///
/// Invariant: `success == false` implies an empty `answer`; a successful
/// response with an empty answer is treated as failed by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub model: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelResponse {
    pub fn answered(model: impl Into<String>, answer: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            model: model.into(),
            answer: answer.into(),
            reasoning: None,
            latency_ms,
            success: true,
            error: None,
        }
    }

    pub fn failed(model: impl Into<String>, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            model: model.into(),
            answer: String::new(),
            reasoning: None,
            latency_ms,
            success: false,
            error: Some(error.into()),
        }
    }

    /// Whether this response counts toward consensus.
    pub fn is_usable(&self) -> bool {
        self.success && !self.answer.trim().is_empty()
    }
}

/// The response least similar to the rest, reported only on a split verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dissenter {
    pub model: String,
    pub answer: String,
    pub mean_similarity: f64,
}

/// The verdict produced by the aggregator, plus everything the pipeline
/// attaches on the way out (reflection and session metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub verdict: Verdict,
    pub confidence: ConfidenceLevel,
    pub agreement_score: f64,
    pub responses: Vec<ModelResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dissenter: Option<Dissenter>,
    #[serde(default)]
    pub reflection_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_consensus_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub memory_context_used: bool,
    #[serde(default)]
    pub guardrails_applied: bool,
}

impl ConsensusResult {
    fn empty(verdict: Verdict, responses: Vec<ModelResponse>) -> Self {
        Self {
            verdict,
            confidence: verdict.confidence(),
            agreement_score: 0.0,
            responses,
            consensus_answer: None,
            dissenter: None,
            reflection_applied: false,
            quality_score: None,
            original_consensus_answer: None,
            session_id: None,
            memory_context_used: false,
            guardrails_applied: false,
        }
    }
}

/// Aggregate the fan-out responses into a verdict.
///
/// Zero usable responses yield `no_consensus` with no representative answer;
/// a single usable response yields `no_consensus` with that answer (one
/// juror is not a consensus). Ties on the representative and dissenter are
/// broken by first index in the usable sublist, which is stable with respect
/// to the fan-out's input order.
pub fn aggregate(responses: Vec<ModelResponse>) -> ConsensusResult {
    let usable: Vec<usize> = responses
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_usable())
        .map(|(i, _)| i)
        .collect();

    match usable.len() {
        0 => ConsensusResult::empty(Verdict::NoConsensus, responses),
        1 => {
            let answer = responses[usable[0]].answer.clone();
            let mut result = ConsensusResult::empty(Verdict::NoConsensus, responses);
            result.consensus_answer = Some(answer);
            result
        }
        n => {
            // Symmetric pairwise similarity over the usable answers.
            let mut matrix = vec![vec![1.0_f64; n]; n];
            let mut pair_sum = 0.0_f64;
            for i in 0..n {
                for j in (i + 1)..n {
                    let s = similarity::score(
                        &responses[usable[i]].answer,
                        &responses[usable[j]].answer,
                    );
                    matrix[i][j] = s;
                    matrix[j][i] = s;
                    pair_sum += s;
                }
            }
            let pair_count = (n * (n - 1) / 2) as f64;
            let agreement_score = round2(pair_sum / pair_count);

            let verdict = if agreement_score >= UNANIMOUS_THRESHOLD {
                Verdict::Unanimous
            } else if agreement_score >= SPLIT_THRESHOLD {
                Verdict::Split
            } else {
                Verdict::NoConsensus
            };

            // Mean similarity of each usable answer to the others.
            let row_means: Vec<f64> = (0..n)
                .map(|i| {
                    let sum: f64 = (0..n).filter(|&j| j != i).map(|j| matrix[i][j]).sum();
                    sum / (n - 1) as f64
                })
                .collect();

            let representative = arg_best(&row_means, |best, candidate| candidate > best);
            let consensus_answer = Some(responses[usable[representative]].answer.clone());

            let dissenter = (verdict == Verdict::Split).then(|| {
                let least = arg_best(&row_means, |best, candidate| candidate < best);
                let r = &responses[usable[least]];
                Dissenter {
                    model: r.model.clone(),
                    answer: r.answer.clone(),
                    mean_similarity: round2(row_means[least]),
                }
            });

            let mut result = ConsensusResult::empty(verdict, responses);
            result.agreement_score = agreement_score;
            result.consensus_answer = consensus_answer;
            result.dissenter = dissenter;
            result
        }
    }
}

/// Index of the best element under `better`, first index winning ties.
fn arg_best(values: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if better(values[best], v) {
            best = i;
        }
    }
    best
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
