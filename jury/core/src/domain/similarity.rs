// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lexical agreement scoring between two answers.
//!
//! The metric is deliberately self-contained: the two texts form the whole
//! corpus (N = 2), weights are smoothed TF-IDF (`tf * (1 + ln(2/df))`), and
//! the score is the cosine of the two weight vectors. Terms shared by both
//! answers keep their raw TF component, so the cosine collapses to a
//! count-based measure on the shared vocabulary. This is an agreement
//! heuristic, not semantic equivalence.

use std::collections::BTreeMap;

/// Number of documents in the two-text corpus.
const CORPUS_SIZE: f64 = 2.0;

/// Lexical similarity between two texts in `[0, 1]`.
///
/// Properties relied on by the aggregator:
/// - `score(a, a) == 1.0` whenever `a` contains at least one token
/// - `score(a, b) == score(b, a)`
/// - either side empty (or token-free) yields `0.0`
pub fn score(a: &str, b: &str) -> f64 {
    let counts_a = term_counts(a);
    let counts_b = term_counts(b);
    if counts_a.is_empty() || counts_b.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    let mut accumulate = |tf_a: f64, tf_b: f64| {
        let df = (tf_a > 0.0) as u8 + (tf_b > 0.0) as u8;
        let idf = (CORPUS_SIZE / df as f64).ln();
        let weight_a = tf_a * (1.0 + idf);
        let weight_b = tf_b * (1.0 + idf);

        dot += weight_a * weight_b;
        norm_a += weight_a * weight_a;
        norm_b += weight_b * weight_b;
    };

    for (term, &tf_a) in &counts_a {
        let tf_b = counts_b.get(term).copied().unwrap_or(0);
        accumulate(tf_a as f64, tf_b as f64);
    }
    for (term, &tf_b) in &counts_b {
        if !counts_a.contains_key(term) {
            accumulate(0.0, tf_b as f64);
        }
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Case-folded word-token counts, split on whitespace and punctuation.
fn term_counts(text: &str) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }
    counts
}
