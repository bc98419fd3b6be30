// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The memory subsystem: per-session rings plus the process-wide long-term
//! store.
//!
//! Sessions live in a sharded map so concurrent requests against different
//! sessions never contend; access to a single session is serialised by its
//! shard lock. The long-term store is one mutex-protected FIFO ring shared
//! by every session. All operations are in-memory and non-blocking; nothing
//! here survives a restart.

use std::collections::VecDeque;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::domain::consensus::Verdict;
use crate::domain::memory::{
    MemoryEntry, SessionMemory, CONTEXT_WINDOW, LONG_TERM_CAPACITY, LONG_TERM_MIN_SCORE,
};

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub active_sessions: usize,
    pub total_session_queries: usize,
    pub long_term_memory_size: usize,
}

/// A long-term entry matched against a query, with its keyword-overlap score.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarEntry {
    pub entry: MemoryEntry,
    pub relevance: f64,
}

pub struct MemoryService {
    sessions: DashMap<String, SessionMemory>,
    long_term: Mutex<VecDeque<MemoryEntry>>,
    session_ttl_seconds: u64,
}

impl MemoryService {
    pub fn new(session_ttl_seconds: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            long_term: Mutex::new(VecDeque::with_capacity(LONG_TERM_CAPACITY)),
            session_ttl_seconds,
        }
    }

    /// Conversational context built from the session's most recent entries,
    /// or `None` when the session has no history yet. The session is created
    /// lazily on first reference and its access time refreshed.
    pub fn session_context(&self, session_id: &str) -> Option<String> {
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionMemory::new(session_id));
        session.touch();

        if session.is_empty() {
            return None;
        }

        let blocks = session
            .recent(CONTEXT_WINDOW)
            .map(|e| format!("Q: {}\nA: {}", e.question, e.answer))
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(format!("Previous conversation context:\n{blocks}"))
    }

    /// Record a finished query in the session ring, then consider the entry
    /// for long-term admission.
    pub fn record(&self, session_id: &str, entry: MemoryEntry) {
        self.consider_long_term(&entry);
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionMemory::new(session_id));
        session.push(entry);
    }

    /// Admission: high agreement, an actual consensus, and a question not
    /// already present (case-folded). Oldest entry evicted at capacity.
    fn consider_long_term(&self, entry: &MemoryEntry) {
        if entry.agreement_score < LONG_TERM_MIN_SCORE || entry.verdict == Verdict::NoConsensus {
            return;
        }
        let folded = entry.question.trim().to_lowercase();
        let mut store = self.long_term.lock();
        if store.iter().any(|e| e.question.trim().to_lowercase() == folded) {
            return;
        }
        if store.len() == LONG_TERM_CAPACITY {
            store.pop_front();
        }
        store.push_back(entry.clone());
        debug!(size = store.len(), "long-term memory admitted an entry");
    }

    /// Rank long-term entries by the fraction of the query's keywords that
    /// appear in the stored question. Zero-score entries are dropped.
    pub fn find_similar(&self, question: &str, limit: usize) -> Vec<SimilarEntry> {
        let keywords = extract_keywords(question);
        if keywords.is_empty() || limit == 0 {
            return Vec::new();
        }

        let store = self.long_term.lock();
        let mut scored: Vec<SimilarEntry> = store
            .iter()
            .filter_map(|entry| {
                let folded = entry.question.to_lowercase();
                let hits = keywords.iter().filter(|k| folded.contains(k.as_str())).count();
                (hits > 0).then(|| SimilarEntry {
                    entry: entry.clone(),
                    relevance: hits as f64 / keywords.len() as f64,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        scored
    }

    /// The session's entries in insertion order, if the session exists.
    pub fn history(&self, session_id: &str) -> Option<Vec<MemoryEntry>> {
        self.sessions
            .get(session_id)
            .map(|session| session.entries().cloned().collect())
    }

    pub fn stats(&self) -> MemoryStats {
        let total_session_queries = self.sessions.iter().map(|s| s.len()).sum();
        MemoryStats {
            active_sessions: self.sessions.len(),
            total_session_queries,
            long_term_memory_size: self.long_term.lock().len(),
        }
    }

    /// Reap idle sessions. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(self.session_ttl_seconds, now));
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!(removed, "reaped expired sessions");
        }
        removed
    }
}

/// Keywords: case-folded tokens longer than three characters, stripped of
/// non-alphanumerics.
fn extract_keywords(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .map(|token| token.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|token| token.len() > 3)
        .collect()
}
