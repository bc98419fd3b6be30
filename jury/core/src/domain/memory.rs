// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session memory value objects.
//!
//! A [`SessionMemory`] is a bounded, insertion-ordered ring of the session's
//! recent question/answer outcomes. The shared stores that own these values
//! live in `application::memory_service`.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::consensus::Verdict;

/// Maximum entries retained per session; the oldest is evicted on overflow.
pub const MAX_SESSION_QUERIES: usize = 10;

/// Process-wide capacity of the long-term store (FIFO eviction).
pub const LONG_TERM_CAPACITY: usize = 1000;

/// Minimum agreement score for admission into the long-term store.
pub const LONG_TERM_MIN_SCORE: f64 = 0.80;

/// Sessions idle longer than this are reaped.
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 3600;

/// How many recent entries feed the conversational context block.
pub const CONTEXT_WINDOW: usize = 3;

/// A single recorded question/answer outcome. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub verdict: Verdict,
    pub agreement_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        verdict: Verdict,
        agreement_score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: answer.into(),
            verdict,
            agreement_score,
            timestamp: Utc::now(),
        }
    }
}

/// Per-session ring of recent entries.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    entries: VecDeque<MemoryEntry>,
}

impl SessionMemory {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            last_accessed_at: now,
            entries: VecDeque::with_capacity(MAX_SESSION_QUERIES),
        }
    }

    /// Mark the session as used, deferring its reaping.
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

    /// Append an entry, evicting the oldest when the ring is full.
    pub fn push(&mut self, entry: MemoryEntry) {
        if self.entries.len() == MAX_SESSION_QUERIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.touch();
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter()
    }

    /// The most recent `n` entries, oldest of the window first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &MemoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the session has been idle past the TTL.
    pub fn is_expired(&self, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
        now - self.last_accessed_at > Duration::seconds(ttl_seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str) -> MemoryEntry {
        MemoryEntry::new(question, "answer", Verdict::Unanimous, 0.95)
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let mut session = SessionMemory::new("s1");
        for i in 0..(MAX_SESSION_QUERIES + 5) {
            session.push(entry(&format!("q{i}")));
        }
        assert_eq!(session.len(), MAX_SESSION_QUERIES);
        let questions: Vec<&str> = session.entries().map(|e| e.question.as_str()).collect();
        assert_eq!(questions.first(), Some(&"q5"));
        assert_eq!(questions.last(), Some(&"q14"));
    }

    #[test]
    fn recent_returns_last_entries_in_insertion_order() {
        let mut session = SessionMemory::new("s1");
        for i in 0..5 {
            session.push(entry(&format!("q{i}")));
        }
        let recent: Vec<&str> = session.recent(3).map(|e| e.question.as_str()).collect();
        assert_eq!(recent, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn recent_window_larger_than_ring_yields_everything() {
        let mut session = SessionMemory::new("s1");
        session.push(entry("only"));
        assert_eq!(session.recent(3).count(), 1);
    }

    #[test]
    fn expiry_respects_ttl() {
        let mut session = SessionMemory::new("s1");
        session.touch();
        let now = Utc::now();
        assert!(!session.is_expired(3600, now));
        assert!(session.is_expired(3600, now + Duration::seconds(3601)));
    }
}
