// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Query and dispatch accounting.
//!
//! Two sinks, fed together: the `metrics` facade (rendered by the Prometheus
//! exporter behind `GET /metrics`) and a set of process-local atomics that
//! back the `/status` snapshot and the Station metrics payload. The facade
//! cannot be read back, so the atomics are the source of truth for
//! snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;

use crate::domain::consensus::Verdict;

/// Prometheus counter names exposed by the façade.
pub mod names {
    pub const QUERIES_TOTAL: &str = "compass_queries_total";
    pub const QUERIES_SUCCESSFUL_TOTAL: &str = "compass_queries_successful_total";
    pub const QUERIES_FAILED_TOTAL: &str = "compass_queries_failed_total";
    pub const REQUESTS_TOTAL: &str = "compass_requests_total";
    pub const CONSENSUS_UNANIMOUS_TOTAL: &str = "compass_consensus_unanimous_total";
    pub const CONSENSUS_SPLIT_TOTAL: &str = "compass_consensus_split_total";
    pub const CONSENSUS_NO_CONSENSUS_TOTAL: &str = "compass_consensus_no_consensus_total";
    pub const QUERY_LATENCY_MS: &str = "compass_query_latency_ms";
    pub const MODEL_DISPATCHES_TOTAL: &str = "compass_model_dispatches_total";
    pub const MODEL_DISPATCH_LATENCY_MS: &str = "compass_model_dispatch_latency_ms";
}

#[derive(Debug)]
pub struct Telemetry {
    started_at: Instant,
    requests: AtomicU64,
    queries: AtomicU64,
    queries_successful: AtomicU64,
    queries_failed: AtomicU64,
    unanimous: AtomicU64,
    split: AtomicU64,
    no_consensus: AtomicU64,
    dispatches: AtomicU64,
    dispatch_failures: AtomicU64,
    router_cost_micro_usd: AtomicU64,
    router_cache_hits: AtomicU64,
}

/// Point-in-time view for `/status` and the Station metrics channel.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub requests_total: u64,
    pub queries_total: u64,
    pub queries_successful: u64,
    pub queries_failed: u64,
    pub consensus_unanimous: u64,
    pub consensus_split: u64,
    pub consensus_no_consensus: u64,
    pub model_dispatches: u64,
    pub model_dispatch_failures: u64,
    pub router_cost_usd: f64,
    pub router_cache_hits: u64,
}

/// Touch every exported counter so the Prometheus exposition lists the
/// full set from the first scrape.
pub fn register_counters() {
    for name in [
        names::QUERIES_TOTAL,
        names::QUERIES_SUCCESSFUL_TOTAL,
        names::QUERIES_FAILED_TOTAL,
        names::REQUESTS_TOTAL,
        names::CONSENSUS_UNANIMOUS_TOTAL,
        names::CONSENSUS_SPLIT_TOTAL,
        names::CONSENSUS_NO_CONSENSUS_TOTAL,
    ] {
        counter!(name).absolute(0);
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            queries_successful: AtomicU64::new(0),
            queries_failed: AtomicU64::new(0),
            unanimous: AtomicU64::new(0),
            split: AtomicU64::new(0),
            no_consensus: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            router_cost_micro_usd: AtomicU64::new(0),
            router_cache_hits: AtomicU64::new(0),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// One inbound HTTP request on the façade.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter!(names::REQUESTS_TOTAL).increment(1);
    }

    /// One completed jury query. `success` follows the pipeline rule (at
    /// least one model succeeded or the verdict is not `no_consensus`);
    /// `latency_ms` is the maximum per-model latency, the parallel lower
    /// bound of the fan-out.
    pub fn record_query(&self, success: bool, verdict: Verdict, latency_ms: u64) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        counter!(names::QUERIES_TOTAL).increment(1);
        histogram!(names::QUERY_LATENCY_MS).record(latency_ms as f64);
        if success {
            self.queries_successful.fetch_add(1, Ordering::Relaxed);
            counter!(names::QUERIES_SUCCESSFUL_TOTAL).increment(1);
        } else {
            self.queries_failed.fetch_add(1, Ordering::Relaxed);
            counter!(names::QUERIES_FAILED_TOTAL).increment(1);
        }
        let (cell, name) = match verdict {
            Verdict::Unanimous => (&self.unanimous, names::CONSENSUS_UNANIMOUS_TOTAL),
            Verdict::Split => (&self.split, names::CONSENSUS_SPLIT_TOTAL),
            Verdict::NoConsensus => (&self.no_consensus, names::CONSENSUS_NO_CONSENSUS_TOTAL),
        };
        cell.fetch_add(1, Ordering::Relaxed);
        counter!(name).increment(1);
    }

    /// One per-model dispatch inside the fan-out.
    pub fn record_dispatch(
        &self,
        model: &str,
        success: bool,
        latency_ms: u64,
        cost_usd: Option<f64>,
        cache_hit: bool,
    ) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        let success_label = if success { "true" } else { "false" };
        counter!(names::MODEL_DISPATCHES_TOTAL, "model" => model.to_string(), "success" => success_label)
            .increment(1);
        histogram!(names::MODEL_DISPATCH_LATENCY_MS, "model" => model.to_string())
            .record(latency_ms as f64);
        if !success {
            self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(cost) = cost_usd {
            let micro = (cost * 1_000_000.0).round().max(0.0) as u64;
            self.router_cost_micro_usd.fetch_add(micro, Ordering::Relaxed);
        }
        if cache_hit {
            self.router_cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            requests_total: self.requests.load(Ordering::Relaxed),
            queries_total: self.queries.load(Ordering::Relaxed),
            queries_successful: self.queries_successful.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            consensus_unanimous: self.unanimous.load(Ordering::Relaxed),
            consensus_split: self.split.load(Ordering::Relaxed),
            consensus_no_consensus: self.no_consensus.load(Ordering::Relaxed),
            model_dispatches: self.dispatches.load(Ordering::Relaxed),
            model_dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            router_cost_usd: self.router_cost_micro_usd.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
            router_cache_hits: self.router_cache_hits.load(Ordering::Relaxed),
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_counters_split_by_outcome() {
        let telemetry = Telemetry::new();
        telemetry.record_query(true, Verdict::Unanimous, 420);
        telemetry.record_query(true, Verdict::Split, 380);
        telemetry.record_query(false, Verdict::NoConsensus, 60_000);

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.queries_total, 3);
        assert_eq!(snapshot.queries_successful, 2);
        assert_eq!(snapshot.queries_failed, 1);
        assert_eq!(snapshot.consensus_unanimous, 1);
        assert_eq!(snapshot.consensus_split, 1);
        assert_eq!(snapshot.consensus_no_consensus, 1);
    }

    #[test]
    fn dispatch_accounting_accumulates_cost_and_cache_hits() {
        let telemetry = Telemetry::new();
        telemetry.record_dispatch("gpt-4o", true, 812, Some(0.0025), true);
        telemetry.record_dispatch("claude-sonnet-4", false, 60_000, None, false);
        telemetry.record_dispatch("gemini-2.5-pro", true, 990, Some(0.0015), false);

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.model_dispatches, 3);
        assert_eq!(snapshot.model_dispatch_failures, 1);
        assert_eq!(snapshot.router_cache_hits, 1);
        assert!((snapshot.router_cost_usd - 0.004).abs() < 1e-9);
    }
}
