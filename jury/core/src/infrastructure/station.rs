// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Station control-plane reporting: lifecycle events, heartbeats, metrics.
//!
//! Two separate channels, by contract: heartbeats carry liveness only
//! (`{mode, uptime_seconds, agent_name}`, never resource data), while the
//! 60-second metrics channel carries resource usage and counters. Every
//! reporting failure here is logged and swallowed; the control plane must
//! never break the data path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::lifecycle::{LifecycleState, TransitionObserver};
use crate::infrastructure::telemetry::Telemetry;

/// Consecutive heartbeat failures that force EMERGENCY mode.
const EMERGENCY_FAILURE_THRESHOLD: u32 = 3;

/// Cadence of the resource metrics channel.
const METRICS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeartbeatMode {
    Emergency,
    Idle,
    Sleep,
}

impl HeartbeatMode {
    pub fn interval(&self) -> Duration {
        match self {
            HeartbeatMode::Emergency => Duration::from_secs(5),
            HeartbeatMode::Idle => Duration::from_secs(30),
            HeartbeatMode::Sleep => Duration::from_secs(900),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatMode::Emergency => "EMERGENCY",
            HeartbeatMode::Idle => "IDLE",
            HeartbeatMode::Sleep => "SLEEP",
        }
    }
}

pub struct StationClient {
    client: reqwest::Client,
    station_url: String,
    collector_url: Option<String>,
    agent_id: String,
    agent_key: Option<String>,
    agent_name: String,
}

impl StationClient {
    pub fn new(
        station_url: impl Into<String>,
        collector_url: Option<String>,
        agent_id: impl Into<String>,
        agent_key: Option<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client must build");
        Self {
            client,
            station_url: station_url.into().trim_end_matches('/').to_string(),
            collector_url: collector_url.map(|u| u.trim_end_matches('/').to_string()),
            agent_id: agent_id.into(),
            agent_key,
            agent_name: agent_name.into(),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.agent_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<(), String> {
        let response = self
            .authed(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", response.status()))
        }
    }

    /// Report a lifecycle transition. Failures are logged and swallowed.
    pub async fn report_transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
        reason: &str,
    ) {
        let url = format!("{}/api/agents/{}/lifecycle", self.station_url, self.agent_id);
        let body = json!({
            "event_type": "STATE_CHANGE",
            "from_state": from.as_str(),
            "to_state": to.as_str(),
            "reason": reason,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Err(err) = self.post(&url, &body).await {
            warn!(%from, %to, err, "lifecycle report to station failed");
        }
    }

    /// Send one liveness heartbeat: collector first, station on fallback.
    /// The body deliberately carries no resource data.
    pub async fn send_heartbeat(&self, mode: HeartbeatMode, uptime_seconds: u64) -> bool {
        let body = json!({
            "mode": mode.as_str(),
            "uptime_seconds": uptime_seconds,
            "agent_name": self.agent_name,
        });

        if let Some(collector) = &self.collector_url {
            let url = format!("{collector}/heartbeat/{}", self.agent_id);
            match self.post(&url, &body).await {
                Ok(()) => return true,
                Err(err) => {
                    debug!(err, "collector heartbeat failed, falling back to station");
                }
            }
        }

        let url = format!("{}/api/agents/{}/heartbeat", self.station_url, self.agent_id);
        match self.post(&url, &body).await {
            Ok(()) => true,
            Err(err) => {
                warn!(err, "station heartbeat failed");
                false
            }
        }
    }

    /// Send one resource metrics sample.
    pub async fn send_metrics(
        &self,
        cpu_percent: f64,
        memory_mb: f64,
        requests_handled: u64,
        custom_metrics: serde_json::Value,
    ) {
        let url = format!("{}/api/agents/{}/metrics", self.station_url, self.agent_id);
        let body = json!({
            "cpu_percent": cpu_percent,
            "memory_mb": memory_mb,
            "requests_handled": requests_handled,
            "custom_metrics": custom_metrics,
        });
        if let Err(err) = self.post(&url, &body).await {
            warn!(err, "metrics report to station failed");
        }
    }
}

#[async_trait]
impl TransitionObserver for StationClient {
    async fn on_transition(&self, from: LifecycleState, to: LifecycleState, reason: &str) {
        self.report_transition(from, to, reason).await;
    }
}

/// Shared heartbeat health used by the monitor loop and `GET /health`.
pub struct HeartbeatStatus {
    mode: RwLock<HeartbeatMode>,
    consecutive_failures: AtomicU32,
}

impl HeartbeatStatus {
    pub fn new(mode: HeartbeatMode) -> Self {
        Self {
            mode: RwLock::new(mode),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn mode(&self) -> HeartbeatMode {
        *self.mode.read()
    }

    pub fn set_mode(&self, mode: HeartbeatMode) {
        *self.mode.write() = mode;
    }

    /// Healthy until the failure threshold trips.
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < EMERGENCY_FAILURE_THRESHOLD
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Records a failure; returns true when the threshold just tripped.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= EMERGENCY_FAILURE_THRESHOLD && self.mode() != HeartbeatMode::Emergency {
            self.set_mode(HeartbeatMode::Emergency);
            return true;
        }
        false
    }
}

/// Heartbeat loop: one beat per mode interval until cancelled. The interval
/// is re-read on every beat, so a mode flip (e.g. to EMERGENCY) applies
/// from the next beat onward.
pub async fn run_heartbeat_loop(
    station: std::sync::Arc<StationClient>,
    status: std::sync::Arc<HeartbeatStatus>,
    telemetry: std::sync::Arc<Telemetry>,
    cancel: CancellationToken,
) {
    loop {
        let mode = status.mode();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(mode.interval()) => {}
        }

        if station.send_heartbeat(status.mode(), telemetry.uptime_seconds()).await {
            status.record_success();
        } else if status.record_failure() {
            warn!("three consecutive heartbeat failures, switching to EMERGENCY mode");
        }
    }
}

/// Resource metrics loop on its own 60-second channel.
pub async fn run_metrics_loop(
    station: std::sync::Arc<StationClient>,
    telemetry: std::sync::Arc<Telemetry>,
    cancel: CancellationToken,
) {
    let mut sampler = CpuSampler::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(METRICS_INTERVAL) => {}
        }

        let snapshot = telemetry.snapshot();
        let custom = json!({
            "queries_total": snapshot.queries_total,
            "consensus_unanimous": snapshot.consensus_unanimous,
            "consensus_split": snapshot.consensus_split,
            "consensus_no_consensus": snapshot.consensus_no_consensus,
            "router_cost_usd": snapshot.router_cost_usd,
            "router_cache_hits": snapshot.router_cache_hits,
        });
        station
            .send_metrics(
                sampler.cpu_percent(),
                resident_memory_mb(),
                snapshot.requests_total,
                custom,
            )
            .await;
    }
}

/// Resident set size in MiB, read from procfs; zero where unavailable.
pub fn resident_memory_mb() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(statm) = std::fs::read_to_string("/proc/self/statm") {
            if let Some(pages) = statm.split_whitespace().nth(1).and_then(|v| v.parse::<u64>().ok())
            {
                return (pages * 4096) as f64 / (1024.0 * 1024.0);
            }
        }
    }
    0.0
}

/// CPU usage since the previous sample, from procfs jiffies; zero where
/// unavailable.
struct CpuSampler {
    last_jiffies: Option<u64>,
    last_sample: std::time::Instant,
}

impl CpuSampler {
    fn new() -> Self {
        Self { last_jiffies: process_jiffies(), last_sample: std::time::Instant::now() }
    }

    fn cpu_percent(&mut self) -> f64 {
        let now = std::time::Instant::now();
        let jiffies = process_jiffies();
        let percent = match (self.last_jiffies, jiffies) {
            (Some(prev), Some(current)) => {
                let elapsed = now.duration_since(self.last_sample).as_secs_f64();
                if elapsed > 0.0 {
                    // Linux exposes jiffies at 100 Hz.
                    ((current.saturating_sub(prev)) as f64 / 100.0) / elapsed * 100.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        self.last_jiffies = jiffies;
        self.last_sample = now;
        percent
    }
}

#[cfg(target_os = "linux")]
fn process_jiffies() -> Option<u64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // Fields 14 and 15 (utime, stime), counting from 1 after the comm
    // field which may contain spaces inside parentheses.
    let rest = stat.rsplit(')').next()?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

#[cfg(not(target_os = "linux"))]
fn process_jiffies() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_intervals_match_the_contract() {
        assert_eq!(HeartbeatMode::Emergency.interval(), Duration::from_secs(5));
        assert_eq!(HeartbeatMode::Idle.interval(), Duration::from_secs(30));
        assert_eq!(HeartbeatMode::Sleep.interval(), Duration::from_secs(900));
    }

    #[test]
    fn three_failures_trip_emergency_mode() {
        let status = HeartbeatStatus::new(HeartbeatMode::Idle);
        assert!(status.is_healthy());
        assert!(!status.record_failure());
        assert!(!status.record_failure());
        assert!(status.is_healthy());
        // The third failure flips the mode exactly once.
        assert!(status.record_failure());
        assert!(!status.is_healthy());
        assert_eq!(status.mode(), HeartbeatMode::Emergency);
        assert!(!status.record_failure());
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let status = HeartbeatStatus::new(HeartbeatMode::Idle);
        status.record_failure();
        status.record_failure();
        status.record_success();
        assert!(status.is_healthy());
        assert!(!status.record_failure());
    }

    #[tokio::test]
    async fn heartbeat_falls_back_to_station_when_collector_is_down() {
        let mut station_server = mockito::Server::new_async().await;
        let station_hit = station_server
            .mock("POST", "/api/agents/jury-1/heartbeat")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut collector_server = mockito::Server::new_async().await;
        let collector_hit = collector_server
            .mock("POST", "/heartbeat/jury-1")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let client = StationClient::new(
            station_server.url(),
            Some(collector_server.url()),
            "jury-1",
            Some("key".to_string()),
            "compass-jury",
        );
        assert!(client.send_heartbeat(HeartbeatMode::Idle, 42).await);
        collector_hit.assert_async().await;
        station_hit.assert_async().await;
    }

    #[tokio::test]
    async fn heartbeat_body_is_liveness_only() {
        let mut server = mockito::Server::new_async().await;
        let hit = server
            .mock("POST", "/api/agents/jury-1/heartbeat")
            .match_request(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body().unwrap()).unwrap();
                let object = body.as_object().unwrap();
                object.len() == 3
                    && object.contains_key("mode")
                    && object.contains_key("uptime_seconds")
                    && object.contains_key("agent_name")
            })
            .with_status(200)
            .create_async()
            .await;

        let client =
            StationClient::new(server.url(), None, "jury-1", None, "compass-jury");
        assert!(client.send_heartbeat(HeartbeatMode::Sleep, 7).await);
        hit.assert_async().await;
    }
}
