// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod router_client;
pub mod station;
pub mod telemetry;

pub use router_client::ModelRouterClient;
pub use station::{HeartbeatMode, HeartbeatStatus, StationClient};
pub use telemetry::Telemetry;
