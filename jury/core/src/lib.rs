// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # compass-jury-core
//!
//! The core crate of the Compass jury agent: ask one question to a panel of
//! LLMs through the Model Router, score lexical agreement between the
//! answers, and return a verdict (unanimous / split / no consensus) with a
//! representative answer and, on a split, the dissenter.
//!
//! ## Layer Structure
//!
//! ```text
//! presentation/   ← HTTP façade (axum)
//!     ↓
//! application/    ← jury orchestrator, fan-out, reflection, memory, lifecycle
//!     ↓
//! domain/         ← similarity, consensus, guardrails, value objects, seams
//! infrastructure/ ← Model Router client, Station reporting, telemetry
//! ```
//!
//! The pipeline in one line: guardrails → session context → parallel
//! fan-out → aggregation → optional reflection → memory write-back.
//!
//! ## Integration Tests
//!
//! See `jury/core/tests/` for pipeline scenarios against a scripted
//! backend and Model Router client tests against a mock HTTP server.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
