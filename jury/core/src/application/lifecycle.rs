// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent lifecycle state machine.
//!
//! `NEW → PROVISIONED → ACTIVE ↔ DRAINING → TERMINATED`, with
//! `ACTIVE → KILLED` as the error path. Transitions are validated here;
//! reporting them to the Station is the observer's concern and must never
//! block or fail the transition itself.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    New,
    Provisioned,
    Active,
    Draining,
    Terminated,
    Killed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::New => "NEW",
            LifecycleState::Provisioned => "PROVISIONED",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Draining => "DRAINING",
            LifecycleState::Terminated => "TERMINATED",
            LifecycleState::Killed => "KILLED",
        }
    }

    /// Only an ACTIVE agent accepts jury queries.
    pub fn accepts_queries(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    /// States in which the agent reports itself healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self,
            LifecycleState::New
                | LifecycleState::Provisioned
                | LifecycleState::Active
                | LifecycleState::Draining
        )
    }

    fn can_transition_to(&self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (New, Provisioned)
                | (Provisioned, Active)
                | (Active, Draining)
                | (Draining, Active)
                | (Draining, Terminated)
                | (Active, Killed)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("invalid lifecycle transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Observer notified after each committed transition. Implementations must
/// swallow their own failures; control-plane reporting never breaks the
/// data path.
#[async_trait]
pub trait TransitionObserver: Send + Sync {
    async fn on_transition(&self, from: LifecycleState, to: LifecycleState, reason: &str);
}

pub struct LifecycleManager {
    state: RwLock<LifecycleState>,
    observer: Option<Arc<dyn TransitionObserver>>,
}

impl LifecycleManager {
    pub fn new(observer: Option<Arc<dyn TransitionObserver>>) -> Self {
        Self {
            state: RwLock::new(LifecycleState::New),
            observer,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Commit a transition and notify the observer. The observer call runs
    /// inline so start-up sequences stay ordered; its failures are its own.
    pub async fn transition(
        &self,
        to: LifecycleState,
        reason: &str,
    ) -> Result<(), InvalidTransition> {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            if !from.can_transition_to(to) {
                return Err(InvalidTransition { from, to });
            }
            *state = to;
            from
        };
        info!(%from, %to, reason, "lifecycle transition");
        if let Some(observer) = &self.observer {
            observer.on_transition(from, to, reason).await;
        }
        Ok(())
    }
}
