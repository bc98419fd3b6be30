// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Environment-backed service configuration.
//!
//! Everything the process needs comes from environment variables; the server
//! binary loads a `.env` file first in development. Feature flags default to
//! enabled unless set to the literal `"false"`.

use std::time::Duration;

use thiserror::Error;

use super::memory::DEFAULT_SESSION_TTL_SECONDS;

/// Default juror panel when `COMPASS_MODELS` is unset.
pub const DEFAULT_MODELS: &[&str] = &["gpt-4o", "claude-sonnet-4", "gemini-2.5-pro"];

/// Default critic model when `REFLECTION_MODEL` is unset.
pub const DEFAULT_REFLECTION_MODEL: &str = "claude-sonnet-4";

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct JuryConfig {
    /// Base URL of the Model Router, e.g. `http://router.internal:4000`.
    pub model_router_url: String,
    /// Bearer JWT for the Model Router.
    pub model_router_token: String,
    /// Station control plane base URL; `None` disables all reporting.
    pub station_url: Option<String>,
    /// Agent identity sent in `X-PAP-Agent-Id` and used in Station paths.
    pub agent_id: String,
    /// Key used to authenticate against the Station.
    pub agent_key: Option<String>,
    /// Optional dedicated heartbeat collector; Station is the fallback.
    pub collector_url: Option<String>,
    /// Juror panel, in dispatch order.
    pub models: Vec<String>,
    /// Critic model for the reflection pass.
    pub reflection_model: String,
    pub enable_reflection: bool,
    pub enable_memory: bool,
    pub enable_guardrails: bool,
    pub session_ttl: Duration,
    pub port: u16,
    /// Public base URL used in shareable report links.
    pub base_url: Option<String>,
}

impl JuryConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let model_router_url =
            required("MODEL_ROUTER_URL")?.trim_end_matches('/').to_string();
        let model_router_token = required("MODEL_ROUTER_TOKEN")?;
        let agent_id = required("PAP_AGENT_ID")?;

        let models = match optional("COMPASS_MODELS") {
            Some(raw) => {
                let parsed: Vec<String> = raw
                    .split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect();
                if parsed.is_empty() {
                    return Err(ConfigError::InvalidVar {
                        name: "COMPASS_MODELS",
                        value: raw,
                        reason: "no model identifiers after parsing".to_string(),
                    });
                }
                parsed
            }
            None => DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        };

        let session_ttl_seconds = match optional("SESSION_TTL_SECONDS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidVar {
                name: "SESSION_TTL_SECONDS",
                value: raw,
                reason: e.to_string(),
            })?,
            None => DEFAULT_SESSION_TTL_SECONDS,
        };

        let port = match optional("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidVar {
                name: "PORT",
                value: raw,
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            model_router_url,
            model_router_token,
            station_url: optional("PAP_STATION_URL").map(|u| u.trim_end_matches('/').to_string()),
            agent_id,
            agent_key: optional("PAP_AGENT_KEY"),
            collector_url: optional("PAP_COLLECTOR_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
            models,
            reflection_model: optional("REFLECTION_MODEL")
                .unwrap_or_else(|| DEFAULT_REFLECTION_MODEL.to_string()),
            enable_reflection: flag_enabled(optional("ENABLE_REFLECTION")),
            enable_memory: flag_enabled(optional("ENABLE_MEMORY")),
            enable_guardrails: flag_enabled(optional("ENABLE_GUARDRAILS")),
            session_ttl: Duration::from_secs(session_ttl_seconds),
            port,
            base_url: optional("BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
        })
    }
}

/// Feature flags are on unless the variable is the literal `"false"`.
fn flag_enabled(value: Option<String>) -> bool {
    value.as_deref() != Some("false")
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::MissingVar(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_to_enabled() {
        assert!(flag_enabled(None));
        assert!(flag_enabled(Some("true".to_string())));
        assert!(flag_enabled(Some("1".to_string())));
        // Only the literal "false" disables.
        assert!(flag_enabled(Some("FALSE".to_string())));
        assert!(!flag_enabled(Some("false".to_string())));
    }

    #[test]
    fn default_panel_has_three_jurors() {
        assert_eq!(DEFAULT_MODELS.len(), 3);
    }
}
