//! # Application State
//!
//! This module defines the shared state that is available to all HTTP request handlers.
//! The state is created once at server startup and shared via `Arc` across all
//! concurrent requests.
//!
//! Join order requests carry their own table statistics, so no catalog lives here: each
//! request builds a fresh catalog and a fresh join order core, and nothing is shared
//! between requests except the configuration.

use optx_core::join_order::JoinOrderConfig;
use std::env;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

/// Server-level optimizer configuration.
///
/// Read once at startup from the environment:
///
/// - `OPTX_LISTEN_ADDR`: socket address to bind (default `0.0.0.0:3000`).
/// - `OPTX_EXPLODE_OUTER_JOINS`: `true`/`false` (or `1`/`0`); whether left outer joins
///   among the n-ary join's inputs are split into reorderable left/right inputs.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub listen_addr: String,
    pub explode_outer_joins: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            explode_outer_joins: true,
        }
    }
}

impl OptimizerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Unset or unparsable values
    /// fall back to the defaults.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: lookup("OPTX_LISTEN_ADDR")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.listen_addr),
            explode_outer_joins: lookup("OPTX_EXPLODE_OUTER_JOINS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.explode_outer_joins),
        }
    }

    pub fn join_order_config(&self) -> JoinOrderConfig {
        JoinOrderConfig {
            explode_outer_joins: self.explode_outer_joins,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Shared application state, accessible by all request handlers via Axum's State extractor.
pub struct AppState {
    pub config: OptimizerConfig,
}

impl AppState {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }
}
