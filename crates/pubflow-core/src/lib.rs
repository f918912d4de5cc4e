//! Shared configuration and pipeline vocabulary for Pubflow.
//!
//! Holds the env-driven [`AppConfig`], the three pipeline stage routing
//! keys, and the daily quota names consulted by the budget gate.

mod app_config;
mod config;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// The three pipeline stages. Each stage owns exactly one task queue,
/// routed by the stage's queue name; there are no dynamic queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Collect,
    Process,
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Collect, Stage::Process, Stage::Publish];

    /// Routing key for this stage's task queue.
    #[must_use]
    pub fn queue_name(self) -> &'static str {
        match self {
            Stage::Collect => "collect",
            Stage::Process => "process",
            Stage::Publish => "publish",
        }
    }

    /// Parses a routing key back into a stage.
    #[must_use]
    pub fn from_queue_name(name: &str) -> Option<Self> {
        match name {
            "collect" => Some(Stage::Collect),
            "process" => Some(Stage::Process),
            "publish" => Some(Stage::Publish),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.queue_name())
    }
}

/// A daily-capped resource tracked by the budget counters.
///
/// `Calls` counts external collection requests; `Tokens` counts AI
/// consumption units reported by the enrichment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quota {
    Calls,
    Tokens,
}

impl Quota {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Quota::Calls => "calls",
            Quota::Tokens => "tokens",
        }
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_queue_names_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_queue_name(stage.queue_name()), Some(stage));
        }
        assert_eq!(Stage::from_queue_name("enrich"), None);
    }

    #[test]
    fn stage_serializes_as_routing_key() {
        let json = serde_json::to_string(&Stage::Process).expect("serialize");
        assert_eq!(json, "\"process\"");
        let back: Stage = serde_json::from_str("\"publish\"").expect("deserialize");
        assert_eq!(back, Stage::Publish);
    }

    #[test]
    fn quota_names_are_stable() {
        assert_eq!(Quota::Calls.as_str(), "calls");
        assert_eq!(Quota::Tokens.as_str(), "tokens");
    }
}
