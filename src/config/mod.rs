//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub caller: CallerConfig,
}

/// Tunables for the call session orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long a dialed participant may ring before the add is rejected.
    pub participant_answer_timeout_secs: u64,
    /// How long a transfer candidate may ring before rollback.
    pub transfer_answer_timeout_secs: u64,
    /// Grace period between a remote hangup and forced cleanup.
    pub end_grace_secs: u64,
    /// Buffered events on the status broadcast channel.
    pub status_capacity: usize,
    /// Buffered commands on the orchestrator mailbox.
    pub command_buffer: usize,
    /// Completed sessions kept in the in-memory log.
    pub session_log_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            participant_answer_timeout_secs: 45,
            transfer_answer_timeout_secs: 30,
            end_grace_secs: 2,
            status_capacity: 64,
            command_buffer: 32,
            session_log_capacity: 100,
        }
    }
}

impl OrchestratorConfig {
    pub fn participant_answer_timeout(&self) -> Duration {
        Duration::from_secs(self.participant_answer_timeout_secs)
    }

    pub fn transfer_answer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_answer_timeout_secs)
    }

    pub fn end_grace(&self) -> Duration {
        Duration::from_secs(self.end_grace_secs)
    }
}

/// Outbound caller identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerConfig {
    /// Caller id used when a call does not supply one explicitly.
    pub default_caller_id: Option<String>,
}

impl Config {
    /// Parse a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.orchestrator.participant_answer_timeout_secs, 45);
        assert_eq!(config.orchestrator.transfer_answer_timeout_secs, 30);
        assert_eq!(config.orchestrator.end_grace_secs, 2);
        assert!(config.caller.default_caller_id.is_none());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = Config::from_toml_str(
            r#"
            [caller]
            default_caller_id = "+15550001111"

            [orchestrator]
            transfer_answer_timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(
            config.caller.default_caller_id.as_deref(),
            Some("+15550001111")
        );
        assert_eq!(config.orchestrator.transfer_answer_timeout_secs, 10);
        // Untouched fields keep their defaults.
        assert_eq!(config.orchestrator.participant_answer_timeout_secs, 45);
    }

    #[test]
    fn test_empty_toml_is_valid() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.orchestrator.command_buffer, 32);
    }
}
