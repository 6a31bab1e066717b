//! Agent configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `STEWARD_<FIELD>` environment variables. `validate` runs last.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use steward_core::{NodeId, Result, StewardError};

use crate::convergence::LoopTiming;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "STEWARD_";

/// Configuration for one node's convergence agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// UUID of the node the agents run on
    pub node_uuid: String,
    /// Address of that node
    pub hostname: String,
    /// Delay between discovery passes while converged
    pub poll_interval_ms: u64,
    /// Delay before rediscovery after a successful change
    pub unconverged_delay_ms: u64,
    /// Initial delay after a failed change
    pub failure_backoff_ms: u64,
    /// Upper bound for the doubling failure delay
    pub max_failure_backoff_ms: u64,
    /// Default tracing filter
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_uuid: String::new(),
            hostname: "localhost".to_string(),
            poll_interval_ms: 60_000,
            unconverged_delay_ms: 100,
            failure_backoff_ms: 1_000,
            max_failure_backoff_ms: 60_000,
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    /// Short intervals and a fixed node id for tests.
    pub fn for_testing() -> Self {
        Self {
            node_uuid: "00000000-0000-0000-0000-00000000000a".to_string(),
            hostname: "127.0.0.1".to_string(),
            poll_interval_ms: 1_000,
            unconverged_delay_ms: 10,
            failure_backoff_ms: 50,
            max_failure_backoff_ms: 400,
            log_level: "debug".to_string(),
        }
    }

    /// Parse a TOML file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StewardError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML text on top of the defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StewardError::config(format!("Invalid TOML: {e}")))
    }

    /// Apply `STEWARD_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `STEWARD_*` overrides from `vars`. Unknown keys are ignored.
    pub fn merge_with_vars<K, V>(&mut self, vars: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(field) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            self.set_from_string(&field.to_lowercase(), value.as_ref())?;
        }
        Ok(())
    }

    /// Set one field by name.
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "node_uuid" => self.node_uuid = value.to_string(),
            "hostname" => self.hostname = value.to_string(),
            "poll_interval_ms" => self.poll_interval_ms = parse_ms(key, value)?,
            "unconverged_delay_ms" => self.unconverged_delay_ms = parse_ms(key, value)?,
            "failure_backoff_ms" => self.failure_backoff_ms = parse_ms(key, value)?,
            "max_failure_backoff_ms" => self.max_failure_backoff_ms = parse_ms(key, value)?,
            "log_level" => self.log_level = value.to_string(),
            _ => {}
        }
        Ok(())
    }

    /// Reject configurations the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.node_id()?;
        if self.hostname.trim().is_empty() {
            return Err(StewardError::config("hostname must not be empty"));
        }
        if self.failure_backoff_ms == 0 {
            return Err(StewardError::config("failure_backoff_ms must be positive"));
        }
        if self.max_failure_backoff_ms < self.failure_backoff_ms {
            return Err(StewardError::config(
                "max_failure_backoff_ms must be at least failure_backoff_ms",
            ));
        }
        Ok(())
    }

    /// Defaults, then `path` if given, then the environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// The configured node id.
    pub fn node_id(&self) -> Result<NodeId> {
        self.node_uuid
            .parse()
            .map_err(|_| StewardError::config(format!("node_uuid {:?} is not a UUID", self.node_uuid)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Loop delays derived from this configuration.
    pub fn timing(&self) -> LoopTiming {
        LoopTiming {
            unconverged_delay: Duration::from_millis(self.unconverged_delay_ms),
            failure_backoff: Duration::from_millis(self.failure_backoff_ms),
            max_failure_backoff: Duration::from_millis(self.max_failure_backoff_ms),
        }
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| StewardError::config(format!("{key}: {value:?} is not a number")))
}
