// Configuration check

use anyhow::Context;
use std::path::Path;

use steward_agent::AgentConfig;

/// Load the layered configuration and print it as TOML.
pub fn check_config(path: Option<&Path>) -> anyhow::Result<()> {
    let config = AgentConfig::load(path).context("configuration rejected")?;
    tracing::debug!(node_uuid = %config.node_uuid, "Configuration valid");
    print!("{}", render(&config)?);
    Ok(())
}

fn render(config: &AgentConfig) -> anyhow::Result<String> {
    toml::to_string_pretty(config).context("failed to render configuration")
}
