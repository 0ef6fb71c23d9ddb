//! Check command implementation

use anyhow::Result;
use std::path::Path;

use shikigami::agent::{AgentBackend, CursorAdapter};
use shikigami::config::Config;

/// Report whether the agent CLI can be located. Returns false when it cannot.
pub fn check_command(config_path: Option<&Path>) -> Result<bool> {
    let config = Config::load(config_path)?;
    let adapter = CursorAdapter::from_settings(&config.agent);

    if adapter.is_available() {
        println!("Agent CLI found: {}", adapter.describe());
        Ok(true)
    } else {
        eprintln!("Agent CLI not found: {}", adapter.describe());
        eprintln!(
            "Install it, or point agent.binary / RUNNER_AGENT_BINARY at the executable."
        );
        Ok(false)
    }
}
