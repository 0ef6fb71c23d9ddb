//! Configuration loading and management

mod settings;

pub use settings::{AgentSettings, ArtifactSettings, JobSettings, ServerSettings, TimeoutSettings};

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "RUNNER_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub jobs: JobSettings,

    #[serde(default)]
    pub artifacts: ArtifactSettings,
}

impl Config {
    /// Get the global config directory path (~/.shikigami/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shikigami")
    }

    /// Get the global config file path (~/.shikigami/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Parse a config file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the effective configuration.
    ///
    /// Reads `path` (or the global config file), falls back to defaults when
    /// the file does not exist, applies `RUNNER_*` environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with environment variables read through `lookup`
    pub fn load_with_env(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::global_config_path);

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::debug!(
                "[shikigami:config] No config at {}, using defaults",
                path.display()
            );
            Self::default()
        };

        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RUNNER_*` overrides read through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(host) = var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(binary) = var("AGENT_BINARY") {
            self.agent.binary = binary;
        }
        if let Some(seconds) = var("TIMEOUT_SECONDS") {
            self.timeouts.invoke_seconds = parse_env("TIMEOUT_SECONDS", &seconds)?;
        }
        if let Some(seconds) = var("EXECUTE_TIMEOUT_SECONDS") {
            self.timeouts.execute_seconds = parse_env("EXECUTE_TIMEOUT_SECONDS", &seconds)?;
        }
        if let Some(dir) = var("ARTIFACTS_DIR") {
            self.artifacts.dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Reject settings the runner cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.timeouts.invoke_seconds == 0 {
            bail!("timeouts.invoke_seconds must be greater than 0");
        }
        if self.timeouts.execute_seconds == 0 {
            bail!("timeouts.execute_seconds must be greater than 0");
        }
        if self.jobs.retention_seconds == 0 {
            bail!("jobs.retention_seconds must be greater than 0");
        }
        if self.jobs.max_jobs == 0 {
            bail!("jobs.max_jobs must be greater than 0");
        }
        if self.agent.binary.trim().is_empty() {
            bail!("agent.binary must not be empty");
        }
        Ok(())
    }

    /// Artifact root, or `None` when artifacts are disabled
    pub fn artifacts_dir(&self) -> Option<PathBuf> {
        if !self.artifacts.enabled {
            return None;
        }
        Some(match &self.artifacts.dir {
            Some(dir) => expand_home(dir),
            None => Self::global_config_dir().join("jobs"),
        })
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Invalid {ENV_PREFIX}{name}: {value}"))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
