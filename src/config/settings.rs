//! Settings sections of the config file

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8423
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The external agent CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Binary name (looked up on PATH) or absolute path
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Value of the `--model` argument
    #[serde(default = "default_model")]
    pub model: String,

    /// Extra arguments placed before the prompt
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Extra environment for the subprocess
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_binary() -> String {
    "agent".to_string()
}

fn default_model() -> String {
    "auto".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            model: default_model(),
            extra_args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

/// Hard invocation budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Ask and plan
    #[serde(default = "default_invoke_seconds")]
    pub invoke_seconds: u64,

    /// Execute
    #[serde(default = "default_execute_seconds")]
    pub execute_seconds: u64,
}

fn default_invoke_seconds() -> u64 {
    180
}

fn default_execute_seconds() -> u64 {
    1800
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            invoke_seconds: default_invoke_seconds(),
            execute_seconds: default_execute_seconds(),
        }
    }
}

impl TimeoutSettings {
    pub fn invoke(&self) -> Duration {
        Duration::from_secs(self.invoke_seconds)
    }

    pub fn execute(&self) -> Duration {
        Duration::from_secs(self.execute_seconds)
    }
}

/// Registry retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    /// Settled jobs untouched for this long are evicted
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,

    /// Eviction sweep period; 0 disables the sweep (lazy eviction still applies)
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Registry capacity
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
}

fn default_retention_seconds() -> u64 {
    3600
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_max_jobs() -> usize {
    256
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            retention_seconds: default_retention_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            max_jobs: default_max_jobs(),
        }
    }
}

impl JobSettings {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }
}

/// Per-job artifact files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory; defaults to `~/.shikigami/jobs`
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}
