//! Abstract agent backend consumed by the invocation bridge

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::OrchestratorError;

/// What the agent is allowed to do during one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationMode {
    /// Read-only question answering
    Ask,
    /// Read-only planning
    Plan,
    /// Full access to the working directory
    Execute,
}

impl InvocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationMode::Ask => "ask",
            InvocationMode::Plan => "plan",
            InvocationMode::Execute => "execute",
        }
    }
}

impl std::fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a backend needs for a single invocation
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Full prompt text (opaque to the orchestrator)
    pub prompt: String,

    /// Directory the agent runs in
    pub working_dir: PathBuf,

    pub mode: InvocationMode,

    /// Session to resume, `None` for a fresh conversation
    pub session_id: Option<String>,

    /// Wall-clock budget for the whole invocation
    pub timeout: Duration,
}

/// Result of a completed invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResult {
    /// The agent's response text
    pub text: String,

    /// Session id reported by the backend, if any
    pub session_id: Option<String>,

    /// Duration reported by the backend
    pub duration_ms: Option<u64>,

    /// The backend flagged its own response as an error
    pub is_error: bool,
}

/// One piece of streamed output from a running invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentChunk {
    /// The agent moved on to a new step (tool use, phase change)
    Step(String),
    /// Plain output text
    Log(String),
}

/// Failures reported by a backend
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvocationError {
    #[error("{0}")]
    Unavailable(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("exited with code {code:?}")]
    NonZeroExit { code: Option<i32>, output: String },

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for InvocationError {
    fn from(err: std::io::Error) -> Self {
        InvocationError::Io(err.to_string())
    }
}

impl From<InvocationError> for OrchestratorError {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Unavailable(message) => {
                OrchestratorError::InvocationUnavailable(message)
            }
            InvocationError::Timeout(timeout) => OrchestratorError::InvocationTimeout { timeout },
            InvocationError::NonZeroExit { code, output } => {
                OrchestratorError::InvocationFailed { code, output }
            }
            InvocationError::Io(message) => OrchestratorError::InvocationFailed {
                code: None,
                output: message,
            },
        }
    }
}

/// Trait for agent backends
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Run one invocation to completion and return its result
    async fn invoke(&self, request: &InvocationRequest) -> Result<AgentResult, InvocationError>;

    /// Run one invocation, forwarding output chunks as they are produced
    ///
    /// # Arguments
    /// * `request` - The invocation to run
    /// * `chunk_tx` - Channel receiving output chunks in production order
    async fn invoke_streaming(
        &self,
        request: &InvocationRequest,
        chunk_tx: mpsc::Sender<AgentChunk>,
    ) -> Result<AgentResult, InvocationError>;

    /// Get the backend ID
    fn id(&self) -> &str;

    /// Check if this backend can be started (binary exists)
    fn is_available(&self) -> bool;

    /// Human-readable description of the command in use
    fn describe(&self) -> String {
        self.id().to_string()
    }
}
