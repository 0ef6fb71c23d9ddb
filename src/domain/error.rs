use std::time::Duration;

use thiserror::Error;

use super::job::{JobId, JobPhase};

/// Longest slice of captured agent output carried in an error message
const MAX_ERROR_OUTPUT_CHARS: usize = 500;

/// Errors surfaced by the orchestrator to its clients
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// Agent backend missing or could not be started
    #[error("agent backend unavailable: {0}")]
    InvocationUnavailable(String),

    /// Agent invocation exceeded its wall-clock budget
    #[error("agent invocation timed out after {}s", .timeout.as_secs())]
    InvocationTimeout { timeout: Duration },

    /// Agent exited non-zero
    #[error("{}", describe_failure(.code, .output))]
    InvocationFailed { code: Option<i32>, output: String },

    /// Operation is not legal for the job's current phase
    #[error("cannot {operation} while job is {phase}")]
    InvalidPhase {
        phase: JobPhase,
        operation: &'static str,
    },

    /// Another operation is already in flight for this job
    #[error("job {job_id} is busy ({phase})")]
    JobBusy { job_id: JobId, phase: JobPhase },

    /// Unknown job or plan id
    #[error("not found: {0}")]
    NotFound(String),
}

impl OrchestratorError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::InvocationUnavailable(_) => "invocation_unavailable",
            OrchestratorError::InvocationTimeout { .. } => "invocation_timeout",
            OrchestratorError::InvocationFailed { .. } => "invocation_failed",
            OrchestratorError::InvalidPhase { .. } => "invalid_phase",
            OrchestratorError::JobBusy { .. } => "job_busy",
            OrchestratorError::NotFound(_) => "not_found",
        }
    }

    /// HTTP status used when the error crosses the transport
    pub fn http_status(&self) -> u16 {
        match self {
            OrchestratorError::InvocationUnavailable(_) => 503,
            OrchestratorError::InvocationTimeout { .. } => 504,
            OrchestratorError::InvocationFailed { .. } => 502,
            OrchestratorError::InvalidPhase { .. } => 409,
            OrchestratorError::JobBusy { .. } => 409,
            OrchestratorError::NotFound(_) => 404,
        }
    }

    pub fn job_not_found(job_id: &str) -> Self {
        OrchestratorError::NotFound(format!("job {job_id}"))
    }

    pub fn plan_not_found(plan_id: &str) -> Self {
        OrchestratorError::NotFound(format!("plan {plan_id}"))
    }
}

fn describe_failure(code: &Option<i32>, output: &str) -> String {
    let mut message = match code {
        Some(code) => format!("agent exited with code {code}"),
        None => "agent terminated by signal".to_string(),
    };
    let output = output.trim();
    if !output.is_empty() {
        let tail: String = if output.chars().count() > MAX_ERROR_OUTPUT_CHARS {
            let skip = output.chars().count() - MAX_ERROR_OUTPUT_CHARS;
            output.chars().skip(skip).collect()
        } else {
            output.to_string()
        };
        message.push_str(": ");
        message.push_str(&tail);
    }
    message
}
