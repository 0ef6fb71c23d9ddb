mod impls;
mod phase;

pub use phase::JobPhase;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ProgressEvent;

/// Unique identifier for a job (12 lowercase hex chars)
pub type JobId = String;

/// Identifier of one generated plan
pub type PlanId = String;

/// Generate a fresh 12-char identifier for jobs and plans
pub fn new_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// One conversational/execution thread driven through ask, plan, approve and execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: JobId,

    /// Project directory the agent runs in
    pub project_path: PathBuf,

    /// Backend session token; empty means no prior context
    #[serde(default)]
    pub session_id: String,

    /// Current phase
    pub phase: JobPhase,

    /// Logical turn, bumped when a finished job is asked or planned again
    #[serde(default)]
    pub turn: u32,

    /// Id of the current plan, set after a successful plan
    #[serde(default)]
    pub plan_id: Option<PlanId>,

    /// Text of the current plan
    #[serde(default)]
    pub plan_text: Option<String>,

    /// Answer from the last successful ask
    #[serde(default)]
    pub ask_text: Option<String>,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When the job was last updated
    pub updated_at: DateTime<Utc>,

    /// Progress events of the current turn, in append order
    #[serde(default)]
    pub events: Vec<ProgressEvent>,

    /// Error message if the job failed
    #[serde(default)]
    pub terminal_error: Option<String>,
}
