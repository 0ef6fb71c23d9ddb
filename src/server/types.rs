//! Request and response bodies of the HTTP API

use serde::{Deserialize, Serialize};

use crate::domain::JobId;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub project_path: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobIdResponse {
    pub job_id: JobId,
}

/// `/ask`: either `job_id`, or `project_path` (plus optional `session_id`)
/// to create or reuse a job.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub objective: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `/approve` and `/execute`; the job is looked up by `plan_id` when
/// `job_id` is absent.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanActionRequest {
    pub plan_id: String,
    #[serde(default)]
    pub job_id: Option<JobId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApproveResponse {
    pub job_id: JobId,
    pub status: &'static str,
}
