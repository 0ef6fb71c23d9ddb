//! Core domain types for the shikigami runner

mod error;
mod job;
mod progress;

pub use error::OrchestratorError;
pub use job::{Job, JobId, JobPhase, PlanId, new_id};
pub use progress::{ProgressEvent, ProgressKind};
