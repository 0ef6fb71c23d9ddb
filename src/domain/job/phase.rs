use serde::{Deserialize, Serialize};

use crate::domain::error::OrchestratorError;

/// The phase of a job in the ask -> plan -> approve -> execute lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Created, nothing has run yet
    Idle,
    /// A read-only ask invocation is in flight
    Asking,
    /// The last ask finished
    AskDone,
    /// A read-only plan invocation is in flight
    Planning,
    /// A plan is ready for review
    PlanReady,
    /// The current plan was approved and may be executed once
    Approved,
    /// The approved plan is being executed
    Executing,
    /// Execution finished successfully
    Complete,
    /// The last operation failed
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Idle => "idle",
            JobPhase::Asking => "asking",
            JobPhase::AskDone => "ask_done",
            JobPhase::Planning => "planning",
            JobPhase::PlanReady => "plan_ready",
            JobPhase::Approved => "approved",
            JobPhase::Executing => "executing",
            JobPhase::Complete => "complete",
            JobPhase::Failed => "failed",
        }
    }

    /// An invocation is running for this job; it accepts no other operation.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobPhase::Asking | JobPhase::Planning | JobPhase::Executing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Complete | JobPhase::Failed)
    }

    /// Phases from which a fresh ask or plan may start.
    pub fn accepts_new_turn(&self) -> bool {
        matches!(
            self,
            JobPhase::Idle
                | JobPhase::AskDone
                | JobPhase::PlanReady
                | JobPhase::Complete
                | JobPhase::Failed
        )
    }

    /// Every legal (from, to) pair. Anything else is rejected.
    pub fn can_transition_to(&self, target: JobPhase) -> bool {
        use JobPhase::*;
        match (self, target) {
            (Idle | AskDone | PlanReady | Complete | Failed, Asking | Planning) => true,
            (Asking, AskDone | Failed) => true,
            (Planning, PlanReady | Failed) => true,
            (PlanReady, Approved) => true,
            (Approved, Executing | Failed) => true,
            (Executing, Complete | Failed) => true,
            _ => false,
        }
    }

    /// Check a transition, naming the attempted operation in the error.
    pub fn validate_transition(
        &self,
        target: JobPhase,
        operation: &'static str,
    ) -> Result<(), OrchestratorError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidPhase {
                phase: *self,
                operation,
            })
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
