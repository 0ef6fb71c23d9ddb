use chrono::Utc;
use std::path::PathBuf;

use super::{Job, JobId, JobPhase, PlanId, new_id};
use crate::domain::{OrchestratorError, ProgressEvent, ProgressKind};

impl Job {
    /// Create a new idle job
    pub fn new(id: JobId, project_path: PathBuf, session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_path,
            session_id: session_id.into(),
            phase: JobPhase::Idle,
            turn: 0,
            plan_id: None,
            plan_text: None,
            ask_text: None,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
            terminal_error: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Sequence number the next appended event receives
    pub fn next_seq(&self) -> u64 {
        self.events.len() as u64
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn latest_event(&self) -> Option<&ProgressEvent> {
        self.events.last()
    }

    /// Append an event, stamping it with the next sequence number.
    pub fn append_event(&mut self, mut event: ProgressEvent) -> u64 {
        let seq = self.next_seq();
        if event.seq != seq {
            tracing::debug!(
                "[shikigami:jobs] Job {} restamped event seq {} -> {}",
                self.id,
                event.seq,
                seq
            );
        }
        event.seq = seq;
        self.events.push(event);
        self.touch();
        seq
    }

    pub fn push_event(&mut self, kind: ProgressKind, text: impl Into<String>) -> u64 {
        let event = ProgressEvent::new(self.next_seq(), kind, text);
        self.append_event(event)
    }

    /// Adopt the session id the backend reported. Empty reports keep the old one.
    pub fn adopt_session(&mut self, session_id: Option<&str>) {
        if let Some(session_id) = session_id.filter(|s| !s.is_empty()) {
            self.session_id = session_id.to_string();
        }
    }

    /// The backend session to resume, if any
    pub fn resume_session(&self) -> Option<&str> {
        if self.session_id.is_empty() {
            None
        } else {
            Some(&self.session_id)
        }
    }

    fn transition(
        &mut self,
        target: JobPhase,
        operation: &'static str,
    ) -> Result<(), OrchestratorError> {
        self.phase.validate_transition(target, operation)?;
        let from = self.phase;
        self.phase = target;
        self.touch();
        tracing::info!(
            "[shikigami:jobs] Job {} {} -> {} (turn {})",
            self.id,
            from,
            target,
            self.turn
        );
        Ok(())
    }

    fn ensure_not_busy(&self) -> Result<(), OrchestratorError> {
        if self.phase.is_in_flight() {
            return Err(OrchestratorError::JobBusy {
                job_id: self.id.clone(),
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn start_new_turn(&mut self) {
        self.turn += 1;
        self.events.clear();
        self.terminal_error = None;
    }

    fn begin_read_only(
        &mut self,
        target: JobPhase,
        operation: &'static str,
    ) -> Result<(), OrchestratorError> {
        self.ensure_not_busy()?;
        self.phase.validate_transition(target, operation)?;
        if self.phase.is_terminal() {
            self.start_new_turn();
        }
        self.transition(target, operation)
    }

    /// Move into `Asking`. Rejected with `JobBusy` while another operation runs.
    pub fn begin_ask(&mut self) -> Result<(), OrchestratorError> {
        self.begin_read_only(JobPhase::Asking, "ask")
    }

    /// Move into `Planning`. Rejected with `JobBusy` while another operation runs.
    pub fn begin_plan(&mut self) -> Result<(), OrchestratorError> {
        self.begin_read_only(JobPhase::Planning, "plan")
    }

    pub fn complete_ask(
        &mut self,
        text: String,
        session_id: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        self.adopt_session(session_id);
        self.ask_text = Some(text);
        let done = ProgressEvent::done(self.next_seq(), "Ask completed")
            .with_session_id(self.session_id.clone());
        self.append_event(done);
        self.transition(JobPhase::AskDone, "complete ask")
    }

    /// Store a freshly generated plan, superseding any previous one.
    pub fn complete_plan(
        &mut self,
        text: String,
        session_id: Option<&str>,
    ) -> Result<PlanId, OrchestratorError> {
        self.adopt_session(session_id);
        let plan_id = new_id();
        self.plan_id = Some(plan_id.clone());
        self.plan_text = Some(text);
        let done = ProgressEvent::done(self.next_seq(), "Plan generation completed")
            .with_session_id(self.session_id.clone());
        self.append_event(done);
        self.transition(JobPhase::PlanReady, "complete plan")?;
        Ok(plan_id)
    }

    fn ensure_current_plan(
        &self,
        plan_id: &str,
        operation: &'static str,
    ) -> Result<(), OrchestratorError> {
        if self.plan_id.as_deref() != Some(plan_id) {
            return Err(OrchestratorError::InvalidPhase {
                phase: self.phase,
                operation,
            });
        }
        Ok(())
    }

    /// Approve the current plan. Phase is left untouched on rejection.
    pub fn approve(&mut self, plan_id: &str) -> Result<(), OrchestratorError> {
        self.ensure_current_plan(plan_id, "approve")?;
        self.ensure_not_busy()?;
        if self.phase != JobPhase::PlanReady {
            return Err(OrchestratorError::InvalidPhase {
                phase: self.phase,
                operation: "approve",
            });
        }
        self.transition(JobPhase::Approved, "approve")
    }

    /// Check that `plan_id` may be executed now and return its text.
    pub fn prepare_execute(&self, plan_id: &str) -> Result<String, OrchestratorError> {
        self.ensure_current_plan(plan_id, "execute")?;
        self.ensure_not_busy()?;
        if self.phase != JobPhase::Approved {
            return Err(OrchestratorError::InvalidPhase {
                phase: self.phase,
                operation: "execute",
            });
        }
        Ok(self.plan_text.clone().unwrap_or_default())
    }

    /// Move into `Executing` and record the opening step event.
    pub fn start_execute(&mut self) -> Result<(), OrchestratorError> {
        self.transition(JobPhase::Executing, "execute")?;
        self.push_event(ProgressKind::Step, "Starting agent in execute mode");
        Ok(())
    }

    pub fn complete_execute(&mut self, session_id: Option<&str>) -> Result<(), OrchestratorError> {
        self.adopt_session(session_id);
        self.transition(JobPhase::Complete, "complete execute")
    }

    /// Mark the job failed without recording an event.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), OrchestratorError> {
        self.transition(JobPhase::Failed, "fail")?;
        self.terminal_error = Some(message.into());
        Ok(())
    }

    /// Record an `error` event and mark the job failed.
    pub fn fail_with_event(&mut self, message: impl Into<String>) -> Result<(), OrchestratorError> {
        self.phase.validate_transition(JobPhase::Failed, "fail")?;
        let message = message.into();
        self.push_event(ProgressKind::Error, message.clone());
        self.fail(message)
    }

    /// Settled jobs hold no running invocation.
    pub fn is_settled(&self) -> bool {
        !self.phase.is_in_flight()
    }
}
