use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of progress record produced while a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    /// Orchestrator or agent moved on to a new step
    Step,
    /// Free-form output from the agent
    Log,
    /// Invocation finished successfully (terminal)
    Done,
    /// Invocation failed (terminal)
    Error,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Step => "step",
            ProgressKind::Log => "log",
            ProgressKind::Done => "done",
            ProgressKind::Error => "error",
        }
    }

    /// `done` and `error` close an invocation; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressKind::Done | ProgressKind::Error)
    }
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One incremental unit of job progress.
///
/// `seq` is assigned when the event is appended to a job and is strictly
/// increasing, without gaps, within one turn of that job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Position of this event in the job's event log
    pub seq: u64,

    /// The kind of event
    pub kind: ProgressKind,

    /// Payload text (log line, step description, or error message)
    pub text: String,

    /// When this event was recorded
    pub timestamp: DateTime<Utc>,

    /// Backend session id, only set on a `done` event when the backend reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ProgressEvent {
    pub fn new(seq: u64, kind: ProgressKind, text: impl Into<String>) -> Self {
        Self {
            seq,
            kind,
            text: text.into(),
            timestamp: Utc::now(),
            session_id: None,
        }
    }

    pub fn step(seq: u64, text: impl Into<String>) -> Self {
        Self::new(seq, ProgressKind::Step, text)
    }

    pub fn log(seq: u64, text: impl Into<String>) -> Self {
        Self::new(seq, ProgressKind::Log, text)
    }

    pub fn done(seq: u64, text: impl Into<String>) -> Self {
        Self::new(seq, ProgressKind::Done, text)
    }

    pub fn error(seq: u64, text: impl Into<String>) -> Self {
        Self::new(seq, ProgressKind::Error, text)
    }

    /// Attach the session id reported by the backend
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        if !session_id.is_empty() {
            self.session_id = Some(session_id);
        }
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}
