//! Event/status publisher.
//!
//! Both read models sit on the job's own event log: [`StatusSnapshot`] for
//! pollers and [`Subscription`] for live readers. Writers bump the entry's
//! generation counter after every append, which wakes subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use super::registry::JobEntry;
use crate::domain::{Job, JobId, JobPhase, PlanId, ProgressEvent};

/// Pull-based view of a job for clients that poll
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub job_id: JobId,
    #[serde(rename = "state")]
    pub phase: JobPhase,
    pub turn: u32,
    pub event_count: usize,
    pub latest_event: Option<ProgressEvent>,
    pub session_id: String,
    pub plan_id: Option<PlanId>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn of(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            phase: job.phase,
            turn: job.turn,
            event_count: job.event_count(),
            latest_event: job.latest_event().cloned(),
            session_id: job.session_id.clone(),
            plan_id: job.plan_id.clone(),
            error: job.terminal_error.clone(),
            updated_at: job.updated_at,
        }
    }
}

/// Push-based reader of one job's events.
///
/// Starts at the end of the log as it was when subscribing; history is only
/// available through [`StatusSnapshot`] or the job record. Ends after the
/// first terminal event it delivers, or when the job is evicted. When a new
/// turn starts it continues from that turn's first event.
pub struct Subscription {
    entry: Arc<JobEntry>,
    generation: watch::Receiver<u64>,
    turn: u32,
    cursor: usize,
    finished: bool,
}

enum Next {
    Event(ProgressEvent),
    NewTurn(u32),
    Wait,
}

impl Subscription {
    pub(super) fn new(entry: Arc<JobEntry>) -> Self {
        let generation = entry.watch();
        let (turn, cursor) = entry.read(|job| (job.turn, job.event_count()));
        Self {
            entry,
            generation,
            turn,
            cursor,
            finished: false,
        }
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        loop {
            if self.finished {
                return None;
            }
            if self.entry.is_retired() {
                self.finished = true;
                return None;
            }

            self.generation.borrow_and_update();
            let (turn, cursor) = (self.turn, self.cursor);
            let step = self.entry.read(|job| {
                if job.turn != turn {
                    Next::NewTurn(job.turn)
                } else {
                    match job.events.get(cursor) {
                        Some(event) => Next::Event(event.clone()),
                        None => Next::Wait,
                    }
                }
            });

            match step {
                Next::Event(event) => {
                    self.cursor += 1;
                    if event.is_terminal() {
                        self.finished = true;
                    }
                    return Some(event);
                }
                Next::NewTurn(turn) => {
                    self.turn = turn;
                    self.cursor = 0;
                }
                Next::Wait => {
                    if self.generation.changed().await.is_err() {
                        self.finished = true;
                        return None;
                    }
                }
            }
        }
    }
}
