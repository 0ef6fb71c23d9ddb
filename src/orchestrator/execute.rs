//! Execute: start the streaming invocation and pump its events into the job.

use std::sync::Arc;

use futures::StreamExt;

use super::Orchestrator;
use crate::agent::{ProgressStream, prompt};
use crate::domain::{JobId, OrchestratorError, ProgressKind};
use crate::job::{ArtifactStore, JobEntry};

impl Orchestrator {
    /// Start executing the approved plan. Returns once the invocation is
    /// running; progress is read through [`Orchestrator::status`] or
    /// [`Orchestrator::subscribe`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn execute(&self, job_id: &str, plan_id: &str) -> Result<JobId, OrchestratorError> {
        let entry = self.registry.get(job_id)?;

        // The availability check may scan PATH; run it outside the job lock.
        let available = self.bridge.check_available();

        let stream = entry.update(|job| -> Result<ProgressStream, OrchestratorError> {
            let plan_text = job.prepare_execute(plan_id)?;
            if let Err(e) = available {
                tracing::warn!("[shikigami:jobs] Job {} execute failed to start: {}", job.id, e);
                if let Err(fail) = job.fail_with_event(e.to_string()) {
                    tracing::warn!("[shikigami:jobs] Job {}: {}", job.id, fail);
                }
                return Err(e);
            }
            job.start_execute()?;
            // Streamed events are numbered after the opening step event.
            Ok(self.bridge.invoke_streaming(
                prompt::execute_prompt(&plan_text),
                job.project_path.clone(),
                job.resume_session().map(str::to_string),
                job.next_seq(),
            ))
        })?;

        tokio::spawn(pump_events(entry.clone(), stream, self.artifacts.clone()));
        Ok(entry.id().to_string())
    }
}

/// Append every streamed event to the job and settle it on the terminal one.
async fn pump_events(entry: Arc<JobEntry>, mut stream: ProgressStream, artifacts: ArtifactStore) {
    while let Some(event) = stream.next().await {
        let kind = event.kind;
        let text = event.text.clone();
        let session_id = event.session_id.clone();

        let settled = entry.update(|job| {
            job.append_event(event);
            match kind {
                ProgressKind::Done => job.complete_execute(session_id.as_deref()),
                ProgressKind::Error => job.fail(text),
                ProgressKind::Step | ProgressKind::Log => Ok(()),
            }
        });
        if let Err(e) = settled {
            tracing::warn!("[shikigami:jobs] Job {} could not settle: {}", entry.id(), e);
        }
    }

    // A producer that died without a terminal event still has to release the job.
    let unsettled = entry.read(|job| job.phase.is_in_flight());
    if unsettled {
        let result =
            entry.update(|job| job.fail_with_event("agent stream ended without a result"));
        if let Err(e) = result {
            tracing::warn!("[shikigami:jobs] Job {} could not settle: {}", entry.id(), e);
        }
    }

    let job = entry.snapshot();
    tracing::info!(
        "[shikigami:jobs] Job {} execute finished: {} ({} events)",
        job.id,
        job.phase,
        job.event_count()
    );
    artifacts.record_run(&job);
}
