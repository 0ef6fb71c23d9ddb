//! Job orchestrator.
//!
//! Client-facing operations (ask, plan, approve, execute, status, subscribe)
//! over an explicitly constructed [`JobRegistry`] and [`InvocationBridge`].
//! Each operation takes the job's lock only to check and move its phase;
//! agent invocations run outside of it.

mod execute;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::agent::{
    AgentResult, BridgeTimeouts, CursorAdapter, InvocationBridge, InvocationMode, prompt,
};
use crate::config::Config;
use crate::domain::{Job, JobId, OrchestratorError, PlanId};
use crate::job::{
    ArtifactStore, JobEntry, JobRegistry, RegistryConfig, StatusSnapshot, Subscription,
    SweepHandle,
};

/// Answer to an ask
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub job_id: JobId,
    pub ask_text: String,
    pub session_id: String,
}

/// A freshly generated plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub job_id: JobId,
    pub plan_id: PlanId,
    #[serde(rename = "plan_markdown")]
    pub plan_text: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub agent_available: bool,
    pub agent_command: String,
    pub jobs: usize,
}

pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    bridge: InvocationBridge,
    artifacts: ArtifactStore,
    sweeper: Mutex<Option<SweepHandle>>,
}

impl Orchestrator {
    pub fn new(registry: Arc<JobRegistry>, bridge: InvocationBridge, artifacts: ArtifactStore) -> Self {
        Self {
            registry,
            bridge,
            artifacts,
            sweeper: Mutex::new(None),
        }
    }

    /// Build the registry, the Cursor-backed bridge and the artifact store from config
    pub fn from_config(config: &Config) -> Self {
        let registry = Arc::new(JobRegistry::new(RegistryConfig {
            retention: Duration::from_secs(config.jobs.retention_seconds),
            max_jobs: config.jobs.max_jobs,
        }));
        let bridge = InvocationBridge::new(
            Arc::new(CursorAdapter::from_settings(&config.agent)),
            BridgeTimeouts {
                invoke: config.timeouts.invoke(),
                execute: config.timeouts.execute(),
            },
        );
        let artifacts = match config.artifacts_dir() {
            Some(dir) => ArtifactStore::new(dir),
            None => ArtifactStore::disabled(),
        };
        Self::new(registry, bridge, artifacts)
    }

    /// Start the periodic eviction sweep. Replaces a running one.
    pub fn start_sweeper(&self, interval: Duration) {
        let handle = self.registry.spawn_sweeper(interval);
        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        drop(previous);
    }

    /// Stop the sweep task and wait for it to exit
    pub async fn shutdown(&self) {
        let handle = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            tracing::info!("[shikigami:jobs] Orchestrator shut down");
        }
    }

    /// Reuse the latest idle job of this conversation or create a new one
    pub fn create_or_reuse_job(&self, project_path: PathBuf, session_id: Option<&str>) -> JobId {
        self.registry
            .create_or_reuse(project_path, session_id)
            .id()
            .to_string()
    }

    /// Ask a read-only question in the job's project
    pub async fn ask(&self, job_id: &str, message: &str) -> Result<AskOutcome, OrchestratorError> {
        let entry = self.registry.get(job_id)?;
        entry.update(|job| job.begin_ask())?;

        let job = self
            .run_read_only(entry, InvocationMode::Ask, prompt::ask_prompt(message), |job, result| {
                job.complete_ask(result.text, result.session_id.as_deref())
            })
            .await?;
        self.artifacts.record_ask(&job);

        Ok(AskOutcome {
            job_id: job.id,
            ask_text: job.ask_text.unwrap_or_default(),
            session_id: job.session_id,
        })
    }

    /// Generate a plan, superseding the job's previous one
    pub async fn plan(
        &self,
        job_id: &str,
        objective: &str,
        constraints: &[String],
    ) -> Result<PlanOutcome, OrchestratorError> {
        let entry = self.registry.get(job_id)?;
        entry.update(|job| job.begin_plan())?;

        let job = self
            .run_read_only(
                entry,
                InvocationMode::Plan,
                prompt::plan_prompt(objective, constraints),
                |job, result| {
                    job.complete_plan(result.text, result.session_id.as_deref())
                        .map(|_| ())
                },
            )
            .await?;
        self.artifacts.record_plan(&job);

        Ok(PlanOutcome {
            job_id: job.id,
            plan_id: job.plan_id.unwrap_or_default(),
            plan_text: job.plan_text.unwrap_or_default(),
            session_id: job.session_id,
        })
    }

    /// Approve the job's current plan
    pub fn approve(&self, job_id: &str, plan_id: &str) -> Result<JobId, OrchestratorError> {
        let entry = self.registry.get(job_id)?;
        entry.update(|job| job.approve(plan_id))?;
        Ok(entry.id().to_string())
    }

    /// Poll model
    pub fn status(&self, job_id: &str) -> Result<StatusSnapshot, OrchestratorError> {
        Ok(self.registry.get(job_id)?.status())
    }

    /// Push model: events appended after this call
    pub fn subscribe(&self, job_id: &str) -> Result<Subscription, OrchestratorError> {
        Ok(self.registry.get(job_id)?.subscribe())
    }

    /// Full copy of the job record
    pub fn job(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        Ok(self.registry.get(job_id)?.snapshot())
    }

    /// Id of the job whose current plan is `plan_id`
    pub fn find_by_plan_id(&self, plan_id: &str) -> Result<JobId, OrchestratorError> {
        Ok(self.registry.find_by_plan_id(plan_id)?.id().to_string())
    }

    pub fn health(&self) -> HealthReport {
        let agent_available = self.bridge.is_available();
        HealthReport {
            status: if agent_available { "ok" } else { "degraded" },
            agent_available,
            agent_command: self.bridge.describe(),
            jobs: self.registry.len(),
        }
    }

    /// Run one ask/plan invocation for a job that already entered its
    /// in-flight phase, and settle the job with the outcome.
    ///
    /// The invocation runs on its own task so the job always settles even if
    /// the caller stops waiting.
    async fn run_read_only<F>(
        &self,
        entry: Arc<JobEntry>,
        mode: InvocationMode,
        prompt: String,
        complete: F,
    ) -> Result<Job, OrchestratorError>
    where
        F: FnOnce(&mut Job, AgentResult) -> Result<(), OrchestratorError> + Send + 'static,
    {
        let (working_dir, session_id) = entry.read(|job| {
            (
                job.project_path.clone(),
                job.resume_session().map(str::to_string),
            )
        });
        let bridge = self.bridge.clone();
        let task_entry = entry.clone();

        let task = tokio::spawn(async move {
            let entry = task_entry;
            let outcome = bridge.invoke(prompt, working_dir, mode, session_id).await;
            match outcome {
                Ok(result) => entry.update(|job| -> Result<Job, OrchestratorError> {
                    complete(job, result)?;
                    Ok(job.clone())
                }),
                Err(e) => {
                    tracing::warn!("[shikigami:jobs] Job {} {} failed: {}", entry.id(), mode, e);
                    settle_failed(&entry, &e);
                    Err(e)
                }
            }
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = OrchestratorError::InvocationFailed {
                    code: None,
                    output: format!("{mode} task aborted: {e}"),
                };
                settle_failed(&entry, &error);
                Err(error)
            }
        }
    }
}

/// Record `error` on the job's event log and move it to `Failed`.
fn settle_failed(entry: &JobEntry, error: &OrchestratorError) {
    let result = entry.update(|job| job.fail_with_event(error.to_string()));
    if let Err(e) = result {
        tracing::warn!(
            "[shikigami:jobs] Job {} could not record failure: {}",
            entry.id(),
            e
        );
    }
}
