//! Job registry: the process-wide table of active and recent jobs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::publisher::{StatusSnapshot, Subscription};
use crate::domain::{Job, JobId, OrchestratorError, new_id};

/// Retention and capacity limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Settled jobs untouched for longer than this are purged
    pub retention: Duration,
    /// Capacity; the least recently updated settled job is evicted on overflow
    pub max_jobs: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(3600),
            max_jobs: 256,
        }
    }
}

/// One job record plus the notification primitive its readers observe.
///
/// The record is only mutated through [`JobEntry::update`], which bumps the
/// generation counter so subscribers wake up.
pub struct JobEntry {
    id: JobId,
    job: Mutex<Job>,
    generation: watch::Sender<u64>,
    retired: AtomicBool,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            id: job.id.clone(),
            job: Mutex::new(job),
            generation,
            retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, Job> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read the job under its lock
    pub fn read<R>(&self, f: impl FnOnce(&Job) -> R) -> R {
        f(&*self.lock())
    }

    /// Mutate the job under its lock and notify watchers
    pub fn update<R>(&self, f: impl FnOnce(&mut Job) -> R) -> R {
        let result = f(&mut *self.lock());
        self.notify();
        result
    }

    /// Clone of the current record
    pub fn snapshot(&self) -> Job {
        self.read(Job::clone)
    }

    pub fn status(&self) -> StatusSnapshot {
        self.read(StatusSnapshot::of)
    }

    /// Subscribe to events appended from now on
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        Subscription::new(Arc::clone(self))
    }

    pub(super) fn watch(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub(super) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.notify();
    }

    fn notify(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    fn is_expired(&self, retention: TimeDelta) -> bool {
        self.read(|job| job.is_settled() && Utc::now() - job.updated_at > retention)
    }
}

/// Manages job records (in-memory only, no persistence)
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Arc<JobEntry>>>,
    config: RegistryConfig,
}

impl JobRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobEntry>>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn retention(&self) -> TimeDelta {
        TimeDelta::from_std(self.config.retention).unwrap_or(TimeDelta::MAX)
    }

    /// Create a fresh idle job
    pub fn create(&self, project_path: PathBuf, session_id: &str) -> Arc<JobEntry> {
        let mut jobs = self.table();
        self.make_room(&mut jobs);

        let mut id = new_id();
        while jobs.contains_key(&id) {
            id = new_id();
        }
        let entry = Arc::new(JobEntry::new(Job::new(
            id.clone(),
            project_path.clone(),
            session_id,
        )));
        jobs.insert(id.clone(), entry.clone());
        tracing::info!(
            "[shikigami:jobs] Created job {} for project {}",
            id,
            project_path.display()
        );
        entry
    }

    /// Reuse the latest job of the same conversation that can start a new ask
    /// or plan, or create one.
    pub fn create_or_reuse(&self, project_path: PathBuf, session_id: Option<&str>) -> Arc<JobEntry> {
        let session_id = session_id.unwrap_or("").trim();
        if !session_id.is_empty() {
            let retention = self.retention();
            let reusable = {
                let jobs = self.table();
                jobs.values()
                    .filter(|entry| !entry.is_expired(retention))
                    .filter_map(|entry| {
                        entry.read(|job| {
                            (job.phase.accepts_new_turn()
                                && job.session_id == session_id
                                && job.project_path == project_path)
                                .then_some((job.updated_at, entry.clone()))
                        })
                    })
                    .max_by_key(|(updated_at, _)| *updated_at)
                    .map(|(_, entry)| entry)
            };
            if let Some(entry) = reusable {
                tracing::info!(
                    "[shikigami:jobs] Reusing job {} for session {}",
                    entry.id(),
                    session_id.chars().take(12).collect::<String>()
                );
                return entry;
            }
        }
        self.create(project_path, session_id)
    }

    /// Look up a job, purging it first if it expired
    pub fn get(&self, id: &str) -> Result<Arc<JobEntry>, OrchestratorError> {
        let mut jobs = self.table();
        let entry = jobs
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::job_not_found(id))?;
        if entry.is_expired(self.retention()) {
            jobs.remove(id);
            entry.retire();
            tracing::info!("[shikigami:jobs] Job {} expired", id);
            return Err(OrchestratorError::job_not_found(id));
        }
        Ok(entry)
    }

    /// Find the job whose current plan is `plan_id`
    pub fn find_by_plan_id(&self, plan_id: &str) -> Result<Arc<JobEntry>, OrchestratorError> {
        let id = {
            let jobs = self.table();
            jobs.values()
                .find(|entry| entry.read(|job| job.plan_id.as_deref() == Some(plan_id)))
                .map(|entry| entry.id().to_string())
        };
        match id {
            Some(id) => self.get(&id),
            None => Err(OrchestratorError::plan_not_found(plan_id)),
        }
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Remove every expired job; returns how many were removed
    pub fn sweep(&self) -> usize {
        let retention = self.retention();
        let mut jobs = self.table();
        let expired: Vec<JobId> = jobs
            .iter()
            .filter(|(_, entry)| entry.is_expired(retention))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(entry) = jobs.remove(id) {
                entry.retire();
            }
        }
        if !expired.is_empty() {
            tracing::info!(
                "[shikigami:jobs] Evicted {} expired job(s), {} remaining",
                expired.len(),
                jobs.len()
            );
        }
        expired.len()
    }

    /// Evict the least recently updated settled job while at capacity
    fn make_room(&self, jobs: &mut HashMap<JobId, Arc<JobEntry>>) {
        while jobs.len() >= self.config.max_jobs {
            let oldest = jobs
                .values()
                .filter_map(|entry| {
                    entry.read(|job| job.is_settled().then_some((job.updated_at, job.id.clone())))
                })
                .min_by_key(|(updated_at, _)| *updated_at)
                .map(|(_, id)| id);
            let Some(id) = oldest else {
                tracing::warn!(
                    "[shikigami:jobs] Registry over capacity ({}) with every job in flight",
                    self.config.max_jobs
                );
                return;
            };
            if let Some(entry) = jobs.remove(&id) {
                entry.retire();
            }
            tracing::info!("[shikigami:jobs] Evicted job {} (capacity)", id);
        }
    }

    /// Start the periodic eviction sweep
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let registry = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        registry.sweep();
                    }
                }
            }
            tracing::debug!("[shikigami:jobs] Sweeper stopped");
        });
        SweepHandle {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Owns the background sweep task; dropping it stops the sweep.
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Stop the sweep and wait for the task to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
