//! Per-job artifact files.
//!
//! Write-only audit output under `<root>/<job_id>/`. Nothing here is read
//! back, and an I/O failure never fails the job operation that triggered it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::{Job, ProgressKind};

pub const ASK_FILE: &str = "ask_response.md";
pub const PLAN_FILE: &str = "plan.md";
pub const LOGS_FILE: &str = "logs.txt";
pub const RUN_FILE: &str = "run.json";

#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    root: Option<PathBuf>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// A store that writes nothing
    pub fn disabled() -> Self {
        Self { root: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    /// Directory holding one job's files
    pub fn job_dir(&self, job_id: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(job_id))
    }

    /// Save the answer of the last ask
    pub fn record_ask(&self, job: &Job) {
        if let Some(text) = &job.ask_text {
            self.store(&job.id, ASK_FILE, text);
        }
    }

    /// Save the current plan
    pub fn record_plan(&self, job: &Job) {
        if let Some(text) = &job.plan_text {
            self.store(&job.id, PLAN_FILE, text);
        }
    }

    /// Save the execute log and a dump of the job record.
    pub fn record_run(&self, job: &Job) {
        if !self.is_enabled() {
            return;
        }
        self.store(&job.id, LOGS_FILE, &execution_log(job));
        match serde_json::to_string_pretty(job) {
            Ok(json) => self.store(&job.id, RUN_FILE, &json),
            Err(e) => tracing::warn!(
                "[shikigami:jobs] Failed to serialize job {} for {}: {}",
                job.id,
                RUN_FILE,
                e
            ),
        }
    }

    fn store(&self, job_id: &str, name: &str, contents: &str) {
        let Some(dir) = self.job_dir(job_id) else {
            return;
        };
        if let Err(e) = write_file(&dir, name, contents) {
            tracing::warn!("[shikigami:jobs] Job {} artifact {}: {:#}", job_id, name, e);
        }
    }
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create artifact dir: {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, contents)
        .with_context(|| format!("Failed to write artifact: {}", path.display()))
}

/// Step and log text of the current turn, one event per line
fn execution_log(job: &Job) -> String {
    let mut out = String::new();
    for event in &job.events {
        if matches!(event.kind, ProgressKind::Step | ProgressKind::Log) {
            out.push_str(&event.text);
            if !event.text.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}
