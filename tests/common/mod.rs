//! Shared test utilities: a scripted agent backend and orchestrator helpers

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use shikigami::agent::{
    AgentBackend, AgentChunk, AgentResult, BridgeTimeouts, InvocationBridge, InvocationError,
    InvocationRequest,
};
use shikigami::job::{ArtifactStore, JobRegistry, RegistryConfig, StatusSnapshot};
use shikigami::orchestrator::Orchestrator;

/// What the scripted backend does on its next invocation
#[derive(Debug, Clone)]
pub struct Script {
    pub text: String,
    pub session_id: Option<String>,
    /// Delay before the result is returned
    pub delay: Duration,
    /// Chunks emitted by streaming invocations, in order
    pub chunks: Vec<AgentChunk>,
    pub chunk_delay: Duration,
    pub failure: Option<InvocationError>,
}

impl Script {
    pub fn reply(text: &str) -> Self {
        Self {
            text: text.to_string(),
            session_id: Some("sess-1".to_string()),
            delay: Duration::ZERO,
            chunks: Vec::new(),
            chunk_delay: Duration::ZERO,
            failure: None,
        }
    }

    pub fn failing(error: InvocationError) -> Self {
        Self {
            failure: Some(error),
            ..Self::reply("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_chunks(mut self, chunks: &[&str], chunk_delay: Duration) -> Self {
        self.chunks = chunks
            .iter()
            .map(|c| AgentChunk::Log(c.to_string()))
            .collect();
        self.chunk_delay = chunk_delay;
        self
    }
}

/// Callback run on every availability check
type AvailabilityHook = Box<dyn Fn() + Send + Sync>;

/// In-process backend replaying a [`Script`]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    available: AtomicBool,
    availability_hook: Mutex<Option<AvailabilityHook>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<InvocationRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            available: AtomicBool::new(true),
            availability_hook: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn on_availability_check(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.availability_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn begin(&self, request: &InvocationRequest) -> Script {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.script.lock().unwrap().clone()
    }

    fn finish(script: Script) -> Result<AgentResult, InvocationError> {
        match script.failure {
            Some(error) => Err(error),
            None => Ok(AgentResult {
                text: script.text,
                session_id: script.session_id,
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn invoke(&self, request: &InvocationRequest) -> Result<AgentResult, InvocationError> {
        let script = self.begin(request);
        tokio::time::sleep(script.delay).await;
        Self::finish(script)
    }

    async fn invoke_streaming(
        &self,
        request: &InvocationRequest,
        chunk_tx: mpsc::Sender<AgentChunk>,
    ) -> Result<AgentResult, InvocationError> {
        let script = self.begin(request);
        for chunk in &script.chunks {
            tokio::time::sleep(script.chunk_delay).await;
            let _ = chunk_tx.send(chunk.clone()).await;
        }
        tokio::time::sleep(script.delay).await;
        Self::finish(script)
    }

    fn id(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        if let Some(hook) = &*self.availability_hook.lock().unwrap() {
            hook();
        }
        self.available.load(Ordering::SeqCst)
    }
}

pub fn timeouts(invoke: Duration, execute: Duration) -> BridgeTimeouts {
    BridgeTimeouts { invoke, execute }
}

/// Orchestrator over `backend` with artifacts disabled
pub fn orchestrator(backend: Arc<ScriptedBackend>, timeouts: BridgeTimeouts) -> Orchestrator {
    orchestrator_with(backend, timeouts, ArtifactStore::disabled())
}

pub fn orchestrator_with(
    backend: Arc<ScriptedBackend>,
    timeouts: BridgeTimeouts,
    artifacts: ArtifactStore,
) -> Orchestrator {
    let registry = Arc::new(JobRegistry::new(RegistryConfig::default()));
    Orchestrator::new(registry, InvocationBridge::new(backend, timeouts), artifacts)
}

/// Poll until the job leaves its in-flight phase
pub async fn wait_until_settled(orchestrator: &Orchestrator, job_id: &str) -> StatusSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = orchestrator.status(job_id).unwrap();
        if !status.phase.is_in_flight() {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} did not settle: {:?}",
            status.phase
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drive a fresh job in `project` through plan and approve; returns (job_id, plan_id)
pub async fn approved_job(orchestrator: &Orchestrator, project: &Path) -> (String, String) {
    let job_id = orchestrator.create_or_reuse_job(project.to_path_buf(), None);
    let plan = orchestrator
        .plan(&job_id, "add a health endpoint", &[])
        .await
        .unwrap();
    orchestrator.approve(&job_id, &plan.plan_id).unwrap();
    (job_id, plan.plan_id)
}
