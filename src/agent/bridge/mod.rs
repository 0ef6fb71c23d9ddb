//! Agent invocation bridge.
//!
//! Turns a (prompt, working directory, session, mode) tuple into either one
//! synchronous [`AgentResult`] or a lazy [`ProgressStream`], enforcing a hard
//! per-invocation deadline on top of the backend. Each call invokes the
//! backend at most once; nothing is retried.

mod stream;

pub use stream::ProgressStream;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::backend::{AgentBackend, AgentChunk, AgentResult, InvocationMode, InvocationRequest};
use crate::domain::{OrchestratorError, ProgressEvent};

/// Buffered chunks between the backend and the bridge
const CHUNK_BUFFER: usize = 64;

/// Deadline used when the configured budget does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Text of the `done` event closing a successful streaming invocation
pub const EXECUTE_DONE_TEXT: &str = "Execution completed successfully";

/// Hard wall-clock budgets per invocation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTimeouts {
    /// Budget for ask and plan
    pub invoke: Duration,
    /// Budget for execute
    pub execute: Duration,
}

impl Default for BridgeTimeouts {
    fn default() -> Self {
        Self {
            invoke: Duration::from_secs(180),
            execute: Duration::from_secs(1800),
        }
    }
}

#[derive(Clone)]
pub struct InvocationBridge {
    backend: Arc<dyn AgentBackend>,
    timeouts: BridgeTimeouts,
}

impl InvocationBridge {
    pub fn new(backend: Arc<dyn AgentBackend>, timeouts: BridgeTimeouts) -> Self {
        Self { backend, timeouts }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Run one read-only invocation to completion.
    pub async fn invoke(
        &self,
        prompt: String,
        working_dir: PathBuf,
        mode: InvocationMode,
        session_id: Option<String>,
    ) -> Result<AgentResult, OrchestratorError> {
        let timeout = self.timeouts.invoke;
        let request = InvocationRequest {
            prompt,
            working_dir,
            mode,
            session_id,
            timeout,
        };

        match tokio::time::timeout(timeout, self.backend.invoke(&request)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!(
                    "[shikigami:agent] {} invocation exceeded {}s",
                    mode,
                    timeout.as_secs()
                );
                Err(OrchestratorError::InvocationTimeout { timeout })
            }
        }
    }

    /// `InvocationUnavailable` unless the backend can be started
    pub fn check_available(&self) -> Result<(), OrchestratorError> {
        if self.backend.is_available() {
            return Ok(());
        }
        Err(OrchestratorError::InvocationUnavailable(format!(
            "agent backend '{}' is not available: {}",
            self.backend.id(),
            self.backend.describe()
        )))
    }

    /// Start an execute-mode invocation and return its progress stream.
    ///
    /// Events are numbered from `start_seq`. Callers report an unavailable
    /// backend through [`InvocationBridge::check_available`] first, so no
    /// stream exists for it. Must be called from within a Tokio runtime.
    pub fn invoke_streaming(
        &self,
        prompt: String,
        working_dir: PathBuf,
        session_id: Option<String>,
        start_seq: u64,
    ) -> ProgressStream {
        let request = InvocationRequest {
            prompt,
            working_dir,
            mode: InvocationMode::Execute,
            session_id,
            timeout: self.timeouts.execute,
        };
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(produce(self.backend.clone(), request, start_seq, event_tx));
        ProgressStream::new(event_rx)
    }
}

/// Numbers events and forwards them to the stream
struct EventSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    next_seq: u64,
}

impl EventSink {
    fn emit(&mut self, event: ProgressEvent) {
        // A dropped consumer does not stop the invocation.
        let _ = self.tx.send(event);
        self.next_seq += 1;
    }

    fn chunk(&mut self, chunk: AgentChunk) {
        let event = match chunk {
            AgentChunk::Step(text) => ProgressEvent::step(self.next_seq, text),
            AgentChunk::Log(text) => ProgressEvent::log(self.next_seq, text),
        };
        self.emit(event);
    }
}

/// `now + timeout`, saturating far in the future for huge budgets
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

async fn produce(
    backend: Arc<dyn AgentBackend>,
    request: InvocationRequest,
    start_seq: u64,
    event_tx: mpsc::UnboundedSender<ProgressEvent>,
) {
    let mut sink = EventSink {
        tx: event_tx,
        next_seq: start_seq,
    };
    let timeout = request.timeout;
    let sleep = tokio::time::sleep_until(deadline_after(timeout));
    tokio::pin!(sleep);

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<AgentChunk>(CHUNK_BUFFER);
    let mut invocation = backend.invoke_streaming(&request, chunk_tx);
    let mut chunks_open = true;

    let outcome: Result<AgentResult, OrchestratorError> = loop {
        tokio::select! {
            biased;
            _ = &mut sleep => {
                break Err(OrchestratorError::InvocationTimeout { timeout });
            }
            chunk = chunk_rx.recv(), if chunks_open => match chunk {
                Some(chunk) => sink.chunk(chunk),
                None => chunks_open = false,
            },
            result = &mut invocation => {
                while let Ok(chunk) = chunk_rx.try_recv() {
                    sink.chunk(chunk);
                }
                break result.map_err(OrchestratorError::from);
            }
        }
    };

    // Dropping the invocation kills the subprocess if it is still running.
    drop(invocation);
    chunk_rx.close();

    match outcome {
        Ok(result) => {
            let mut done = ProgressEvent::done(sink.next_seq, EXECUTE_DONE_TEXT);
            if let Some(session_id) = result.session_id {
                done = done.with_session_id(session_id);
            }
            sink.emit(done);
        }
        Err(err) => {
            if matches!(err, OrchestratorError::InvocationTimeout { .. }) {
                tracing::warn!(
                    "[shikigami:agent] Streaming invocation exceeded {}s, stopped forwarding",
                    timeout.as_secs()
                );
            }
            sink.emit(ProgressEvent::error(sink.next_seq, err.to_string()));
        }
    }
}

#[cfg(test)]
mod tests;
