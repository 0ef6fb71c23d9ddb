use super::*;
use crate::agent::backend::InvocationError;
use crate::domain::ProgressKind;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Backend that replays a fixed script
struct Scripted {
    chunks: Vec<AgentChunk>,
    chunk_delay: Duration,
    finish_delay: Duration,
    outcome: Result<AgentResult, InvocationError>,
    available: bool,
    completed: Arc<AtomicBool>,
}

impl Scripted {
    fn ok(text: &str) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_delay: Duration::ZERO,
            finish_delay: Duration::ZERO,
            outcome: Ok(AgentResult {
                text: text.to_string(),
                session_id: Some("sess-1".to_string()),
                ..Default::default()
            }),
            available: true,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl AgentBackend for Scripted {
    async fn invoke(&self, _request: &InvocationRequest) -> Result<AgentResult, InvocationError> {
        tokio::time::sleep(self.finish_delay).await;
        self.completed.store(true, Ordering::SeqCst);
        self.outcome.clone()
    }

    async fn invoke_streaming(
        &self,
        _request: &InvocationRequest,
        chunk_tx: mpsc::Sender<AgentChunk>,
    ) -> Result<AgentResult, InvocationError> {
        for chunk in &self.chunks {
            tokio::time::sleep(self.chunk_delay).await;
            let _ = chunk_tx.send(chunk.clone()).await;
        }
        tokio::time::sleep(self.finish_delay).await;
        self.completed.store(true, Ordering::SeqCst);
        self.outcome.clone()
    }

    fn id(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

fn bridge(backend: Scripted, timeout: Duration) -> InvocationBridge {
    InvocationBridge::new(
        Arc::new(backend),
        BridgeTimeouts {
            invoke: timeout,
            execute: timeout,
        },
    )
}

fn stream(bridge: &InvocationBridge, start_seq: u64) -> ProgressStream {
    bridge.invoke_streaming("go".to_string(), std::env::temp_dir(), None, start_seq)
}

#[tokio::test]
async fn test_invoke_returns_result() {
    let bridge = bridge(Scripted::ok("answer"), Duration::from_secs(5));
    let result = bridge
        .invoke("q".to_string(), std::env::temp_dir(), InvocationMode::Ask, None)
        .await
        .unwrap();
    assert_eq!(result.text, "answer");
    assert_eq!(result.session_id.as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn test_invoke_times_out() {
    let backend = Scripted {
        finish_delay: Duration::from_secs(10),
        ..Scripted::ok("late")
    };
    let bridge = bridge(backend, Duration::from_millis(100));
    let err = bridge
        .invoke("q".to_string(), std::env::temp_dir(), InvocationMode::Plan, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvocationTimeout { .. }));
}

#[tokio::test]
async fn test_invoke_maps_non_zero_exit() {
    let backend = Scripted {
        outcome: Err(InvocationError::NonZeroExit {
            code: Some(1),
            output: "boom".to_string(),
        }),
        ..Scripted::ok("")
    };
    let bridge = bridge(backend, Duration::from_secs(5));
    let err = bridge
        .invoke("q".to_string(), std::env::temp_dir(), InvocationMode::Ask, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvocationFailed { code: Some(1), .. }
    ));
}

#[tokio::test]
async fn test_streaming_numbers_events_from_start_seq() {
    let backend = Scripted {
        chunks: vec![
            AgentChunk::Log("one".to_string()),
            AgentChunk::Step("[Tool: edit]".to_string()),
            AgentChunk::Log("two".to_string()),
        ],
        ..Scripted::ok("done")
    };
    let bridge = bridge(backend, Duration::from_secs(5));
    let events: Vec<ProgressEvent> = stream(&bridge, 3).collect().await;

    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![3, 4, 5, 6]);
    let kinds: Vec<ProgressKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ProgressKind::Log,
            ProgressKind::Step,
            ProgressKind::Log,
            ProgressKind::Done
        ]
    );
    let done = events.last().unwrap();
    assert_eq!(done.text, EXECUTE_DONE_TEXT);
    assert_eq!(done.session_id.as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn test_streaming_failure_ends_with_single_error() {
    let backend = Scripted {
        chunks: vec![AgentChunk::Log("partial".to_string())],
        outcome: Err(InvocationError::NonZeroExit {
            code: Some(2),
            output: String::new(),
        }),
        ..Scripted::ok("")
    };
    let bridge = bridge(backend, Duration::from_secs(5));
    let events: Vec<ProgressEvent> = stream(&bridge, 0).collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].text, "partial");
    assert_eq!(events[1].kind, ProgressKind::Error);
    assert_eq!(events[1].text, "agent exited with code 2");
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_streaming_timeout_stops_forwarding() {
    let backend = Scripted {
        chunks: vec![
            AgentChunk::Log("early".to_string()),
            AgentChunk::Log("too late".to_string()),
        ],
        chunk_delay: Duration::from_millis(150),
        ..Scripted::ok("never")
    };
    let completed = backend.completed.clone();
    let bridge = bridge(backend, Duration::from_millis(250));
    let events: Vec<ProgressEvent> = stream(&bridge, 0).collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].text, "early");
    assert_eq!(events[1].kind, ProgressKind::Error);
    assert!(events[1].text.contains("timed out"));
    assert!(!completed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unavailable_backend_is_reported() {
    let backend = Scripted {
        available: false,
        ..Scripted::ok("")
    };
    let unavailable = bridge(backend, Duration::from_secs(5));
    let err = unavailable.check_available().unwrap_err();
    assert!(matches!(err, OrchestratorError::InvocationUnavailable(_)));
    assert!(err.to_string().contains("scripted"));

    let available = bridge(Scripted::ok(""), Duration::from_secs(5));
    assert!(available.check_available().is_ok());
}

#[tokio::test]
async fn test_streaming_with_huge_budget_still_finishes() {
    let backend = Scripted {
        chunks: vec![AgentChunk::Log("working".to_string())],
        ..Scripted::ok("done")
    };
    let bridge = bridge(backend, Duration::from_secs(u64::MAX));
    let events: Vec<ProgressEvent> = stream(&bridge, 0).collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].text, "working");
    assert_eq!(events[1].kind, ProgressKind::Done);
}

#[tokio::test]
async fn test_dropped_stream_leaves_invocation_running() {
    let backend = Scripted {
        chunks: vec![AgentChunk::Log("a".to_string()), AgentChunk::Log("b".to_string())],
        chunk_delay: Duration::from_millis(20),
        ..Scripted::ok("done")
    };
    let completed = backend.completed.clone();
    let bridge = bridge(backend, Duration::from_secs(5));

    let mut events = stream(&bridge, 0);
    let first = events.next().await.unwrap();
    assert_eq!(first.text, "a");
    drop(events);

    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !completed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "backend should finish after the consumer left");
}

#[tokio::test]
async fn test_stream_returns_none_after_terminal() {
    let bridge = bridge(Scripted::ok("x"), Duration::from_secs(5));
    let mut events = stream(&bridge, 0);
    let done = events.next().await.unwrap();
    assert_eq!(done.kind, ProgressKind::Done);
    assert!(events.next().await.is_none());
    assert!(events.next().await.is_none());
}
