//! Cursor agent CLI adapter

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

use super::output::{ResultDocument, StreamLine, parse_json_output, parse_stream_line};
use crate::agent::backend::{
    AgentBackend, AgentChunk, AgentResult, InvocationError, InvocationMode, InvocationRequest,
};
use crate::agent::process::{
    CommandSpec, OutputLine, OutputSource, ProcessRunner, RunOutcome, RunStatus, find_executable,
};
use crate::config::AgentSettings;

const INSTALL_HINT: &str = "Install it with: curl -fsSL https://cursor.com/install | bash";

pub struct CursorAdapter {
    id: String,
    binary: PathBuf,
    model: String,
    extra_args: Vec<String>,
    env: HashMap<String, String>,
    runner: ProcessRunner,
}

impl CursorAdapter {
    pub fn new() -> Self {
        Self::from_settings(&AgentSettings::default())
    }

    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            id: "cursor".to_string(),
            binary: PathBuf::from(&settings.binary),
            model: settings.model.clone(),
            extra_args: settings.extra_args.clone(),
            env: settings.env.clone(),
            runner: ProcessRunner::new(),
        }
    }

    /// Resolve the agent binary, or report the backend as unavailable
    fn resolve_binary(&self) -> Result<PathBuf, InvocationError> {
        find_executable(&self.binary).ok_or_else(|| {
            InvocationError::Unavailable(format!(
                "Cursor agent CLI not found ({}). {}",
                self.binary.display(),
                INSTALL_HINT
            ))
        })
    }

    /// Build command arguments
    fn build_args(&self, request: &InvocationRequest, streaming: bool) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-p".to_string(),
            "--trust".to_string(),
            "--model".to_string(),
            self.model.clone(),
        ];

        if streaming {
            args.extend([
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--stream-partial-output".to_string(),
            ]);
        } else {
            args.extend(["--output-format".to_string(), "json".to_string()]);
        }

        if let Some(session_id) = request.session_id.as_deref().filter(|s| !s.is_empty()) {
            args.push("--resume".to_string());
            args.push(session_id.to_string());
        }

        match request.mode {
            InvocationMode::Ask | InvocationMode::Plan => {
                args.push("--mode".to_string());
                args.push(request.mode.as_str().to_string());
            }
            InvocationMode::Execute => args.push("--yolo".to_string()),
        }

        args.extend(self.extra_args.iter().cloned());

        // The prompt is positional and must come last.
        args.push(request.prompt.clone());
        args
    }

    fn command(&self, binary: PathBuf, request: &InvocationRequest, streaming: bool) -> CommandSpec {
        CommandSpec::new(binary)
            .args(self.build_args(request, streaming))
            .envs(&self.env)
    }

    fn log_launch(&self, request: &InvocationRequest, streaming: bool) {
        let resume = request
            .session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(12).collect::<String>())
            .unwrap_or_else(|| "new".to_string());
        tracing::info!(
            "[shikigami:agent] Launching {}agent CLI for {} (mode={}, resume={})",
            if streaming { "streaming " } else { "" },
            request.working_dir.display(),
            request.mode,
            resume
        );
    }
}

impl Default for CursorAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a finished run onto the backend error taxonomy
fn check_status(outcome: &RunOutcome, request: &InvocationRequest) -> Result<(), InvocationError> {
    match outcome.status {
        RunStatus::Success => Ok(()),
        RunStatus::Timeout => Err(InvocationError::Timeout(request.timeout)),
        RunStatus::Crashed { code } => {
            let mut output = outcome.stdout.trim().to_string();
            let stderr = outcome.stderr.trim();
            if !stderr.is_empty() {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(stderr);
            }
            Err(InvocationError::NonZeroExit { code, output })
        }
    }
}

#[async_trait]
impl AgentBackend for CursorAdapter {
    async fn invoke(&self, request: &InvocationRequest) -> Result<AgentResult, InvocationError> {
        let binary = self.resolve_binary()?;
        self.log_launch(request, false);

        let command = self.command(binary, request, false);
        let outcome = self
            .runner
            .run(&command, &request.working_dir, request.timeout, None)
            .await?;

        tracing::info!(
            "[shikigami:agent] Agent CLI exited ({:?}), output length {}",
            outcome.status,
            outcome.stdout.len()
        );
        check_status(&outcome, request)?;
        Ok(parse_json_output(&outcome.stdout))
    }

    async fn invoke_streaming(
        &self,
        request: &InvocationRequest,
        chunk_tx: mpsc::Sender<AgentChunk>,
    ) -> Result<AgentResult, InvocationError> {
        let binary = self.resolve_binary()?;
        self.log_launch(request, true);

        let command = self.command(binary, request, true);
        let (line_tx, mut line_rx) = mpsc::channel::<OutputLine>(256);

        let run = self
            .runner
            .run(&command, &request.working_dir, request.timeout, Some(line_tx));

        let forward = async {
            let mut final_doc: Option<ResultDocument> = None;
            let mut accumulated = String::new();
            while let Some(line) = line_rx.recv().await {
                let parsed = match line.source {
                    OutputSource::Stdout => parse_stream_line(&line.line),
                    OutputSource::Stderr if line.line.trim().is_empty() => StreamLine::Skip,
                    OutputSource::Stderr => StreamLine::Chunk(AgentChunk::Log(line.line)),
                };
                match parsed {
                    StreamLine::Chunk(chunk) => {
                        if let AgentChunk::Log(text) = &chunk {
                            accumulated.push_str(text);
                        }
                        let _ = chunk_tx.send(chunk).await;
                    }
                    StreamLine::Result(doc) => final_doc = Some(doc),
                    StreamLine::Skip => {}
                }
            }
            (final_doc, accumulated)
        };

        let (outcome, (final_doc, accumulated)) = tokio::join!(run, forward);
        let outcome = outcome?;

        tracing::info!(
            "[shikigami:agent] Streaming agent CLI exited ({:?})",
            outcome.status
        );
        check_status(&outcome, request)?;

        let result = match final_doc {
            Some(doc) => doc.into_agent_result(&accumulated),
            None => AgentResult {
                text: accumulated,
                ..Default::default()
            },
        };
        Ok(result)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        find_executable(&self.binary).is_some()
    }

    fn describe(&self) -> String {
        match find_executable(&self.binary) {
            Some(path) => format!("agent @ {}", path.display()),
            None => format!("{} (not found)", self.binary.display()),
        }
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
