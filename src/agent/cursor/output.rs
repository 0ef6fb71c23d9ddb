//! Cursor agent CLI output parsing

use serde::Deserialize;

use crate::agent::backend::{AgentChunk, AgentResult};

/// Text used when the agent printed nothing at all
pub const NO_RESPONSE_TEXT: &str = "(No response from agent)";

/// Result document printed by `--output-format json`, also the final
/// `result` line of `--output-format stream-json`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultDocument {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub is_error: bool,
}

impl ResultDocument {
    pub fn into_agent_result(self, fallback_text: &str) -> AgentResult {
        let text = self
            .result
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| fallback_text.to_string());
        AgentResult {
            text,
            session_id: self.session_id.filter(|s| !s.is_empty()),
            duration_ms: self.duration_ms,
            is_error: self.is_error,
        }
    }
}

/// Typed lines of the stream-json output
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamChunk {
    TextDelta {
        #[serde(default)]
        content: String,
    },
    Result(ResultDocument),
    ToolUse {
        #[serde(default)]
        name: Option<String>,
    },
    ToolResult {
        #[serde(default)]
        is_error: bool,
    },
}

/// What one stdout line of a streaming run means
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    /// Forward as progress
    Chunk(AgentChunk),
    /// Final result metadata
    Result(ResultDocument),
    /// Nothing worth forwarding
    Skip,
}

/// Parse one line of stream-json output
pub fn parse_stream_line(line: &str) -> StreamLine {
    let line = line.trim();
    if line.is_empty() {
        return StreamLine::Skip;
    }

    if let Ok(chunk) = serde_json::from_str::<StreamChunk>(line) {
        return match chunk {
            StreamChunk::TextDelta { content } if content.is_empty() => StreamLine::Skip,
            StreamChunk::TextDelta { content } => StreamLine::Chunk(AgentChunk::Log(content)),
            StreamChunk::Result(doc) => StreamLine::Result(doc),
            StreamChunk::ToolUse { name } => StreamLine::Chunk(AgentChunk::Step(format!(
                "[Tool: {}]",
                name.as_deref().unwrap_or("unknown")
            ))),
            StreamChunk::ToolResult { .. } => {
                StreamLine::Chunk(AgentChunk::Step("[Tool completed]".to_string()))
            }
        };
    }

    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(serde_json::Value::Object(map)) => {
            let field = |key: &str| {
                map.get(key)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            let text = field("content")
                .or_else(|| field("result"))
                .unwrap_or_else(|| line.to_string());
            StreamLine::Chunk(AgentChunk::Log(text))
        }
        _ => StreamLine::Chunk(AgentChunk::Log(line.to_string())),
    }
}

/// Interpret the complete stdout of a `--output-format json` run
pub fn parse_json_output(stdout: &str) -> AgentResult {
    let raw = stdout.trim();
    if raw.is_empty() {
        return AgentResult {
            text: NO_RESPONSE_TEXT.to_string(),
            is_error: true,
            ..Default::default()
        };
    }

    match serde_json::from_str::<ResultDocument>(raw) {
        Ok(doc) => doc.into_agent_result(raw),
        Err(_) => {
            let preview: String = raw.chars().take(200).collect();
            tracing::warn!("[shikigami:agent] Agent returned non-JSON: {}", preview);
            AgentResult {
                text: raw.to_string(),
                ..Default::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_output() {
        let result = parse_json_output(
            r#"{"type":"result","result":"The answer","session_id":"abc-123","duration_ms":1200,"is_error":false}"#,
        );
        assert_eq!(result.text, "The answer");
        assert_eq!(result.session_id.as_deref(), Some("abc-123"));
        assert_eq!(result.duration_ms, Some(1200));
        assert!(!result.is_error);
    }

    #[test]
    fn test_parse_json_output_empty() {
        let result = parse_json_output("  \n");
        assert_eq!(result.text, NO_RESPONSE_TEXT);
        assert!(result.is_error);
        assert!(result.session_id.is_none());
    }

    #[test]
    fn test_parse_json_output_non_json_passthrough() {
        let result = parse_json_output("plain text answer\n");
        assert_eq!(result.text, "plain text answer");
        assert!(!result.is_error);
    }

    #[test]
    fn test_parse_json_output_error_flag() {
        let result = parse_json_output(r#"{"result":"quota exceeded","is_error":true,"session_id":""}"#);
        assert!(result.is_error);
        assert!(result.session_id.is_none());
    }

    #[test]
    fn test_stream_text_delta() {
        assert_eq!(
            parse_stream_line(r#"{"type":"text_delta","content":"Hello"}"#),
            StreamLine::Chunk(AgentChunk::Log("Hello".to_string()))
        );
        assert_eq!(
            parse_stream_line(r#"{"type":"text_delta","content":""}"#),
            StreamLine::Skip
        );
    }

    #[test]
    fn test_stream_tool_markers() {
        assert_eq!(
            parse_stream_line(r#"{"type":"tool_use","name":"edit_file","input":{}}"#),
            StreamLine::Chunk(AgentChunk::Step("[Tool: edit_file]".to_string()))
        );
        assert_eq!(
            parse_stream_line(r#"{"type":"tool_result","content":"ok"}"#),
            StreamLine::Chunk(AgentChunk::Step("[Tool completed]".to_string()))
        );
    }

    #[test]
    fn test_stream_result_line() {
        match parse_stream_line(r#"{"type":"result","result":"Done","session_id":"s1"}"#) {
            StreamLine::Result(doc) => {
                assert_eq!(doc.result.as_deref(), Some("Done"));
                assert_eq!(doc.session_id.as_deref(), Some("s1"));
            }
            other => panic!("expected result, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_unknown_and_raw_lines() {
        assert_eq!(
            parse_stream_line(r#"{"type":"status","content":"thinking"}"#),
            StreamLine::Chunk(AgentChunk::Log("thinking".to_string()))
        );
        assert_eq!(
            parse_stream_line("not json at all"),
            StreamLine::Chunk(AgentChunk::Log("not json at all".to_string()))
        );
        assert_eq!(parse_stream_line("   "), StreamLine::Skip);
    }
}
