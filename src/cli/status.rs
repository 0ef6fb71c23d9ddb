//! Status command implementation

use anyhow::Result;
use serde_json::Value;

use super::http::http_get_json;

/// Poll a running server for one job's status
pub fn status_command(base_url: &str, job_id: &str, json: bool) -> Result<()> {
    let url = format!(
        "{}/job-status?job_id={}",
        base_url.trim_end_matches('/'),
        job_id
    );
    let status = http_get_json(&url)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", format_status_line(&status));
    }
    Ok(())
}

fn format_status_line(status: &Value) -> String {
    let field = |name: &str| status.get(name).and_then(Value::as_str).unwrap_or("-");
    let events = status
        .get("event_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let turn = status.get("turn").and_then(Value::as_u64).unwrap_or(0);

    let mut line = format!(
        "#{} [{}] turn {}, {} event(s)",
        field("job_id"),
        field("state"),
        turn,
        events
    );
    if let Some(latest) = status.get("latest_event").filter(|v| !v.is_null()) {
        let kind = latest.get("kind").and_then(Value::as_str).unwrap_or("?");
        let text = latest.get("text").and_then(Value::as_str).unwrap_or("");
        let text: String = text.lines().next().unwrap_or("").chars().take(80).collect();
        line.push_str(&format!(" - last {kind}: {text}"));
    }
    if let Some(error) = status.get("error").and_then(Value::as_str) {
        line.push_str(&format!("\n    Error: {error}"));
    }
    line
}
