//! HTTP client helpers for talking to a running server.

use anyhow::{Context, Result};

fn format_http_error(code: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {code}");
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return format!("HTTP {code}: {body}");
    };

    let error = value
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap_or("http_error");
    match value.get("message").and_then(|v| v.as_str()) {
        Some(message) => format!("HTTP {code} {error}: {message}"),
        None => format!("HTTP {code} {error}: {body}"),
    }
}

pub(super) fn http_get_json(url: &str) -> Result<serde_json::Value> {
    let resp = ureq::get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            anyhow::anyhow!(format_http_error(code, &body))
        }
        other => anyhow::anyhow!(other),
    })?;

    let body = resp.into_string().context("Failed to read response body")?;
    let json: serde_json::Value =
        serde_json::from_str(&body).context("Failed to parse JSON response")?;
    Ok(json)
}
