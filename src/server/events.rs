//! `/events`: Server-Sent Events over a job subscription.
//!
//! The response is written straight to the connection as a chunked body,
//! one chunk per frame, so every frame is flushed as soon as its event is
//! appended and the connection stays usable after the terminal event.

use std::io::{self, Write};
use std::time::Duration;

use tiny_http::Request;

use super::{ServerContext, query_param, respond_error, respond_orchestrator_error};
use crate::domain::ProgressEvent;
use crate::job::Subscription;

/// Idle time after which a comment frame is sent to detect gone clients
const KEEP_ALIVE: Duration = Duration::from_secs(15);

pub fn stream_events(context: &ServerContext, query: &str, request: Request) {
    let Some(job_id) = query_param(query, "job_id") else {
        respond_error(request, 400, "bad_request", "job_id query parameter is required");
        return;
    };
    let subscription = match context.orchestrator.subscribe(&job_id) {
        Ok(subscription) => subscription,
        Err(e) => {
            respond_orchestrator_error(request, &e);
            return;
        }
    };

    tracing::info!("[shikigami:http] Event stream opened for job {}", job_id);
    let mut writer = request.into_writer();
    let result = pump(context, subscription, &mut writer);
    match result {
        Ok(sent) => tracing::info!(
            "[shikigami:http] Event stream for job {} closed after {} event(s)",
            job_id,
            sent
        ),
        Err(e) => tracing::debug!(
            "[shikigami:http] Event stream for job {} dropped: {}",
            job_id,
            e
        ),
    }
}

fn pump(
    context: &ServerContext,
    mut subscription: Subscription,
    writer: &mut impl Write,
) -> io::Result<usize> {
    write_headers(writer)?;
    let mut sent = 0;
    loop {
        let next = context
            .runtime
            .block_on(async { tokio::time::timeout(KEEP_ALIVE, subscription.next()).await });
        match next {
            Ok(Some(event)) => {
                write_frame(writer, &event)?;
                sent += 1;
            }
            Ok(None) => break,
            Err(_) => write_chunk(writer, b": keep-alive\n\n")?,
        }
    }
    write_chunk(writer, b"")?;
    Ok(sent)
}

fn write_headers(writer: &mut impl Write) -> io::Result<()> {
    let headers = concat!(
        "HTTP/1.1 200 OK\r\n",
        "Content-Type: text/event-stream; charset=utf-8\r\n",
        "Cache-Control: no-store\r\n",
        "Transfer-Encoding: chunked\r\n",
        "\r\n"
    );
    writer.write_all(headers.as_bytes())?;
    writer.flush()
}

fn write_frame(writer: &mut impl Write, event: &ProgressEvent) -> io::Result<()> {
    write_chunk(writer, format_frame(event).as_bytes())
}

/// One chunk of a chunked body; an empty chunk ends the body
fn write_chunk(writer: &mut impl Write, data: &[u8]) -> io::Result<()> {
    write!(writer, "{:x}\r\n", data.len())?;
    writer.write_all(data)?;
    writer.write_all(b"\r\n")?;
    writer.flush()
}

/// One SSE frame; multi-line text becomes several `data:` lines
fn format_frame(event: &ProgressEvent) -> String {
    let mut frame = format!("event: {}\nid: {}\n", event.kind, event.seq);
    if event.text.is_empty() {
        frame.push_str("data: \n");
    }
    for line in event.text.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}
