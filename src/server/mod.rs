//! HTTP server for remote clients
//!
//! Exposes the orchestrator over JSON:
//! - GET /health - agent availability
//! - POST /jobs, /ask, /plan, /approve, /execute - job operations
//! - GET /job-status - poll model
//! - GET /events - push model as Server-Sent Events
//!
//! Every request is handled on its own thread so that long-lived event
//! streams never hold up other requests.

mod events;
mod handlers;
mod types;

use std::borrow::Cow;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tiny_http::{Request, Response, Server};
use tokio::runtime::Handle;
use tracing::{error, info};

use crate::domain::OrchestratorError;
use crate::orchestrator::Orchestrator;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024; // 2 MiB

/// What every request handler gets
#[derive(Clone)]
struct ServerContext {
    orchestrator: Arc<Orchestrator>,
    runtime: Handle,
}

/// A running server; dropping it stops accepting requests.
pub struct HttpServer {
    addr: SocketAddr,
    server: Arc<Server>,
    thread: Option<thread::JoinHandle<()>>,
}

impl HttpServer {
    /// The bound address (useful when binding port 0)
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting requests and wait for the accept loop to exit.
    /// Requests already being handled run to completion on their own threads.
    pub fn shutdown(mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        info!("[shikigami:http] Server on {} stopped", self.addr);
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

/// Bind `bind_addr` and serve requests on a background thread.
///
/// Async orchestrator operations are driven on `runtime`.
pub fn start_http_server(
    bind_addr: &str,
    orchestrator: Arc<Orchestrator>,
    runtime: Handle,
) -> Result<HttpServer> {
    let server = match Server::http(bind_addr) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("[shikigami:http] Failed to start server on {}: {}", bind_addr, e);
            return Err(anyhow!("Failed to bind {bind_addr}: {e}"));
        }
    };
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| anyhow!("Server on {bind_addr} has no IP address"))?;
    info!("[shikigami:http] Server listening on http://{}", addr);

    let context = ServerContext {
        orchestrator,
        runtime,
    };
    let listener = server.clone();
    let thread = thread::Builder::new()
        .name("shikigami-http".to_string())
        .spawn(move || {
            for request in listener.incoming_requests() {
                let context = context.clone();
                let spawned = thread::Builder::new()
                    .name("shikigami-http-request".to_string())
                    .spawn(move || handle_request(&context, request));
                if let Err(e) = spawned {
                    error!("[shikigami:http] Failed to spawn request thread: {}", e);
                }
            }
        })
        .context("Failed to spawn HTTP server thread")?;

    Ok(HttpServer {
        addr,
        server,
        thread: Some(thread),
    })
}

fn handle_request(context: &ServerContext, mut request: Request) {
    let method = request.method().to_string();
    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url.as_str(), ""),
    };
    tracing::debug!("[shikigami:http] {} {}", method, path);

    match (method.as_str(), path) {
        ("GET", "/health") => handlers::health(context, request),
        ("GET", "/job-status") => handlers::job_status(context, query, request),
        ("GET", "/events") => events::stream_events(context, query, request),

        ("POST", "/jobs" | "/ask" | "/plan" | "/approve" | "/execute") => {
            let body = match read_request_body(&mut request) {
                Ok(body) => body,
                Err(response) => {
                    let _ = request.respond(response);
                    return;
                }
            };
            match path {
                "/jobs" => handlers::create_job(context, &body, request),
                "/ask" => handlers::ask(context, &body, request),
                "/plan" => handlers::plan(context, &body, request),
                "/approve" => handlers::approve(context, &body, request),
                _ => handlers::execute(context, &body, request),
            }
        }

        _ => respond_error(request, 404, "not_found", &format!("no route for {method} {path}")),
    }
}

fn json_content_type() -> tiny_http::Header {
    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header is valid")
}

fn error_body(code: &str, message: &str) -> String {
    serde_json::json!({ "error": code, "message": message }).to_string()
}

fn error_response(status_code: u16, code: &str, message: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(error_body(code, message))
        .with_status_code(status_code)
        .with_header(json_content_type())
}

fn read_request_body(request: &mut Request) -> Result<String, Response<std::io::Cursor<Vec<u8>>>> {
    let mut body = String::new();
    let mut reader = request.as_reader().take((MAX_BODY_BYTES + 1) as u64);
    if let Err(e) = reader.read_to_string(&mut body) {
        error!("[shikigami:http] Failed to read body: {}", e);
        return Err(error_response(400, "bad_request", &format!("unreadable body: {e}")));
    }

    if body.len() > MAX_BODY_BYTES {
        return Err(error_response(
            413,
            "payload_too_large",
            &format!("body exceeds {MAX_BODY_BYTES} bytes"),
        ));
    }

    Ok(body)
}

/// Parse a JSON body; the error is the `bad_request` message
fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    serde_json::from_str(body).map_err(|e| format!("invalid JSON body: {e}"))
}

/// Percent-decoded value of `name` in a query string
fn query_param<'a>(query: &'a str, name: &str) -> Option<Cow<'a, str>> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .filter(|value| !value.is_empty())
}

fn respond_json(request: Request, status_code: u16, value: &impl Serialize) {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|e| error_body("serialize", &e.to_string()));
    let response = Response::from_string(body)
        .with_status_code(status_code)
        .with_header(json_content_type());
    let _ = request.respond(response);
}

fn respond_error(request: Request, status_code: u16, code: &str, message: &str) {
    let _ = request.respond(error_response(status_code, code, message));
}

fn respond_orchestrator_error(request: Request, err: &OrchestratorError) {
    respond_error(request, err.http_status(), err.code(), &err.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        assert_eq!(query_param("job_id=abc&x=1", "job_id").as_deref(), Some("abc"));
        assert_eq!(query_param("x=1&job_id=abc", "job_id").as_deref(), Some("abc"));
        assert_eq!(query_param("job_id=", "job_id"), None);
        assert_eq!(query_param("", "job_id"), None);
    }

    #[test]
    fn test_query_param_is_percent_decoded() {
        assert_eq!(
            query_param("job_id=my%20job%2F1", "job_id").as_deref(),
            Some("my job/1")
        );
        assert_eq!(query_param("job_id=%FF", "job_id"), None);
    }

    #[test]
    fn test_error_body_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&error_body("job_busy", "job x is busy (asking)")).unwrap();
        assert_eq!(value["error"], "job_busy");
        assert_eq!(value["message"], "job x is busy (asking)");
    }
}
